use regex::Regex;
use std::sync::LazyLock;

use crate::error::AppError;

static COLUMN_INVALID_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9-]+").expect("valid column regex"));
static TABLE_INVALID_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_]+").expect("valid table regex"));
static DATABASE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid database regex"));

/// Turns untrusted header tokens and path segments into identifiers that are
/// safe to interpolate into DDL.
pub struct IdentifierSanitizer;

impl IdentifierSanitizer {
    /// Sanitize a raw CSV header token into a column name.
    ///
    /// Trim, lowercase, strip one leading and one trailing double quote, then
    /// collapse every run outside `[a-z0-9-]` into a single `-`.
    pub fn column_name(raw: &str) -> String {
        let lowered = raw.trim().to_lowercase();
        let unquoted = lowered.strip_prefix('"').unwrap_or(&lowered);
        let unquoted = unquoted.strip_suffix('"').unwrap_or(unquoted);
        COLUMN_INVALID_RUN.replace_all(unquoted, "-").into_owned()
    }

    /// Sanitize a storage path segment into a table name (`[a-z0-9_]` only)
    pub fn table_name(segment: &str) -> String {
        TABLE_INVALID_RUN
            .replace_all(&segment.to_lowercase(), "_")
            .into_owned()
    }

    /// Database names come from configuration and are interpolated unquoted
    pub fn validate_database_name(name: &str) -> Result<(), AppError> {
        if DATABASE_NAME.is_match(name) {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "Database name '{}' must only contain letters, digits and underscores",
                name
            )))
        }
    }

    /// Escape a value for use inside a single-quoted SQL string literal
    pub fn quote_literal(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }
}
