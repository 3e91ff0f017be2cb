use crate::error::AppError;
use crate::models::Delimiter;
use crate::validation::IdentifierSanitizer;

/// Bytes read from a CSV object when looking for its header line
pub const HEADER_READ_LIMIT: usize = 64 * 1024;

/// Infers the delimiter and column names from a CSV header line
pub struct SchemaInferrer;

impl SchemaInferrer {
    /// Extract the first line from the start of an object
    pub fn first_line(head: &[u8]) -> Result<String, AppError> {
        let text = String::from_utf8_lossy(head);
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        let line = text.split('\n').next().unwrap_or_default();
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.trim().is_empty() {
            return Err(AppError::MalformedInput(
                "CSV object has no header line".to_string(),
            ));
        }

        Ok(line.to_string())
    }

    /// Pick the delimiter and sanitize the header fields.
    ///
    /// The line is split by `|` and by `,`; the split with more fields wins,
    /// ties go to the pipe. Quoted fields containing the other delimiter are
    /// not understood.
    pub fn infer(first_line: &str) -> Result<(Delimiter, Vec<String>), AppError> {
        if first_line.trim().is_empty() {
            return Err(AppError::MalformedInput(
                "CSV header line is empty".to_string(),
            ));
        }

        let pipe_fields: Vec<&str> = first_line.split('|').collect();
        let comma_fields: Vec<&str> = first_line.split(',').collect();

        let (delimiter, fields) = if pipe_fields.len() >= comma_fields.len() {
            (Delimiter::Pipe, pipe_fields)
        } else {
            (Delimiter::Comma, comma_fields)
        };

        let columns: Vec<String> = fields
            .into_iter()
            .map(IdentifierSanitizer::column_name)
            .collect();

        if columns.iter().all(|name| name.is_empty()) {
            return Err(AppError::MalformedInput(format!(
                "CSV header '{}' has no usable column names",
                first_line
            )));
        }

        Ok((delimiter, columns))
    }
}
