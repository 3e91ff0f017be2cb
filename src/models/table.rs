use serde::{Deserialize, Serialize};

use crate::validation::IdentifierSanitizer;

/// Field delimiter detected from a CSV header line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    Comma,
    Pipe,
}

impl Delimiter {
    pub fn as_char(&self) -> char {
        match self {
            Delimiter::Comma => ',',
            Delimiter::Pipe => '|',
        }
    }
}

/// Every inferred column is typed as text
pub const COLUMN_TYPE: &str = "string";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
}

impl ColumnDescriptor {
    /// Build a text column from an already sanitized name
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: COLUMN_TYPE.to_string(),
        }
    }
}

/// External table registered over the directory holding a CSV object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub delimiter: Delimiter,
    pub location: String,
}

impl TableDescriptor {
    /// `directory` is the object key's parent path, without a trailing slash.
    pub fn for_directory(
        bucket: &str,
        directory: &str,
        delimiter: Delimiter,
        column_names: Vec<String>,
    ) -> Self {
        let last_segment = directory.rsplit('/').next().unwrap_or(directory);
        Self {
            name: IdentifierSanitizer::table_name(last_segment),
            columns: column_names.into_iter().map(ColumnDescriptor::text).collect(),
            delimiter,
            location: format!("s3://{}/{}/", bucket, directory),
        }
    }
}

/// A view derived from a companion template object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewDescriptor {
    pub name: String,
    pub index: usize,
    pub template_key: String,
    pub sql: String,
}

impl ViewDescriptor {
    /// Views are named after the table and the template's position in the listing
    pub fn name_for(table_name: &str, index: usize) -> String {
        format!("{}_{}_view", table_name, index)
    }
}
