use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Query engine error: {0}")]
    Engine(String),

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Query {execution_id} did not finish within {waited_secs} seconds")]
    Timeout { execution_id: String, waited_secs: u64 },

    #[error("Waiting for query {0} was cancelled")]
    Cancelled(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code reported in invocation outcomes
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Engine(_) => "ENGINE_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::MalformedInput(_) => "MALFORMED_INPUT",
            AppError::Parse(_) => "PARSE_ERROR",
            AppError::Timeout { .. } => "POLL_TIMEOUT",
            AppError::Cancelled(_) => "CANCELLED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotImplemented(_) => "NOT_IMPLEMENTED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Convert anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<object_store::Error> for AppError {
    fn from(err: object_store::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Engine(format!("HTTP request failed: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::MalformedInput(err.to_string())
    }
}
