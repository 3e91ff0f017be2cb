// Query engine trait for the remote asynchronous SQL service
use crate::error::AppError;
use crate::models::{QueryState, Row};

/// State reported by the engine for one execution
#[derive(Debug, Clone)]
pub struct ExecutionStatus {
    pub state: QueryState,
    pub state_change_reason: Option<String>,
}

/// Remote SQL engine abstraction.
///
/// Statements run asynchronously on the remote side: `start_query` only hands
/// back an execution id, callers poll `query_status` and read rows with
/// `query_results` once the execution left QUEUED/RUNNING.
#[async_trait::async_trait]
pub trait QueryEngine: Send + Sync {
    /// Submit a statement and return the engine-assigned execution id
    async fn start_query(
        &self,
        sql: &str,
        database: &str,
        output_location: &str,
    ) -> Result<String, AppError>;

    /// Current state of an execution
    async fn query_status(&self, execution_id: &str) -> Result<ExecutionStatus, AppError>;

    /// All result rows of a finished execution, empty when the engine returned none
    async fn query_results(&self, execution_id: &str) -> Result<Vec<Row>, AppError>;

    /// Get engine name
    fn engine_name(&self) -> &str;
}
