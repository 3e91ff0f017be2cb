use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution state reported by the remote engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    /// QUEUED and RUNNING keep the poller waiting; everything else ends the wait
    pub fn is_pending(&self) -> bool {
        matches!(self, QueryState::Queued | QueryState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryState::Queued => "QUEUED",
            QueryState::Running => "RUNNING",
            QueryState::Succeeded => "SUCCEEDED",
            QueryState::Failed => "FAILED",
            QueryState::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for QueryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A statement submitted to the remote engine and the last state seen for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryExecution {
    pub id: String,
    pub query_text: String,
    pub database: String,
    pub output_location: String,
    pub state: QueryState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_change_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueryExecution {
    pub fn new(id: String, query_text: String, database: String, output_location: String) -> Self {
        Self {
            id,
            query_text,
            database,
            output_location,
            state: QueryState::Queued,
            state_change_reason: None,
            submitted_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn apply_state(&mut self, state: QueryState, reason: Option<String>) {
        self.state = state;
        self.state_change_reason = reason;
        if state.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == QueryState::Succeeded
    }
}

/// One result row: ordered string cells, absent values read as empty strings
pub type Row = Vec<String>;
