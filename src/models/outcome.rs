use axum::{
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Status code reported for every invocation, failures included
pub const INVOCATION_STATUS_CODE: i32 = 0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InvocationKind {
    Ingest,
    Sweep,
}

/// A failure swallowed at the entry-point boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationFailure {
    pub subject: String,
    pub code: String,
    pub message: String,
}

/// Result of one handler invocation.
///
/// `status_code` stays 0 whatever happened; `succeeded` and `failures` are
/// what lets a caller tell a swallowed failure apart from a clean run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationOutcome {
    pub invocation_id: String,
    pub kind: InvocationKind,
    pub status_code: i32,
    pub succeeded: bool,
    pub processed: Vec<String>,
    pub skipped: Vec<String>,
    pub failures: Vec<InvocationFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl InvocationOutcome {
    pub fn new(kind: InvocationKind) -> Self {
        Self {
            invocation_id: Uuid::new_v4().to_string(),
            kind,
            status_code: INVOCATION_STATUS_CODE,
            succeeded: true,
            processed: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn mark_processed(&mut self, subject: impl Into<String>) {
        self.processed.push(subject.into());
    }

    pub fn mark_skipped(&mut self, subject: impl Into<String>) {
        self.skipped.push(subject.into());
    }

    pub fn record_failure(&mut self, subject: impl Into<String>, error: &AppError) {
        self.succeeded = false;
        self.failures.push(InvocationFailure {
            subject: subject.into(),
            code: error.code().to_string(),
            message: error.to_string(),
        });
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }
}

impl IntoResponse for InvocationOutcome {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
