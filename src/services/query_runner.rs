use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{EngineConfig, PollConfig};
use crate::error::AppError;
use crate::models::{QueryExecution, QueryState, Row};
use crate::services::engine::QueryEngine;

/// How the poller waits on a remote execution
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl PollSettings {
    pub fn from_config(config: &PollConfig) -> Self {
        Self {
            interval: config.interval(),
            timeout: config.timeout(),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: None,
        }
    }
}

/// Drives the submit / poll / fetch protocol against the remote engine.
///
/// Statements are strictly sequential: callers await one execution before
/// submitting the next.
pub struct QueryRunner {
    engine: Arc<dyn QueryEngine>,
    database: String,
    output_location: String,
    poll: PollSettings,
    cancellation: CancellationToken,
}

impl QueryRunner {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        database: impl Into<String>,
        output_location: impl Into<String>,
        poll: PollSettings,
    ) -> Self {
        Self {
            engine,
            database: database.into(),
            output_location: output_location.into(),
            poll,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn from_config(
        engine: Arc<dyn QueryEngine>,
        engine_config: &EngineConfig,
        poll_config: &PollConfig,
    ) -> Self {
        Self::new(
            engine,
            engine_config.database.clone(),
            engine_config.output_location.clone(),
            PollSettings::from_config(poll_config),
        )
    }

    /// Abort pending waits when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Submit a statement without waiting for it
    pub async fn submit(&self, sql: &str) -> Result<QueryExecution, AppError> {
        tracing::info!("Running query: {}", sql);
        let execution_id = self
            .engine
            .start_query(sql, &self.database, &self.output_location)
            .await?;
        tracing::info!("Query id: {}", execution_id);

        Ok(QueryExecution::new(
            execution_id,
            sql.to_string(),
            self.database.clone(),
            self.output_location.clone(),
        ))
    }

    /// Poll until the execution leaves QUEUED/RUNNING and return the state it
    /// ended in. FAILED and CANCELLED are returned, not raised.
    pub async fn await_completion(&self, execution: &mut QueryExecution) -> Result<QueryState, AppError> {
        let started = Instant::now();
        let deadline = self.poll.timeout.map(|timeout| started + timeout);

        loop {
            let status = self.engine.query_status(&execution.id).await?;
            execution.apply_state(status.state, status.state_change_reason);

            if status.state.is_terminal() {
                tracing::info!("Query id finished {} ({})", execution.id, status.state);
                return Ok(status.state);
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(AppError::Timeout {
                        execution_id: execution.id.clone(),
                        waited_secs: started.elapsed().as_secs(),
                    });
                }
            }

            tracing::debug!("Waiting query id to finish {} ({})", execution.id, status.state);
            tokio::select! {
                _ = self.cancellation.cancelled() => {
                    return Err(AppError::Cancelled(execution.id.clone()));
                }
                _ = tokio::time::sleep(self.poll.interval) => {}
            }
        }
    }

    /// Fetch rows of a finished execution
    pub async fn fetch_rows(&self, execution_id: &str) -> Result<Vec<Row>, AppError> {
        self.engine.query_results(execution_id).await
    }

    /// Submit and wait; a non-successful terminal state is logged and returned
    /// to the caller inside the execution.
    pub async fn run(&self, sql: &str) -> Result<QueryExecution, AppError> {
        let mut execution = self.submit(sql).await?;
        let state = self.await_completion(&mut execution).await?;
        if state != QueryState::Succeeded {
            tracing::warn!(
                "Query {} ended in {}: {}",
                execution.id,
                state,
                execution.state_change_reason.as_deref().unwrap_or("no reason given")
            );
        }
        Ok(execution)
    }

    /// Submit, wait and read the rows
    pub async fn run_for_rows(&self, sql: &str) -> Result<Vec<Row>, AppError> {
        let execution = self.run(sql).await?;
        self.fetch_rows(&execution.id).await
    }
}
