use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{InvocationKind, InvocationOutcome, Row};
use crate::services::query_runner::QueryRunner;
use crate::validation::IdentifierSanitizer;

/// Trailing epoch seconds of a `transient_lastDdlTime` property line
static DDL_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\t(\d+)$").expect("valid ddl time regex"));

/// What one sweep did
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub examined: Vec<String>,
    pub skipped: Vec<String>,
    pub dropped_tables: Vec<String>,
    pub dropped_views: Vec<String>,
}

/// Drops tables, and the views derived from them, once they are older than
/// the retention window.
pub struct RetentionSweeper {
    runner: Arc<QueryRunner>,
    max_age_days: i64,
}

impl RetentionSweeper {
    pub fn new(runner: Arc<QueryRunner>, max_age_days: i64) -> Self {
        Self { runner, max_age_days }
    }

    /// Parse the creation time out of a property value such as
    /// `transient_lastDdlTime\t1700000000`. `Ok(None)` when the value has no
    /// trailing timestamp.
    pub fn parse_created_at(property: &str) -> Result<Option<DateTime<Utc>>, AppError> {
        let Some(captures) = DDL_TIME.captures(property.trim_end_matches(['\r', '\n'])) else {
            return Ok(None);
        };

        let seconds: i64 = captures[1].parse().map_err(|e| {
            AppError::Parse(format!("Invalid epoch seconds '{}': {}", &captures[1], e))
        })?;

        DateTime::from_timestamp(seconds, 0)
            .map(Some)
            .ok_or_else(|| AppError::Parse(format!("Epoch seconds {} out of range", seconds)))
    }

    /// Older than the window in whole days
    pub fn is_expired(created_at: DateTime<Utc>, now: DateTime<Utc>, max_age_days: i64) -> bool {
        (now - created_at).num_days() > max_age_days
    }

    pub fn table_properties_sql(table: &str) -> String {
        format!("SHOW TBLPROPERTIES {}('transient_lastDdlTime');", table)
    }

    pub fn views_like_sql(table: &str) -> String {
        format!(
            "SHOW VIEWS LIKE {};",
            IdentifierSanitizer::quote_literal(&format!("{}*_view", table))
        )
    }

    /// Entry point for a sweep invocation. Never fails: an error aborts the
    /// sweep, is logged and is reported in the outcome.
    pub async fn handle_payload(&self, payload: &str) -> InvocationOutcome {
        tracing::info!("Sweep invocation payload: {}", payload);

        let mut outcome = InvocationOutcome::new(InvocationKind::Sweep);
        match self.sweep(Utc::now()).await {
            Ok(report) => {
                tracing::info!(
                    "Sweep examined {} tables, dropped {} tables and {} views",
                    report.examined.len(),
                    report.dropped_tables.len(),
                    report.dropped_views.len()
                );
                for table in report.dropped_tables {
                    outcome.mark_processed(table);
                }
                for table in report.skipped {
                    outcome.mark_skipped(table);
                }
            }
            Err(error) => {
                tracing::error!(code = error.code(), "Retention sweep aborted: {}", error);
                outcome.record_failure("sweep", &error);
            }
        }
        outcome.finish()
    }

    /// Examine every table and drop the expired ones.
    ///
    /// A failing property lookup or timestamp parse aborts the whole sweep;
    /// tables after it are not examined.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
        let mut report = SweepReport::default();

        let tables = self.runner.run_for_rows("SHOW TABLES;").await?;
        for table in tables.iter().filter_map(first_cell) {
            tracing::info!("Table: {}", table);
            report.examined.push(table.to_string());

            let properties = self
                .runner
                .run_for_rows(&Self::table_properties_sql(table))
                .await?;
            let property = properties.iter().find_map(first_cell).ok_or_else(|| {
                AppError::Parse(format!("Table {} has no transient_lastDdlTime property", table))
            })?;

            let Some(created_at) = Self::parse_created_at(property)? else {
                tracing::warn!("Table {} property '{}' carries no timestamp", table, property);
                report.skipped.push(table.to_string());
                continue;
            };
            tracing::info!("Table: {} created at: {}", table, created_at);

            if !Self::is_expired(created_at, now, self.max_age_days) {
                continue;
            }

            tracing::info!("Table: {} older than {} days, deleting", table, self.max_age_days);
            self.runner
                .run(&format!("DROP TABLE IF EXISTS {};", table))
                .await?;
            report.dropped_tables.push(table.to_string());

            let views = self.runner.run_for_rows(&Self::views_like_sql(table)).await?;
            for view in views.iter().filter_map(first_cell) {
                tracing::info!("Deleting view: {}", view);
                self.runner
                    .run(&format!("DROP VIEW IF EXISTS {};", view))
                    .await?;
                report.dropped_views.push(view.to_string());
            }
        }

        Ok(report)
    }

    /// Run a sweep every `interval` until `shutdown` is cancelled
    pub fn spawn_schedule(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Stopping scheduled retention sweeps");
                        break;
                    }
                    _ = ticker.tick() => {
                        let outcome = self.handle_payload("{\"source\":\"schedule\"}").await;
                        if !outcome.succeeded {
                            tracing::warn!("Scheduled sweep {} reported failures", outcome.invocation_id);
                        }
                    }
                }
            }
        })
    }
}

/// First non-empty cell of a row
fn first_cell(row: &Row) -> Option<&str> {
    row.first()
        .map(|cell| cell.trim())
        .filter(|cell| !cell.is_empty())
}
