use std::sync::Arc;

use chrono::Utc;

use crate::error::AppError;
use crate::models::{
    InvocationKind, InvocationOutcome, ObjectRef, QueryExecution, StorageEvent, TableDescriptor,
    ViewDescriptor,
};
use crate::services::query_runner::QueryRunner;
use crate::services::registrar::CatalogRegistrar;
use crate::services::schema_inference::{SchemaInferrer, HEADER_READ_LIMIT};
use crate::storage::ObjectStorage;

/// Optional behaviours of the ingestion pipeline
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestCapabilities {
    /// Tag each source CSV with the table it was registered as
    pub tag_source_objects: bool,
}

/// Everything registered for one CSV object
#[derive(Debug, Clone)]
pub struct IngestedTable {
    pub object: ObjectRef,
    pub table: TableDescriptor,
    pub table_execution: QueryExecution,
    pub views: Vec<(ViewDescriptor, QueryExecution)>,
    pub tagged: bool,
}

/// Ingestion pipeline: infer a schema from each new CSV object and register
/// its external table and views.
pub struct IngestService {
    runner: Arc<QueryRunner>,
    storage: Arc<dyn ObjectStorage>,
    registrar: CatalogRegistrar,
    capabilities: IngestCapabilities,
}

impl IngestService {
    pub fn new(
        runner: Arc<QueryRunner>,
        storage: Arc<dyn ObjectStorage>,
        capabilities: IngestCapabilities,
    ) -> Self {
        let registrar = CatalogRegistrar::new(runner.clone(), storage.clone());
        Self {
            runner,
            storage,
            registrar,
            capabilities,
        }
    }

    /// Entry point for a raw notification payload. Never fails: every error
    /// ends up logged and in the returned outcome.
    pub async fn handle_payload(&self, payload: &str) -> InvocationOutcome {
        tracing::info!("Ingest invocation payload: {}", payload);

        match serde_json::from_str::<StorageEvent>(payload) {
            Ok(event) => self.handle_event(&event).await,
            Err(e) => {
                let error = AppError::MalformedInput(format!("Invalid notification payload: {}", e));
                tracing::error!(code = error.code(), "{}", error);
                let mut outcome = InvocationOutcome::new(InvocationKind::Ingest);
                outcome.record_failure("payload", &error);
                outcome.finish()
            }
        }
    }

    /// Ensure the database once, then process records one at a time in
    /// delivery order. A failing record does not stop the next one.
    pub async fn handle_event(&self, event: &StorageEvent) -> InvocationOutcome {
        let mut outcome = InvocationOutcome::new(InvocationKind::Ingest);
        let database = self.runner.database().to_string();

        if let Err(error) = self.registrar.register_database(&database).await {
            tracing::error!(code = error.code(), "Failed to ensure database {}: {}", database, error);
            outcome.record_failure(format!("database:{}", database), &error);
            return outcome.finish();
        }

        for record in &event.records {
            let object = record.object_ref();
            if object.is_view_template() {
                tracing::info!("Skipping view template object {}", object);
                outcome.mark_skipped(object.to_string());
                continue;
            }

            match self.ingest_object(&object).await {
                Ok(ingested) => {
                    tracing::info!(
                        "Registered table {} with {} views from {}",
                        ingested.table.name,
                        ingested.views.len(),
                        object
                    );
                    outcome.mark_processed(object.to_string());
                }
                Err(error) => {
                    tracing::error!(code = error.code(), "Failed to ingest {}: {}", object, error);
                    outcome.record_failure(object.to_string(), &error);
                }
            }
        }

        outcome.finish()
    }

    /// Infer the schema of one CSV object and register its table, views and
    /// (when enabled) the source tags. The first failing step aborts the rest.
    pub async fn ingest_object(&self, object: &ObjectRef) -> Result<IngestedTable, AppError> {
        let directory = object.directory();
        if directory.is_empty() {
            return Err(AppError::MalformedInput(format!(
                "{} has no parent directory to name a table after",
                object
            )));
        }

        let head = self
            .storage
            .get_object_head(&object.bucket, &object.key, HEADER_READ_LIMIT)
            .await?;
        let first_line = SchemaInferrer::first_line(&head)?;
        let (delimiter, columns) = SchemaInferrer::infer(&first_line)?;
        tracing::info!("Inferred {:?} delimited header with columns {:?} for {}", delimiter, columns, object);

        let table = TableDescriptor::for_directory(&object.bucket, directory, delimiter, columns);
        if table.name.is_empty() {
            return Err(AppError::MalformedInput(format!(
                "Directory '{}' does not yield a table name",
                directory
            )));
        }

        let database = self.runner.database().to_string();
        let table_execution = self.registrar.register_table(&database, &table).await?;
        let views = self
            .registrar
            .register_views(&object.bucket, directory, &table)
            .await?;

        let tagged = if self.capabilities.tag_source_objects {
            let tags = vec![
                ("ingested-table".to_string(), format!("{}.{}", database, table.name)),
                ("ingested-at".to_string(), Utc::now().to_rfc3339()),
            ];
            self.storage.put_tags(&object.bucket, &object.key, &tags).await?;
            true
        } else {
            false
        };

        Ok(IngestedTable {
            object: object.clone(),
            table,
            table_execution,
            views,
            tagged,
        })
    }
}
