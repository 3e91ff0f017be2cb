pub mod invoke;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::AppError;
use crate::services::engine::{create_engine, QueryEngine};
use crate::services::{IngestCapabilities, IngestService, QueryRunner, RetentionSweeper};
use crate::storage::{ObjectStorage, ObjectStoreStorage, S3Tagger, StorageBackend, StoreRegistry};

/// Application state, built once at process start
#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestService>,
    pub sweeper: Arc<RetentionSweeper>,
}

impl AppState {
    /// Wire the engine client, storage and pipelines from the configuration.
    /// Cancelling `shutdown` aborts any in-flight poll loop.
    pub fn from_config(config: &Config, shutdown: CancellationToken) -> Result<Self, AppError> {
        let engine = create_engine(&config.engine, &config.aws)?;
        let registry = Arc::new(StoreRegistry::new(StorageBackend::from_config(&config.storage)));
        let mut object_storage = ObjectStoreStorage::new(registry);
        if config.ingest.tag_source_objects {
            let tagger = S3Tagger::from_config(
                &config.storage,
                &config.aws,
                Duration::from_secs(config.engine.request_timeout_secs),
            )?;
            object_storage = object_storage.with_tagger(Arc::new(tagger));
        }
        let storage: Arc<dyn ObjectStorage> = Arc::new(object_storage);
        let capabilities = IngestCapabilities {
            tag_source_objects: config.ingest.tag_source_objects,
        };

        Ok(Self::with_components(
            engine,
            storage,
            config,
            capabilities,
            shutdown,
        ))
    }

    pub fn with_components(
        engine: Arc<dyn QueryEngine>,
        storage: Arc<dyn ObjectStorage>,
        config: &Config,
        capabilities: IngestCapabilities,
        shutdown: CancellationToken,
    ) -> Self {
        let runner = Arc::new(
            QueryRunner::from_config(engine, &config.engine, &config.poll).with_cancellation(shutdown),
        );

        Self {
            ingest: Arc::new(IngestService::new(runner.clone(), storage, capabilities)),
            sweeper: Arc::new(RetentionSweeper::new(runner, config.retention.max_age_days)),
        }
    }
}
