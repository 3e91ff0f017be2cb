use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::{StorageBackendKind, StorageConfig};
use crate::error::AppError;

/// Where bucket stores are created
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// S3 buckets, credentials and region taken from the environment.
    /// `endpoint` selects an S3-compatible service, addressed path-style.
    S3 { endpoint: Option<String> },
    /// One directory per bucket under `root`
    Local { root: PathBuf },
    /// Process-local stores, for development and tests
    Memory,
}

impl StorageBackend {
    pub fn from_config(config: &StorageConfig) -> Self {
        match config.backend {
            StorageBackendKind::S3 => StorageBackend::S3 {
                endpoint: config.s3_endpoint.clone(),
            },
            StorageBackendKind::Local => StorageBackend::Local {
                root: PathBuf::from(&config.local_root),
            },
            StorageBackendKind::Memory => StorageBackend::Memory,
        }
    }
}

/// Store registry that keeps one object store per bucket.
/// Buckets arrive with each event, so stores are created lazily and reused.
pub struct StoreRegistry {
    stores: Arc<RwLock<HashMap<String, Arc<dyn ObjectStore>>>>,
    backend: StorageBackend,
}

impl StoreRegistry {
    pub fn new(backend: StorageBackend) -> Self {
        Self {
            stores: Arc::new(RwLock::new(HashMap::new())),
            backend,
        }
    }

    /// Get or create the store for `bucket`.
    /// Safe to call concurrently from multiple tasks.
    pub async fn get_or_create(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, AppError> {
        // Fast path: check if store already exists (read lock)
        {
            let stores = self.stores.read().await;
            if let Some(store) = stores.get(bucket) {
                return Ok(store.clone());
            }
        }

        let mut stores = self.stores.write().await;

        // Another task may have created it while we waited for the write lock
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }

        tracing::info!("Creating object store for bucket: {} ({:?})", bucket, self.backend);
        let store = self.build_store(bucket)?;
        stores.insert(bucket.to_string(), store.clone());

        Ok(store)
    }

    /// Number of cached stores
    pub async fn store_count(&self) -> usize {
        self.stores.read().await.len()
    }

    fn build_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, AppError> {
        if bucket.is_empty() || bucket.contains('/') || bucket.contains("..") {
            return Err(AppError::Validation(format!("Invalid bucket name: '{}'", bucket)));
        }

        match &self.backend {
            StorageBackend::S3 { endpoint } => {
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
                if let Some(endpoint) = endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_virtual_hosted_style_request(false)
                        .with_allow_http(endpoint.starts_with("http://"));
                }
                let store = builder
                    .build()
                    .map_err(|e| {
                        AppError::Storage(format!("Failed to create S3 store for {}: {}", bucket, e))
                    })?;
                Ok(Arc::new(store))
            }
            StorageBackend::Local { root } => {
                let dir = root.join(bucket);
                std::fs::create_dir_all(&dir).map_err(|e| {
                    AppError::Storage(format!("Failed to create {}: {}", dir.display(), e))
                })?;
                let store = LocalFileSystem::new_with_prefix(&dir)?;
                Ok(Arc::new(store))
            }
            StorageBackend::Memory => Ok(Arc::new(InMemory::new())),
        }
    }
}
