use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;
use std::sync::Arc;

use crate::error::AppError;
use crate::storage::registry::StoreRegistry;
use crate::storage::tagging::S3Tagger;

/// Object storage operations the pipeline needs
#[async_trait::async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Download a whole object
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, AppError>;

    /// Download the start of an object up to the first newline.
    /// A first line longer than `max_bytes` is malformed input.
    async fn get_object_head(&self, bucket: &str, key: &str, max_bytes: usize) -> Result<Vec<u8>, AppError>;

    /// Keys under `prefix`, in lexicographic order
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, AppError>;

    /// Attach tags to an existing object
    async fn put_tags(&self, bucket: &str, key: &str, tags: &[(String, String)]) -> Result<(), AppError>;
}

/// `object_store`-backed storage; tagging goes through [`S3Tagger`] when attached
pub struct ObjectStoreStorage {
    registry: Arc<StoreRegistry>,
    tagger: Option<Arc<S3Tagger>>,
}

impl ObjectStoreStorage {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self { registry, tagger: None }
    }

    pub fn with_tagger(mut self, tagger: Arc<S3Tagger>) -> Self {
        self.tagger = Some(tagger);
        self
    }
}

/// Object keys are used verbatim; keys that are not valid store paths
/// (empty segments, `.` or `..`) cannot be addressed.
fn object_path(key: &str) -> Result<Path, AppError> {
    Path::parse(key).map_err(|e| AppError::MalformedInput(format!("Unusable object key '{}': {}", key, e)))
}

#[async_trait::async_trait]
impl ObjectStorage for ObjectStoreStorage {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, AppError> {
        let store = self.registry.get_or_create(bucket).await?;
        let bytes = store.get(&object_path(key)?).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn get_object_head(&self, bucket: &str, key: &str, max_bytes: usize) -> Result<Vec<u8>, AppError> {
        let store = self.registry.get_or_create(bucket).await?;
        let mut stream = store.get(&object_path(key)?).await?.into_stream();

        let mut head = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            head.extend_from_slice(&chunk);
            if head.contains(&b'\n') || head.len() > max_bytes {
                break;
            }
        }

        let line_end = head.iter().position(|b| *b == b'\n').unwrap_or(head.len());
        if line_end > max_bytes {
            return Err(AppError::MalformedInput(format!(
                "First line of s3://{}/{} is longer than {} bytes",
                bucket, key, max_bytes
            )));
        }
        head.truncate((line_end + 1).min(head.len()));

        Ok(head)
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, AppError> {
        let store = self.registry.get_or_create(bucket).await?;
        let prefix = object_path(prefix)?;

        let objects: Vec<_> = store.list(Some(&prefix)).try_collect().await?;
        let mut keys: Vec<String> = objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect();
        // Match the lexicographic order S3 listings come back in
        keys.sort_unstable();

        Ok(keys)
    }

    async fn put_tags(&self, bucket: &str, key: &str, tags: &[(String, String)]) -> Result<(), AppError> {
        match &self.tagger {
            Some(tagger) => tagger.put_tags(bucket, key, tags).await,
            None => Err(AppError::NotImplemented(format!(
                "Tagging existing objects needs the S3 backend (s3://{}/{})",
                bucket, key
            ))),
        }
    }
}
