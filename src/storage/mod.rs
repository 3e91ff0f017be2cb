// Object storage access: per-bucket store registry, the storage trait and S3 tagging
pub mod object_storage;
pub mod registry;
pub mod tagging;

pub use object_storage::{ObjectStorage, ObjectStoreStorage};
pub use registry::{StorageBackend, StoreRegistry};
pub use tagging::S3Tagger;
