pub mod engine; // Remote SQL engine client
pub mod ingest_service;
pub mod query_runner; // Submit / poll / fetch protocol
pub mod registrar;
pub mod retention;
pub mod schema_inference;

pub use ingest_service::*;
pub use query_runner::*;
pub use registrar::*;
pub use retention::*;
pub use schema_inference::*;
