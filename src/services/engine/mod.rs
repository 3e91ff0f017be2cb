// Remote SQL engine access
pub mod adapter;
pub mod athena;

pub use adapter::{ExecutionStatus, QueryEngine};
pub use athena::AthenaEngine;

use crate::config::{AwsConfig, EngineConfig};
use crate::error::AppError;
use crate::signing::{is_aws_host, RequestSigner};
use std::sync::Arc;
use std::time::Duration;

/// Factory function to create the engine client described by the configuration.
/// AWS endpoints need credentials; other endpoints (emulators, signing
/// proxies) are called unsigned when none are configured.
pub fn create_engine(config: &EngineConfig, aws: &AwsConfig) -> Result<Arc<dyn QueryEngine>, AppError> {
    let mut engine = AthenaEngine::new(
        &config.endpoint_for(&aws.region),
        Duration::from_secs(config.request_timeout_secs),
    )?;

    match aws.credentials() {
        Some(credentials) => {
            engine = engine.with_signer(RequestSigner::new(credentials, &aws.region, "athena"));
        }
        None if is_aws_host(engine.endpoint()) => {
            return Err(AppError::Validation(format!(
                "AWS credentials are required for {}; set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY or point ATHENA_ENDPOINT elsewhere",
                engine.endpoint()
            )));
        }
        None => {}
    }

    tracing::info!(
        "Using {} engine at {} (signed: {})",
        engine.engine_name(),
        engine.endpoint(),
        engine.is_signed()
    );
    Ok(Arc::new(engine))
}
