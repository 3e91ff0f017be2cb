use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::signing::Credentials;
use crate::validation::IdentifierSanitizer;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub aws: AwsConfig,
    pub poll: PollConfig,
    pub retention: RetentionConfig,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Target database for every statement
    pub database: String,
    /// URI where the engine stages query output
    pub output_location: String,
    /// Defaults to the regional AWS endpoint
    pub endpoint: Option<String>,
    pub request_timeout_secs: u64,
}

impl EngineConfig {
    pub fn endpoint_for(&self, region: &str) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://athena.{}.amazonaws.com", region))
    }
}

/// Region and static credentials used to sign engine and tagging requests
#[derive(Clone, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

impl AwsConfig {
    /// Credentials when both the key id and the secret are set
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => Some(Credentials {
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                session_token: self.session_token.clone(),
            }),
            _ => None,
        }
    }
}

impl std::fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsConfig")
            .field("region", &self.region)
            .field("credentials", &self.credentials())
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    pub interval_secs: u64,
    /// No deadline when unset: a query stuck RUNNING blocks its caller
    pub timeout_secs: Option<u64>,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    pub max_age_days: i64,
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    S3,
    Local,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    pub local_root: String,
    /// S3-compatible endpoint (path-style); AWS when unset
    pub s3_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    pub tag_source_objects: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Environment variable → configuration key
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("AthenaDbName", "engine.database"),
    ("OutputBucket", "engine.output_location"),
    ("ATHENA_ENDPOINT", "engine.endpoint"),
    ("ATHENA_REQUEST_TIMEOUT_SECS", "engine.request_timeout_secs"),
    ("AWS_REGION", "aws.region"),
    ("AWS_ACCESS_KEY_ID", "aws.access_key_id"),
    ("AWS_SECRET_ACCESS_KEY", "aws.secret_access_key"),
    ("AWS_SESSION_TOKEN", "aws.session_token"),
    ("POLL_INTERVAL_SECS", "poll.interval_secs"),
    ("POLL_TIMEOUT_SECS", "poll.timeout_secs"),
    ("RETENTION_DAYS", "retention.max_age_days"),
    ("SWEEP_INTERVAL_SECS", "retention.sweep_interval_secs"),
    ("STORAGE_BACKEND", "storage.backend"),
    ("STORAGE_LOCAL_ROOT", "storage.local_root"),
    ("S3_ENDPOINT", "storage.s3_endpoint"),
    ("TAG_SOURCE_OBJECTS", "ingest.tag_source_objects"),
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    ("RUST_LOG", "logging.level"),
];

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from defaults plus whatever `lookup` returns
    /// for the known variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, config::ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = config::Config::builder()
            .set_default("engine.request_timeout_secs", 30)?
            .set_default("aws.region", "us-east-1")?
            .set_default("poll.interval_secs", 5)?
            .set_default("retention.max_age_days", 30)?
            .set_default("storage.backend", "s3")?
            .set_default("storage.local_root", "./data")?
            .set_default("ingest.tag_source_objects", false)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("logging.level", "info")?;

        for &(var, key) in ENV_OVERRIDES {
            if let Some(value) = lookup(var) {
                builder = builder.set_override(key, value)?;
            }
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        IdentifierSanitizer::validate_database_name(&self.engine.database)
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;

        if self.engine.output_location.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "OutputBucket must not be empty".to_string(),
            ));
        }

        if self.poll.interval_secs == 0 {
            return Err(config::ConfigError::Message(
                "POLL_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        if self.aws.access_key_id.is_some() != self.aws.secret_access_key.is_some() {
            return Err(config::ConfigError::Message(
                "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together".to_string(),
            ));
        }

        if self.ingest.tag_source_objects && self.storage.backend != StorageBackendKind::S3 {
            return Err(config::ConfigError::Message(
                "TAG_SOURCE_OBJECTS requires STORAGE_BACKEND=s3".to_string(),
            ));
        }

        if self.retention.max_age_days < 0 {
            return Err(config::ConfigError::Message(
                "RETENTION_DAYS must not be negative".to_string(),
            ));
        }

        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
