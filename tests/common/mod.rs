#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use csv_catalog_pipeline::services::engine::{ExecutionStatus, QueryEngine};
use csv_catalog_pipeline::storage::{ObjectStorage, ObjectStoreStorage, StorageBackend, StoreRegistry};
use csv_catalog_pipeline::{AppError, PollSettings, QueryRunner, QueryState, Row};
use object_store::path::Path;
use object_store::PutPayload;

pub const DATABASE: &str = "mydb";
pub const OUTPUT_LOCATION: &str = "s3://query-results/";
pub const BUCKET: &str = "landing";

/// One call the pipeline made against the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Submit { id: String, sql: String },
    Status { id: String, state: QueryState },
    Results { id: String },
}

#[derive(Default)]
struct EngineState {
    calls: Vec<EngineCall>,
    next_id: usize,
    pending_polls: usize,
    remaining: HashMap<String, usize>,
    sql_by_id: HashMap<String, String>,
    final_states: Vec<(String, QueryState)>,
    results: Vec<(String, Vec<Row>)>,
    failures: Vec<String>,
}

/// In-memory engine: records every call, reports RUNNING for a configurable
/// number of polls, then the scripted final state (SUCCEEDED by default).
/// Rules match when the submitted SQL contains their pattern.
pub struct ScriptedEngine {
    state: Mutex<EngineState>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn with_pending_polls(mut self, polls: usize) -> Self {
        self.state.get_mut().unwrap().pending_polls = polls;
        self
    }

    pub fn with_final_state(mut self, pattern: &str, state: QueryState) -> Self {
        self.state
            .get_mut()
            .unwrap()
            .final_states
            .push((pattern.to_string(), state));
        self
    }

    pub fn with_rows(mut self, pattern: &str, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();
        self.state
            .get_mut()
            .unwrap()
            .results
            .push((pattern.to_string(), rows));
        self
    }

    pub fn failing_on(mut self, pattern: &str) -> Self {
        self.state.get_mut().unwrap().failures.push(pattern.to_string());
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Submitted SQL with whitespace runs collapsed
    pub fn submitted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::Submit { sql, .. } => Some(normalize(&sql)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl QueryEngine for ScriptedEngine {
    async fn start_query(&self, sql: &str, database: &str, output_location: &str) -> Result<String, AppError> {
        assert_eq!(database, DATABASE);
        assert_eq!(output_location, OUTPUT_LOCATION);

        let mut state = self.state.lock().unwrap();
        if state.failures.iter().any(|pattern| sql.contains(pattern.as_str())) {
            return Err(AppError::Engine(format!("scripted failure for: {}", sql)));
        }

        state.next_id += 1;
        let id = format!("exec-{}", state.next_id);
        let pending = state.pending_polls;
        state.remaining.insert(id.clone(), pending);
        state.sql_by_id.insert(id.clone(), sql.to_string());
        state.calls.push(EngineCall::Submit {
            id: id.clone(),
            sql: sql.to_string(),
        });
        Ok(id)
    }

    async fn query_status(&self, execution_id: &str) -> Result<ExecutionStatus, AppError> {
        let mut state = self.state.lock().unwrap();
        let sql = state
            .sql_by_id
            .get(execution_id)
            .cloned()
            .ok_or_else(|| AppError::Engine(format!("unknown execution {}", execution_id)))?;

        let remaining = state.remaining.get(execution_id).copied().unwrap_or(0);
        let query_state = if remaining > 0 {
            state.remaining.insert(execution_id.to_string(), remaining - 1);
            QueryState::Running
        } else {
            state
                .final_states
                .iter()
                .find(|(pattern, _)| sql.contains(pattern.as_str()))
                .map(|(_, final_state)| *final_state)
                .unwrap_or(QueryState::Succeeded)
        };

        state.calls.push(EngineCall::Status {
            id: execution_id.to_string(),
            state: query_state,
        });
        Ok(ExecutionStatus {
            state: query_state,
            state_change_reason: None,
        })
    }

    async fn query_results(&self, execution_id: &str) -> Result<Vec<Row>, AppError> {
        let mut state = self.state.lock().unwrap();
        let sql = state.sql_by_id.get(execution_id).cloned().unwrap_or_default();
        state.calls.push(EngineCall::Results {
            id: execution_id.to_string(),
        });
        Ok(state
            .results
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    fn engine_name(&self) -> &str {
        "scripted"
    }
}

/// Storage wrapper that records tags instead of rejecting them
pub struct TaggingStorage {
    inner: ObjectStoreStorage,
    pub tags: Mutex<Vec<(String, String, Vec<(String, String)>)>>,
}

impl TaggingStorage {
    pub fn new(inner: ObjectStoreStorage) -> Self {
        Self {
            inner,
            tags: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStorage for TaggingStorage {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, AppError> {
        self.inner.get_object(bucket, key).await
    }

    async fn get_object_head(&self, bucket: &str, key: &str, max_bytes: usize) -> Result<Vec<u8>, AppError> {
        self.inner.get_object_head(bucket, key, max_bytes).await
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, AppError> {
        self.inner.list_keys(bucket, prefix).await
    }

    async fn put_tags(&self, bucket: &str, key: &str, tags: &[(String, String)]) -> Result<(), AppError> {
        self.tags
            .lock()
            .unwrap()
            .push((bucket.to_string(), key.to_string(), tags.to_vec()));
        Ok(())
    }
}

/// In-memory storage seeded with `objects` in the test bucket
pub async fn seeded_storage(objects: &[(&str, &str)]) -> ObjectStoreStorage {
    let registry = Arc::new(StoreRegistry::new(StorageBackend::Memory));
    let store = registry.get_or_create(BUCKET).await.unwrap();
    for (key, body) in objects {
        store
            .put(&Path::parse(*key).unwrap(), PutPayload::from(body.as_bytes().to_vec()))
            .await
            .unwrap();
    }
    ObjectStoreStorage::new(registry)
}

pub fn runner(engine: Arc<ScriptedEngine>) -> Arc<QueryRunner> {
    Arc::new(QueryRunner::new(
        engine,
        DATABASE,
        OUTPUT_LOCATION,
        PollSettings {
            interval: Duration::from_millis(1),
            timeout: Some(Duration::from_secs(5)),
        },
    ))
}

/// Notification payload for the given raw (still encoded) keys
pub fn event_payload(keys: &[&str]) -> String {
    let records: Vec<serde_json::Value> = keys
        .iter()
        .map(|key| {
            serde_json::json!({
                "eventSource": "aws:s3",
                "s3": {"bucket": {"name": BUCKET}, "object": {"key": key}}
            })
        })
        .collect();
    serde_json::json!({ "Records": records }).to_string()
}

pub fn normalize(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}
