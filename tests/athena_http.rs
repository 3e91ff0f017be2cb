use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use csv_catalog_pipeline::services::engine::{AthenaEngine, QueryEngine};
use csv_catalog_pipeline::signing::{Credentials, RequestSigner};
use csv_catalog_pipeline::{AppError, PollSettings, QueryRunner, QueryState};
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct FakeAthena {
    status_calls: Arc<AtomicUsize>,
    requests: Arc<std::sync::Mutex<Vec<(String, Value)>>>,
    authorizations: Arc<std::sync::Mutex<Vec<String>>>,
}

async fn athena_api(
    State(fake): State<FakeAthena>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    let target = headers
        .get("x-amz-target")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let content_type = headers
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert_eq!(content_type, "application/x-amz-json-1.1");
    if let Some(authorization) = headers.get("authorization").and_then(|value| value.to_str().ok()) {
        assert!(headers.contains_key("x-amz-date"));
        fake.authorizations.lock().unwrap().push(authorization.to_string());
    }

    let request: Value = serde_json::from_str(&body).unwrap();
    fake.requests.lock().unwrap().push((target.clone(), request.clone()));

    match target.as_str() {
        "AmazonAthena.StartQueryExecution" => {
            (StatusCode::OK, Json(json!({"QueryExecutionId": "qe-123"})))
        }
        "AmazonAthena.GetQueryExecution" if request["QueryExecutionId"] == "missing" => (
            StatusCode::BAD_REQUEST,
            Json(json!({"__type": "InvalidRequestException", "Message": "QueryExecution missing was not found"})),
        ),
        "AmazonAthena.GetQueryExecution" => {
            let call = fake.status_calls.fetch_add(1, Ordering::SeqCst);
            let state = if call == 0 { "RUNNING" } else { "SUCCEEDED" };
            (
                StatusCode::OK,
                Json(json!({
                    "QueryExecution": {
                        "QueryExecutionId": request["QueryExecutionId"],
                        "Status": {"State": state}
                    }
                })),
            )
        }
        "AmazonAthena.GetQueryResults" if request.get("NextToken").is_none() => (
            StatusCode::OK,
            Json(json!({
                "ResultSet": {"Rows": [{"Data": [{"VarCharValue": "orders"}]}]},
                "NextToken": "page-2"
            })),
        ),
        "AmazonAthena.GetQueryResults" => (
            StatusCode::OK,
            Json(json!({"ResultSet": {"Rows": [{"Data": [{"VarCharValue": "customers"}]}]}})),
        ),
        _ => (StatusCode::BAD_REQUEST, Json(json!({"__type": "UnknownOperationException"}))),
    }
}

async fn spawn_fake() -> (String, FakeAthena) {
    let fake = FakeAthena::default();
    let app = Router::new()
        .route("/", post(athena_api))
        .with_state(fake.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/", addr), fake)
}

#[tokio::test]
async fn test_submit_poll_and_paginated_results() {
    let (endpoint, fake) = spawn_fake().await;
    let engine = Arc::new(AthenaEngine::new(&endpoint, Duration::from_secs(5)).unwrap());
    let runner = QueryRunner::new(
        engine,
        "mydb",
        "s3://query-results/",
        PollSettings {
            interval: Duration::from_millis(10),
            timeout: Some(Duration::from_secs(5)),
        },
    );

    let rows = runner.run_for_rows("SHOW TABLES;").await.unwrap();

    assert_eq!(rows, vec![vec!["orders".to_string()], vec!["customers".to_string()]]);
    assert_eq!(fake.status_calls.load(Ordering::SeqCst), 2);

    let requests = fake.requests.lock().unwrap();
    let (target, start) = &requests[0];
    assert_eq!(target, "AmazonAthena.StartQueryExecution");
    assert_eq!(start["QueryString"], "SHOW TABLES;");
    assert_eq!(start["QueryExecutionContext"]["Database"], "mydb");
    assert_eq!(start["ResultConfiguration"]["OutputLocation"], "s3://query-results/");

    let (_, last) = requests.last().unwrap();
    assert_eq!(last["QueryExecutionId"], "qe-123");
    assert_eq!(last["NextToken"], "page-2");
}

#[tokio::test]
async fn test_remote_error_becomes_engine_error() {
    let (endpoint, _fake) = spawn_fake().await;
    let engine = AthenaEngine::new(&endpoint, Duration::from_secs(5)).unwrap();

    let error = engine.query_status("missing").await.unwrap_err();

    match error {
        AppError::Engine(message) => {
            assert!(message.contains("InvalidRequestException"));
            assert!(message.contains("was not found"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_is_engine_error() {
    let engine = AthenaEngine::new("http://127.0.0.1:1/", Duration::from_secs(2)).unwrap();

    let error = tokio_test::assert_err!(engine.start_query("SHOW TABLES;", "mydb", "s3://out/").await);

    assert!(matches!(error, AppError::Engine(_)));
}

#[tokio::test]
async fn test_query_state_parsing() {
    let (endpoint, _fake) = spawn_fake().await;
    let engine = AthenaEngine::new(&endpoint, Duration::from_secs(5)).unwrap();

    let first = tokio_test::assert_ok!(engine.query_status("qe-123").await);
    let second = tokio_test::assert_ok!(engine.query_status("qe-123").await);

    assert_eq!(first.state, QueryState::Running);
    assert_eq!(second.state, QueryState::Succeeded);
}

#[tokio::test]
async fn test_signed_requests_carry_authorization() {
    let (endpoint, fake) = spawn_fake().await;
    let credentials = Credentials {
        access_key_id: "AKID".to_string(),
        secret_access_key: "secret".to_string(),
        session_token: None,
    };
    let engine = AthenaEngine::new(&endpoint, Duration::from_secs(5))
        .unwrap()
        .with_signer(RequestSigner::new(credentials, "eu-west-1", "athena"));

    tokio_test::assert_ok!(engine.start_query("SHOW TABLES;", "mydb", "s3://out/").await);

    let authorizations = fake.authorizations.lock().unwrap();
    assert_eq!(authorizations.len(), 1);
    assert!(authorizations[0].starts_with("AWS4-HMAC-SHA256 Credential=AKID/"));
    assert!(authorizations[0].contains("/eu-west-1/athena/aws4_request"));
    assert!(authorizations[0].contains("SignedHeaders=content-type;host;x-amz-date;x-amz-target"));
}

#[tokio::test]
async fn test_unsigned_engine_sends_no_authorization() {
    let (endpoint, fake) = spawn_fake().await;
    let engine = AthenaEngine::new(&endpoint, Duration::from_secs(5)).unwrap();

    tokio_test::assert_ok!(engine.start_query("SHOW TABLES;", "mydb", "s3://out/").await);

    assert!(fake.authorizations.lock().unwrap().is_empty());
}
