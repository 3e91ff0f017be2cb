// Athena adapter speaking the JSON 1.1 protocol over HTTP
// Requests are SigV4-signed when a signer is attached
use crate::error::AppError;
use crate::models::{QueryState, Row};
use crate::services::engine::adapter::{ExecutionStatus, QueryEngine};
use crate::signing::RequestSigner;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const TARGET_PREFIX: &str = "AmazonAthena";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

pub struct AthenaEngine {
    endpoint: Url,
    client: Client,
    signer: Option<RequestSigner>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct StartQueryExecutionRequest<'a> {
    pub query_string: &'a str,
    pub query_execution_context: QueryExecutionContext<'a>,
    pub result_configuration: ResultConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct QueryExecutionContext<'a> {
    pub database: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ResultConfiguration<'a> {
    pub output_location: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartQueryExecutionResponse {
    query_execution_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ExecutionRequest<'a> {
    query_execution_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueryExecutionResponse {
    query_execution: QueryExecutionInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionInfo {
    status: QueryExecutionStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionStatus {
    state: QueryState,
    #[serde(default)]
    state_change_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct GetQueryResultsResponse {
    #[serde(default)]
    pub result_set: Option<ResultSet>,
    #[serde(default)]
    pub next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ResultSet {
    #[serde(default)]
    pub rows: Vec<ResultRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ResultRow {
    #[serde(default)]
    pub data: Vec<Datum>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Datum {
    #[serde(default)]
    pub var_char_value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

impl GetQueryResultsResponse {
    /// Flatten the result set into string rows; absent structures yield no rows
    pub(crate) fn into_rows(self) -> Vec<Row> {
        self.result_set
            .map(|set| {
                set.rows
                    .into_iter()
                    .map(|row| {
                        row.data
                            .into_iter()
                            .map(|datum| datum.var_char_value.unwrap_or_default())
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl AthenaEngine {
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self, AppError> {
        let url = Url::parse(endpoint)
            .map_err(|e| AppError::Validation(format!("Invalid engine endpoint: {}", e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(AppError::Validation(
                "Engine endpoint must use http:// or https:// scheme".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: url,
            client,
            signer: None,
        })
    }

    pub fn with_signer(mut self, signer: RequestSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    /// Invoke one API action and decode its JSON answer
    async fn call<Req, Resp>(&self, action: &str, request: &Req) -> Result<Resp, AppError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)
            .map_err(|e| AppError::Internal(format!("Failed to encode {} request: {}", action, e)))?;

        let target = format!("{}.{}", TARGET_PREFIX, action);
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("X-Amz-Target", &target)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE);

        if let Some(signer) = &self.signer {
            let headers = [("content-type", CONTENT_TYPE), ("x-amz-target", target.as_str())];
            for (name, value) in signer.sign("POST", &self.endpoint, &headers, &body, Utc::now()) {
                request = request.header(name, value);
            }
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::Engine(format!("{} request failed: {}", action, e)))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Engine(format!("Failed to read {} response: {}", action, e)))?;

        if !status.is_success() {
            let detail = match serde_json::from_slice::<ErrorBody>(&bytes) {
                Ok(ErrorBody { error_type, message }) => format!(
                    "{}: {}",
                    error_type.unwrap_or_else(|| "UnknownError".to_string()),
                    message.unwrap_or_default()
                ),
                Err(_) => String::from_utf8_lossy(&bytes).into_owned(),
            };
            return Err(AppError::Engine(format!("{} failed ({}): {}", action, status, detail)));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Engine(format!("Failed to parse {} response: {}", action, e)))
    }
}

#[async_trait::async_trait]
impl QueryEngine for AthenaEngine {
    async fn start_query(
        &self,
        sql: &str,
        database: &str,
        output_location: &str,
    ) -> Result<String, AppError> {
        let request = StartQueryExecutionRequest {
            query_string: sql,
            query_execution_context: QueryExecutionContext { database },
            result_configuration: ResultConfiguration { output_location },
        };
        let response: StartQueryExecutionResponse =
            self.call("StartQueryExecution", &request).await?;
        Ok(response.query_execution_id)
    }

    async fn query_status(&self, execution_id: &str) -> Result<ExecutionStatus, AppError> {
        let request = ExecutionRequest {
            query_execution_id: execution_id,
            next_token: None,
        };
        let response: GetQueryExecutionResponse =
            self.call("GetQueryExecution", &request).await?;
        let status = response.query_execution.status;
        Ok(ExecutionStatus {
            state: status.state,
            state_change_reason: status.state_change_reason,
        })
    }

    async fn query_results(&self, execution_id: &str) -> Result<Vec<Row>, AppError> {
        let mut rows = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let request = ExecutionRequest {
                query_execution_id: execution_id,
                next_token: next_token.as_deref(),
            };
            let page: GetQueryResultsResponse = self.call("GetQueryResults", &request).await?;
            next_token = page.next_token.clone();
            rows.extend(page.into_rows());

            if next_token.is_none() {
                break;
            }
        }

        Ok(rows)
    }

    fn engine_name(&self) -> &str {
        "athena"
    }
}
