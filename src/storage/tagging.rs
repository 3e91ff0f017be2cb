// S3 PutObjectTagging over plain HTTP; object_store has no call for tagging existing objects
use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use percent_encoding::utf8_percent_encode;
use reqwest::{Client, Method};
use sha2::{Digest, Sha256};
use std::time::Duration;
use url::Url;

use crate::config::{AwsConfig, StorageConfig};
use crate::error::AppError;
use crate::signing::{is_aws_host, payload_hash, RequestSigner, AWS_PATH_ENCODE, AWS_URI_ENCODE};

/// Replaces the tag set of existing S3 objects
#[derive(Debug)]
pub struct S3Tagger {
    client: Client,
    /// Path-style endpoint; virtual-hosted AWS URLs when unset
    endpoint: Option<Url>,
    region: String,
    signer: Option<RequestSigner>,
}

impl S3Tagger {
    pub fn new(
        endpoint: Option<Url>,
        region: impl Into<String>,
        signer: Option<RequestSigner>,
        request_timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            region: region.into(),
            signer,
        })
    }

    pub fn from_config(
        storage: &StorageConfig,
        aws: &AwsConfig,
        request_timeout: Duration,
    ) -> Result<Self, AppError> {
        let endpoint = storage
            .s3_endpoint
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| AppError::Validation(format!("Invalid S3 endpoint: {}", e)))?;

        let signer = aws
            .credentials()
            .map(|credentials| RequestSigner::new(credentials, &aws.region, "s3"));
        let targets_aws = endpoint.as_ref().map(is_aws_host).unwrap_or(true);
        if signer.is_none() && targets_aws {
            return Err(AppError::Validation(
                "Tagging S3 objects requires AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY".to_string(),
            ));
        }

        Self::new(endpoint, &aws.region, signer, request_timeout)
    }

    /// `PUT` target for the tagging subresource of `bucket/key`
    pub fn tagging_url(&self, bucket: &str, key: &str) -> anyhow::Result<Url> {
        let key = utf8_percent_encode(key, AWS_PATH_ENCODE);
        let url = match &self.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}?tagging",
                endpoint.as_str().trim_end_matches('/'),
                utf8_percent_encode(bucket, AWS_URI_ENCODE),
                key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}?tagging",
                bucket, self.region, key
            ),
        };
        Url::parse(&url).with_context(|| format!("Cannot build tagging URL for s3://{}", bucket))
    }

    fn tagging_request(&self, bucket: &str, key: &str, tags: &[(String, String)]) -> anyhow::Result<reqwest::Request> {
        let url = self.tagging_url(bucket, key)?;
        let body = tagging_body(tags).into_bytes();
        let checksum = BASE64.encode(Sha256::digest(&body));
        let content_hash = payload_hash(&body);

        let mut builder = self
            .client
            .request(Method::PUT, url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .header("x-amz-checksum-sha256", &checksum)
            .header("x-amz-content-sha256", &content_hash);

        if let Some(signer) = &self.signer {
            let headers = [
                ("content-type", "application/xml"),
                ("x-amz-checksum-sha256", checksum.as_str()),
                ("x-amz-content-sha256", content_hash.as_str()),
            ];
            for (name, value) in signer.sign("PUT", &url, &headers, &body, Utc::now()) {
                builder = builder.header(name, value);
            }
        }

        builder
            .body(body)
            .build()
            .with_context(|| format!("Cannot build tagging request for s3://{}/{}", bucket, key))
    }

    pub async fn put_tags(&self, bucket: &str, key: &str, tags: &[(String, String)]) -> Result<(), AppError> {
        let request = self.tagging_request(bucket, key, tags)?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| AppError::Storage(format!("Tagging s3://{}/{} failed: {}", bucket, key, e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Storage(format!(
                "Tagging s3://{}/{} failed ({}): {}",
                bucket, key, status, detail
            )));
        }

        tracing::debug!("Tagged s3://{}/{} with {} tags", bucket, key, tags.len());
        Ok(())
    }
}

/// `<Tagging>` document carrying the full tag set
pub fn tagging_body(tags: &[(String, String)]) -> String {
    let tag_set: String = tags
        .iter()
        .map(|(key, value)| {
            format!(
                "<Tag><Key>{}</Key><Value>{}</Value></Tag>",
                escape_xml(key),
                escape_xml(value)
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Tagging><TagSet>{}</TagSet></Tagging>",
        tag_set
    )
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::Credentials;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Method as HttpMethod, StatusCode, Uri};
    use axum::Router;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct Captured {
        method: HttpMethod,
        uri: Uri,
        headers: HeaderMap,
        body: String,
    }

    async fn spawn_fake_s3(status: StatusCode) -> (Url, Arc<Mutex<Vec<Captured>>>) {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        let app = Router::new().fallback(move |method: HttpMethod, uri: Uri, headers: HeaderMap, body: Bytes| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(Captured {
                    method,
                    uri,
                    headers,
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
                (status, "<Error><Code>AccessDenied</Code></Error>")
            }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (Url::parse(&format!("http://{}", addr)).unwrap(), captured)
    }

    fn signer() -> RequestSigner {
        let credentials = Credentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
        };
        RequestSigner::new(credentials, "eu-west-1", "s3")
    }

    fn tags() -> Vec<(String, String)> {
        vec![
            ("ingested-table".to_string(), "mydb.d1".to_string()),
            ("note".to_string(), "a&b".to_string()),
        ]
    }

    #[test]
    fn test_tagging_body_escapes_values() {
        let body = tagging_body(&tags());
        assert!(body.contains("<Tag><Key>ingested-table</Key><Value>mydb.d1</Value></Tag>"));
        assert!(body.contains("<Value>a&amp;b</Value>"));
        assert!(body.ends_with("</TagSet></Tagging>"));
    }

    #[test]
    fn test_virtual_hosted_url() {
        let tagger = S3Tagger::new(None, "eu-west-1", Some(signer()), Duration::from_secs(5)).unwrap();
        let url = tagger.tagging_url("landing", "data/d 1/file.csv").unwrap();
        assert_eq!(
            url.as_str(),
            "https://landing.s3.eu-west-1.amazonaws.com/data/d%201/file.csv?tagging"
        );
    }

    #[tokio::test]
    async fn test_put_tags_sends_signed_tagging_request() {
        let (endpoint, captured) = spawn_fake_s3(StatusCode::OK).await;
        let tagger = S3Tagger::new(Some(endpoint), "eu-west-1", Some(signer()), Duration::from_secs(5)).unwrap();

        tagger.put_tags("landing", "data/d1/file#1.csv", &tags()).await.unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let request = &captured[0];
        assert_eq!(request.method, HttpMethod::PUT);
        assert_eq!(request.uri.path(), "/landing/data/d1/file%231.csv");
        assert_eq!(request.uri.query(), Some("tagging"));
        assert!(request.body.contains("<Key>ingested-table</Key><Value>mydb.d1</Value>"));

        let checksum = BASE64.encode(Sha256::digest(request.body.as_bytes()));
        assert_eq!(request.headers["x-amz-checksum-sha256"], checksum.as_str());
        let authorization = request.headers["authorization"].to_str().unwrap();
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKID/"));
        assert!(authorization.contains("/eu-west-1/s3/aws4_request"));
        assert!(authorization.contains("x-amz-checksum-sha256;x-amz-content-sha256;x-amz-date"));
    }

    #[tokio::test]
    async fn test_rejected_tagging_is_storage_error() {
        let (endpoint, _captured) = spawn_fake_s3(StatusCode::FORBIDDEN).await;
        let tagger = S3Tagger::new(Some(endpoint), "eu-west-1", None, Duration::from_secs(5)).unwrap();

        let error = tagger.put_tags("landing", "data/d1/file.csv", &tags()).await.unwrap_err();

        assert!(matches!(error, AppError::Storage(ref msg) if msg.contains("AccessDenied")));
    }

    #[tokio::test]
    async fn test_unbuildable_url_is_internal_error() {
        let tagger = S3Tagger::new(None, "eu-west-1", Some(signer()), Duration::from_secs(5)).unwrap();

        let error = tagger.put_tags("bad bucket", "data/d1/file.csv", &tags()).await.unwrap_err();

        assert_eq!(error.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_from_config_needs_credentials_for_aws() {
        let storage = StorageConfig {
            backend: crate::config::StorageBackendKind::S3,
            local_root: "./data".to_string(),
            s3_endpoint: None,
        };
        let aws = AwsConfig {
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
        };

        let error = S3Tagger::from_config(&storage, &aws, Duration::from_secs(5)).unwrap_err();
        assert_eq!(error.code(), "VALIDATION_ERROR");

        let local = StorageConfig {
            s3_endpoint: Some("http://localhost:9000".to_string()),
            ..storage
        };
        assert!(S3Tagger::from_config(&local, &aws, Duration::from_secs(5)).is_ok());
    }
}
