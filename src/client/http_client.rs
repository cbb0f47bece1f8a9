use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, trace};

use super::auth::{http_date, Signer};
use super::transport::{Request, RequestExecutor, Response};
use crate::config::{ClientConfig, ConsistencyLevel};
use crate::error::{CosmoError, CosmoResult};

const API_VERSION: &str = "2018-12-31";

const HEADER_DATE: &str = "x-ms-date";
const HEADER_VERSION: &str = "x-ms-version";
const HEADER_PARTITION_KEY: &str = "x-ms-documentdb-partitionkey";
const HEADER_CROSS_PARTITION: &str = "x-ms-documentdb-query-enablecrosspartition";
const HEADER_IS_QUERY: &str = "x-ms-documentdb-isquery";
const HEADER_UPSERT: &str = "x-ms-documentdb-is-upsert";
const HEADER_CONSISTENCY: &str = "x-ms-consistency-level";
const HEADER_CONTINUATION: &str = "x-ms-continuation";
const HEADER_REQUEST_CHARGE: &str = "x-ms-request-charge";
const HEADER_RETRY_AFTER_MS: &str = "x-ms-retry-after-ms";

/// [`RequestExecutor`] over HTTPS with `reqwest`.
///
/// Query requests follow continuation tokens until the result set is
/// exhausted; the returned body holds every page's `Documents` and the charge
/// is the sum over pages.
pub struct HttpTransport {
    base_url: String,
    signer: Signer,
    consistency: Option<ConsistencyLevel>,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> CosmoResult<Self> {
        let signer = Signer::from_credential(&config.credential()?)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| CosmoError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            signer,
            consistency: config.consistency,
            client,
        })
    }

    fn headers(&self, request: &Request, continuation: Option<&str>) -> CosmoResult<HeaderMap> {
        let date = http_date(chrono::Utc::now());
        let auth = self
            .signer
            .authorization(request.method.as_str(), &request.path, &date)?;

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_VERSION, HeaderValue::from_static(API_VERSION));
        headers.insert(HEADER_DATE, header_value(&date)?);
        headers.insert(AUTHORIZATION, header_value(&auth)?);

        if request.is_query {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/query+json"));
            headers.insert(HEADER_IS_QUERY, HeaderValue::from_static("true"));
        } else {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        if let Some(pk) = &request.partition_key {
            let encoded = serde_json::to_string(&[pk])?;
            headers.insert(HEADER_PARTITION_KEY, header_value(&encoded)?);
        }
        if request.cross_partition {
            headers.insert(HEADER_CROSS_PARTITION, HeaderValue::from_static("true"));
        }
        if request.upsert {
            headers.insert(HEADER_UPSERT, HeaderValue::from_static("true"));
        }
        if let Some(level) = self.consistency {
            headers.insert(HEADER_CONSISTENCY, HeaderValue::from_static(level.as_header()));
        }
        if let Some(token) = continuation {
            headers.insert(HEADER_CONTINUATION, header_value(token)?);
        }
        Ok(headers)
    }

    async fn send_once(&self, request: &Request, continuation: Option<&str>) -> CosmoResult<Response> {
        let url = format!("{}/{}", self.base_url, request.path.trim_start_matches('/'));
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(self.headers(request, continuation)?);
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CosmoError::Connection(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let request_charge = header_str(&headers, HEADER_REQUEST_CHARGE)
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);
        let next = header_str(&headers, HEADER_CONTINUATION).map(str::to_string);
        let retry_after = header_str(&headers, HEADER_RETRY_AFTER_MS)
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis);

        let text = response
            .text()
            .await
            .map_err(|e| CosmoError::Protocol(format!("Failed to read response: {}", e)))?;
        let body: Value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| {
                CosmoError::Protocol(format!("Failed to parse response: {} - Text: {}", e, text))
            })?
        };

        trace!(status, request_charge, path = %request.path, "response received");

        if !(200..300).contains(&status) {
            return Err(CosmoError::from_status(status, &body, retry_after));
        }

        Ok(Response {
            status,
            body,
            request_charge,
            continuation: next,
        })
    }
}

#[async_trait]
impl RequestExecutor for HttpTransport {
    async fn request(&self, request: Request) -> CosmoResult<Response> {
        debug!(method = %request.method, path = %request.path, query = ?request.query_text(), "request");

        let first = self.send_once(&request, None).await?;
        if !request.is_query || first.continuation.is_none() {
            return Ok(first);
        }

        let mut documents = first.documents();
        let mut request_charge = first.request_charge;
        let mut continuation = first.continuation;
        let status = first.status;

        while let Some(token) = continuation {
            let page = self.send_once(&request, Some(&token)).await?;
            documents.extend(page.documents());
            request_charge += page.request_charge;
            continuation = page.continuation;
        }

        let count = documents.len();
        Ok(Response {
            status,
            body: serde_json::json!({ "Documents": documents, "_count": count }),
            request_charge,
            continuation: None,
        })
    }
}

fn header_value(value: &str) -> CosmoResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| CosmoError::Protocol(format!("invalid header value '{}': {}", value, e)))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
