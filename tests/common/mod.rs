//! Shared test utilities
//!
//! Provides:
//! - A recording [`MockExecutor`] answering requests through a handler
//! - Response and error helpers
//! - A client configuration with fast retries

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cosmoform::{
    ClientConfig, CosmoClient, CosmoError, CosmoResult, Request, RequestExecutor, Response,
    RetryPolicy,
};
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::{json, Value};

type Handler = Box<dyn Fn(&Request) -> CosmoResult<Response> + Send + Sync>;

/// Records every request and answers with `handler`.
pub struct MockExecutor {
    handler: Handler,
    requests: Mutex<Vec<Request>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockExecutor {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&Request) -> CosmoResult<Response> + Send + Sync + 'static,
    {
        Arc::new(Self::build(handler, None))
    }

    /// Like [`MockExecutor::new`] but every request sleeps first, so
    /// overlapping requests are observable through [`MockExecutor::peak`].
    pub fn with_delay<F>(delay: Duration, handler: F) -> Arc<Self>
    where
        F: Fn(&Request) -> CosmoResult<Response> + Send + Sync + 'static,
    {
        Arc::new(Self::build(handler, Some(delay)))
    }

    fn build<F>(handler: F, delay: Option<Duration>) -> Self
    where
        F: Fn(&Request) -> CosmoResult<Response> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn count_method(&self, method: &Method) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| &r.method == method && !r.is_query)
            .count()
    }

    pub fn queries(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter_map(|r| r.query_text().map(str::to_string))
            .collect()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestExecutor for MockExecutor {
    async fn request(&self, request: Request) -> CosmoResult<Response> {
        self.requests.lock().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = (self.handler)(&request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::new("https://localhost:8081", "app");
    config.key = Some("dGVzdC1rZXk=".to_string());
    config.retry = RetryPolicy::new(3, Duration::from_millis(1));
    config
}

pub fn test_client(executor: Arc<MockExecutor>) -> CosmoClient {
    CosmoClient::from_executor(executor, test_config())
}

pub fn ok(body: Value) -> CosmoResult<Response> {
    Ok(Response::new(200, body).with_charge(1.0))
}

pub fn rows(documents: Vec<Value>) -> CosmoResult<Response> {
    let count = documents.len();
    Ok(Response::new(200, json!({ "Documents": documents, "_count": count })).with_charge(2.5))
}

/// Echo the request body back, as create/replace do.
pub fn echo(request: &Request) -> CosmoResult<Response> {
    ok(request.body.clone().unwrap_or(Value::Null))
}

pub fn status(code: u16, message: &str) -> CosmoError {
    CosmoError::from_status(code, &json!({ "code": "Error", "message": message }), None)
}

/// `count` documents `d0..` spread over two tenants.
pub fn documents(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "id": format!("d{}", i),
                "tenantId": if i % 2 == 0 { "t1" } else { "t2" },
                "status": "active",
                "n": i,
            })
        })
        .collect()
}
