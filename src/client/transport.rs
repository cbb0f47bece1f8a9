//! The request primitive every operation goes through.
//!
//! [`RequestExecutor`] is the single seam between the client and the remote
//! service. The HTTP implementation lives in `http_client`; tests substitute a
//! recording mock.

use async_trait::async_trait;
use cosmoform_sql::QuerySpec;
use reqwest::Method;
use serde_json::Value;

use crate::error::CosmoResult;

/// One call against the service. `path` is an opaque resource address such as
/// `dbs/app/colls/users/docs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub partition_key: Option<Value>,
    pub cross_partition: bool,
    pub is_query: bool,
    pub upsert: bool,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            partition_key: None,
            cross_partition: false,
            is_query: false,
            upsert: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// A query POST carrying `{query, parameters}`.
    pub fn query(path: impl Into<String>, spec: &QuerySpec) -> Self {
        let mut request = Self::new(Method::POST, path);
        request.body = serde_json::to_value(spec).ok();
        request.is_query = true;
        request
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn partition_key(mut self, partition_key: Option<Value>) -> Self {
        self.partition_key = partition_key;
        self
    }

    pub fn cross_partition(mut self, enabled: bool) -> Self {
        self.cross_partition = enabled;
        self
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    /// Statement text, for query requests.
    pub fn query_text(&self) -> Option<&str> {
        self.body.as_ref()?.get("query")?.as_str()
    }
}

/// A successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
    /// Cost units charged for the request (summed over pages for queries).
    pub request_charge: f64,
    pub continuation: Option<String>,
}

impl Response {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            request_charge: 0.0,
            continuation: None,
        }
    }

    pub fn with_charge(mut self, request_charge: f64) -> Self {
        self.request_charge = request_charge;
        self
    }

    /// Result rows of a query response.
    pub fn documents(&self) -> Vec<Value> {
        self.body
            .get("Documents")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default()
    }
}

/// Executes requests against the service.
///
/// Implementations report non-success statuses as errors (see
/// [`CosmoError::from_status`](crate::error::CosmoError::from_status)).
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn request(&self, request: Request) -> CosmoResult<Response>;
}

/// Resource addresses.
pub mod paths {
    pub fn databases() -> String {
        "dbs".to_string()
    }

    pub fn database(db: &str) -> String {
        format!("dbs/{}", db)
    }

    pub fn containers(db: &str) -> String {
        format!("dbs/{}/colls", db)
    }

    pub fn container(db: &str, container: &str) -> String {
        format!("dbs/{}/colls/{}", db, container)
    }

    pub fn documents(db: &str, container: &str) -> String {
        format!("dbs/{}/colls/{}/docs", db, container)
    }

    pub fn document(db: &str, container: &str, id: &str) -> String {
        format!("dbs/{}/colls/{}/docs/{}", db, container, id)
    }
}
