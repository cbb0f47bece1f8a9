use std::time::Duration;

use cosmoform_sql::SqlError;
use thiserror::Error;

/// Status codes the service uses for transient conditions.
pub const RETRIABLE_STATUS_CODES: [u16; 5] = [408, 429, 449, 500, 503];

#[derive(Error, Debug)]
pub enum CosmoError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        code: Option<String>,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Full scan rejected: {0}")]
    FullScanRejected(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Schema validation failed: {0}")]
    Validation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sql(#[from] SqlError),
}

pub type CosmoResult<T> = Result<T, CosmoError>;

impl serde::Serialize for CosmoError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl CosmoError {
    /// Build from a non-success response. 404 and 409 get their own variants.
    pub fn from_status(status: u16, body: &serde_json::Value, retry_after: Option<Duration>) -> Self {
        let message = body
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| match body {
                serde_json::Value::Null => "no response body".to_string(),
                other => other.to_string(),
            });
        let code = body
            .get("code")
            .and_then(|c| c.as_str())
            .map(str::to_string);

        match status {
            404 => CosmoError::NotFound(message),
            409 => CosmoError::Conflict(message),
            _ => CosmoError::Http {
                status,
                code,
                message,
                retry_after,
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CosmoError::Http { status, .. } => Some(*status),
            CosmoError::NotFound(_) => Some(404),
            CosmoError::Conflict(_) => Some(409),
            _ => None,
        }
    }

    /// Transient failures worth retrying with backoff.
    pub fn is_retriable(&self) -> bool {
        matches!(self, CosmoError::Http { status, .. } if RETRIABLE_STATUS_CODES.contains(status))
    }

    /// Server-suggested wait before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CosmoError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CosmoError::NotFound(_))
    }

    /// The service refused a query because it would have to fan out over
    /// every partition (this also happens on empty containers).
    pub fn is_full_scan_rejection(&self) -> bool {
        let message = match self {
            CosmoError::Http { message, .. } => message.to_lowercase(),
            _ => return false,
        };
        message.contains("enablecrosspartition")
            || (message.contains("cross partition query")
                && (message.contains("disabled")
                    || message.contains("can not be directly served")
                    || message.contains("cannot be directly served")))
    }

    /// Rewrite a full-scan rejection into an actionable message. Every other
    /// error passes through untouched.
    pub fn enrich_full_scan(self, container: &str) -> Self {
        if !self.is_full_scan_rejection() {
            return self;
        }
        CosmoError::FullScanRejected(format!(
            "the query on '{}' could not be served without a partition scope ({}). \
             Pass a partition key, narrow the filter, or opt in with enable_cross_partition. \
             Empty containers commonly trigger this.",
            container, self
        ))
    }
}
