//! Client configuration.
//!
//! Everything a client needs is carried in an explicit [`ClientConfig`]
//! handed to the builder; nothing is read from process-global state after
//! construction. Configs come from code, from environment variables, or from
//! a TOML file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CosmoError, CosmoResult};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_MS: u64 = 1000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Backoff settings for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each subsequent one.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_RETRY_BASE_MS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay_ms: base_delay.as_millis() as u64,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
        }
    }
}

/// Defaults applied to bulk operations that don't set their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkDefaults {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub continue_on_error: bool,
}

impl Default for BulkDefaults {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            continue_on_error: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    Strong,
    BoundedStaleness,
    Session,
    ConsistentPrefix,
    Eventual,
}

impl ConsistencyLevel {
    pub fn as_header(&self) -> &'static str {
        match self {
            ConsistencyLevel::Strong => "Strong",
            ConsistencyLevel::BoundedStaleness => "BoundedStaleness",
            ConsistencyLevel::Session => "Session",
            ConsistencyLevel::ConsistentPrefix => "ConsistentPrefix",
            ConsistencyLevel::Eventual => "Eventual",
        }
    }
}

/// How requests are authorized.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Base64 account key, used to sign every request.
    MasterKey(String),
    /// Pre-issued resource token, sent as-is.
    ResourceToken(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::MasterKey(_) => write!(f, "MasterKey(***)"),
            Credential::ResourceToken(_) => write!(f, "ResourceToken(***)"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub endpoint: String,
    pub database: String,
    #[serde(default, skip_serializing)]
    pub key: Option<String>,
    #[serde(default, skip_serializing)]
    pub resource_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub consistency: Option<ConsistencyLevel>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub bulk: BulkDefaults,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ClientConfig {
    pub fn new(endpoint: &str, database: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            database: database.to_string(),
            key: None,
            resource_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            consistency: None,
            retry: RetryPolicy::default(),
            bulk: BulkDefaults::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The credential to sign with. A master key wins over a resource token.
    pub fn credential(&self) -> CosmoResult<Credential> {
        match (&self.key, &self.resource_token) {
            (Some(key), _) => Ok(Credential::MasterKey(key.clone())),
            (None, Some(token)) => Ok(Credential::ResourceToken(token.clone())),
            (None, None) => Err(CosmoError::Configuration(
                "either a key or a resource token is required".to_string(),
            )),
        }
    }

    pub fn validate(&self) -> CosmoResult<()> {
        if self.endpoint.is_empty() {
            return Err(CosmoError::Configuration("endpoint is required".to_string()));
        }
        url::Url::parse(&self.endpoint).map_err(|e| {
            CosmoError::Configuration(format!("invalid endpoint '{}': {}", self.endpoint, e))
        })?;
        if self.database.is_empty() {
            return Err(CosmoError::Configuration("database is required".to_string()));
        }
        if self.bulk.batch_size == 0 {
            return Err(CosmoError::Configuration(
                "bulk.batch_size must be at least 1".to_string(),
            ));
        }
        self.credential().map(|_| ())
    }

    /// Read `COSMOFORM_*` variables from the process environment.
    pub fn from_env() -> CosmoResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup (the process environment, a map in
    /// tests, ...).
    pub fn from_lookup<F>(lookup: F) -> CosmoResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name).ok_or_else(|| CosmoError::Configuration(format!("{} is not set", name)))
        };

        let mut config = Self::new(&required("COSMOFORM_ENDPOINT")?, &required("COSMOFORM_DATABASE")?);
        config.key = lookup("COSMOFORM_KEY");
        config.resource_token = lookup("COSMOFORM_RESOURCE_TOKEN");

        if let Some(v) = lookup("COSMOFORM_TIMEOUT_SECS") {
            config.timeout_secs = parse_var("COSMOFORM_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("COSMOFORM_MAX_RETRIES") {
            config.retry.max_retries = parse_var("COSMOFORM_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("COSMOFORM_RETRY_BASE_MS") {
            config.retry.base_delay_ms = parse_var("COSMOFORM_RETRY_BASE_MS", &v)?;
        }
        if let Some(v) = lookup("COSMOFORM_BATCH_SIZE") {
            config.bulk.batch_size = parse_var("COSMOFORM_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("COSMOFORM_MAX_CONCURRENCY") {
            config.bulk.max_concurrency = parse_var("COSMOFORM_MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("COSMOFORM_CONSISTENCY") {
            config.consistency = Some(
                serde_json::from_value(serde_json::Value::String(v.clone())).map_err(|_| {
                    CosmoError::Configuration(format!("unknown consistency level '{}'", v))
                })?,
            );
        }

        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> CosmoResult<Self> {
        let mut config: Self = toml::from_str(text)
            .map_err(|e| CosmoError::Configuration(format!("invalid config: {}", e)))?;
        config.endpoint = config.endpoint.trim_end_matches('/').to_string();
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> CosmoResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CosmoError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> CosmoResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CosmoError::Configuration(format!("{} has an invalid value '{}'", name, value)))
}
