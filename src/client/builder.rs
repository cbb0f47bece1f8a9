use std::sync::Arc;

use super::http_client::HttpTransport;
use super::CosmoClient;
use crate::bulk::ProgressObserver;
use crate::config::{BulkDefaults, ClientConfig, ConsistencyLevel, RetryPolicy};
use crate::error::CosmoResult;

/// Fluent construction of a [`CosmoClient`] over HTTP.
///
/// ```no_run
/// # async fn run() -> cosmoform::CosmoResult<()> {
/// let client = cosmoform::CosmoClient::builder("https://acct.documents.azure.com:443/")
///     .database("app")
///     .key("bWFzdGVyLWtleQ==")
///     .timeout_secs(10)
///     .build()?;
/// client.ping().await?;
/// # Ok(())
/// # }
/// ```
pub struct CosmoClientBuilder {
    config: ClientConfig,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl CosmoClientBuilder {
    pub fn new(endpoint: &str) -> Self {
        Self {
            config: ClientConfig::new(endpoint, ""),
            observer: None,
        }
    }

    /// Start from an existing configuration (environment, TOML file).
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            observer: None,
        }
    }

    pub fn database(mut self, database: &str) -> Self {
        self.config.database = database.to_string();
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.config.key = Some(key.to_string());
        self.config.resource_token = None;
        self
    }

    pub fn resource_token(mut self, token: &str) -> Self {
        self.config.resource_token = Some(token.to_string());
        self.config.key = None;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn bulk_defaults(mut self, defaults: BulkDefaults) -> Self {
        self.config.bulk = defaults;
        self
    }

    pub fn consistency(mut self, level: ConsistencyLevel) -> Self {
        self.config.consistency = Some(level);
        self
    }

    /// Observer for bulk operations started from this client.
    pub fn progress_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn build(self) -> CosmoResult<CosmoClient> {
        self.config.validate()?;
        let transport = HttpTransport::new(&self.config)?;
        let client = CosmoClient::from_executor(Arc::new(transport), self.config);
        Ok(match self.observer {
            Some(observer) => client.with_progress_observer(observer),
            None => client,
        })
    }
}
