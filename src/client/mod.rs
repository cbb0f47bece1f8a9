//! Client handles: the root [`CosmoClient`], database management and typed
//! container access.

pub mod auth;
mod builder;
mod container;
mod database;
pub mod http_client;
mod query;
pub mod transport;

pub use builder::CosmoClientBuilder;
pub use container::{Container, FindManyArgs, Scope};
pub use database::{ContainerInfo, DatabaseClient, VerifyReport};
pub use http_client::HttpTransport;
pub use query::FindWithAggregate;
pub use transport::{paths, Request, RequestExecutor, Response};

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::bulk::{BulkExecutor, ProgressObserver};
use crate::config::ClientConfig;
use crate::error::CosmoResult;
use crate::schema::ContainerSchema;

/// Entry point. Cheap to clone; every handle shares the same executor.
#[derive(Clone)]
pub struct CosmoClient {
    executor: Arc<dyn RequestExecutor>,
    config: Arc<ClientConfig>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl CosmoClient {
    pub fn builder(endpoint: &str) -> CosmoClientBuilder {
        CosmoClientBuilder::new(endpoint)
    }

    /// HTTP client from a complete configuration.
    pub fn from_config(config: ClientConfig) -> CosmoResult<Self> {
        CosmoClientBuilder::from_config(config).build()
    }

    /// Client over any executor. Tests pass a recording mock here.
    pub fn from_executor(executor: Arc<dyn RequestExecutor>, config: ClientConfig) -> Self {
        Self {
            executor,
            config: Arc::new(config),
            observer: None,
        }
    }

    pub fn with_progress_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn executor(&self) -> Arc<dyn RequestExecutor> {
        self.executor.clone()
    }

    pub fn database(&self) -> DatabaseClient {
        DatabaseClient::new(self.executor.clone(), &self.config.database)
    }

    /// Typed handle for one container.
    pub fn container<T>(&self, schema: ContainerSchema) -> Container<T>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        Container::new(
            self.executor.clone(),
            &self.config.database,
            schema,
            Arc::new(self.bulk()),
        )
    }

    /// Bulk engine with this client's defaults and observer.
    pub fn bulk(&self) -> BulkExecutor {
        let bulk = BulkExecutor::new(self.executor.clone(), &self.config);
        match &self.observer {
            Some(observer) => bulk.with_observer(observer.clone()),
            None => bulk,
        }
    }

    /// Reads the configured database, failing if it is unreachable or absent.
    pub async fn ping(&self) -> CosmoResult<()> {
        debug!("Pinging database '{}'", self.config.database);
        self.executor
            .request(Request::get(paths::database(&self.config.database)))
            .await?;
        Ok(())
    }
}
