use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::transport::{paths, Request, RequestExecutor};
use crate::error::{CosmoError, CosmoResult};
use crate::migrate::MIGRATIONS_CONTAINER;
use crate::schema::{ContainerSchema, SchemaSet};

/// A container as reported by the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerInfo {
    pub id: String,
    pub partition_key: Option<String>,
}

impl ContainerInfo {
    fn from_value(value: &Value) -> Option<Self> {
        let id = value.get("id")?.as_str()?.to_string();
        let partition_key = value
            .pointer("/partitionKey/paths/0")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self { id, partition_key })
    }
}

/// Differences between declared schemas and the live database.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerifyReport {
    /// Declared but not present.
    pub missing: Vec<String>,
    /// `(container, declared, actual)`.
    pub partition_key_mismatches: Vec<(String, String, String)>,
    /// Present but not declared.
    pub unknown: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.partition_key_mismatches.is_empty()
    }
}

/// Database and container lifecycle.
#[derive(Clone)]
pub struct DatabaseClient {
    executor: Arc<dyn RequestExecutor>,
    database: String,
}

impl DatabaseClient {
    pub fn new(executor: Arc<dyn RequestExecutor>, database: &str) -> Self {
        Self {
            executor,
            database: database.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.database
    }

    /// Returns `true` when the database was created by this call.
    pub async fn create_if_not_exists(&self) -> CosmoResult<bool> {
        let request = Request::post(paths::databases(), json!({ "id": self.database }));
        match self.executor.request(request).await {
            Ok(_) => {
                info!("Created database '{}'", self.database);
                Ok(true)
            }
            Err(CosmoError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn delete(&self) -> CosmoResult<()> {
        self.executor
            .request(Request::delete(paths::database(&self.database)))
            .await?;
        warn!("Deleted database '{}'", self.database);
        Ok(())
    }

    pub async fn list_containers(&self) -> CosmoResult<Vec<ContainerInfo>> {
        let response = self
            .executor
            .request(Request::get(paths::containers(&self.database)))
            .await?;
        let containers = response
            .body
            .get("DocumentCollections")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                CosmoError::Protocol("container listing without DocumentCollections".to_string())
            })?;
        Ok(containers.iter().filter_map(ContainerInfo::from_value).collect())
    }

    /// Returns `true` when the container was created by this call.
    pub async fn create_container_if_not_exists(&self, schema: &ContainerSchema) -> CosmoResult<bool> {
        let request = Request::post(paths::containers(&self.database), schema.to_definition());
        match self.executor.request(request).await {
            Ok(_) => {
                info!(
                    "Created container '{}' (partition key {})",
                    schema.name, schema.partition_key
                );
                Ok(true)
            }
            Err(CosmoError::Conflict(_)) => {
                debug!("Container '{}' already exists", schema.name);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn delete_container(&self, name: &str) -> CosmoResult<()> {
        self.executor
            .request(Request::delete(paths::container(&self.database, name)))
            .await?;
        warn!("Deleted container '{}'", name);
        Ok(())
    }

    /// Compare declared schemas against the live containers.
    pub async fn verify(&self, schemas: &SchemaSet) -> CosmoResult<VerifyReport> {
        let live = self.list_containers().await?;
        let mut report = VerifyReport::default();

        for schema in &schemas.containers {
            match live.iter().find(|c| c.id == schema.name) {
                None => report.missing.push(schema.name.clone()),
                Some(info) => {
                    let actual = info.partition_key.clone().unwrap_or_default();
                    if actual != schema.partition_key {
                        report.partition_key_mismatches.push((
                            schema.name.clone(),
                            schema.partition_key.clone(),
                            actual,
                        ));
                    }
                }
            }
        }

        report.unknown = live
            .into_iter()
            .map(|c| c.id)
            .filter(|id| id != MIGRATIONS_CONTAINER && schemas.get(id).is_none())
            .collect();
        Ok(report)
    }

    /// Delete every container not declared in `schemas`. The migrations
    /// ledger is always kept.
    pub async fn prune(&self, schemas: &SchemaSet, confirm: bool) -> CosmoResult<Vec<String>> {
        if !confirm {
            return Err(CosmoError::Configuration(
                "prune requires confirm: true".to_string(),
            ));
        }
        let report = self.verify(schemas).await?;
        for name in &report.unknown {
            self.delete_container(name).await?;
        }
        Ok(report.unknown)
    }
}
