//! Ordered, recorded data migrations.
//!
//! Applied migrations are recorded in the [`MIGRATIONS_CONTAINER`] ledger,
//! partitioned by id. The checksum covers a migration's id, description and
//! [`Migration::version`]; the body of `up` is not hashed, so bump the version
//! when it changes. A recorded migration whose checksum no longer matches its
//! definition stops the run.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cosmoform_sql::Filter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::bulk::BulkExecutor;
use crate::client::{Container, CosmoClient, DatabaseClient, FindManyArgs, Scope};
use crate::error::{CosmoError, CosmoResult};
use crate::schema::ContainerSchema;

pub const MIGRATIONS_CONTAINER: &str = "_migrations";

#[async_trait]
pub trait Migration: Send + Sync {
    /// Sort key and ledger id, e.g. `"0003_backfill_status"`.
    fn id(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Revision of the body. Changing it after the migration was applied makes
    /// the next run refuse to continue.
    fn version(&self) -> u32 {
        1
    }

    async fn up(&self, ctx: &MigrationContext) -> CosmoResult<()>;
}

/// What a migration body may use.
pub struct MigrationContext {
    client: CosmoClient,
}

impl MigrationContext {
    pub fn client(&self) -> &CosmoClient {
        &self.client
    }

    pub fn database(&self) -> DatabaseClient {
        self.client.database()
    }

    pub fn bulk(&self) -> BulkExecutor {
        self.client.bulk()
    }

    pub fn container<T>(&self, schema: ContainerSchema) -> Container<T>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        self.client.container(schema)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: String,
    pub description: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationStatus {
    pub id: String,
    pub description: String,
    /// `None` while pending.
    pub applied_at: Option<DateTime<Utc>>,
}

pub fn checksum(migration: &dyn Migration) -> String {
    let mut hasher = Sha256::new();
    hasher.update(migration.id().as_bytes());
    hasher.update(b"\n");
    hasher.update(migration.description().as_bytes());
    hasher.update(b"\n");
    hasher.update(migration.version().to_be_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct MigrationRunner {
    client: CosmoClient,
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRunner {
    pub fn new(client: CosmoClient) -> Self {
        Self {
            client,
            migrations: Vec::new(),
        }
    }

    pub fn add(mut self, migration: impl Migration + 'static) -> Self {
        self.migrations.push(Box::new(migration));
        self
    }

    fn ledger(&self) -> Container<MigrationRecord> {
        self.client.container(ledger_schema())
    }

    fn ordered(&self) -> CosmoResult<Vec<&dyn Migration>> {
        let mut ordered: Vec<&dyn Migration> = self.migrations.iter().map(|m| m.as_ref()).collect();
        ordered.sort_by(|a, b| a.id().cmp(b.id()));
        for pair in ordered.windows(2) {
            if pair[0].id() == pair[1].id() {
                return Err(CosmoError::Migration(format!(
                    "duplicate migration id '{}'",
                    pair[0].id()
                )));
            }
        }
        Ok(ordered)
    }

    async fn applied(&self) -> CosmoResult<HashMap<String, MigrationRecord>> {
        let args = FindManyArgs::new(Filter::new()).scope(Scope::cross_partition());
        match self.ledger().find_many(args).await {
            Ok(records) => Ok(records.into_iter().map(|r| (r.id.clone(), r)).collect()),
            Err(e) if e.is_not_found() => Ok(HashMap::new()),
            Err(e) => Err(e),
        }
    }

    /// Every registered migration in order, with its applied time if any.
    pub async fn status(&self) -> CosmoResult<Vec<MigrationStatus>> {
        let applied = self.applied().await?;
        Ok(self
            .ordered()?
            .into_iter()
            .map(|m| MigrationStatus {
                id: m.id().to_string(),
                description: m.description().to_string(),
                applied_at: applied.get(m.id()).map(|r| r.applied_at),
            })
            .collect())
    }

    /// Apply pending migrations in id order. Returns the ids applied, or
    /// the ids that would be applied when `dry_run` is set.
    pub async fn run(&self, dry_run: bool) -> CosmoResult<Vec<String>> {
        let ordered = self.ordered()?;
        if !dry_run {
            self.client
                .database()
                .create_container_if_not_exists(&ledger_schema())
                .await?;
        }
        let applied = self.applied().await?;

        let mut pending = Vec::new();
        for migration in ordered {
            match applied.get(migration.id()) {
                Some(record) if record.checksum != checksum(migration) => {
                    return Err(CosmoError::Migration(format!(
                        "migration '{}' changed since it was applied",
                        migration.id()
                    )));
                }
                Some(_) => {}
                None => pending.push(migration),
            }
        }

        if dry_run {
            return Ok(pending.iter().map(|m| m.id().to_string()).collect());
        }

        let ctx = MigrationContext {
            client: self.client.clone(),
        };
        let ledger = self.ledger();
        let mut done = Vec::with_capacity(pending.len());
        for migration in pending {
            info!("Applying migration {}", migration.id());
            migration
                .up(&ctx)
                .await
                .map_err(|e| CosmoError::Migration(format!("{}: {}", migration.id(), e)))?;
            ledger
                .create(MigrationRecord {
                    id: migration.id().to_string(),
                    description: migration.description().to_string(),
                    checksum: checksum(migration),
                    applied_at: Utc::now(),
                })
                .await?;
            done.push(migration.id().to_string());
        }
        Ok(done)
    }
}

fn ledger_schema() -> ContainerSchema {
    ContainerSchema::new(MIGRATIONS_CONTAINER, "/id")
}
