//! Typed client for document databases that speak a SQL dialect over REST.
//!
//! Statements are compiled by [`cosmoform_sql`]; this crate signs and sends
//! them, runs bulk updates and deletes with bounded concurrency and retry,
//! manages containers and applies migrations.
//!
//! ```no_run
//! use cosmoform::{CosmoClient, ContainerSchema, FindManyArgs, Filter, FieldOps};
//! use serde_json::Value;
//!
//! # async fn run() -> cosmoform::CosmoResult<()> {
//! let client = CosmoClient::builder("https://acct.documents.azure.com:443/")
//!     .database("app")
//!     .key("bWFzdGVyLWtleQ==")
//!     .build()?;
//! let users = client.container::<Value>(ContainerSchema::new("users", "/tenantId"));
//! let adults = users
//!     .find_many(
//!         FindManyArgs::new(Filter::new().where_field("age", FieldOps::new().gte(18)))
//!             .take(20),
//!     )
//!     .await?;
//! # let _ = adults;
//! # Ok(())
//! # }
//! ```

pub mod bulk;
pub mod client;
pub mod config;
pub mod error;
pub mod migrate;
pub mod schema;

pub use bulk::{
    BulkError, BulkExecutor, BulkOptions, BulkProgress, BulkReport, DeleteManyOptions, Patch,
    ProgressObserver, UpdateManyOptions,
};
pub use client::{
    Container, ContainerInfo, CosmoClient, CosmoClientBuilder, DatabaseClient, FindManyArgs,
    FindWithAggregate, HttpTransport, Request, RequestExecutor, Response, Scope, VerifyReport,
};
pub use config::{BulkDefaults, ClientConfig, ConsistencyLevel, Credential, RetryPolicy};
pub use error::{CosmoError, CosmoResult};
pub use migrate::{Migration, MigrationContext, MigrationRunner, MigrationStatus};
pub use schema::{ContainerSchema, FieldDef, FieldKind, SchemaSet};

pub use cosmoform_sql::{
    AggregateRequest, AggregateResult, FieldOps, Filter, GroupByRequest, GroupRow, Operator,
    Pagination, QuerySpec, SortOrder,
};
