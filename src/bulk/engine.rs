//! Bulk update/delete engine.
//!
//! Each call runs Validate → Scan → Batch × N → Finalize. Validation failures
//! never reach the service. The scan loads every candidate before batching.
//! Chunks run in bounded waves; after each chunk the shared counters are
//! updated and the observer receives a snapshot.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cosmoform_sql::{Filter, QuerySpec, SelectQuery};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::batch::{chunk, process_with_concurrency, retry_with_backoff};
use super::progress::{notify, BulkError, BulkStats, ProgressObserver};
use crate::client::transport::{paths, Request, RequestExecutor};
use crate::config::{BulkDefaults, ClientConfig, RetryPolicy};
use crate::error::{CosmoError, CosmoResult};
use crate::schema::ContainerSchema;

/// Computes the fields to merge into one existing document.
pub type TransformFn = dyn Fn(&Value) -> Map<String, Value> + Send + Sync;

/// The change `update_many` applies to each matching document.
#[derive(Clone)]
pub enum Patch {
    /// The same fields merged into every document.
    Static(Map<String, Value>),
    /// Fields computed per document from its current contents.
    Transform(Arc<TransformFn>),
}

impl Patch {
    /// Static patch from a JSON object.
    pub fn fields(fields: Value) -> CosmoResult<Self> {
        match fields {
            Value::Object(map) => Ok(Patch::Static(map)),
            other => Err(CosmoError::Configuration(format!(
                "patch must be a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn transform<F>(transform: F) -> Self
    where
        F: Fn(&Value) -> Map<String, Value> + Send + Sync + 'static,
    {
        Patch::Transform(Arc::new(transform))
    }

    /// Fields to merge into `document`.
    pub fn resolve(&self, document: &Value) -> Map<String, Value> {
        match self {
            Patch::Static(fields) => fields.clone(),
            Patch::Transform(transform) => transform(document),
        }
    }

    /// `document` with the patch merged over its top-level fields.
    pub fn apply(&self, document: Value) -> Value {
        let fields = self.resolve(&document);
        match document {
            Value::Object(mut object) => {
                for (key, value) in fields {
                    object.insert(key, value);
                }
                Value::Object(object)
            }
            other => other,
        }
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Patch::Static(fields) => f.debug_tuple("Static").field(fields).finish(),
            Patch::Transform(_) => f.write_str("Transform(<fn>)"),
        }
    }
}

/// Settings shared by `update_many` and `delete_many`. Unset values fall
/// back to the executor's defaults.
#[derive(Debug, Clone, Default)]
pub struct BulkOptions {
    pub partition_key: Option<Value>,
    pub enable_cross_partition: bool,
    pub batch_size: Option<usize>,
    pub max_concurrency: Option<usize>,
    pub continue_on_error: Option<bool>,
    pub retry: Option<RetryPolicy>,
    pub dry_run: bool,
}

impl BulkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition_key(mut self, partition_key: impl Into<Value>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    pub fn enable_cross_partition(mut self) -> Self {
        self.enable_cross_partition = true;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = Some(enabled);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    fn check_scope(&self, operation: &str) -> CosmoResult<()> {
        if self.partition_key.is_none() && !self.enable_cross_partition {
            return Err(CosmoError::Configuration(format!(
                "{} requires a partition key or enable_cross_partition",
                operation
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct UpdateManyOptions {
    pub filter: Filter,
    pub patch: Patch,
    pub options: BulkOptions,
}

impl UpdateManyOptions {
    pub fn new(filter: Filter, patch: Patch) -> Self {
        Self {
            filter,
            patch,
            options: BulkOptions::default(),
        }
    }

    pub fn with(mut self, options: BulkOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone)]
pub struct DeleteManyOptions {
    pub filter: Filter,
    /// Must be `true` or the call fails before touching any data.
    pub confirm: bool,
    pub options: BulkOptions,
}

impl DeleteManyOptions {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            confirm: false,
            options: BulkOptions::default(),
        }
    }

    pub fn confirm(mut self, confirm: bool) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with(mut self, options: BulkOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkPerformance {
    pub request_charge: f64,
    pub duration: Duration,
    pub docs_per_second: f64,
}

/// Final summary of a bulk call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkReport {
    pub success: bool,
    pub dry_run: bool,
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<BulkError>,
    pub performance: BulkPerformance,
}

impl BulkReport {
    fn from_stats(stats: BulkStats) -> Self {
        let duration = stats.elapsed();
        let seconds = duration.as_secs_f64();
        let docs_per_second = if seconds > 0.0 {
            stats.processed as f64 / seconds
        } else {
            stats.processed as f64
        };
        Self {
            success: stats.failed == 0,
            dry_run: false,
            total: stats.total,
            processed: stats.processed,
            succeeded: stats.succeeded,
            failed: stats.failed,
            errors: stats.errors,
            performance: BulkPerformance {
                request_charge: stats.request_charge,
                duration,
                docs_per_second,
            },
        }
    }

    fn dry_run(total: usize, request_charge: f64, duration: Duration) -> Self {
        Self {
            success: true,
            dry_run: true,
            total,
            processed: 0,
            succeeded: 0,
            failed: 0,
            errors: Vec::new(),
            performance: BulkPerformance {
                request_charge,
                duration,
                docs_per_second: 0.0,
            },
        }
    }
}

struct RunSettings {
    batch_size: usize,
    max_concurrency: usize,
    continue_on_error: bool,
    retry: RetryPolicy,
}

/// Drives multi-document updates and deletes through the request executor.
pub struct BulkExecutor {
    executor: Arc<dyn RequestExecutor>,
    database: String,
    defaults: BulkDefaults,
    retry: RetryPolicy,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl BulkExecutor {
    pub fn new(executor: Arc<dyn RequestExecutor>, config: &ClientConfig) -> Self {
        Self {
            executor,
            database: config.database.clone(),
            defaults: config.bulk,
            retry: config.retry,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn settings(&self, options: &BulkOptions) -> RunSettings {
        RunSettings {
            batch_size: options.batch_size.unwrap_or(self.defaults.batch_size).max(1),
            max_concurrency: options
                .max_concurrency
                .unwrap_or(self.defaults.max_concurrency)
                .max(1),
            continue_on_error: options
                .continue_on_error
                .unwrap_or(self.defaults.continue_on_error),
            retry: options.retry.unwrap_or(self.retry),
        }
    }

    /// Merge a patch into every document matching the filter.
    pub async fn update_many(
        &self,
        target: &ContainerSchema,
        update: UpdateManyOptions,
    ) -> CosmoResult<BulkReport> {
        let UpdateManyOptions {
            filter,
            patch,
            options,
        } = update;
        options.check_scope("updateMany")?;

        let settings = self.settings(&options);
        let started = Instant::now();
        let scan = SelectQuery::new().filter(filter).build();
        let (documents, scan_charge) = self.scan(target, &scan, &options, &settings.retry).await?;
        info!(
            "updateMany on '{}': {} candidate documents",
            target.name,
            documents.len()
        );
        if options.dry_run {
            return Ok(BulkReport::dry_run(
                documents.len(),
                scan_charge,
                started.elapsed(),
            ));
        }

        let executor = &self.executor;
        let database = self.database.as_str();
        let retry = settings.retry;
        let patch = &patch;

        self.run(documents, &settings, started, scan_charge, |document| async move {
            let id = document_id(&document)?;
            let partition_key = target.partition_key_value(&document);
            let updated = patch.apply(document);
            let request = Request::put(paths::document(database, &target.name, &id), updated)
                .partition_key(partition_key);
            let response = retry_with_backoff(|| executor.request(request.clone()), &retry).await?;
            Ok(response.request_charge)
        })
        .await
    }

    /// Delete every document matching the filter. Requires `confirm`.
    pub async fn delete_many(
        &self,
        target: &ContainerSchema,
        delete: DeleteManyOptions,
    ) -> CosmoResult<BulkReport> {
        let DeleteManyOptions {
            filter,
            confirm,
            options,
        } = delete;
        if !confirm {
            return Err(CosmoError::Configuration(
                "deleteMany requires confirm: true".to_string(),
            ));
        }
        options.check_scope("deleteMany")?;

        let settings = self.settings(&options);
        let started = Instant::now();
        // Rows come back keyed by the real field names so the partition key
        // path resolves against them.
        let scan = SelectQuery::new()
            .select(["id", target.partition_key_field()])
            .filter(filter)
            .build();
        let (identities, scan_charge) = self.scan(target, &scan, &options, &settings.retry).await?;
        info!(
            "deleteMany on '{}': {} candidate documents",
            target.name,
            identities.len()
        );
        if options.dry_run {
            return Ok(BulkReport::dry_run(
                identities.len(),
                scan_charge,
                started.elapsed(),
            ));
        }

        let executor = &self.executor;
        let database = self.database.as_str();
        let retry = settings.retry;

        self.run(identities, &settings, started, scan_charge, |identity| async move {
            let id = document_id(&identity)?;
            let request = Request::delete(paths::document(database, &target.name, &id))
                .partition_key(target.partition_key_value(&identity));
            let response = retry_with_backoff(|| executor.request(request.clone()), &retry).await?;
            Ok(response.request_charge)
        })
        .await
    }

    async fn scan(
        &self,
        target: &ContainerSchema,
        spec: &QuerySpec,
        options: &BulkOptions,
        retry: &RetryPolicy,
    ) -> CosmoResult<(Vec<Value>, f64)> {
        let request = Request::query(paths::documents(&self.database, &target.name), spec)
            .partition_key(options.partition_key.clone())
            .cross_partition(options.partition_key.is_none());
        let response = retry_with_backoff(|| self.executor.request(request.clone()), retry)
            .await
            .map_err(|e| e.enrich_full_scan(&target.name))?;
        Ok((response.documents(), response.request_charge))
    }

    async fn run<F, Fut>(
        &self,
        documents: Vec<Value>,
        settings: &RunSettings,
        started: Instant,
        scan_charge: f64,
        operation: F,
    ) -> CosmoResult<BulkReport>
    where
        F: Fn(Value) -> Fut,
        Fut: Future<Output = CosmoResult<f64>>,
    {
        let mut initial = BulkStats::new(documents.len(), started);
        initial.request_charge = scan_charge;
        let stats = Mutex::new(initial);

        let chunks = chunk(&documents, settings.batch_size);
        drop(documents);

        let observer = self.observer.as_deref();
        let operation = &operation;
        let shared = &stats;
        let continue_on_error = settings.continue_on_error;

        let outcome = process_with_concurrency(
            chunks,
            settings.max_concurrency,
            |chunk, index| async move {
                let results = join_all(chunk.into_iter().map(|document| async move {
                    let id = document
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or("<unknown>")
                        .to_string();
                    (id, operation(document).await)
                }))
                .await;

                let mut abort = None;
                let snapshot = {
                    let mut stats = shared.lock();
                    for (id, result) in results {
                        stats.processed += 1;
                        match result {
                            Ok(charge) => {
                                stats.succeeded += 1;
                                stats.request_charge += charge;
                            }
                            Err(err) => {
                                stats.failed += 1;
                                if continue_on_error {
                                    warn!("Document '{}' failed: {}", id, err);
                                    stats.errors.push(BulkError {
                                        id,
                                        message: err.to_string(),
                                        retriable: err.is_retriable(),
                                    });
                                } else if abort.is_none() {
                                    abort = Some(err);
                                }
                            }
                        }
                    }
                    stats.snapshot()
                };

                debug!(
                    "Chunk {} complete: {}/{} processed",
                    index, snapshot.processed, snapshot.total
                );
                notify(observer, &snapshot);

                match abort {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            },
        )
        .await;

        let stats = stats.into_inner();
        match outcome {
            Ok(_) => {
                let report = BulkReport::from_stats(stats);
                info!(
                    "Bulk operation finished: {} succeeded, {} failed, {:.2} RU",
                    report.succeeded, report.failed, report.performance.request_charge
                );
                Ok(report)
            }
            Err(err) => {
                error!(
                    "Bulk operation aborted after {}/{} documents: {}",
                    stats.processed, stats.total, err
                );
                Err(err)
            }
        }
    }
}

fn document_id(document: &Value) -> CosmoResult<String> {
    document
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CosmoError::Protocol(format!("document without an id: {}", document)))
}
