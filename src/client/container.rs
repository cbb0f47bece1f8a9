use std::marker::PhantomData;
use std::sync::Arc;

use cosmoform_sql::{
    where_clause, Filter, Pagination, ParamSink, QuerySpec, SelectQuery, SortOrder,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::transport::{paths, Request, RequestExecutor};
use crate::bulk::{BulkExecutor, Patch};
use crate::error::{CosmoError, CosmoResult};
use crate::schema::ContainerSchema;

/// Which partitions a query may touch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub partition_key: Option<Value>,
    pub enable_cross_partition: bool,
}

impl Scope {
    pub fn partition(partition_key: impl Into<Value>) -> Self {
        Self {
            partition_key: Some(partition_key.into()),
            enable_cross_partition: false,
        }
    }

    pub fn cross_partition() -> Self {
        Self {
            partition_key: None,
            enable_cross_partition: true,
        }
    }

    /// An unfiltered query must name a partition or opt into fan-out.
    pub(crate) fn check(&self, filter: &Filter, operation: &str) -> CosmoResult<()> {
        let mut sink = ParamSink::new();
        let has_where = where_clause(&filter.translate(&mut sink)).is_some();
        if !has_where && self.partition_key.is_none() && !self.enable_cross_partition {
            return Err(CosmoError::Configuration(format!(
                "{} without a filter requires a partition key or enable_cross_partition",
                operation
            )));
        }
        Ok(())
    }

    pub(crate) fn apply(&self, request: Request) -> Request {
        request
            .partition_key(self.partition_key.clone())
            .cross_partition(self.enable_cross_partition)
    }
}

/// Arguments of [`Container::find_many`].
#[derive(Debug, Clone, Default)]
pub struct FindManyArgs {
    pub filter: Filter,
    pub select: Vec<String>,
    pub order_by: Vec<(String, SortOrder)>,
    pub pagination: Pagination,
    pub scope: Scope,
}

impl FindManyArgs {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.push((field.into(), order));
        self
    }

    pub fn take(mut self, take: u64) -> Self {
        self.pagination.take = Some(take);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.pagination.skip = Some(skip);
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub(crate) fn to_query(&self) -> QuerySpec {
        let mut query = SelectQuery::new()
            .select(self.select.iter().cloned())
            .filter(self.filter.clone())
            .pagination(self.pagination);
        for (field, order) in &self.order_by {
            query = query.order_by(field.clone(), *order);
        }
        query.build()
    }
}

/// Typed access to one container.
pub struct Container<T> {
    pub(super) executor: Arc<dyn RequestExecutor>,
    pub(super) database: String,
    pub(super) schema: ContainerSchema,
    pub(super) bulk: Arc<BulkExecutor>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Container<T> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            database: self.database.clone(),
            schema: self.schema.clone(),
            bulk: self.bulk.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Container<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub(crate) fn new(
        executor: Arc<dyn RequestExecutor>,
        database: &str,
        schema: ContainerSchema,
        bulk: Arc<BulkExecutor>,
    ) -> Self {
        Self {
            executor,
            database: database.to_string(),
            schema,
            bulk,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &ContainerSchema {
        &self.schema
    }

    /// Insert a new document. A missing `id` is generated.
    pub async fn create(&self, document: T) -> CosmoResult<T> {
        let (body, partition_key) = self.prepare(document)?;
        let request = Request::post(self.documents_path(), body).partition_key(Some(partition_key));
        let response = self.executor.request(request).await?;
        debug!("Created document in '{}'", self.schema.name);
        Ok(serde_json::from_value(response.body)?)
    }

    /// Insert or replace by id.
    pub async fn upsert(&self, document: T) -> CosmoResult<T> {
        let (body, partition_key) = self.prepare(document)?;
        let request = Request::post(self.documents_path(), body)
            .partition_key(Some(partition_key))
            .upsert(true);
        let response = self.executor.request(request).await?;
        Ok(serde_json::from_value(response.body)?)
    }

    /// Point read. A missing document is `Ok(None)`.
    pub async fn find_unique(
        &self,
        id: &str,
        partition_key: impl Into<Value>,
    ) -> CosmoResult<Option<T>> {
        let request = Request::get(self.document_path(id)).partition_key(Some(partition_key.into()));
        match self.executor.request(request).await {
            Ok(response) => Ok(Some(serde_json::from_value(response.body)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Read, merge `patch` over the top-level fields, replace.
    pub async fn update(
        &self,
        id: &str,
        partition_key: impl Into<Value>,
        patch: &Patch,
    ) -> CosmoResult<T> {
        let partition_key = partition_key.into();
        let read = Request::get(self.document_path(id)).partition_key(Some(partition_key.clone()));
        let current = match self.executor.request(read).await {
            Ok(response) => response.body,
            Err(e) if e.is_not_found() => {
                return Err(CosmoError::NotFound(format!(
                    "document '{}' in '{}'",
                    id, self.schema.name
                )))
            }
            Err(e) => return Err(e),
        };

        let updated = patch.apply(current);
        self.schema.validate(&updated)?;
        let request = Request::put(self.document_path(id), updated).partition_key(Some(partition_key));
        let response = self.executor.request(request).await?;
        Ok(serde_json::from_value(response.body)?)
    }

    pub async fn delete(&self, id: &str, partition_key: impl Into<Value>) -> CosmoResult<()> {
        let request = Request::delete(self.document_path(id)).partition_key(Some(partition_key.into()));
        self.executor.request(request).await?;
        Ok(())
    }

    /// Rows matching the filter, projected, ordered and paginated.
    pub async fn find_many(&self, args: FindManyArgs) -> CosmoResult<Vec<T>> {
        args.scope.check(&args.filter, "findMany")?;
        let rows = self.query_rows(&args.to_query(), &args.scope).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(CosmoError::from))
            .collect()
    }

    pub(super) async fn query_rows(&self, spec: &QuerySpec, scope: &Scope) -> CosmoResult<Vec<Value>> {
        debug!("Query on '{}': {}", self.schema.name, spec.query);
        let request = scope.apply(Request::query(self.documents_path(), spec));
        let response = self
            .executor
            .request(request)
            .await
            .map_err(|e| e.enrich_full_scan(&self.schema.name))?;
        Ok(response.documents())
    }

    fn prepare(&self, document: T) -> CosmoResult<(Value, Value)> {
        let mut body = serde_json::to_value(document)?;
        let object = body.as_object_mut().ok_or_else(|| {
            CosmoError::Validation(format!(
                "{}: document must be a JSON object",
                self.schema.name
            ))
        })?;
        if !object.get("id").map(Value::is_string).unwrap_or(false) {
            object.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        self.schema.apply_defaults(&mut body);
        self.schema.validate(&body)?;
        let partition_key = self.schema.partition_key_value(&body).ok_or_else(|| {
            CosmoError::Validation(format!(
                "{}: partition key {} is missing",
                self.schema.name, self.schema.partition_key
            ))
        })?;
        Ok((body, partition_key))
    }

    fn documents_path(&self) -> String {
        paths::documents(&self.database, &self.schema.name)
    }

    fn document_path(&self, id: &str) -> String {
        paths::document(&self.database, &self.schema.name, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scope_allows_filtered_queries() {
        let filter = Filter::new().eq("status", "active");
        assert!(Scope::default().check(&filter, "findMany").is_ok());
    }

    #[test]
    fn test_scope_rejects_unbounded_scan() {
        let err = Scope::default().check(&Filter::new(), "findMany").unwrap_err();
        assert!(matches!(err, CosmoError::Configuration(_)));

        // A filter made only of nulls emits no WHERE.
        let nulls = Filter::new().eq("status", Value::Null);
        assert!(Scope::default().check(&nulls, "findMany").is_err());
        assert!(Scope::partition("t1").check(&nulls, "findMany").is_ok());
        assert!(Scope::cross_partition().check(&nulls, "findMany").is_ok());
    }

    #[test]
    fn test_find_many_args_render() {
        let args = FindManyArgs::new(Filter::new().eq("status", "active"))
            .select(["id", "name"])
            .order_by("name", SortOrder::Asc)
            .take(5)
            .skip(10);
        let spec = args.to_query();
        assert_eq!(
            spec.query,
            "SELECT VALUE {\"id\": c[\"id\"], \"name\": c[\"name\"]} FROM c WHERE c[\"status\"] = @param0 ORDER BY c[\"name\"] ASC OFFSET 10 LIMIT 5"
        );
        assert_eq!(spec.values(), vec![&json!("active")]);
    }
}
