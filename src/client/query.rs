//! Counts, aggregates, grouping and the find-with-aggregation orchestrator.

use cosmoform_sql::{
    aggregate_query, count_query, group_by_query, parse_aggregate, parse_count, parse_groups,
    AggregateRequest, AggregateResult, Filter, GroupByRequest, GroupRow,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::container::{Container, FindManyArgs, Scope};
use crate::bulk::{BulkReport, DeleteManyOptions, UpdateManyOptions};
use crate::error::CosmoResult;

/// A page of rows plus aggregates over the whole filtered set.
#[derive(Debug, Clone, PartialEq)]
pub struct FindWithAggregate<T> {
    pub data: Vec<T>,
    pub aggregates: AggregateResult,
}

impl<T> Container<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub async fn count(&self, filter: &Filter, scope: &Scope) -> CosmoResult<u64> {
        scope.check(filter, "count")?;
        let rows = self.query_rows(&count_query(filter), scope).await?;
        Ok(parse_count(&rows))
    }

    pub async fn aggregate(
        &self,
        filter: &Filter,
        request: &AggregateRequest,
        scope: &Scope,
    ) -> CosmoResult<AggregateResult> {
        let spec = aggregate_query(filter, request)?;
        scope.check(filter, "aggregate")?;
        let rows = self.query_rows(&spec, scope).await?;
        let row = rows.into_iter().next().unwrap_or(Value::Null);
        Ok(parse_aggregate(&row, request))
    }

    pub async fn group_by(&self, request: &GroupByRequest, scope: &Scope) -> CosmoResult<Vec<GroupRow>> {
        let spec = group_by_query(request)?;
        scope.check(&request.filter, "groupBy")?;
        let rows = self.query_rows(&spec, scope).await?;
        Ok(parse_groups(&rows, request))
    }

    /// Rows and aggregates issued concurrently. The aggregate query shares the
    /// filter only: take, skip, order and projection never affect totals.
    pub async fn find_many_with_aggregate(
        &self,
        args: FindManyArgs,
        request: &AggregateRequest,
    ) -> CosmoResult<FindWithAggregate<T>> {
        let aggregate_spec = aggregate_query(&args.filter, request)?;
        args.scope.check(&args.filter, "findMany")?;
        let scope = args.scope.clone();

        let (data, rows) = tokio::try_join!(
            self.find_many(args),
            self.query_rows(&aggregate_spec, &scope)
        )?;
        let row = rows.into_iter().next().unwrap_or(Value::Null);

        Ok(FindWithAggregate {
            data,
            aggregates: parse_aggregate(&row, request),
        })
    }

    pub async fn update_many(&self, options: UpdateManyOptions) -> CosmoResult<BulkReport> {
        self.bulk.update_many(&self.schema, options).await
    }

    pub async fn delete_many(&self, options: DeleteManyOptions) -> CosmoResult<BulkReport> {
        self.bulk.delete_many(&self.schema, options).await
    }
}
