//! Aggregate statement builder.

use std::collections::HashSet;

use crate::aggregate::{column_alias, AggregateRequest, GroupByRequest, GroupOrderTarget};
use crate::error::{SqlError, SqlResult};
use crate::filter::{where_clause, Filter};
use crate::param::{field_ref, key_alias, ParamSink, QuerySpec, ROOT_ALIAS};

/// Each output column must have its own name or the parser can't tell them apart.
fn ensure_distinct<'a>(aliases: impl IntoIterator<Item = &'a str>) -> SqlResult<()> {
    let mut seen = HashSet::new();
    for alias in aliases {
        if !seen.insert(alias) {
            return Err(SqlError::InvalidField(format!(
                "more than one field maps to output column {}",
                alias
            )));
        }
    }
    Ok(())
}

fn push_where(sql: &mut String, filter: &Filter, sink: &mut ParamSink) {
    let fragments = filter.translate(sink);
    if let Some(clause) = where_clause(&fragments) {
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }
}

/// `SELECT VALUE COUNT(1) FROM c [WHERE ...]`. The result is a single scalar.
pub fn count_query(filter: &Filter) -> QuerySpec {
    let mut sink = ParamSink::new();
    let mut sql = format!("SELECT VALUE COUNT(1) FROM {}", ROOT_ALIAS);
    push_where(&mut sql, filter, &mut sink);
    QuerySpec {
        query: sql,
        parameters: sink.into_parameters(),
    }
}

/// One row with one aliased column per requested statistic.
pub fn aggregate_query(filter: &Filter, request: &AggregateRequest) -> SqlResult<QuerySpec> {
    if request.is_empty() {
        return Err(SqlError::Configuration(
            "aggregate requires at least one of _count, _sum, _avg, _min or _max".to_string(),
        ));
    }

    let columns = request.columns();
    ensure_distinct(columns.iter().map(|col| col.alias.as_str()))?;
    let select_list: Vec<String> = columns
        .iter()
        .map(|col| format!("{} AS {}", col.expr, col.alias))
        .collect();

    let mut sink = ParamSink::new();
    let mut sql = format!("SELECT {} FROM {}", select_list.join(", "), ROOT_ALIAS);
    push_where(&mut sql, filter, &mut sink);

    Ok(QuerySpec {
        query: sql,
        parameters: sink.into_parameters(),
    })
}

/// One row per distinct key combination: key columns first, then the
/// aggregate columns, grouped, ordered and paginated.
pub fn group_by_query(request: &GroupByRequest) -> SqlResult<QuerySpec> {
    if request.by.is_empty() {
        return Err(SqlError::Configuration(
            "groupBy requires at least one grouping field".to_string(),
        ));
    }
    if let Some(field) = request.by.iter().find(|f| f.is_empty()) {
        return Err(SqlError::InvalidField(field.clone()));
    }

    let key_aliases: Vec<String> = request.by.iter().map(|field| key_alias(field)).collect();
    let columns = request.aggregates.columns();
    ensure_distinct(
        key_aliases
            .iter()
            .map(String::as_str)
            .chain(columns.iter().map(|col| col.alias.as_str())),
    )?;

    let mut select_list: Vec<String> = request
        .by
        .iter()
        .zip(&key_aliases)
        .map(|(field, alias)| format!("{} AS {}", field_ref(field), alias))
        .collect();
    select_list.extend(
        columns
            .iter()
            .map(|col| format!("{} AS {}", col.expr, col.alias)),
    );

    let mut sink = ParamSink::new();
    let mut sql = String::from("SELECT ");
    if let Some(top) = request.pagination.render_top() {
        sql.push_str(&top);
        sql.push(' ');
    }
    sql.push_str(&select_list.join(", "));
    sql.push_str(" FROM ");
    sql.push_str(ROOT_ALIAS);

    push_where(&mut sql, &request.filter, &mut sink);

    let keys: Vec<String> = request.by.iter().map(|f| field_ref(f)).collect();
    sql.push_str(" GROUP BY ");
    sql.push_str(&keys.join(", "));

    if !request.order_by.is_empty() {
        let items: Vec<String> = request
            .order_by
            .iter()
            .map(|item| {
                let target = match &item.target {
                    GroupOrderTarget::Key(field) => field_ref(field),
                    GroupOrderTarget::Aggregate(kind, field) => {
                        column_alias(*kind, field.as_deref())
                    }
                };
                format!("{} {}", target, item.order.as_sql())
            })
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&items.join(", "));
    }

    if let Some(offset) = request.pagination.render_offset() {
        sql.push(' ');
        sql.push_str(&offset);
    }

    Ok(QuerySpec {
        query: sql,
        parameters: sink.into_parameters(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateKind;
    use crate::filter::FieldOps;
    use crate::select::SortOrder;
    use serde_json::json;

    #[test]
    fn test_count_query() {
        let spec = count_query(&Filter::new().eq("status", "active"));
        assert_eq!(
            spec.query,
            r#"SELECT VALUE COUNT(1) FROM c WHERE c["status"] = @param0"#
        );
        assert_eq!(spec.values(), vec![&json!("active")]);
    }

    #[test]
    fn test_count_query_without_filter() {
        assert_eq!(count_query(&Filter::new()).query, "SELECT VALUE COUNT(1) FROM c");
    }

    #[test]
    fn test_multi_aggregate() {
        let request = AggregateRequest::new()
            .count()
            .sum(["total"])
            .avg(["age"])
            .min(["price"])
            .max(["price"]);
        let spec = aggregate_query(&Filter::new(), &request).unwrap();
        assert_eq!(
            spec.query,
            concat!(
                r#"SELECT COUNT(1) AS _count, SUM(c["total"]) AS _sum_total, "#,
                r#"AVG(c["age"]) AS _avg_age, MIN(c["price"]) AS _min_price, "#,
                r#"MAX(c["price"]) AS _max_price FROM c"#
            )
        );
    }

    #[test]
    fn test_aggregate_requires_an_op() {
        let err = aggregate_query(&Filter::new(), &AggregateRequest::new()).unwrap_err();
        assert!(matches!(err, SqlError::Configuration(_)));
    }

    #[test]
    fn test_aggregate_with_filter_binds_params() {
        let filter = Filter::new().where_field("age", FieldOps::new().gt(21).lt(65));
        let spec = aggregate_query(&filter, &AggregateRequest::new().count()).unwrap();
        assert!(spec
            .query
            .ends_with(r#"WHERE c["age"] > @param0 AND c["age"] < @param1"#));
        assert_eq!(spec.parameters.len(), 2);
    }

    #[test]
    fn test_group_by() {
        let request = GroupByRequest::new(["category"])
            .aggregates(AggregateRequest::new().count().sum(["amount"]))
            .filter(Filter::new().eq("active", true))
            .order_by_aggregate(AggregateKind::Count, None, SortOrder::Desc)
            .skip(2)
            .take(5);
        let spec = group_by_query(&request).unwrap();
        assert_eq!(
            spec.query,
            concat!(
                r#"SELECT c["category"] AS category, COUNT(1) AS _count, SUM(c["amount"]) AS _sum_amount "#,
                r#"FROM c WHERE c["active"] = @param0 GROUP BY c["category"] "#,
                r#"ORDER BY _count DESC OFFSET 2 LIMIT 5"#
            )
        );
    }

    #[test]
    fn test_group_by_multiple_keys_with_top() {
        let request = GroupByRequest::new(["country", "city"])
            .aggregates(AggregateRequest::new().count())
            .order_by_key("country", SortOrder::Asc)
            .take(3);
        let spec = group_by_query(&request).unwrap();
        assert!(spec.query.starts_with(
            r#"SELECT TOP 3 c["country"] AS country, c["city"] AS city, COUNT(1) AS _count"#
        ));
        assert!(spec.query.contains(r#"GROUP BY c["country"], c["city"]"#));
        assert!(spec.query.ends_with(r#"ORDER BY c["country"] ASC"#));
    }

    #[test]
    fn test_group_by_without_keys_fails() {
        let request = GroupByRequest::new(Vec::<String>::new());
        assert!(matches!(
            group_by_query(&request),
            Err(SqlError::Configuration(_))
        ));
    }

    #[test]
    fn test_group_by_without_aggregates_lists_distinct_keys() {
        let spec = group_by_query(&GroupByRequest::new(["tag"])).unwrap();
        assert_eq!(
            spec.query,
            r#"SELECT c["tag"] AS tag FROM c GROUP BY c["tag"]"#
        );
    }

    #[test]
    fn test_colliding_aggregate_columns_are_rejected() {
        let request = AggregateRequest::new().sum(["a-b", "a_b"]);
        assert!(matches!(
            aggregate_query(&Filter::new(), &request),
            Err(SqlError::InvalidField(_))
        ));

        let request = AggregateRequest::new().count_fields(["x.y", "x y"]);
        assert!(matches!(
            aggregate_query(&Filter::new(), &request),
            Err(SqlError::InvalidField(_))
        ));
    }

    #[test]
    fn test_group_key_colliding_with_aggregate_column_is_rejected() {
        let request =
            GroupByRequest::new(["_count"]).aggregates(AggregateRequest::new().count());
        assert!(matches!(
            group_by_query(&request),
            Err(SqlError::InvalidField(_))
        ));
    }

    #[test]
    fn test_group_by_reserved_and_symbolic_keys() {
        let request = GroupByRequest::new(["value", "first-name"])
            .aggregates(AggregateRequest::new().count())
            .order_by_key("value", SortOrder::Asc);
        let spec = group_by_query(&request).unwrap();
        assert_eq!(
            spec.query,
            concat!(
                r#"SELECT c["value"] AS _key_value, c["first-name"] AS _key_first_name, "#,
                r#"COUNT(1) AS _count FROM c GROUP BY c["value"], c["first-name"] "#,
                r#"ORDER BY c["value"] ASC"#
            )
        );
    }
}
