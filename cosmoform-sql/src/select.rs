//! Row query builder.

use serde::{Deserialize, Serialize};

use crate::filter::{where_clause, Filter};
use crate::pagination::Pagination;
use crate::param::{field_ref, string_literal, ParamSink, QuerySpec, ROOT_ALIAS};

/// Sort direction. Anything not explicitly descending sorts ascending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Builds a `SELECT` over the root collection.
///
/// ```rust
/// use cosmoform_sql::{Filter, FieldOps, SelectQuery, SortOrder};
///
/// let spec = SelectQuery::new()
///     .filter(Filter::new().eq("status", "active").where_field("age", FieldOps::new().gte(18)))
///     .order_by("age", SortOrder::Desc)
///     .take(10)
///     .build();
///
/// assert_eq!(
///     spec.query,
///     r#"SELECT TOP 10 * FROM c WHERE c["status"] = @param0 AND c["age"] >= @param1 ORDER BY c["age"] DESC"#
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    fields: Vec<String>,
    filter: Filter,
    order_by: Vec<(String, SortOrder)>,
    pagination: Pagination,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project only these fields. Rows come back as objects keyed by the
    /// field names exactly as given; repeats are dropped.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.clear();
        for field in fields {
            let field = field.into();
            if !self.fields.contains(&field) {
                self.fields.push(field);
            }
        }
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
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

    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn build(self) -> QuerySpec {
        let mut sink = ParamSink::new();
        let mut sql = String::from("SELECT ");

        if let Some(top) = self.pagination.render_top() {
            sql.push_str(&top);
            sql.push(' ');
        }

        if self.fields.is_empty() {
            sql.push('*');
        } else {
            let projection: Vec<String> = self
                .fields
                .iter()
                .map(|f| format!("{}: {}", string_literal(f), field_ref(f)))
                .collect();
            sql.push_str("VALUE {");
            sql.push_str(&projection.join(", "));
            sql.push('}');
        }

        sql.push_str(" FROM ");
        sql.push_str(ROOT_ALIAS);

        let fragments = self.filter.translate(&mut sink);
        if let Some(clause) = where_clause(&fragments) {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        if !self.order_by.is_empty() {
            let items: Vec<String> = self
                .order_by
                .iter()
                .map(|(field, order)| format!("{} {}", field_ref(field), order.as_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&items.join(", "));
        }

        if let Some(offset) = self.pagination.render_offset() {
            sql.push(' ');
            sql.push_str(&offset);
        }

        QuerySpec {
            query: sql,
            parameters: sink.into_parameters(),
        }
    }
}
