//! Aggregate requests.
//!
//! An [`AggregateRequest`] is a list of tagged [`AggregateOp`]s. Every op knows
//! the output columns it produces, and the column names are the contract
//! between [`builder`] and [`parse`]: the builder aliases each statistic with
//! [`column_alias`] and the parser reads it back by the same name.

pub mod builder;
pub mod parse;

use serde_json::Value;

use crate::error::{SqlError, SqlResult};
use crate::filter::Filter;
use crate::pagination::Pagination;
use crate::param::{alias_ident, field_ref};
use crate::select::SortOrder;

/// Field name inside a count selection that means "count every row".
pub const COUNT_ALL_FIELD: &str = "_all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateKind {
    /// Result key and column prefix, e.g. `_sum`.
    pub fn key(&self) -> &'static str {
        match self {
            AggregateKind::Count => "_count",
            AggregateKind::Sum => "_sum",
            AggregateKind::Avg => "_avg",
            AggregateKind::Min => "_min",
            AggregateKind::Max => "_max",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "_count" => Some(AggregateKind::Count),
            "_sum" => Some(AggregateKind::Sum),
            "_avg" => Some(AggregateKind::Avg),
            "_min" => Some(AggregateKind::Min),
            "_max" => Some(AggregateKind::Max),
            _ => None,
        }
    }

    fn function(&self) -> &'static str {
        match self {
            AggregateKind::Count => "COUNT",
            AggregateKind::Sum => "SUM",
            AggregateKind::Avg => "AVG",
            AggregateKind::Min => "MIN",
            AggregateKind::Max => "MAX",
        }
    }
}

/// Output column name for a statistic.
///
/// `_count` for a whole-row count, `_<op>_<field>` otherwise.
pub fn column_alias(kind: AggregateKind, field: Option<&str>) -> String {
    match field {
        None => kind.key().to_string(),
        Some(COUNT_ALL_FIELD) if kind == AggregateKind::Count => kind.key().to_string(),
        Some(field) => format!("{}_{}", kind.key(), alias_ident(field)),
    }
}

/// What a count op counts.
#[derive(Debug, Clone, PartialEq)]
pub enum CountSelect {
    /// Every matching row: `_count: true`.
    All,
    /// Non-null occurrences of each field: `_count: {email: true}`.
    Fields(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOp {
    Count(CountSelect),
    Sum(Vec<String>),
    Avg(Vec<String>),
    Min(Vec<String>),
    Max(Vec<String>),
}

/// One aliased select-list entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub alias: String,
    pub expr: String,
}

impl AggregateOp {
    pub fn kind(&self) -> AggregateKind {
        match self {
            AggregateOp::Count(_) => AggregateKind::Count,
            AggregateOp::Sum(_) => AggregateKind::Sum,
            AggregateOp::Avg(_) => AggregateKind::Avg,
            AggregateOp::Min(_) => AggregateKind::Min,
            AggregateOp::Max(_) => AggregateKind::Max,
        }
    }

    /// Select-list columns for this op, in request order.
    pub fn columns(&self) -> Vec<Column> {
        match self {
            AggregateOp::Count(CountSelect::All) => vec![Column {
                alias: column_alias(AggregateKind::Count, None),
                expr: "COUNT(1)".to_string(),
            }],
            AggregateOp::Count(CountSelect::Fields(fields)) => fields
                .iter()
                .map(|field| {
                    let expr = if field == COUNT_ALL_FIELD {
                        "COUNT(1)".to_string()
                    } else {
                        let target = field_ref(field);
                        format!(
                            "SUM((IS_DEFINED({t}) AND NOT IS_NULL({t})) ? 1 : 0)",
                            t = target
                        )
                    };
                    Column {
                        alias: column_alias(AggregateKind::Count, Some(field)),
                        expr,
                    }
                })
                .collect(),
            AggregateOp::Sum(fields)
            | AggregateOp::Avg(fields)
            | AggregateOp::Min(fields)
            | AggregateOp::Max(fields) => {
                let kind = self.kind();
                fields
                    .iter()
                    .map(|field| Column {
                        alias: column_alias(kind, Some(field)),
                        expr: format!("{}({})", kind.function(), field_ref(field)),
                    })
                    .collect()
            }
        }
    }

    fn fields_mut(&mut self) -> Option<&mut Vec<String>> {
        match self {
            AggregateOp::Count(CountSelect::All) => None,
            AggregateOp::Count(CountSelect::Fields(fields))
            | AggregateOp::Sum(fields)
            | AggregateOp::Avg(fields)
            | AggregateOp::Min(fields)
            | AggregateOp::Max(fields) => Some(fields),
        }
    }
}

/// The set of statistics requested by one aggregate call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateRequest {
    ops: Vec<AggregateOp>,
}

fn owned<I, S>(fields: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fields.into_iter().map(Into::into).collect()
}

impl AggregateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an op. Field lists of an op kind already present are merged.
    pub fn push(mut self, op: AggregateOp) -> Self {
        let kind = op.kind();
        let position = match self.ops.iter().position(|existing| existing.kind() == kind) {
            Some(position) => position,
            None => {
                self.ops.push(op);
                return self;
            }
        };

        match op {
            // A whole-row count absorbs any field count.
            AggregateOp::Count(CountSelect::All) => {
                self.ops[position] = AggregateOp::Count(CountSelect::All);
            }
            AggregateOp::Count(CountSelect::Fields(more))
            | AggregateOp::Sum(more)
            | AggregateOp::Avg(more)
            | AggregateOp::Min(more)
            | AggregateOp::Max(more) => {
                if let Some(fields) = self.ops[position].fields_mut() {
                    for field in more {
                        if !fields.contains(&field) {
                            fields.push(field);
                        }
                    }
                }
            }
        }
        self
    }

    pub fn count(self) -> Self {
        self.push(AggregateOp::Count(CountSelect::All))
    }

    pub fn count_fields<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(AggregateOp::Count(CountSelect::Fields(owned(fields))))
    }

    pub fn sum<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(AggregateOp::Sum(owned(fields)))
    }

    pub fn avg<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(AggregateOp::Avg(owned(fields)))
    }

    pub fn min<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(AggregateOp::Min(owned(fields)))
    }

    pub fn max<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(AggregateOp::Max(owned(fields)))
    }

    pub fn ops(&self) -> &[AggregateOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// All aggregate columns, in request order.
    pub fn columns(&self) -> Vec<Column> {
        self.ops.iter().flat_map(|op| op.columns()).collect()
    }

    /// Parse `{"_count": true, "_avg": {"age": true}}`.
    ///
    /// Keys other than `_count/_sum/_avg/_min/_max` are ignored so a full
    /// call object (with `where`, `by`, ...) can be passed directly. Field
    /// maps keep only entries set to `true`.
    pub fn from_json(value: &Value) -> SqlResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            SqlError::InvalidFilter(format!("aggregate request must be an object, got {}", value))
        })?;

        let mut request = Self::new();
        for (key, selection) in object {
            let kind = match AggregateKind::from_key(key) {
                Some(kind) => kind,
                None => continue,
            };
            let fields = match selection {
                Value::Bool(true) if kind == AggregateKind::Count => {
                    request = request.count();
                    continue;
                }
                Value::Bool(_) | Value::Null => continue,
                Value::Object(map) => map
                    .iter()
                    .filter(|(_, on)| on.as_bool().unwrap_or(false))
                    .map(|(field, _)| field.clone())
                    .collect::<Vec<_>>(),
                other => {
                    return Err(SqlError::InvalidFilter(format!(
                        "{} expects a field selection object, got {}",
                        key, other
                    )))
                }
            };
            if fields.is_empty() {
                continue;
            }
            let op = match kind {
                AggregateKind::Count => AggregateOp::Count(CountSelect::Fields(fields)),
                AggregateKind::Sum => AggregateOp::Sum(fields),
                AggregateKind::Avg => AggregateOp::Avg(fields),
                AggregateKind::Min => AggregateOp::Min(fields),
                AggregateKind::Max => AggregateOp::Max(fields),
            };
            request = request.push(op);
        }
        Ok(request)
    }
}

/// What a group ordering refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupOrderTarget {
    /// One of the grouping fields.
    Key(String),
    /// An aggregate output column, e.g. `(Count, None)` for `_count`.
    Aggregate(AggregateKind, Option<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupOrder {
    pub target: GroupOrderTarget,
    pub order: SortOrder,
}

/// A `GROUP BY` call: grouping keys, statistics per group, and the usual
/// filter/order/page controls applied to the groups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupByRequest {
    pub by: Vec<String>,
    pub aggregates: AggregateRequest,
    pub filter: Filter,
    pub order_by: Vec<GroupOrder>,
    pub pagination: Pagination,
}

impl GroupByRequest {
    pub fn new<I, S>(by: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            by: owned(by),
            ..Self::default()
        }
    }

    pub fn aggregates(mut self, aggregates: AggregateRequest) -> Self {
        self.aggregates = aggregates;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by_key(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.push(GroupOrder {
            target: GroupOrderTarget::Key(field.into()),
            order,
        });
        self
    }

    pub fn order_by_aggregate(
        mut self,
        kind: AggregateKind,
        field: Option<&str>,
        order: SortOrder,
    ) -> Self {
        self.order_by.push(GroupOrder {
            target: GroupOrderTarget::Aggregate(kind, field.map(str::to_string)),
            order,
        });
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

    /// Parse `{"by": "category", "_count": true, "where": {...}}`.
    /// `by` may be a string or an array of strings.
    pub fn from_json(value: &Value) -> SqlResult<Self> {
        let by = match value.get("by") {
            Some(Value::String(field)) => vec![field.clone()],
            Some(Value::Array(fields)) => fields
                .iter()
                .map(|f| {
                    f.as_str().map(str::to_string).ok_or_else(|| {
                        SqlError::InvalidField(format!("group key must be a string, got {}", f))
                    })
                })
                .collect::<SqlResult<Vec<_>>>()?,
            _ => {
                return Err(SqlError::Configuration(
                    "groupBy requires a `by` field or list of fields".to_string(),
                ))
            }
        };
        let filter = match value.get("where") {
            Some(filter) => Filter::from_json(filter)?,
            None => Filter::new(),
        };
        let pagination = Pagination::new(
            value.get("take").and_then(Value::as_u64),
            value.get("skip").and_then(Value::as_u64),
        );
        Ok(Self {
            by,
            aggregates: AggregateRequest::from_json(value)?,
            filter,
            order_by: Vec::new(),
            pagination,
        })
    }
}
