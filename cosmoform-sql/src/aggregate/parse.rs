//! Aggregate result parser.
//!
//! Reads convention-named columns back into a value that mirrors the request.
//! It never looks at statement text; the only link to the builder is
//! [`column_alias`].

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::aggregate::{
    column_alias, AggregateKind, AggregateOp, AggregateRequest, CountSelect, GroupByRequest,
    COUNT_ALL_FIELD,
};
use crate::param::key_alias;

/// Parsed count statistic. Field counts keep request order.
#[derive(Debug, Clone, PartialEq)]
pub enum CountValue {
    All(u64),
    Fields(Vec<(String, u64)>),
}

fn lookup<'a, V>(fields: &'a [(String, V)], field: &str) -> Option<&'a V> {
    fields.iter().find(|(name, _)| name == field).map(|(_, v)| v)
}

/// One parsed statistic, tagged like the op that produced it.
///
/// Sum/avg/min/max keep the raw JSON value so integer sums stay integers and
/// min/max work on strings and dates. Missing columns become `Value::Null`.
/// Fields are listed in the order they were requested.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateValue {
    Count(CountValue),
    Sum(Vec<(String, Value)>),
    Avg(Vec<(String, Value)>),
    Min(Vec<(String, Value)>),
    Max(Vec<(String, Value)>),
}

impl AggregateValue {
    pub fn kind(&self) -> AggregateKind {
        match self {
            AggregateValue::Count(_) => AggregateKind::Count,
            AggregateValue::Sum(_) => AggregateKind::Sum,
            AggregateValue::Avg(_) => AggregateKind::Avg,
            AggregateValue::Min(_) => AggregateKind::Min,
            AggregateValue::Max(_) => AggregateKind::Max,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            AggregateValue::Count(CountValue::All(n)) => Value::from(*n),
            AggregateValue::Count(CountValue::Fields(fields)) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(*v)))
                    .collect(),
            ),
            AggregateValue::Sum(fields)
            | AggregateValue::Avg(fields)
            | AggregateValue::Min(fields)
            | AggregateValue::Max(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        }
    }
}

/// Result of one aggregate call, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateResult {
    values: Vec<AggregateValue>,
}

impl AggregateResult {
    pub fn values(&self) -> &[AggregateValue] {
        &self.values
    }

    fn get(&self, kind: AggregateKind) -> Option<&AggregateValue> {
        self.values.iter().find(|v| v.kind() == kind)
    }

    fn field(&self, kind: AggregateKind, field: &str) -> Option<&Value> {
        match self.get(kind)? {
            AggregateValue::Sum(map)
            | AggregateValue::Avg(map)
            | AggregateValue::Min(map)
            | AggregateValue::Max(map) => lookup(map, field),
            AggregateValue::Count(_) => None,
        }
    }

    /// Whole-row count, when requested.
    pub fn count(&self) -> Option<u64> {
        match self.get(AggregateKind::Count)? {
            AggregateValue::Count(CountValue::All(n)) => Some(*n),
            AggregateValue::Count(CountValue::Fields(fields)) => {
                lookup(fields, COUNT_ALL_FIELD).copied()
            }
            _ => None,
        }
    }

    /// Non-null count of one field, when requested.
    pub fn count_of(&self, field: &str) -> Option<u64> {
        match self.get(AggregateKind::Count)? {
            AggregateValue::Count(CountValue::Fields(fields)) => lookup(fields, field).copied(),
            _ => None,
        }
    }

    pub fn sum(&self, field: &str) -> Option<f64> {
        self.field(AggregateKind::Sum, field).and_then(Value::as_f64)
    }

    pub fn avg(&self, field: &str) -> Option<f64> {
        self.field(AggregateKind::Avg, field).and_then(Value::as_f64)
    }

    pub fn min(&self, field: &str) -> Option<&Value> {
        self.field(AggregateKind::Min, field).filter(|v| !v.is_null())
    }

    pub fn max(&self, field: &str) -> Option<&Value> {
        self.field(AggregateKind::Max, field).filter(|v| !v.is_null())
    }

    fn write_into(&self, object: &mut Map<String, Value>) {
        for value in &self.values {
            object.insert(value.kind().key().to_string(), value.to_value());
        }
    }

    /// JSON mirroring the request, e.g. `{"_count": 5, "_avg": {"age": 33.4}}`.
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        self.write_into(&mut object);
        Value::Object(object)
    }
}

impl Serialize for AggregateResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// One group: its key values in `by` order plus its statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub keys: Vec<(String, Value)>,
    pub aggregates: AggregateResult,
}

impl GroupRow {
    pub fn key(&self, field: &str) -> Option<&Value> {
        self.keys.iter().find(|(k, _)| k == field).map(|(_, v)| v)
    }

    /// Flat JSON, e.g. `{"category": "a", "_count": 3}`.
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        for (field, value) in &self.keys {
            object.insert(field.clone(), value.clone());
        }
        self.aggregates.write_into(&mut object);
        Value::Object(object)
    }
}

impl Serialize for GroupRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

fn read_count(row: &Value, alias: &str) -> u64 {
    match row.get(alias) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        _ => 0,
    }
}

fn read_fields(row: &Value, kind: AggregateKind, fields: &[String]) -> Vec<(String, Value)> {
    fields
        .iter()
        .map(|field| {
            let value = row
                .get(column_alias(kind, Some(field)))
                .cloned()
                .unwrap_or(Value::Null);
            (field.clone(), value)
        })
        .collect()
}

/// Rebuild the aggregate result for one raw row.
pub fn parse_aggregate(row: &Value, request: &AggregateRequest) -> AggregateResult {
    let values = request
        .ops()
        .iter()
        .map(|op| match op {
            AggregateOp::Count(CountSelect::All) => AggregateValue::Count(CountValue::All(
                read_count(row, &column_alias(AggregateKind::Count, None)),
            )),
            AggregateOp::Count(CountSelect::Fields(fields)) => {
                AggregateValue::Count(CountValue::Fields(
                    fields
                        .iter()
                        .map(|f| {
                            let alias = column_alias(AggregateKind::Count, Some(f));
                            (f.clone(), read_count(row, &alias))
                        })
                        .collect(),
                ))
            }
            AggregateOp::Sum(fields) => {
                AggregateValue::Sum(read_fields(row, AggregateKind::Sum, fields))
            }
            AggregateOp::Avg(fields) => {
                AggregateValue::Avg(read_fields(row, AggregateKind::Avg, fields))
            }
            AggregateOp::Min(fields) => {
                AggregateValue::Min(read_fields(row, AggregateKind::Min, fields))
            }
            AggregateOp::Max(fields) => {
                AggregateValue::Max(read_fields(row, AggregateKind::Max, fields))
            }
        })
        .collect();

    AggregateResult { values }
}

/// Rebuild grouped results, one [`GroupRow`] per raw row.
pub fn parse_groups(rows: &[Value], request: &GroupByRequest) -> Vec<GroupRow> {
    rows.iter()
        .map(|row| GroupRow {
            keys: request
                .by
                .iter()
                .map(|field| {
                    let value = row
                        .get(key_alias(field))
                        .cloned()
                        .unwrap_or(Value::Null);
                    (field.clone(), value)
                })
                .collect(),
            aggregates: parse_aggregate(row, &request.aggregates),
        })
        .collect()
}

/// Unwrap the scalar produced by a `SELECT VALUE COUNT(1)` statement.
pub fn parse_count(rows: &[Value]) -> u64 {
    rows.first()
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
        .unwrap_or(0)
}
