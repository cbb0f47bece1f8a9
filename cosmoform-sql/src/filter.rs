//! Filter translation.
//!
//! A [`Filter`] maps field names to either a literal (equality) or a set of
//! operators. Translation produces one clause fragment per literal and one per
//! operator, each bound to a fresh positional parameter. Fragments are only
//! ever AND-joined.

use serde_json::{Map, Value};

use crate::error::{SqlError, SqlResult};
use crate::param::{field_ref, ParamSink};

/// Comparison operators understood inside an operator object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
}

impl Operator {
    /// Look up an operator object key. Unrecognised keys yield `None` and are
    /// dropped by the caller without error.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "equals" => Some(Operator::Equals),
            "gt" => Some(Operator::Gt),
            "gte" => Some(Operator::Gte),
            "lt" => Some(Operator::Lt),
            "lte" => Some(Operator::Lte),
            "contains" => Some(Operator::Contains),
            "startsWith" => Some(Operator::StartsWith),
            "endsWith" => Some(Operator::EndsWith),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Contains => "contains",
            Operator::StartsWith => "startsWith",
            Operator::EndsWith => "endsWith",
        }
    }

    fn render(&self, field: &str, placeholder: &str) -> String {
        match self {
            Operator::Equals => format!("{} = {}", field, placeholder),
            Operator::Gt => format!("{} > {}", field, placeholder),
            Operator::Gte => format!("{} >= {}", field, placeholder),
            Operator::Lt => format!("{} < {}", field, placeholder),
            Operator::Lte => format!("{} <= {}", field, placeholder),
            Operator::Contains => format!("CONTAINS({}, {})", field, placeholder),
            Operator::StartsWith => format!("STARTSWITH({}, {})", field, placeholder),
            Operator::EndsWith => format!("ENDSWITH({}, {})", field, placeholder),
        }
    }
}

/// Ordered operator set for a single field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldOps {
    ops: Vec<(Operator, Value)>,
}

impl FieldOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, op: Operator, value: impl Into<Value>) -> Self {
        self.ops.push((op, value.into()));
        self
    }

    pub fn equals(self, value: impl Into<Value>) -> Self {
        self.op(Operator::Equals, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Self {
        self.op(Operator::Gt, value)
    }

    pub fn gte(self, value: impl Into<Value>) -> Self {
        self.op(Operator::Gte, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Self {
        self.op(Operator::Lt, value)
    }

    pub fn lte(self, value: impl Into<Value>) -> Self {
        self.op(Operator::Lte, value)
    }

    pub fn contains(self, value: impl Into<Value>) -> Self {
        self.op(Operator::Contains, value)
    }

    pub fn starts_with(self, value: impl Into<Value>) -> Self {
        self.op(Operator::StartsWith, value)
    }

    pub fn ends_with(self, value: impl Into<Value>) -> Self {
        self.op(Operator::EndsWith, value)
    }

    /// Build from an operator object such as `{"gte": 18, "lt": 65}`.
    /// Keys that are not operators are ignored.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let ops = object
            .iter()
            .filter_map(|(key, value)| Operator::from_key(key).map(|op| (op, value.clone())))
            .collect();
        Self { ops }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Operator, Value)> {
        self.ops.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// What a filter entry asks of its field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Equality against a literal value.
    Literal(Value),
    /// One or more operator comparisons.
    Ops(FieldOps),
    /// The entry is present but null; it contributes nothing.
    Skip,
}

/// Ordered field → condition mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    entries: Vec<(String, Condition)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Equality on `field`. A null value is recorded as [`Condition::Skip`],
    /// meaning "do not filter on this field", not "match null".
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let condition = if value.is_null() {
            Condition::Skip
        } else {
            Condition::Literal(value)
        };
        self.entries.push((field.into(), condition));
        self
    }

    pub fn where_field(mut self, field: impl Into<String>, ops: FieldOps) -> Self {
        self.entries.push((field.into(), Condition::Ops(ops)));
        self
    }

    /// Parse a filter object, e.g. `{"status": "active", "age": {"gte": 18}}`.
    ///
    /// Object values are operator objects, everything else is an equality
    /// literal. `null` input means no filter.
    pub fn from_json(value: &Value) -> SqlResult<Self> {
        let object = match value {
            Value::Null => return Ok(Self::new()),
            Value::Object(object) => object,
            other => {
                return Err(SqlError::InvalidFilter(format!(
                    "expected an object, got {}",
                    other
                )))
            }
        };

        let entries = object
            .iter()
            .map(|(field, value)| {
                let condition = match value {
                    Value::Null => Condition::Skip,
                    Value::Object(ops) => Condition::Ops(FieldOps::from_object(ops)),
                    literal => Condition::Literal(literal.clone()),
                };
                (field.clone(), condition)
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(String, Condition)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when translation would emit at least one fragment.
    pub fn has_predicates(&self) -> bool {
        self.entries.iter().any(|(_, condition)| match condition {
            Condition::Literal(_) => true,
            Condition::Ops(ops) => ops.iter().any(|(_, v)| !v.is_null()),
            Condition::Skip => false,
        })
    }

    /// Translate into clause fragments, binding values into `sink`.
    pub fn translate(&self, sink: &mut ParamSink) -> Vec<String> {
        let mut fragments = Vec::new();

        for (field, condition) in &self.entries {
            let target = field_ref(field);
            match condition {
                Condition::Skip => {}
                Condition::Literal(value) => {
                    let placeholder = sink.bind(value.clone());
                    fragments.push(Operator::Equals.render(&target, &placeholder));
                }
                Condition::Ops(ops) => {
                    for (op, value) in ops.iter() {
                        if value.is_null() {
                            continue;
                        }
                        let placeholder = sink.bind(value.clone());
                        fragments.push(op.render(&target, &placeholder));
                    }
                }
            }
        }

        fragments
    }
}

/// AND-join fragments into a `WHERE` clause body.
pub fn where_clause(fragments: &[String]) -> Option<String> {
    if fragments.is_empty() {
        None
    } else {
        Some(fragments.join(" AND "))
    }
}
