//! Parameter bindings and the compiled statement type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Alias of the single collection source in every generated statement.
pub const ROOT_ALIAS: &str = "c";

/// A named parameter binding, serialized the way the query endpoint expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlParameter {
    pub name: String,
    pub value: Value,
}

/// Compiled statement text plus its positional parameter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub query: String,
    pub parameters: Vec<SqlParameter>,
}

impl QuerySpec {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: Vec::new(),
        }
    }

    /// Parameter values in binding order.
    pub fn values(&self) -> Vec<&Value> {
        self.parameters.iter().map(|p| &p.value).collect()
    }
}

/// Hands out `@param0`, `@param1`, ... and records the bound values.
///
/// A sink is created per statement; placeholders are only valid for the
/// statement they were generated for.
#[derive(Debug, Default)]
pub struct ParamSink {
    params: Vec<SqlParameter>,
}

impl ParamSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` and return its placeholder.
    pub fn bind(&mut self, value: Value) -> String {
        let name = format!("@param{}", self.params.len());
        self.params.push(SqlParameter {
            name: name.clone(),
            value,
        });
        name
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn into_parameters(self) -> Vec<SqlParameter> {
        self.params
    }
}

/// Quoted string literal, usable as a property name or inside brackets.
pub fn string_literal(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Bracket-style property access, safe for reserved words: `c["value"]`.
pub fn field_ref(field: &str) -> String {
    format!("{}[{}]", ROOT_ALIAS, string_literal(field))
}

/// Keywords the dialect refuses as bare output aliases.
const RESERVED_WORDS: &[&str] = &[
    "AND", "ARRAY", "AS", "ASC", "BETWEEN", "BY", "CASE", "CAST", "CONVERT", "CROSS", "DESC",
    "DISTINCT", "ELSE", "END", "ESCAPE", "EXISTS", "FALSE", "FOR", "FROM", "GROUP", "HAVING",
    "IN", "INNER", "INSERT", "INTO", "IS", "JOIN", "LEFT", "LIKE", "LIMIT", "NOT", "NULL",
    "OFFSET", "ON", "OR", "ORDER", "OUTER", "OVER", "RIGHT", "SELECT", "SET", "THEN", "TOP",
    "TRUE", "UDF", "UNDEFINED", "UPDATE", "VALUE", "WHEN", "WHERE", "WITH",
];

pub fn is_reserved(word: &str) -> bool {
    RESERVED_WORDS.iter().any(|r| r.eq_ignore_ascii_case(word))
}

fn is_plain_ident(field: &str) -> bool {
    !field.is_empty()
        && !field.starts_with(|c: char| c.is_ascii_digit())
        && field.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Turn a field name into something usable as an output alias.
///
/// Anything outside `[A-Za-z0-9_]` becomes `_`, and a leading digit gets an
/// underscore prefix. Distinct fields can map to the same alias; statement
/// builders reject those collisions.
pub fn alias_ident(field: &str) -> String {
    let mut out: String = field
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Output alias of a grouping key column.
///
/// A plain, non-reserved identifier is its own alias. Anything else is
/// prefixed with `_key_` and sanitized.
pub fn key_alias(field: &str) -> String {
    if is_plain_ident(field) && !is_reserved(field) {
        field.to_string()
    } else {
        format!("_key_{}", alias_ident(field))
    }
}
