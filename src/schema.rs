//! Container schemas.
//!
//! A schema names a container, its partition key path, and optionally the
//! fields documents are expected to carry. Containers without declared fields
//! accept any JSON object.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{CosmoError, CosmoResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    /// RFC 3339 timestamp stored as a string.
    Date,
    Any,
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
            FieldKind::Date => value
                .as_str()
                .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false),
            FieldKind::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl FieldDef {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSchema {
    pub name: String,
    /// Partition key path, e.g. `/tenantId`.
    pub partition_key: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub default_ttl: Option<i64>,
    #[serde(default)]
    pub unique_keys: Vec<Vec<String>>,
}

impl ContainerSchema {
    pub fn new(name: &str, partition_key: &str) -> Self {
        let partition_key = if partition_key.starts_with('/') {
            partition_key.to_string()
        } else {
            format!("/{}", partition_key)
        };
        Self {
            name: name.to_string(),
            partition_key,
            fields: Vec::new(),
            default_ttl: None,
            unique_keys: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn default_ttl(mut self, seconds: i64) -> Self {
        self.default_ttl = Some(seconds);
        self
    }

    /// Partition key path segments, `/a/b` → `["a", "b"]`.
    pub fn partition_key_segments(&self) -> Vec<&str> {
        self.partition_key
            .split('/')
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Top-level field holding the partition key (first path segment).
    pub fn partition_key_field(&self) -> &str {
        self.partition_key_segments().first().copied().unwrap_or("id")
    }

    /// Partition key value of `document`, if present and not null.
    pub fn partition_key_value(&self, document: &Value) -> Option<Value> {
        let mut current = document;
        for segment in self.partition_key_segments() {
            current = current.get(segment)?;
        }
        if current.is_null() {
            None
        } else {
            Some(current.clone())
        }
    }

    /// Fill in declared defaults for absent fields.
    pub fn apply_defaults(&self, document: &mut Value) {
        let Some(object) = document.as_object_mut() else {
            return;
        };
        for field in &self.fields {
            if let Some(default) = &field.default {
                if !object.contains_key(&field.name) {
                    object.insert(field.name.clone(), default.clone());
                }
            }
        }
    }

    /// Check required fields, kinds, and the partition key.
    pub fn validate(&self, document: &Value) -> CosmoResult<()> {
        let object = document.as_object().ok_or_else(|| {
            CosmoError::Validation(format!("{}: document must be a JSON object", self.name))
        })?;

        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(CosmoError::Validation(format!(
                        "{}: field '{}' is required",
                        self.name, field.name
                    )))
                }
                None | Some(Value::Null) => {}
                Some(value) if !field.kind.matches(value) => {
                    return Err(CosmoError::Validation(format!(
                        "{}: field '{}' expected {:?}, got {}",
                        self.name, field.name, field.kind, value
                    )))
                }
                Some(_) => {}
            }
        }

        if self.partition_key_value(document).is_none() {
            return Err(CosmoError::Validation(format!(
                "{}: partition key {} is missing",
                self.name, self.partition_key
            )));
        }
        Ok(())
    }

    /// Body for the container create call.
    pub fn to_definition(&self) -> Value {
        let mut definition = json!({
            "id": self.name,
            "partitionKey": { "paths": [self.partition_key], "kind": "Hash" },
        });
        if let Some(ttl) = self.default_ttl {
            definition["defaultTtl"] = json!(ttl);
        }
        if !self.unique_keys.is_empty() {
            let keys: Vec<Value> = self
                .unique_keys
                .iter()
                .map(|paths| json!({ "paths": paths }))
                .collect();
            definition["uniqueKeyPolicy"] = json!({ "uniqueKeys": keys });
        }
        definition
    }
}

/// A set of container schemas, as loaded from a TOML file:
///
/// ```toml
/// [[containers]]
/// name = "users"
/// partition_key = "/tenantId"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSet {
    #[serde(default)]
    pub containers: Vec<ContainerSchema>,
}

impl SchemaSet {
    pub fn from_toml_str(text: &str) -> CosmoResult<Self> {
        toml::from_str(text).map_err(|e| CosmoError::Configuration(format!("invalid schema file: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> CosmoResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CosmoError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn get(&self, name: &str) -> Option<&ContainerSchema> {
        self.containers.iter().find(|c| c.name == name)
    }
}
