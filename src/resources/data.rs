//! Typed access to a resource's flat JSON state.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::ProviderError;
use crate::schema::{secret_hash_attribute, Schema};
use crate::validation;

/// The attributes of one resource instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceData {
    attributes: Map<String, Value>,
}

impl ResourceData {
    /// Wrap state as stored by the host. `null` is an empty state.
    pub fn from_state(value: Value) -> Result<Self, ProviderError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(attributes) => Ok(Self { attributes }),
            other => Err(ProviderError::InvalidRequest(format!(
                "resource state must be an object, got {}",
                other
            ))),
        }
    }

    /// Wrap configuration, filling unset attributes from their environment
    /// variable or default.
    pub fn from_config(schema: &Schema, value: Value) -> Result<Self, ProviderError> {
        Self::from_config_with(schema, value, |key| std::env::var(key).ok())
    }

    /// Like [`ResourceData::from_config`] with a custom environment lookup.
    pub fn from_config_with<F>(schema: &Schema, value: Value, lookup: F) -> Result<Self, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut data = Self::from_state(value)?;
        for (name, attr) in &schema.attributes {
            if !data.is_unset(name) {
                continue;
            }
            let from_env = attr
                .env_default
                .as_deref()
                .and_then(&lookup)
                .filter(|v| !v.is_empty())
                .map(Value::String);
            if let Some(value) = from_env.or_else(|| attr.default.clone()) {
                data.attributes.insert(name.clone(), value);
            }
        }
        Ok(data)
    }

    fn is_unset(&self, name: &str) -> bool {
        self.attributes.get(name).map_or(true, Value::is_null)
    }

    /// Raw attribute value. `None` for missing and `null`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// A string attribute that must be set and non-empty.
    pub fn required_str(&self, name: &str) -> Result<&str, ProviderError> {
        self.get_str(name)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::Validation(format!("attribute '{}' is required", name)))
    }

    /// A string attribute, empty when unset.
    pub fn get_string(&self, name: &str) -> String {
        self.get_str(name).unwrap_or_default().to_string()
    }

    /// An integer attribute. Integral floats such as `120.0` count.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(validation::as_int64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn required_bool(&self, name: &str) -> Result<bool, ProviderError> {
        self.get_bool(name)
            .ok_or_else(|| ProviderError::Validation(format!("attribute '{}' is required", name)))
    }

    /// A list of strings. Non-string elements are skipped.
    pub fn get_string_list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A map of strings. Scalars other than strings keep their JSON text.
    pub fn get_string_map(&self, name: &str) -> BTreeMap<String, String> {
        self.get(name)
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| {
                        let text = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), text)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Set a string attribute, or `null` when it is empty.
    pub fn set_non_empty(&mut self, name: impl Into<String>, value: &str) {
        let value = if value.is_empty() {
            Value::Null
        } else {
            Value::String(value.to_string())
        };
        self.attributes.insert(name.into(), value);
    }

    /// Set a map attribute, or `null` when it is empty.
    pub fn set_string_map(&mut self, name: impl Into<String>, map: &BTreeMap<String, String>) {
        let value = if map.is_empty() {
            Value::Null
        } else {
            Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            )
        };
        self.attributes.insert(name.into(), value);
    }

    pub fn id(&self) -> Option<&str> {
        self.get_str("id").filter(|id| !id.is_empty())
    }

    /// The id, or an error naming the resource type.
    pub fn required_id(&self, resource_type: &str) -> Result<&str, ProviderError> {
        self.id().ok_or_else(|| {
            ProviderError::InvalidRequest(format!("{} state has no id", resource_type))
        })
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.set("id", Value::String(id.into()));
    }

    /// Store the SHA-256 memo of secret `name` in `<name>_hash`.
    pub fn set_secret_hash(&mut self, name: &str) {
        let hash = self.get_str(name).map(secret_hash);
        self.set(secret_hash_attribute(name), hash.map_or(Value::Null, Value::String));
    }

    /// Copy secret `name` and its memo from `prior`. The API never returns
    /// secrets, so reads keep what was last applied.
    pub fn keep_secret(&mut self, prior: &ResourceData, name: &str) {
        let hash = secret_hash_attribute(name);
        for key in [name, hash.as_str()] {
            let value = prior.get(key).cloned().unwrap_or(Value::Null);
            self.set(key, value);
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.attributes)
    }
}

/// Hex encoded SHA-256 of a secret.
pub fn secret_hash(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Split an import id into exactly `parts` non-empty segments.
pub fn parse_import_id<'a>(
    id: &'a str,
    parts: usize,
    format: &str,
) -> Result<Vec<&'a str>, ProviderError> {
    let segments: Vec<&str> = id.split('/').collect();
    if segments.len() != parts || segments.iter().any(|s| s.trim().is_empty()) {
        return Err(ProviderError::InvalidRequest(format!(
            "invalid import id {:?}, expected {}",
            id, format
        )));
    }
    Ok(segments)
}
