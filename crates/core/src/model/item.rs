use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::keys::{ATTR_PK, ATTR_SK, METADATA_SK};

/// A keyed item destined for the target table
///
/// Attributes are kept as JSON values until the loader converts them to the
/// target's native representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetItem(Map<String, Value>);

impl TargetItem {
    /// Create an item with its partition and sort key
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        let mut attributes = Map::new();
        attributes.insert(ATTR_PK.to_string(), Value::String(pk.into()));
        attributes.insert(ATTR_SK.to_string(), Value::String(sk.into()));
        Self(attributes)
    }

    /// Build an item from raw attributes
    pub fn from_attributes(attributes: Map<String, Value>) -> Self {
        Self(attributes)
    }

    /// Set an attribute unconditionally
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.0.insert(name.to_string(), value.into());
    }

    /// Set an optional attribute, omitting absent and empty values
    pub fn set_opt<V: Into<Value>>(&mut self, name: &str, value: Option<V>) {
        if let Some(value) = value {
            let value = value.into();
            if !is_empty_value(&value) {
                self.0.insert(name.to_string(), value);
            }
        }
    }

    /// Remove an attribute
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(Value::as_f64)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Partition key
    pub fn pk(&self) -> Option<&str> {
        self.get_str(ATTR_PK)
    }

    /// Sort key
    pub fn sk(&self) -> Option<&str> {
        self.get_str(ATTR_SK)
    }

    /// Whether this is an entity's own record rather than a child item
    pub fn is_metadata(&self) -> bool {
        self.sk() == Some(METADATA_SK)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_attributes(self) -> Map<String, Value> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A transformed sale together with its line items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub sale: TargetItem,
    #[serde(default)]
    pub lines: Vec<TargetItem>,
}

impl SaleRecord {
    /// Number of physical items (sale plus lines)
    pub fn item_count(&self) -> usize {
        1 + self.lines.len()
    }

    /// Flatten into physical items, sale first
    pub fn into_items(self) -> impl Iterator<Item = TargetItem> {
        std::iter::once(self.sale).chain(self.lines)
    }
}

/// Whether a value counts as absent for an optional attribute
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
