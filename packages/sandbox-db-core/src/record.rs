//! Records and equality matchers.
//!
//! A record is an opaque field-keyed value bag. The convention field `id`
//! is the record's identity within its table; uniqueness is deliberately
//! NOT enforced, matching the leniency of the fixtures this store stands
//! in for.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name conventionally holding a record's identity.
pub const ID_FIELD: &str = "id";

/// One entity instance: a field-keyed value bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    /// Builds a record from a JSON value.
    ///
    /// Returns `None` if the value is not an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Sets a field, replacing any previous value. Builder-style.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns a field value, if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns the record's `id` field, if present.
    pub fn id(&self) -> Option<&Value> {
        self.fields.get(ID_FIELD)
    }

    /// Shallow-merges `patch` into this record: every field of the patch
    /// overwrites or adds the same-named field here.
    pub fn merge(&mut self, patch: &Record) {
        for (name, value) in &patch.fields {
            self.fields.insert(name.clone(), value.clone());
        }
    }

    /// Returns whether every matcher condition holds on this record.
    pub fn matches(&self, matcher: &Matcher) -> bool {
        matcher
            .conditions
            .iter()
            .all(|(name, expected)| self.fields.get(name) == Some(expected))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consumes the record into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Conjunction of field/value equality conditions.
///
/// An empty matcher matches every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Matcher {
    conditions: Map<String, Value>,
}

impl Matcher {
    /// Creates an empty matcher (matches everything).
    pub fn new() -> Self {
        Self {
            conditions: Map::new(),
        }
    }

    /// Creates a matcher on the `id` field.
    pub fn by_id(id: impl Into<Value>) -> Self {
        Self::new().field(ID_FIELD, id)
    }

    /// Adds an equality condition. Builder-style.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(name.into(), value.into());
        self
    }

    /// Number of conditions.
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Returns whether the matcher has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}
