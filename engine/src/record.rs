//! Record type stored in the local database and exchanged with the server.

use crate::{diff::Diff, error::Result, Error, RecordKey, Version};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name of the record key on the wire and in index paths.
pub const KEY_FIELD: &str = "key";
/// Field name of the server-assigned version.
pub const VERSION_FIELD: &str = "version";
/// Field name of the dirty flag.
pub const CHANGED_FIELD: &str = "changedSinceSync";

/// A keyed JSON record.
///
/// `key`, `version` and `changedSinceSync` are reserved; everything else is
/// payload and is serialized flat next to them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Unique key within the store; generated on first write if absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<RecordKey>,
    /// Version assigned by the server on each accepted write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    /// True while a local change has not been acknowledged by the server
    #[serde(default)]
    pub changed_since_sync: bool,
    /// Payload fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create an empty record without a key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON object. Reserved fields are picked up.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::InvalidRecord("record must be a JSON object".into()));
        }
        serde_json::from_value(value).map_err(|e| Error::InvalidRecord(e.to_string()))
    }

    /// Set the key.
    pub fn with_key(mut self, key: impl Into<RecordKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set a payload field.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// The key, if assigned.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Read a payload field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Write a payload field.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Remove a payload field, returning its previous value.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// The payload as a JSON object.
    pub fn payload(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Whether the record carries unacknowledged local changes.
    pub fn is_dirty(&self) -> bool {
        self.changed_since_sync
    }

    /// Patch the payload in place.
    pub fn apply_diff(&mut self, diff: &Diff) -> Result<()> {
        crate::diff::patch_map(&mut self.fields, diff)
    }

    /// Value this record contributes to an index over `path`.
    ///
    /// Reserved fields are addressed by their wire names; payload fields may
    /// use dotted paths into nested objects. Missing values are not indexed.
    pub fn index_value(&self, path: &str) -> Option<Value> {
        match path {
            KEY_FIELD => self.key.clone().map(Value::String),
            VERSION_FIELD => self.version.map(Value::from),
            CHANGED_FIELD => Some(Value::Bool(self.changed_since_sync)),
            _ => {
                let mut segments = path.split('.');
                let first = segments.next()?;
                let mut current = self.fields.get(first)?;
                for segment in segments {
                    current = current.as_object()?.get(segment)?;
                }
                match current {
                    Value::Null => None,
                    other => Some(other.clone()),
                }
            }
        }
    }
}

/// Generate a random key for a record written without one.
pub fn generate_key() -> RecordKey {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_value_splits_reserved_fields() {
        let record = Record::from_value(json!({
            "key": "a",
            "version": 3,
            "changedSinceSync": true,
            "text": "hi",
        }))
        .unwrap();

        assert_eq!(record.key(), Some("a"));
        assert_eq!(record.version, Some(3));
        assert!(record.is_dirty());
        assert_eq!(record.payload(), json!({"text": "hi"}));
    }

    #[test]
    fn from_value_rejects_non_objects() {
        assert!(matches!(
            Record::from_value(json!([1, 2])),
            Err(Error::InvalidRecord(_))
        ));
    }

    #[test]
    fn wire_format_is_flat() {
        let record = Record::new().with_key("a").with("text", "hi");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({"key": "a", "changedSinceSync": false, "text": "hi"})
        );
    }

    #[test]
    fn index_values() {
        let record = Record::new()
            .with_key("a")
            .with("author", json!({"name": "Ada"}))
            .with("missing", Value::Null);

        assert_eq!(record.index_value("key"), Some(json!("a")));
        assert_eq!(record.index_value("changedSinceSync"), Some(json!(false)));
        assert_eq!(record.index_value("version"), None);
        assert_eq!(record.index_value("author.name"), Some(json!("Ada")));
        assert_eq!(record.index_value("author.age"), None);
        assert_eq!(record.index_value("missing"), None);
    }

    #[test]
    fn generated_keys_are_unique() {
        assert_ne!(generate_key(), generate_key());
    }
}
