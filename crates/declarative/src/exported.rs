//! Exported fields: the values a resource makes available to `lookup`
//!
//! Each resource writes its reference-names and current values into a
//! [`FieldMap`]. Embedded records contribute to the same namespace through
//! [`FieldMap::embed`]; nested records can be re-exported under a prefix with
//! [`FieldMap::re_export_as`].

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("duplicate exported field {0:?}")]
    Duplicate(String),
}

/// Types that export reference-names for downstream lookups
pub trait Exported {
    fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError>;
}

/// Reference-name to value mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldMap {
    fields: BTreeMap<String, Value>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect everything `source` exports
    pub fn of(source: &dyn Exported) -> Result<Self, ExportError> {
        let mut fields = Self::new();
        source.export(&mut fields)?;
        Ok(fields)
    }

    /// Export a single value; reference-names must be unique
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<(), ExportError> {
        let name = name.into();
        if self.fields.contains_key(&name) {
            return Err(ExportError::Duplicate(name));
        }
        self.fields.insert(name, value.into());
        Ok(())
    }

    /// Export an optional value, as `null` when absent
    pub fn insert_opt<T: Into<Value>>(
        &mut self,
        name: impl Into<String>,
        value: Option<T>,
    ) -> Result<(), ExportError> {
        self.insert(name, value.map_or(Value::Null, Into::into))
    }

    /// Merge an embedded record into this namespace
    pub fn embed(&mut self, inner: &dyn Exported) -> Result<(), ExportError> {
        inner.export(self)
    }

    /// Merge a nested record under `prefix.`
    pub fn re_export_as(&mut self, prefix: &str, inner: &dyn Exported) -> Result<(), ExportError> {
        let nested = Self::of(inner)?;
        for (name, value) in nested.fields {
            self.insert(format!("{prefix}.{name}"), value)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Fully qualified lookup keys, `<id>.<name>`
    pub fn qualified(self, id: &str) -> impl Iterator<Item = (String, Value)> {
        self.fields
            .into_iter()
            .map(move |(name, value)| (format!("{id}.{name}"), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inner {
        uid: u32,
    }

    impl Exported for Inner {
        fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
            fields.insert("uid", self.uid)
        }
    }

    struct Outer {
        name: String,
        inner: Inner,
    }

    impl Exported for Outer {
        fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
            fields.insert("name", self.name.clone())?;
            fields.embed(&self.inner)?;
            fields.re_export_as("owner", &self.inner)
        }
    }

    #[test]
    fn test_embed_and_re_export() {
        let outer = Outer {
            name: "x".into(),
            inner: Inner { uid: 7 },
        };
        let fields = FieldMap::of(&outer).unwrap();
        assert_eq!(fields.get("name"), Some(&Value::from("x")));
        assert_eq!(fields.get("uid"), Some(&Value::from(7)));
        assert_eq!(fields.get("owner.uid"), Some(&Value::from(7)));
        assert_eq!(fields.len(), 3);

        let keys: Vec<String> = fields.qualified("file.owner.x").map(|(k, _)| k).collect();
        assert!(keys.contains(&"file.owner.x.owner.uid".to_string()));
    }

    #[test]
    fn test_duplicate_is_error() {
        let mut fields = FieldMap::new();
        fields.insert("uid", 1).unwrap();
        assert_eq!(
            fields.embed(&Inner { uid: 2 }),
            Err(ExportError::Duplicate("uid".into()))
        );
    }
}
