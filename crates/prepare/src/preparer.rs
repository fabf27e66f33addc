//! Validation of a declaration against its schema, and typed field access

use crate::coerce::{Coercer, FromRaw};
use crate::error::{PrepareError, Result};
use crate::schema::{Field, RESERVED_KEYS, Schema};
use render::Render;
use serde_json::{Map, Value};

/// A declaration checked against a [`Schema`]
///
/// Construction rejects unknown keys, missing required fields and
/// conflicting exclusive fields. Fields are then coerced on demand.
pub struct Preparer<'a> {
    schema: &'a Schema,
    source: &'a Map<String, Value>,
    renderer: &'a mut dyn Render,
}

impl std::fmt::Debug for Preparer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preparer")
            .field("schema", &self.schema)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl<'a> Preparer<'a> {
    pub fn new(
        schema: &'a Schema,
        source: &'a Map<String, Value>,
        renderer: &'a mut dyn Render,
    ) -> Result<Self> {
        for key in source.keys() {
            if schema.get(key).is_none() && !RESERVED_KEYS.contains(&key.as_str()) {
                return Err(PrepareError::UnknownField {
                    name: key.clone(),
                    suggestions: schema.suggest(key),
                });
            }
        }

        for field in schema.fields() {
            if field.required && !is_set(source, field.name) {
                return Err(PrepareError::Required(field.name.to_string()));
            }
        }

        for set in schema.exclusive_sets() {
            let present: Vec<String> = set
                .iter()
                .filter(|name| is_set(source, name))
                .map(|name| (*name).to_string())
                .collect();
            if present.len() > 1 {
                return Err(PrepareError::Exclusive(present));
            }
        }

        log::trace!("declaration validated: {} keys", source.len());
        Ok(Self {
            schema,
            source,
            renderer,
        })
    }

    /// Whether the declaration sets `name` to a non-null value
    pub fn is_set(&self, name: &str) -> bool {
        is_set(self.source, name)
    }

    /// Coerce a field, or `None` when it is unset
    pub fn get<T: FromRaw + PartialEq>(&mut self, name: &str) -> Result<Option<T>> {
        let Some(raw) = self.source.get(name).filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let field = self.field(name);
        let mut c = Coercer::new(&mut *self.renderer, field.base);
        let value = T::from_raw(&mut c, name, raw)?;

        if !field.valid_values.is_empty() {
            let mut matched = false;
            for candidate in field.valid_values {
                let candidate = T::from_raw(&mut c, name, &Value::String((*candidate).to_string()))?;
                if candidate == value {
                    matched = true;
                    break;
                }
            }
            if !matched {
                return Err(PrepareError::InvalidValue {
                    name: name.to_string(),
                    value: display_raw(raw),
                    allowed: field.valid_values.iter().map(|v| (*v).to_string()).collect(),
                });
            }
        }
        Ok(Some(value))
    }

    /// Coerce a field, falling back to `default` when it is unset
    pub fn get_or<T: FromRaw + PartialEq>(&mut self, name: &str, default: T) -> Result<T> {
        Ok(self.get(name)?.unwrap_or(default))
    }

    /// Coerce a field that must be set
    pub fn require<T: FromRaw + PartialEq>(&mut self, name: &str) -> Result<T> {
        self.get(name)?
            .ok_or_else(|| PrepareError::Required(name.to_string()))
    }

    /// Dependencies the user listed under `depends`
    pub fn explicit_depends(&mut self) -> Result<Vec<String>> {
        let Some(raw) = self.source.get("depends") else {
            return Ok(Vec::new());
        };
        let mut c = Coercer::new(&mut *self.renderer, 10);
        match raw {
            Value::String(_) => Ok(vec![String::from_raw(&mut c, "depends", raw)?]),
            other => Vec::<String>::from_raw(&mut c, "depends", other),
        }
    }

    /// Scheduler grouping hint, unless the schema claims `group` itself
    pub fn group(&mut self) -> Result<Option<String>> {
        if self.schema.get("group").is_some() {
            return Ok(None);
        }
        let Some(raw) = self.source.get("group").filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let mut c = Coercer::new(&mut *self.renderer, 10);
        String::from_raw(&mut c, "group", raw).map(Some)
    }

    /// Explicit dependencies plus every `param.X` referenced by a field
    pub fn dependencies(&mut self) -> Result<Vec<String>> {
        let explicit = self.explicit_depends()?;
        let mut templates = Vec::new();
        for (key, value) in self.source {
            if !RESERVED_KEYS.contains(&key.as_str()) || self.schema.get(key).is_some() {
                collect_strings(value, &mut templates);
            }
        }
        Ok(self.renderer.dependencies("depends", &explicit, &templates)?)
    }

    fn field(&self, name: &str) -> Field {
        self.schema
            .get(name)
            .cloned()
            .unwrap_or_else(|| Field::new("unknown"))
    }
}

fn is_set(source: &Map<String, Value>, name: &str) -> bool {
    source.get(name).is_some_and(|v| !v.is_null())
}

fn collect_strings<'v>(value: &'v Value, out: &mut Vec<&'v str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(entries) => entries.iter().for_each(|(k, v)| {
            out.push(k);
            collect_strings(v, out);
        }),
        _ => {}
    }
}

fn display_raw(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
