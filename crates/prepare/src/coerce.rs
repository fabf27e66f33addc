//! Coercion from raw declaration values to typed parameters
//!
//! Declarations arrive as `serde_json::Value`s. Strings are rendered before
//! they are interpreted, so a template may stand in for any scalar. Nested
//! values are located as `<name>.<i>` for list elements and
//! `<name>.<i>.key` / `<name>.<i>.value` for map entries.

use crate::error::{PrepareError, Result};
use declarative::parse_duration;
use render::{Render, parse_bool};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Per-field coercion state: the renderer and the integer radix
pub struct Coercer<'a> {
    renderer: &'a mut dyn Render,
    base: u32,
}

impl<'a> Coercer<'a> {
    pub fn new(renderer: &'a mut dyn Render, base: u32) -> Self {
        Self { renderer, base }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn render(&mut self, name: &str, template: &str) -> Result<String> {
        Ok(self.renderer.render(name, template)?)
    }

    /// Render a string value, or stringify a scalar
    fn scalar_text(&mut self, name: &str, raw: &Value, kind: &str) -> Result<String> {
        match raw {
            Value::String(s) => self.render(name, s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(PrepareError::conversion(name, other, kind)),
        }
    }
}

/// Types a raw declaration value can be coerced into
pub trait FromRaw: Sized {
    /// Human-readable target kind for error messages
    fn kind() -> String;

    fn from_raw(c: &mut Coercer<'_>, name: &str, raw: &Value) -> Result<Self>;
}

impl FromRaw for String {
    fn kind() -> String {
        "string".into()
    }

    fn from_raw(c: &mut Coercer<'_>, name: &str, raw: &Value) -> Result<Self> {
        match raw {
            Value::Null => Ok(Self::new()),
            other => c.scalar_text(name, other, "string"),
        }
    }
}

impl FromRaw for bool {
    fn kind() -> String {
        "bool".into()
    }

    fn from_raw(c: &mut Coercer<'_>, name: &str, raw: &Value) -> Result<Self> {
        match raw {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(*b),
            Value::String(s) => Ok(parse_bool(&c.render(name, s)?)),
            other => Err(PrepareError::conversion(name, other, "bool")),
        }
    }
}

macro_rules! from_raw_int {
    ($($ty:ty),+) => {$(
        impl FromRaw for $ty {
            fn kind() -> String {
                stringify!($ty).into()
            }

            /// Native numbers are taken as-is; only strings use the field's base
            fn from_raw(c: &mut Coercer<'_>, name: &str, raw: &Value) -> Result<Self> {
                if let Value::Number(n) = raw {
                    let wide = n
                        .as_i64()
                        .map(i128::from)
                        .or_else(|| n.as_u64().map(i128::from))
                        .ok_or_else(|| PrepareError::conversion(name, n, stringify!($ty)))?;
                    return <$ty>::try_from(wide)
                        .map_err(|_| PrepareError::out_of_range(name, n, stringify!($ty)));
                }
                let text = c.scalar_text(name, raw, stringify!($ty))?;
                let trimmed = text.trim();
                <$ty>::from_str_radix(trimmed, c.base()).map_err(|e| match e.kind() {
                    std::num::IntErrorKind::PosOverflow | std::num::IntErrorKind::NegOverflow => {
                        PrepareError::out_of_range(name, trimmed, stringify!($ty))
                    }
                    _ => PrepareError::conversion(name, trimmed, stringify!($ty)),
                })
            }
        }
    )+};
}

from_raw_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromRaw for f64 {
    fn kind() -> String {
        "f64".into()
    }

    fn from_raw(c: &mut Coercer<'_>, name: &str, raw: &Value) -> Result<Self> {
        if let Value::Number(n) = raw {
            return n
                .as_f64()
                .ok_or_else(|| PrepareError::conversion(name, n, "f64"));
        }
        let text = c.scalar_text(name, raw, "f64")?;
        text.trim()
            .parse()
            .map_err(|_| PrepareError::conversion(name, &text, "f64"))
    }
}

impl FromRaw for f32 {
    fn kind() -> String {
        "f32".into()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_raw(c: &mut Coercer<'_>, name: &str, raw: &Value) -> Result<Self> {
        let wide = f64::from_raw(c, name, raw)?;
        if wide.is_finite() && wide.abs() > f64::from(f32::MAX) {
            return Err(PrepareError::out_of_range(name, wide, "f32"));
        }
        Ok(wide as f32)
    }
}

impl FromRaw for Duration {
    fn kind() -> String {
        "duration".into()
    }

    /// Integers are nanoseconds; strings use unit suffixes
    fn from_raw(c: &mut Coercer<'_>, name: &str, raw: &Value) -> Result<Self> {
        match raw {
            Value::Number(n) => n
                .as_u64()
                .map(Self::from_nanos)
                .ok_or_else(|| PrepareError::out_of_range(name, n, "duration")),
            Value::String(s) => {
                let text = c.render(name, s)?;
                parse_duration(&text).map_err(|_| PrepareError::conversion(name, &text, "duration"))
            }
            other => Err(PrepareError::conversion(name, other, "duration")),
        }
    }
}

impl<T: FromRaw> FromRaw for Option<T> {
    fn kind() -> String {
        format!("optional {}", T::kind())
    }

    fn from_raw(c: &mut Coercer<'_>, name: &str, raw: &Value) -> Result<Self> {
        match raw {
            Value::Null => Ok(None),
            other => T::from_raw(c, name, other).map(Some),
        }
    }
}

impl<T: FromRaw> FromRaw for Vec<T> {
    fn kind() -> String {
        format!("list of {}", T::kind())
    }

    fn from_raw(c: &mut Coercer<'_>, name: &str, raw: &Value) -> Result<Self> {
        match raw {
            Value::Null => Ok(Self::new()),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| T::from_raw(c, &format!("{name}.{i}"), item))
                .collect(),
            other => Err(PrepareError::conversion(name, other, Self::kind())),
        }
    }
}

impl<K: FromRaw + Ord, V: FromRaw> FromRaw for BTreeMap<K, V> {
    fn kind() -> String {
        format!("map of {} to {}", K::kind(), V::kind())
    }

    fn from_raw(c: &mut Coercer<'_>, name: &str, raw: &Value) -> Result<Self> {
        let entries: &Map<String, Value> = match raw {
            Value::Null => return Ok(Self::new()),
            Value::Object(entries) => entries,
            // block syntax wraps a single map in a list
            Value::Array(items) => match items.as_slice() {
                [Value::Object(entries)] => entries,
                _ => return Err(PrepareError::conversion(name, raw, Self::kind())),
            },
            other => return Err(PrepareError::conversion(name, other, Self::kind())),
        };

        let mut out = Self::new();
        for (i, (key, value)) in entries.iter().enumerate() {
            let key = K::from_raw(c, &format!("{name}.{i}.key"), &Value::String(key.clone()))?;
            let value = V::from_raw(c, &format!("{name}.{i}.value"), value)?;
            out.insert(key, value);
        }
        Ok(out)
    }
}

impl FromRaw for Value {
    fn kind() -> String {
        "any".into()
    }

    /// Strings anywhere in the value are rendered; everything else is kept
    fn from_raw(c: &mut Coercer<'_>, name: &str, raw: &Value) -> Result<Self> {
        match raw {
            Value::String(s) => Ok(Value::String(c.render(name, s)?)),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| Self::from_raw(c, &format!("{name}.{i}"), item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(entries) => {
                let mut out = Map::new();
                for (i, (key, value)) in entries.iter().enumerate() {
                    let value = Self::from_raw(c, &format!("{name}.{i}.value"), value)?;
                    out.insert(key.clone(), value);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }
}

/// Coerce a type through an underlying [`FromRaw`] type and `TryFrom`
///
/// ```ignore
/// from_raw_via!(State, String);
/// ```
#[macro_export]
macro_rules! from_raw_via {
    ($ty:ty, $under:ty) => {
        impl $crate::FromRaw for $ty {
            fn kind() -> String {
                stringify!($ty).to_string()
            }

            fn from_raw(
                c: &mut $crate::Coercer<'_>,
                name: &str,
                raw: &$crate::Value,
            ) -> $crate::Result<Self> {
                let under = <$under as $crate::FromRaw>::from_raw(c, name, raw)?;
                <$ty>::try_from(under).map_err(|e| $crate::PrepareError::Conversion {
                    name: name.to_string(),
                    raw: e.to_string(),
                    kind: stringify!($ty).to_string(),
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use render::{ModuleRenderer, Param};
    use serde_json::json;

    fn coerce<T: FromRaw>(raw: Value) -> Result<T> {
        coerce_base(raw, 10)
    }

    fn coerce_base<T: FromRaw>(raw: Value, base: u32) -> Result<T> {
        let mut renderer = ModuleRenderer::new().with_param("port", Param::with_default(8080));
        let mut c = Coercer::new(&mut renderer, base);
        T::from_raw(&mut c, "field", &raw)
    }

    #[test]
    fn test_bool() {
        assert!(coerce::<bool>(json!(true)).unwrap());
        assert!(coerce::<bool>(json!("T")).unwrap());
        assert!(coerce::<bool>(json!("TRUE")).unwrap());
        assert!(!coerce::<bool>(json!("yes")).unwrap());
        assert!(!coerce::<bool>(Value::Null).unwrap());
        assert_eq!(coerce::<Option<bool>>(Value::Null).unwrap(), None);
        assert_eq!(coerce::<Option<bool>>(json!(false)).unwrap(), Some(false));
    }

    #[test]
    fn test_integers() {
        assert_eq!(coerce::<u32>(json!(42)).unwrap(), 42);
        assert_eq!(coerce::<i64>(json!("-7")).unwrap(), -7);
        assert_eq!(coerce_base::<u32>(json!("0755"), 8).unwrap(), 0o755);
        assert_eq!(coerce_base::<u32>(json!("755"), 8).unwrap(), 0o755);
        assert_eq!(coerce_base::<u32>(json!(420), 8).unwrap(), 420);
        assert!(matches!(
            coerce::<u32>(json!(1.5)),
            Err(PrepareError::Conversion { .. })
        ));
        assert_eq!(coerce::<u16>(json!("{{param \"port\"}}")).unwrap(), 8080);
    }

    #[test]
    fn test_integer_out_of_range() {
        let err = coerce::<u8>(json!("300")).unwrap_err();
        assert_eq!(
            err,
            PrepareError::OutOfRange {
                name: "field".into(),
                raw: "300".into(),
                kind: "u8".into(),
            }
        );
        assert!(coerce::<i8>(json!(-129)).is_err());
        assert!(matches!(
            coerce::<u32>(json!("abc")),
            Err(PrepareError::Conversion { .. })
        ));
    }

    #[test]
    fn test_floats() {
        assert!((coerce::<f64>(json!(1.5)).unwrap() - 1.5).abs() < f64::EPSILON);
        assert!((coerce::<f32>(json!("2.25")).unwrap() - 2.25).abs() < f32::EPSILON);
        assert!(coerce::<f32>(json!(1e300)).is_err());
    }

    #[test]
    fn test_duration() {
        assert_eq!(
            coerce::<Duration>(json!(1_500)).unwrap(),
            Duration::from_nanos(1_500)
        );
        assert_eq!(
            coerce::<Duration>(json!("1h30m")).unwrap(),
            Duration::from_secs(5400)
        );
        assert!(coerce::<Duration>(json!(-1)).is_err());
    }

    #[test]
    fn test_slice_locations() {
        let err = coerce::<Vec<u8>>(json!([1, "x"])).unwrap_err();
        assert_eq!(err.field(), Some("field.1"));
        assert_eq!(coerce::<Vec<String>>(json!(["a", "b"])).unwrap(), ["a", "b"]);
    }

    #[test]
    fn test_map_unwraps_single_element_list() {
        let expected: BTreeMap<String, String> = [("A".to_string(), "1".to_string())].into();
        assert_eq!(
            coerce::<BTreeMap<String, String>>(json!({"A": "1"})).unwrap(),
            expected
        );
        assert_eq!(
            coerce::<BTreeMap<String, String>>(json!([{"A": "1"}])).unwrap(),
            expected
        );
        let err = coerce::<BTreeMap<String, u8>>(json!({"A": "x"})).unwrap_err();
        assert_eq!(err.field(), Some("field.0.value"));
    }

    #[test]
    fn test_any_renders_nested_strings() {
        let out = coerce::<Value>(json!({"a": ["{{param \"port\"}}", 1]})).unwrap();
        assert_eq!(out, json!({"a": ["8080", 1]}));
    }

    #[derive(Debug, PartialEq)]
    enum State {
        Present,
        Absent,
    }

    impl TryFrom<String> for State {
        type Error = String;

        fn try_from(s: String) -> std::result::Result<Self, String> {
            match s.as_str() {
                "present" => Ok(Self::Present),
                "absent" => Ok(Self::Absent),
                _ => Err(s),
            }
        }
    }

    crate::from_raw_via!(State, String);

    #[test]
    fn test_alias() {
        assert_eq!(coerce::<State>(json!("absent")).unwrap(), State::Absent);
        assert_eq!(coerce::<State>(json!("present")).unwrap(), State::Present);
        assert!(coerce::<State>(json!("gone")).is_err());
    }
}
