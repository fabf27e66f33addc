//! The `Render` contract and the module-scoped renderer behind it.

use crate::error::{RenderError, Result};
use crate::eval::{self, Scope};
use crate::template::Template;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Interpolates declaration values and extracts their dependencies.
///
/// `name` is always the field being rendered; it is used as the error
/// location.
pub trait Render {
    /// Render a single template.
    fn render(&mut self, name: &str, template: &str) -> Result<String>;

    /// Every `param.X` referenced by `template`, without evaluating it.
    fn params(&self, name: &str, template: &str) -> Result<Vec<String>>;

    /// Render a template and interpret the result as a boolean.
    ///
    /// `t` and `true` (any case) are true; everything else is false.
    fn render_bool(&mut self, name: &str, template: &str) -> Result<bool> {
        Ok(parse_bool(&self.render(name, template)?))
    }

    /// Render each element of a slice, located as `<name>.<index>`.
    fn render_string_slice(&mut self, name: &str, templates: &[String]) -> Result<Vec<String>> {
        templates
            .iter()
            .enumerate()
            .map(|(i, template)| self.render(&format!("{name}.{i}"), template))
            .collect()
    }

    /// Render both sides of a map and fold each pair into a single string.
    fn render_string_map_to_string_slice(
        &mut self,
        name: &str,
        map: &BTreeMap<String, String>,
        fold: &dyn Fn(&str, &str) -> String,
    ) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(map.len());
        for (i, (key, value)) in map.iter().enumerate() {
            let key = self.render(&format!("{name}.{i}.key"), key)?;
            let value = self.render(&format!("{name}.{i}.value"), value)?;
            out.push(fold(&key, &value));
        }
        Ok(out)
    }

    /// Deduplicated union of explicit dependencies and the params each
    /// source template references.
    fn dependencies(&self, name: &str, explicit: &[String], sources: &[&str]) -> Result<Vec<String>> {
        let mut deps: Vec<String> = Vec::new();
        for dep in explicit {
            if !deps.contains(dep) {
                deps.push(dep.clone());
            }
        }
        for source in sources {
            for dep in self.params(name, source)? {
                if !deps.contains(&dep) {
                    deps.push(dep);
                }
            }
        }
        Ok(deps)
    }
}

/// Truthiness of a rendered string.
pub fn parse_bool(s: &str) -> bool {
    s.eq_ignore_ascii_case("t") || s.eq_ignore_ascii_case("true")
}

/// A module parameter: the bound argument, if any, and the declared default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Param {
    pub value: Option<Value>,
    pub default: Option<Value>,
}

impl Param {
    /// A parameter with only a default.
    pub fn with_default(default: impl Into<Value>) -> Self {
        Self {
            value: None,
            default: Some(default.into()),
        }
    }

    /// The bound argument, falling back to the default.
    pub fn resolve(&self) -> Option<&Value> {
        self.value.as_ref().or(self.default.as_ref())
    }
}

/// Renderer for one module scope.
///
/// Holds the module's parameters and the exported fields of already
/// processed sibling resources (`<type>.<name>.<field>` keys). Every
/// parameter a render resolves is recorded as a `param.X` edge.
#[derive(Debug, Clone, Default)]
pub struct ModuleRenderer {
    params: BTreeMap<String, Param>,
    lookups: BTreeMap<String, Value>,
    edges: BTreeSet<String>,
}

impl ModuleRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter.
    pub fn with_param(mut self, name: impl Into<String>, param: Param) -> Self {
        self.params.insert(name.into(), param);
        self
    }

    /// Bind an argument to a parameter, declaring it if needed.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.params.entry(name.into()).or_default().value = Some(value.into());
    }

    /// Make an exported field available to `lookup`.
    pub fn publish(&mut self, key: impl Into<String>, value: Value) {
        self.lookups.insert(key.into(), value);
    }

    /// Edges recorded since the last call, cleared on return.
    pub fn take_edges(&mut self) -> Vec<String> {
        std::mem::take(&mut self.edges).into_iter().collect()
    }
}

impl Scope for ModuleRenderer {
    fn param(&mut self, location: &str, name: &str) -> Result<Value> {
        let value = self
            .params
            .get(name)
            .and_then(Param::resolve)
            .cloned()
            .ok_or_else(|| RenderError::UnknownParam {
                location: location.to_string(),
                name: name.to_string(),
            })?;
        self.edges.insert(format!("param.{name}"));
        Ok(value)
    }

    fn lookup(&mut self, location: &str, name: &str) -> Result<Value> {
        self.lookups
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::UnknownLookup {
                location: location.to_string(),
                name: name.to_string(),
            })
    }
}

impl Render for ModuleRenderer {
    fn render(&mut self, name: &str, template: &str) -> Result<String> {
        if !template.contains("{{") {
            return Ok(template.to_string());
        }
        let parsed = Template::parse(name, template)?;
        let out = eval::execute(name, &parsed, self)?;
        log::trace!("rendered {name}: {template:?} -> {out:?}");
        Ok(out)
    }

    fn params(&self, name: &str, template: &str) -> Result<Vec<String>> {
        Ok(Template::parse(name, template)?.param_refs())
    }
}
