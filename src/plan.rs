//! Plan files: module params and an ordered list of resource declarations
//!
//! ```toml
//! [params.user]
//! default = "deploy"
//!
//! [[resource]]
//! type = "file.mode"
//! name = "motd"
//! destination = "/etc/motd"
//! mode = "0644"
//! ```
//!
//! Every key other than `type` and `name` is handed to the resource's
//! preparer untouched.

use crate::registry;
use anyhow::{Context, Result, bail};
use render::{ModuleRenderer, Param};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    #[serde(default)]
    pub params: BTreeMap<String, ParamDecl>,
    #[serde(default, rename = "resource")]
    pub resources: Vec<Node>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamDecl {
    pub default: Option<Value>,
}

/// One resource declaration
#[derive(Debug, Clone, Deserialize)]
pub struct Node {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Node {
    /// `<type>.<name>`, the key dependencies and lookups use
    pub fn id(&self) -> String {
        format!("{}.{}", self.kind, self.name)
    }
}

impl Plan {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid plan {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let plan: Self = toml::from_str(content)?;
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for node in &self.resources {
            if registry::find(&node.kind).is_none() {
                let suggestions = registry::suggest(&node.kind);
                if suggestions.is_empty() {
                    bail!("{}: unknown resource type {:?}", node.name, node.kind);
                }
                bail!(
                    "{}: unknown resource type {:?}, did you mean {}?",
                    node.name,
                    node.kind,
                    suggestions.join(" or ")
                );
            }
            if !seen.insert(node.id()) {
                bail!("duplicate resource {}", node.id());
            }
        }
        Ok(())
    }

    /// Whether any declaration needs the service manager
    pub fn uses(&self, kind: &str) -> bool {
        self.resources.iter().any(|n| n.kind == kind)
    }

    /// A renderer holding the declared params with `overrides` bound
    pub fn renderer(&self, overrides: &[(String, String)]) -> Result<ModuleRenderer> {
        let mut renderer = self
            .params
            .iter()
            .fold(ModuleRenderer::new(), |r, (name, decl)| {
                r.with_param(
                    name.clone(),
                    Param {
                        value: None,
                        default: decl.default.clone(),
                    },
                )
            });
        for (name, value) in overrides {
            if !self.params.contains_key(name) {
                bail!("--param {name}: no such param in plan");
            }
            renderer.bind(name.clone(), value.clone());
        }
        Ok(renderer)
    }
}

/// Parse a `name=value` override
pub fn parse_param(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got {arg:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use render::Render;
    use serde_json::json;

    const PLAN: &str = r#"
[params.mode]
default = "0644"

[[resource]]
type = "file.mode"
name = "motd"
destination = "/etc/motd"
mode = '{{ param "mode" }}'

[[resource]]
type = "task"
name = "hello"
check = "test -f /tmp/hello"
apply = "touch /tmp/hello"
depends = ["file.mode.motd"]
"#;

    #[test]
    fn test_parse() {
        let plan = Plan::parse(PLAN).unwrap();
        assert_eq!(plan.resources.len(), 2);
        assert_eq!(plan.resources[0].id(), "file.mode.motd");
        assert_eq!(plan.resources[0].fields["destination"], json!("/etc/motd"));
        assert_eq!(plan.resources[1].fields["depends"], json!(["file.mode.motd"]));
        assert!(!plan.uses(registry::SYSTEMD_UNIT_STATE));
    }

    #[test]
    fn test_unknown_type_suggests() {
        let err = Plan::parse("[[resource]]\ntype = \"file.mdoe\"\nname = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("did you mean file.mode"), "{err}");
    }

    #[test]
    fn test_duplicate_id() {
        let err = Plan::parse(
            "[[resource]]\ntype = \"query\"\nname = \"x\"\nquery = \"true\"\n\
             [[resource]]\ntype = \"query\"\nname = \"x\"\nquery = \"false\"\n",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "duplicate resource query.x");
    }

    #[test]
    fn test_param_override() {
        let plan = Plan::parse(PLAN).unwrap();
        let mut renderer = plan.renderer(&[("mode".into(), "0600".into())]).unwrap();
        assert_eq!(renderer.render("mode", r#"{{ param "mode" }}"#).unwrap(), "0600");

        let mut renderer = plan.renderer(&[]).unwrap();
        assert_eq!(renderer.render("mode", r#"{{ param "mode" }}"#).unwrap(), "0644");

        assert!(plan.renderer(&[("nope".into(), "1".into())]).is_err());
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("a=b=c").unwrap(), ("a".into(), "b=c".into()));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }
}
