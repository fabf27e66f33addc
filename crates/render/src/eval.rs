//! Template evaluation and the builtin function set.

use crate::error::{RenderError, Result};
use crate::template::{Arg, Command, Node, Pipeline, Template};
use serde_json::Value;

/// Resolves the two functions that reach outside the template.
pub(crate) trait Scope {
    fn param(&mut self, location: &str, name: &str) -> Result<Value>;
    fn lookup(&mut self, location: &str, name: &str) -> Result<Value>;
}

/// Evaluate `template` to a string.
pub(crate) fn execute(location: &str, template: &Template, scope: &mut dyn Scope) -> Result<String> {
    let mut out = String::new();
    for node in &template.nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Action(pipeline) => {
                let value = eval_pipeline(location, pipeline, scope)?;
                out.push_str(&display(&value));
            }
        }
    }
    Ok(out)
}

fn eval_pipeline(location: &str, pipeline: &Pipeline, scope: &mut dyn Scope) -> Result<Value> {
    let mut piped = None;
    for command in &pipeline.commands {
        piped = Some(eval_command(location, command, piped.take(), scope)?);
    }
    Ok(piped.unwrap_or(Value::Null))
}

fn eval_command(
    location: &str,
    command: &Command,
    piped: Option<Value>,
    scope: &mut dyn Scope,
) -> Result<Value> {
    match command.args.as_slice() {
        [Arg::Ident(name), rest @ ..] => {
            let mut args = rest
                .iter()
                .map(|arg| eval_arg(location, arg, scope))
                .collect::<Result<Vec<_>>>()?;
            args.extend(piped);
            call(location, name, args, scope)
        }
        [single] if piped.is_none() => eval_arg(location, single, scope),
        _ => Err(RenderError::Arguments {
            location: location.to_string(),
            function: "pipeline".to_string(),
            message: "can't give argument to non-function".to_string(),
        }),
    }
}

fn eval_arg(location: &str, arg: &Arg, scope: &mut dyn Scope) -> Result<Value> {
    match arg {
        Arg::Literal(value) => Ok(value.clone()),
        Arg::Ident(name) => call(location, name, Vec::new(), scope),
        Arg::Pipeline(inner) => eval_pipeline(location, inner, scope),
    }
}

fn call(location: &str, name: &str, args: Vec<Value>, scope: &mut dyn Scope) -> Result<Value> {
    match name {
        "param" => {
            let [param] = arity(location, name, args)?;
            scope.param(location, &display(&param))
        }
        "lookup" => {
            let [key] = arity(location, name, args)?;
            scope.lookup(location, &display(&key))
        }
        "split" => {
            let [sep, s] = arity(location, name, args)?;
            let (sep, s) = (display(&sep), display(&s));
            Ok(Value::Array(
                s.split(sep.as_str())
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ))
        }
        "join" => {
            let [sep, list] = arity(location, name, args)?;
            match list {
                Value::Array(items) => Ok(Value::String(
                    items
                        .iter()
                        .map(display)
                        .collect::<Vec<_>>()
                        .join(&display(&sep)),
                )),
                other => Ok(Value::String(display(&other))),
            }
        }
        "upper" => map_string(location, name, args, |s| s.to_uppercase()),
        "lower" => map_string(location, name, args, |s| s.to_lowercase()),
        "trim" => map_string(location, name, args, |s| s.trim().to_string()),
        "trimPrefix" => {
            let [prefix, s] = arity(location, name, args)?;
            let (prefix, s) = (display(&prefix), display(&s));
            Ok(Value::String(
                s.strip_prefix(prefix.as_str()).unwrap_or(&s).to_string(),
            ))
        }
        "trimSuffix" => {
            let [suffix, s] = arity(location, name, args)?;
            let (suffix, s) = (display(&suffix), display(&s));
            Ok(Value::String(
                s.strip_suffix(suffix.as_str()).unwrap_or(&s).to_string(),
            ))
        }
        "replace" => {
            let [old, new, s] = arity(location, name, args)?;
            Ok(Value::String(
                display(&s).replace(&display(&old), &display(&new)),
            ))
        }
        "default" => {
            let [fallback, value] = arity(location, name, args)?;
            Ok(if is_empty(&value) { fallback } else { value })
        }
        _ => Err(RenderError::UnknownFunction {
            location: location.to_string(),
            name: name.to_string(),
        }),
    }
}

fn map_string(
    location: &str,
    name: &str,
    args: Vec<Value>,
    f: impl Fn(&str) -> String,
) -> Result<Value> {
    let [s] = arity(location, name, args)?;
    Ok(Value::String(f(&display(&s))))
}

fn arity<const N: usize>(location: &str, function: &str, args: Vec<Value>) -> Result<[Value; N]> {
    args.try_into().map_err(|args: Vec<Value>| RenderError::Arguments {
        location: location.to_string(),
        function: function.to_string(),
        message: format!("wrong number of args: want {N} got {}", args.len()),
    })
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
    }
}

/// Text form of a template value.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => "<no value>".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(display).collect();
            format!("[{}]", parts.join(" "))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{k}:{}", display(v)))
                .collect();
            format!("map[{}]", parts.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct MapScope {
        params: BTreeMap<String, Value>,
    }

    impl Scope for MapScope {
        fn param(&mut self, location: &str, name: &str) -> Result<Value> {
            self.params
                .get(name)
                .cloned()
                .ok_or_else(|| RenderError::UnknownParam {
                    location: location.to_string(),
                    name: name.to_string(),
                })
        }

        fn lookup(&mut self, location: &str, name: &str) -> Result<Value> {
            Err(RenderError::UnknownLookup {
                location: location.to_string(),
                name: name.to_string(),
            })
        }
    }

    fn run(source: &str) -> Result<String> {
        let mut scope = MapScope::default();
        scope.params.insert("csv".into(), Value::from("a,b,c"));
        scope.params.insert("empty".into(), Value::from(""));
        let template = Template::parse("f", source)?;
        execute("f", &template, &mut scope)
    }

    #[test]
    fn test_literals() {
        assert_eq!(run("{{ 1 }}").unwrap(), "1");
        assert_eq!(run("{{ 1.5 }}").unwrap(), "1.5");
        assert_eq!(run("{{ true }}").unwrap(), "true");
        assert_eq!(run(r#"{{ "x" }}"#).unwrap(), "x");
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(run(r#"{{ param "csv" | split "," | join ";" }}"#).unwrap(), "a;b;c");
        assert_eq!(run(r#"{{ split "," (param "csv") }}"#).unwrap(), "[a b c]");
        assert_eq!(run(r#"{{ upper "abc" }}"#).unwrap(), "ABC");
        assert_eq!(run(r#"{{ "  x  " | trim }}"#).unwrap(), "x");
        assert_eq!(run(r#"{{ trimPrefix "v" "v1.2" }}"#).unwrap(), "1.2");
        assert_eq!(run(r#"{{ trimSuffix ".service" "nginx.service" }}"#).unwrap(), "nginx");
        assert_eq!(run(r#"{{ replace "a" "b" "banana" }}"#).unwrap(), "bbnbnb");
        assert_eq!(run(r#"{{ param "empty" | default "fallback" }}"#).unwrap(), "fallback");
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            run(r#"{{ param "missing" }}"#),
            Err(RenderError::UnknownParam { .. })
        ));
        assert!(matches!(
            run(r#"{{ lookup "file.mode.x.mode" }}"#),
            Err(RenderError::UnknownLookup { .. })
        ));
        assert!(matches!(
            run(r#"{{ exec "rm" }}"#),
            Err(RenderError::UnknownFunction { .. })
        ));
        assert!(matches!(
            run(r#"{{ upper "a" "b" }}"#),
            Err(RenderError::Arguments { .. })
        ));
        assert!(matches!(
            run(r#"{{ "a" | "b" }}"#),
            Err(RenderError::Arguments { .. })
        ));
    }
}
