//! `query`: run a script for its output; never changes anything

use super::Environment;
use super::shell::{Shell, base_schema, exec_failure};
use crate::results::summarize_one;
use declarative::{
    Context, ExportError, Exported, Failure, FieldMap, Monitor, Outcome, Status, Task,
};
use prepare::{Field, Preparer, Schema};
use render::Render;

pub fn schema() -> Schema {
    base_schema().field(Field::new("query").required())
}

pub fn prepare(p: &mut Preparer<'_>, env: &Environment) -> anyhow::Result<Box<dyn Task>> {
    let shell = Shell::prepare(p, env)?;
    let query: String = p.require("query")?;
    shell.validate("query", &query)?;
    Ok(Box::new(Query { shell, query }))
}

#[derive(Debug)]
pub struct Query {
    shell: Shell,
    query: String,
}

impl Exported for Query {
    fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
        fields.insert("query", self.query.clone())?;
        self.shell.export_into(fields)
    }
}

impl Monitor for Query {
    fn check(&mut self, ctx: &Context, _renderer: &mut dyn Render) -> Outcome {
        let results = self
            .shell
            .run_exec(ctx, "query", &self.query)
            .map_err(|e| exec_failure(e, &Status::new()))?;

        let mut status = Status::new();
        status.add_message(summarize_one(&results));
        status.set_output(results.stdout.clone());
        if !results.success() {
            return Err(Failure::fatal(
                status,
                anyhow::anyhow!("query returned {}", results.exit_status),
            ));
        }
        Ok(status)
    }
}

impl Task for Query {
    fn apply(&mut self, _ctx: &Context) -> Outcome {
        Err(Failure::fatal(
            Status::new(),
            anyhow::anyhow!("query has no changes"),
        ))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::resource::testing::prepare_json;
    use declarative::Level;
    use render::ModuleRenderer;
    use serde_json::json;

    #[test]
    fn test_query_output_is_exported() {
        let mut task = prepare_json(
            &schema(),
            prepare,
            &Environment::default(),
            json!({ "query": "echo \"$GREETING\"", "env": { "GREETING": "hi" } }),
        )
        .unwrap();

        let status = task.check(&Context::new(), &mut ModuleRenderer::new()).unwrap();
        assert!(!status.has_changes());
        assert_eq!(status.output(), Some("hi\n"));
        let fields = FieldMap::of(task.as_ref()).unwrap();
        assert_eq!(fields.get("stdout"), Some(&json!("hi\n")));
    }

    #[test]
    fn test_failing_query_is_fatal() {
        let failure = prepare_json(&schema(), prepare, &Environment::default(), json!({ "query": "exit 2" }))
            .unwrap()
            .check(&Context::new(), &mut ModuleRenderer::new())
            .unwrap_err();
        assert_eq!(failure.level(), Level::Fatal);
    }

    #[test]
    fn test_apply_is_an_error() {
        let failure = prepare_json(&schema(), prepare, &Environment::default(), json!({ "query": "true" }))
            .unwrap()
            .apply(&Context::new())
            .unwrap_err();
        assert_eq!(failure.error.to_string(), "query has no changes");
    }
}
