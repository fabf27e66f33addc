//! `wait.query`: rerun a check script until it exits 0

use super::Environment;
use super::shell::{Shell, base_schema, check_status, exec_failure};
use crate::results::summarize_one;
use crate::runner::ExecError;
use declarative::{
    Context, ExportError, Exported, Failure, FieldMap, Level, Monitor, Outcome, Retrier, Status,
    Task, cancelled,
};
use prepare::{Field, Preparer, Schema};
use render::Render;

/// Retry fields shared with `wait.port`
pub fn with_retry_fields(schema: Schema) -> Schema {
    schema
        .field(Field::new("interval"))
        .field(Field::new("grace_period"))
        .field(Field::new("max_retry"))
}

/// Unparseable durations fall back to the defaults with a warning
pub fn retrier(p: &mut Preparer<'_>) -> prepare::Result<Retrier> {
    let grace_period: Option<String> = p.get("grace_period")?;
    let interval: Option<String> = p.get("interval")?;
    Ok(Retrier::from_strings(
        grace_period.as_deref(),
        interval.as_deref(),
        p.get("max_retry")?,
    ))
}

/// Level for a finished wait: only a wait that had to retry changed anything
pub fn retry_level(retrier: &Retrier) -> Level {
    if retrier.retry_count > 1 {
        Level::WillChange
    } else {
        Level::NoChange
    }
}

/// "Passed after N retries (D)" / "Failed after N retries (D)"
pub fn retry_message(passed: bool, retrier: &Retrier) -> String {
    format!(
        "{} after {} retries ({:?})",
        if passed { "Passed" } else { "Failed" },
        retrier.retry_count,
        retrier.duration
    )
}

pub fn export_retrier(retrier: &Retrier, fields: &mut FieldMap) -> Result<(), ExportError> {
    fields.insert("interval", format!("{:?}", retrier.interval))?;
    fields.insert("grace_period", format!("{:?}", retrier.grace_period))?;
    fields.insert("max_retry", retrier.max_retry)?;
    fields.insert("retry_count", retrier.retry_count)
}

pub fn schema() -> Schema {
    with_retry_fields(base_schema().field(Field::new("check").required()))
}

pub fn prepare(p: &mut Preparer<'_>, env: &Environment) -> anyhow::Result<Box<dyn Task>> {
    let shell = Shell::prepare(p, env)?;
    let check: String = p.require("check")?;
    shell.validate("check", &check)?;
    Ok(Box::new(Wait {
        shell,
        check,
        retrier: retrier(p)?,
    }))
}

#[derive(Debug)]
pub struct Wait {
    shell: Shell,
    check: String,
    retrier: Retrier,
}

impl Exported for Wait {
    fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
        fields.insert("check", self.check.clone())?;
        export_retrier(&self.retrier, fields)?;
        self.shell.export_into(fields)
    }
}

impl Monitor for Wait {
    fn check(&mut self, ctx: &Context, _renderer: &mut dyn Render) -> Outcome {
        let results = self
            .shell
            .run_check(ctx, &self.check)
            .map_err(|e| exec_failure(e, &Status::new()))?;
        let mut status = check_status(&results);
        if self.retrier.retry_count > 0 {
            status.add_message(retry_message(results.success(), &self.retrier));
        }
        Ok(status)
    }
}

impl Task for Wait {
    fn apply(&mut self, ctx: &Context) -> Outcome {
        let shell = &mut self.shell;
        let script = &self.check;
        let outcome = self
            .retrier
            .retry_until(ctx, || shell.run_check(ctx, script).map(|r| r.success()))
            .map_err(|e| cancelled(e, Status::new()))?;

        let mut status = Status::new();
        let passed = match outcome {
            Ok(passed) => passed,
            Err(ExecError::Interrupted(interrupt)) => return Err(cancelled(interrupt, status)),
            Err(err) => {
                log::debug!("last wait attempt failed: {err}");
                false
            }
        };

        status.add_message(retry_message(passed, &self.retrier));
        if let Some(last) = self.shell.results.last() {
            status.add_message(summarize_one(last));
            status.set_output(last.stdout.clone());
        }
        if !passed {
            return Err(Failure::fatal(
                status,
                anyhow::anyhow!("check did not pass after {} attempts", self.retrier.retry_count),
            ));
        }
        status.raise_level(retry_level(&self.retrier));
        Ok(status)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::resource::testing::prepare_json;
    use render::ModuleRenderer;
    use serde_json::json;

    fn task(fields: serde_json::Value) -> Box<dyn Task> {
        prepare_json(&schema(), prepare, &Environment::default(), fields).unwrap()
    }

    #[test]
    fn test_passes_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("count");
        // passes on the third run
        let check = format!(
            "echo x >> {0}; test $(wc -l < {0}) -ge 3",
            counter.display()
        );
        let mut task = task(json!({ "check": check, "interval": "10ms", "max_retry": 5 }));

        let status = task.apply(&Context::new()).unwrap();
        assert!(status.messages()[0].starts_with("Passed after 3 retries"));
        let fields = FieldMap::of(task.as_ref()).unwrap();
        assert_eq!(fields.get("retry_count"), Some(&json!(3)));
    }

    #[test]
    fn test_fails_after_max_retry() {
        let failure = task(json!({ "check": "exit 1", "interval": "1ms", "max_retry": 2 }))
            .apply(&Context::new())
            .unwrap_err();
        assert_eq!(failure.level(), Level::Fatal);
        assert!(failure.status.messages()[0].starts_with("Failed after 2 retries"));
    }

    #[test]
    fn test_passing_check_applies_nothing() {
        let mut task = task(json!({ "check": "true", "interval": "1ms" }));
        let ctx = Context::new();
        let check = task.check(&ctx, &mut ModuleRenderer::new()).unwrap();
        assert!(!check.has_changes());

        let status = task.apply(&ctx).unwrap();
        assert!(!status.has_changes());
        assert_eq!(status.status_code(), Level::NoChange);
    }

    #[test]
    fn test_bad_durations_use_defaults() {
        let task = task(json!({ "check": "true", "interval": "bogus", "grace_period": "soon" }));
        let fields = FieldMap::of(task.as_ref()).unwrap();
        assert_eq!(fields.get("interval"), Some(&json!("5s")));
        assert_eq!(fields.get("grace_period"), Some(&json!("0ns")));
    }

    #[test]
    fn test_check_is_single_run() {
        let status = task(json!({ "check": "exit 1" }))
            .check(&Context::new(), &mut ModuleRenderer::new())
            .unwrap();
        assert_eq!(status.status_code(), Level::WillChange);
    }
}
