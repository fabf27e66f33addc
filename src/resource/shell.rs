//! `task`: a check script that decides whether an apply script runs
//!
//! The interpreter plumbing in [`Shell`] is shared with `query` and
//! `wait.query`.

use super::Environment;
use crate::results::{ResultsContext, summarize_one};
use crate::runner::{CommandResults, ExecError, ScriptRunner, command_exists};
use anyhow::{Context as _, ensure};
use declarative::{
    Context, ExportError, Exported, Failure, FieldMap, Level, Monitor, Outcome, Status, Task,
    cancelled,
};
use prepare::{Field, Preparer, Schema};
use render::Render;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Fields every interpreter-backed resource accepts
pub fn base_schema() -> Schema {
    Schema::new()
        .field(Field::new("interpreter"))
        .field(Field::new("check_flags"))
        .field(Field::new("exec_flags"))
        .field(Field::new("timeout"))
        .field(Field::new("dir"))
        .field(Field::new("env"))
}

pub fn schema() -> Schema {
    base_schema()
        .field(Field::new("check").required())
        .field(Field::new("apply"))
}

pub fn prepare(p: &mut Preparer<'_>, env: &Environment) -> anyhow::Result<Box<dyn Task>> {
    let shell = Shell::prepare(p, env)?;
    let check: String = p.require("check")?;
    let apply: Option<String> = p.get("apply")?;

    shell.validate("check", &check)?;
    if let Some(apply) = &apply {
        shell.validate("apply", apply)?;
    }
    Ok(Box::new(ShellTask { shell, check, apply }))
}

/// An interpreter with its flags and the trail of runs so far
#[derive(Debug, Clone)]
pub struct Shell {
    pub runner: ScriptRunner,
    pub check_flags: Vec<String>,
    pub exec_flags: Vec<String>,
    pub results: ResultsContext,
}

impl Shell {
    pub fn prepare(p: &mut Preparer<'_>, env: &Environment) -> anyhow::Result<Self> {
        let interpreter: Option<String> = p.get("interpreter")?;
        let mut runner = ScriptRunner::new(interpreter.as_deref().or(env.interpreter.as_deref()));
        ensure!(
            command_exists(&runner.interpreter.to_string_lossy()),
            "interpreter {} not found",
            runner.interpreter.display()
        );
        runner.timeout = p.get("timeout")?.or(env.command_timeout);
        runner.dir = p.get::<String>("dir")?.map(PathBuf::from);
        runner.env = p.get_or("env", BTreeMap::new())?;

        Ok(Self {
            runner,
            check_flags: p.get_or("check_flags", Vec::new())?,
            exec_flags: p.get_or("exec_flags", Vec::new())?,
            results: ResultsContext::new(),
        })
    }

    /// Reject scripts the interpreter cannot parse
    pub fn validate(&self, what: &str, script: &str) -> anyhow::Result<()> {
        self.runner
            .check_syntax(&Context::new(), script)
            .with_context(|| format!("{what} script"))
    }

    /// Run the check script, appending its results to the trail
    pub fn run_check(&mut self, ctx: &Context, script: &str) -> Result<CommandResults, ExecError> {
        let results = self.runner.run(ctx, "check", script, &self.check_flags)?;
        self.results.append(results.clone());
        Ok(results)
    }

    /// Run a script with the exec flags under `op`
    pub fn run_exec(
        &mut self,
        ctx: &Context,
        op: &str,
        script: &str,
    ) -> Result<CommandResults, ExecError> {
        let results = self.runner.run(ctx, op, script, &self.exec_flags)?;
        self.results.append(results.clone());
        Ok(results)
    }

    pub fn export_into(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
        let env: Map<String, Value> = self
            .runner
            .env
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect();
        fields.insert("interpreter", self.runner.interpreter.display().to_string())?;
        fields.insert("check_flags", self.check_flags.clone())?;
        fields.insert("exec_flags", self.exec_flags.clone())?;
        fields.insert_opt("dir", self.runner.dir.as_ref().map(|d| d.display().to_string()))?;
        fields.insert("env", env)?;
        fields.insert_opt("timeout", self.runner.timeout.map(|t| format!("{t:?}")))?;

        let last = self.results.last();
        fields.insert_opt("exit_status", last.map(|r| r.exit_status))?;
        fields.insert_opt("stdout", last.map(|r| r.stdout.clone()))?;
        fields.insert_opt("stderr", last.map(|r| r.stderr.clone()))
    }
}

/// Turn a failed run into a failure carrying `status`
pub fn exec_failure(err: ExecError, status: &Status) -> Failure {
    match err {
        ExecError::Interrupted(interrupt) => cancelled(interrupt, status.clone()),
        other => Failure::fatal(status.clone(), other),
    }
}

/// Status for a check run: exit 0 means nothing to do
pub fn check_status(results: &CommandResults) -> Status {
    let mut status = Status::new();
    status.add_message(summarize_one(results));
    status.set_output(results.stdout.clone());
    if !results.success() {
        status.add_difference(
            "check",
            format!("returned {}", results.exit_status),
            "returned 0",
            None,
        );
    }
    status.raise_level_for_diffs();
    status
}

#[derive(Debug)]
pub struct ShellTask {
    shell: Shell,
    check: String,
    apply: Option<String>,
}

impl Exported for ShellTask {
    fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
        fields.insert("check", self.check.clone())?;
        fields.insert_opt("apply", self.apply.clone())?;
        self.shell.export_into(fields)
    }
}

impl Monitor for ShellTask {
    fn check(&mut self, ctx: &Context, _renderer: &mut dyn Render) -> Outcome {
        let results = self
            .shell
            .run_check(ctx, &self.check)
            .map_err(|e| exec_failure(e, &Status::new()))?;
        Ok(check_status(&results))
    }
}

impl Task for ShellTask {
    fn apply(&mut self, ctx: &Context) -> Outcome {
        let checked = self
            .shell
            .run_check(ctx, &self.check)
            .map_err(|e| exec_failure(e, &Status::new()))?;
        let mut status = check_status(&checked);
        if !status.has_changes() {
            return Ok(status);
        }

        let Some(apply) = &self.apply else {
            return Err(Failure::cant_change(
                status,
                anyhow::anyhow!("check failed and there is no apply script"),
            ));
        };

        log::info!("running apply script");
        let results = self
            .shell
            .run_exec(ctx, "apply", apply)
            .map_err(|e| exec_failure(e, &status))?;

        status = Status::with_level(Level::WillChange);
        status.add_message(self.shell.results.summarize());
        status.set_output(results.stdout.clone());
        if !results.success() {
            return Err(Failure::fatal(
                status,
                anyhow::anyhow!("apply script returned {}", results.exit_status),
            ));
        }
        Ok(status)
    }
}
