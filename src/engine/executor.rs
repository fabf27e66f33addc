//! Execution engine - sequential prepare, check and apply over a plan

use crate::plan::{Node, Plan};
use crate::registry;
use crate::resource::Environment;
use anyhow::Context as _;
use declarative::{Context, Dependencies, Failure, Resource, Status};
use prepare::Preparer;
use render::ModuleRenderer;
use std::collections::BTreeSet;

/// Options for execution
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Converge nodes whose check reports changes; otherwise only check
    pub apply: bool,
}

/// What happened to one node
#[derive(Debug)]
pub enum NodeOutcome {
    NoChange,
    /// The check found changes and the run did not apply them
    WouldChange,
    Changed,
    Failed { error: String },
    Skipped { reason: String },
}

/// One node's result with the status behind it
#[derive(Debug)]
pub struct NodeReport {
    pub id: String,
    pub outcome: NodeOutcome,
    pub status: Status,
}

/// Progress reporting for a run
pub trait ProgressCallback {
    /// Called before a node is prepared
    fn on_node_start(&mut self, id: &str, index: usize, total: usize);

    /// Called once a node is done
    fn on_node_complete(&mut self, report: &NodeReport);
}

/// Summary of execution results
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteSummary {
    pub changed: usize,
    pub would_change: usize,
    pub no_change: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ExecuteSummary {
    pub fn total_changes(&self) -> usize {
        self.changed + self.would_change
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn total(&self) -> usize {
        self.changed + self.would_change + self.no_change + self.skipped + self.failed
    }

    pub fn add_result(&mut self, outcome: &NodeOutcome) {
        match outcome {
            NodeOutcome::NoChange => self.no_change += 1,
            NodeOutcome::WouldChange => self.would_change += 1,
            NodeOutcome::Changed => self.changed += 1,
            NodeOutcome::Failed { .. } => self.failed += 1,
            NodeOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Run every node of `plan` in order
///
/// A node that depends on a failed or skipped node is skipped. Once `ctx`
/// is cancelled the remaining nodes are skipped.
pub fn execute<P: ProgressCallback>(
    plan: &Plan,
    renderer: &mut ModuleRenderer,
    env: &Environment,
    ctx: &Context,
    opts: ExecuteOptions,
    progress: &mut P,
) -> ExecuteSummary {
    let mut summary = ExecuteSummary::default();
    let mut broken: BTreeSet<String> = BTreeSet::new();
    let total = plan.resources.len();

    for (index, node) in plan.resources.iter().enumerate() {
        let id = node.id();
        progress.on_node_start(&id, index, total);

        let report = if ctx.is_cancelled() {
            skipped(id, "context was cancelled".to_string())
        } else {
            run_node(node, renderer, env, ctx, opts, &broken)
        };

        if matches!(
            report.outcome,
            NodeOutcome::Failed { .. } | NodeOutcome::Skipped { .. }
        ) {
            broken.insert(report.id.clone());
        }
        summary.add_result(&report.outcome);
        progress.on_node_complete(&report);
    }

    log::debug!("run finished: {summary:?}");
    summary
}

fn skipped(id: String, reason: String) -> NodeReport {
    NodeReport {
        id,
        outcome: NodeOutcome::Skipped { reason },
        status: Status::new(),
    }
}

fn failed(id: String, failure: Failure) -> NodeReport {
    NodeReport {
        id,
        outcome: NodeOutcome::Failed {
            error: format!("{:#}", failure.error),
        },
        status: failure.status,
    }
}

/// Render and coerce a declaration into a scheduler-facing resource
pub fn prepare_node(
    node: &Node,
    renderer: &mut ModuleRenderer,
    env: &Environment,
) -> anyhow::Result<Resource> {
    let registration = registry::find(&node.kind)
        .with_context(|| format!("unknown resource type {:?}", node.kind))?;
    let schema = (registration.schema)();
    let mut p = Preparer::new(&schema, &node.fields, renderer)?;
    let explicit = p.explicit_depends()?;
    let computed = p.dependencies()?;
    let group = p.group()?;
    let task = (registration.prepare)(&mut p, env)?;

    let mut resource = Resource::new(
        registration.name,
        node.name.clone(),
        Dependencies::new(explicit),
        task,
    )
    .with_group(group);
    resource.set_depends(computed);
    Ok(resource)
}

fn run_node(
    node: &Node,
    renderer: &mut ModuleRenderer,
    env: &Environment,
    ctx: &Context,
    opts: ExecuteOptions,
    broken: &BTreeSet<String>,
) -> NodeReport {
    let id = node.id();
    let mut resource = match prepare_node(node, renderer, env) {
        Ok(resource) => resource,
        Err(e) => {
            let error = e.context(format!("prepare {id}"));
            return failed(id, Failure::fatal(Status::new(), error));
        }
    };
    renderer.take_edges();

    if let Some(dep) = resource.depends().into_iter().find(|d| broken.contains(d)) {
        return skipped(id, format!("dependency {dep} did not succeed"));
    }

    let status = match resource.check(ctx, renderer) {
        Ok(status) => status,
        Err(failure) => return failed(id, failure),
    };

    let (outcome, status) = if !status.has_changes() {
        (NodeOutcome::NoChange, status)
    } else if !opts.apply {
        (NodeOutcome::WouldChange, status)
    } else {
        log::info!("applying {id}");
        match resource.apply(ctx) {
            Ok(applied) => (NodeOutcome::Changed, applied),
            Err(failure) => return failed(id, failure),
        }
    };

    match resource.exported() {
        Ok(fields) => {
            for (key, value) in fields.qualified(&id) {
                renderer.publish(key, value);
            }
        }
        Err(e) => {
            return failed(
                id,
                Failure::fatal(status, anyhow::Error::new(e).context("export fields")),
            );
        }
    }

    NodeReport {
        id,
        outcome,
        status,
    }
}
