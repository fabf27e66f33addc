//! Resource contract: two-phase check/apply with structured status
//!
//! A [`Monitor`] observes the host and reports what would change. A [`Task`]
//! can additionally converge the host. Both return an [`Outcome`]: a
//! [`Status`] on success, or a [`Failure`] pairing a cant-change or fatal
//! status with the error behind it.
//!
//! The scheduler-facing wrapper is [`Resource`], which owns a prepared task
//! together with its identity and dependency edges.

use crate::context::{Context, Interrupt};
use crate::exported::{ExportError, Exported, FieldMap};
use crate::status::{Level, Status};
use render::Render;
use std::fmt;

/// Result of a check or apply
pub type Outcome = Result<Status, Failure>;

/// A failed check or apply
///
/// The status always carries level [`Level::CantChange`] or
/// [`Level::Fatal`] and ends with the error message.
pub struct Failure {
    pub status: Status,
    pub error: anyhow::Error,
}

impl Failure {
    /// The resource could not be evaluated
    pub fn fatal(status: Status, error: impl Into<anyhow::Error>) -> Self {
        Self::at(Level::Fatal, status, error.into())
    }

    /// The resource refuses to act
    pub fn cant_change(status: Status, error: impl Into<anyhow::Error>) -> Self {
        Self::at(Level::CantChange, status, error.into())
    }

    fn at(level: Level, mut status: Status, error: anyhow::Error) -> Self {
        status.raise_level(level);
        status.add_message(error.to_string());
        Self { status, error }
    }

    pub fn level(&self) -> Level {
        self.status.status_code()
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("level", &self.level())
            .field("error", &self.error)
            .finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.level(), self.error)
    }
}

/// Any error propagated with `?` is fatal
impl<E: Into<anyhow::Error>> From<E> for Failure {
    fn from(error: E) -> Self {
        Self::fatal(Status::new(), error)
    }
}

/// Attach the status built so far to an error
pub trait FailWith<T> {
    fn fail_with(self, status: &Status) -> Result<T, Failure>;
}

impl<T, E: Into<anyhow::Error>> FailWith<T> for Result<T, E> {
    fn fail_with(self, status: &Status) -> Result<T, Failure> {
        self.map_err(|e| Failure::fatal(status.clone(), e))
    }
}

/// Read-only observation of the host
pub trait Monitor: Exported + Send + fmt::Debug {
    /// Report what apply would do, without mutating anything
    fn check(&mut self, ctx: &Context, renderer: &mut dyn Render) -> Outcome;
}

/// A monitor that can also converge the host
pub trait Task: Monitor {
    /// Make the changes the last check reported
    ///
    /// When the last check reported no changes this must be a no-op that
    /// returns a no-change status.
    fn apply(&mut self, ctx: &Context) -> Outcome;
}

/// Explicit and computed dependencies of a resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    explicit: Vec<String>,
    computed: Option<Vec<String>>,
}

impl Dependencies {
    pub fn new(explicit: Vec<String>) -> Self {
        Self {
            explicit,
            computed: None,
        }
    }

    pub fn explicit(&self) -> &[String] {
        &self.explicit
    }

    /// Replace the computed dependency set
    pub fn set_computed(&mut self, computed: Vec<String>) {
        self.computed = Some(computed);
    }

    /// Whether the computed set has been filled in
    pub fn has_computed(&self) -> bool {
        self.computed.is_some()
    }

    /// Deduplicated union of explicit and computed dependencies
    pub fn all(&self) -> Vec<String> {
        let mut all = self.explicit.clone();
        for dep in self.computed.iter().flatten() {
            if !all.contains(dep) {
                all.push(dep.clone());
            }
        }
        all
    }
}

/// A prepared resource as seen by the scheduler
pub struct Resource {
    name: String,
    kind: &'static str,
    group: Option<String>,
    dependencies: Dependencies,
    task: Box<dyn Task>,
}

impl Resource {
    pub fn new(
        kind: &'static str,
        name: impl Into<String>,
        dependencies: Dependencies,
        task: Box<dyn Task>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            group: None,
            dependencies,
            task,
        }
    }

    pub fn with_group(mut self, group: Option<String>) -> Self {
        self.group = group;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered type name, e.g. `file.mode`
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Stable identifier, `<kind>.<name>`
    pub fn id(&self) -> String {
        format!("{}.{}", self.kind, self.name)
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn depends(&self) -> Vec<String> {
        self.dependencies.all()
    }

    pub fn set_depends(&mut self, depends: Vec<String>) {
        self.dependencies.set_computed(depends);
    }

    pub fn has_base_dependencies(&self) -> bool {
        self.dependencies.has_computed()
    }

    pub fn check(&mut self, ctx: &Context, renderer: &mut dyn Render) -> Outcome {
        ctx.check().map_err(|e| cancelled(e, Status::new()))?;
        log::debug!("check {}", self.id());
        self.task.check(ctx, renderer)
    }

    pub fn apply(&mut self, ctx: &Context) -> Outcome {
        ctx.check().map_err(|e| cancelled(e, Status::new()))?;
        log::debug!("apply {}", self.id());
        self.task.apply(ctx)
    }

    pub fn exported(&self) -> Result<FieldMap, ExportError> {
        FieldMap::of(self.task.as_ref())
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id())
            .field("depends", &self.depends())
            .field("task", &self.task)
            .finish()
    }
}

/// Fatal failure for an interrupted wait
pub fn cancelled(interrupt: Interrupt, status: Status) -> Failure {
    Failure::fatal(status, interrupt)
}
