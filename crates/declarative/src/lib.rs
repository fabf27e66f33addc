//! # Declarative
//!
//! Core abstractions for converging a host to a declared state.
//!
//! ## Core Concepts
//!
//! - **Status**: what a check found or an apply did, with a severity
//!   [`Level`], messages and per-field [`Diff`]s
//! - **Task**: a resource that can [`Monitor::check`] the host and
//!   [`Task::apply`] the difference
//! - **Resource**: a prepared task with its identity and dependencies, as
//!   the scheduler sees it
//! - **Retrier**: the fixed-interval loop behind wait-style resources
//! - **FieldMap**: the values a resource exports to downstream lookups
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Context, Exported, FieldMap, Monitor, Outcome, Status, Task};
//! use render::Render;
//!
//! #[derive(Debug)]
//! struct Marker { path: std::path::PathBuf }
//!
//! impl Exported for Marker {
//!     fn export(&self, fields: &mut FieldMap) -> Result<(), declarative::ExportError> {
//!         fields.insert("path", self.path.display().to_string())
//!     }
//! }
//!
//! impl Monitor for Marker {
//!     fn check(&mut self, _ctx: &Context, _r: &mut dyn Render) -> Outcome {
//!         let mut status = Status::new();
//!         if !self.path.exists() {
//!             status.add_difference("path", "<absent>", "present", None);
//!             status.raise_level_for_diffs();
//!         }
//!         Ok(status)
//!     }
//! }
//!
//! impl Task for Marker {
//!     fn apply(&mut self, _ctx: &Context) -> Outcome {
//!         std::fs::write(&self.path, b"")?;
//!         Ok(Status::new())
//!     }
//! }
//! ```
//!
//! Check and apply are strictly serialized per resource; separate resources
//! share no mutable state and may run on separate threads.

pub mod context;
pub mod diff;
pub mod duration;
pub mod exported;
pub mod resource;
pub mod retry;
pub mod status;

pub use context::{Context, Interrupt};
pub use diff::Diff;
pub use duration::{DurationError, parse_duration, parse_duration_or};
pub use exported::{ExportError, Exported, FieldMap};
pub use resource::{Dependencies, FailWith, Failure, Monitor, Outcome, Resource, Task, cancelled};
pub use retry::Retrier;
pub use status::{Level, Status, append_status};
