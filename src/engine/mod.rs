//! Execution engine for converge
//!
//! The engine walks a plan in order:
//! 1. Preparing - Render and coerce each declaration into a task
//! 2. Checking - Observe the host and report a diff
//! 3. Applying - Converge when asked and the check found changes
//!
//! After each node its exported fields are published for `lookup`.

pub mod differ;
pub mod executor;

pub use differ::{Printer, print_summary};
pub use executor::{ExecuteOptions, execute};
