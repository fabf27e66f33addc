//! # Unitkit
//!
//! Query and drive systemd units.
//!
//! The [`Executor`] trait is the seam between resources and the service
//! manager; [`DbusExecutor`] implements it over the system bus. Enablement
//! is read structurally from the unit trees by [`EnablementRoots`].
//!
//! ```ignore
//! use unitkit::{DbusExecutor, Executor};
//!
//! let systemd = DbusExecutor::system()?;
//! let unit = systemd.query_unit("nginx.service", true)?;
//! if unit.active_state != "active" {
//!     systemd.start_unit(&unit)?;
//! }
//! ```

pub mod dbus;
pub mod enablement;
pub mod error;
pub mod executor;
pub mod signal;
pub mod unit;

pub use dbus::DbusExecutor;
pub use enablement::{Enablement, EnablementRoots, is_enabled_under};
pub use error::{Error, Result};
pub use executor::{Change, ChangeType, Executor, job_result};
pub use signal::Signal;
pub use unit::{Unit, UnitType, canonical_name, failure_phrase};
