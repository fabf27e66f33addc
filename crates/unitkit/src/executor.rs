//! The operations the unit resource needs from systemd

use crate::error::{Error, Result};
use crate::signal::Signal;
use crate::unit::Unit;
use serde::Serialize;
use std::fmt;

/// Kind of symlink change made while (dis)enabling a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Link,
    Unlink,
}

impl ChangeType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "symlink" | "link" => Some(Self::Link),
            "unlink" => Some(Self::Unlink),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Link => "link",
            Self::Unlink => "unlink",
        })
    }
}

/// One symlink created or removed by enable/disable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub kind: ChangeType,
    pub filename: String,
    pub destination: String,
}

/// Access to the service manager
///
/// Start, stop, restart and reload block until systemd reports the job as
/// finished.
pub trait Executor: Send + Sync {
    /// Every loaded unit with its global and typed properties
    fn list_units(&self) -> Result<Vec<Unit>>;

    /// Find a unit by name
    ///
    /// With `verify` a missing unit is an error; without it a placeholder
    /// whose active state is `unknown` is returned.
    fn query_unit(&self, name: &str, verify: bool) -> Result<Unit> {
        match self.list_units()?.into_iter().find(|u| u.name == name) {
            Some(unit) => Ok(unit),
            None if verify => Err(Error::UnitNotFound(name.to_string())),
            None => {
                log::debug!("unit {name} not loaded, assuming unknown state");
                Ok(Unit::unknown(name))
            }
        }
    }

    fn start_unit(&self, unit: &Unit) -> Result<()>;

    fn stop_unit(&self, unit: &Unit) -> Result<()>;

    fn restart_unit(&self, unit: &Unit) -> Result<()>;

    fn reload_unit(&self, unit: &Unit) -> Result<()>;

    /// Deliver `signal` to every process of the unit without waiting
    fn send_signal(&self, unit: &Unit, signal: Signal) -> Result<()>;

    /// Returns whether the unit carried install hooks and the symlinks made
    fn enable_unit(&self, unit: &Unit, runtime: bool, force: bool) -> Result<(bool, Vec<Change>)>;

    fn disable_unit(&self, unit: &Unit, runtime: bool) -> Result<Vec<Change>>;
}

/// Translate the result word of a finished job
pub fn job_result(verb: &'static str, unit: &str, result: &str) -> Result<()> {
    match result {
        "done" | "skipped" => Ok(()),
        "canceled" | "timeout" | "failed" | "dependency" => Err(Error::Job {
            verb,
            unit: unit.to_string(),
            result: result.to_string(),
        }),
        other => Err(Error::UnknownJobStatus(other.to_string())),
    }
}
