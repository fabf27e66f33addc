//! Structural enablement: whether a unit is wired into a systemd tree
//!
//! The `UnitFileState` property only distinguishes a handful of coarse
//! states, so enablement is read from the filesystem instead. A unit counts
//! as enabled under a root when the root contains an entry named after the
//! unit, or a symlink that resolves to the file the unit was loaded from.

use crate::unit::Unit;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const DEFAULT_PERSISTENT_ROOT: &str = "/etc/systemd";
pub const DEFAULT_RUNTIME_ROOT: &str = "/run/systemd";

/// Current enablement of one unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Enablement {
    pub persistent: bool,
    pub runtime: bool,
}

/// The two trees searched for enablement links
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnablementRoots {
    pub persistent: PathBuf,
    pub runtime: PathBuf,
}

impl Default for EnablementRoots {
    fn default() -> Self {
        Self {
            persistent: PathBuf::from(DEFAULT_PERSISTENT_ROOT),
            runtime: PathBuf::from(DEFAULT_RUNTIME_ROOT),
        }
    }
}

impl EnablementRoots {
    pub fn new(persistent: impl Into<PathBuf>, runtime: impl Into<PathBuf>) -> Self {
        Self {
            persistent: persistent.into(),
            runtime: runtime.into(),
        }
    }

    pub fn status(&self, unit: &Unit) -> Enablement {
        Enablement {
            persistent: is_enabled_under(&self.persistent, unit),
            runtime: is_enabled_under(&self.runtime, unit),
        }
    }
}

/// Walk `root` looking for the unit's name or a link to its fragment
pub fn is_enabled_under(root: &Path, unit: &Unit) -> bool {
    let fragment = unit.fragment_path().and_then(|p| fs::canonicalize(p).ok());

    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if entry.file_name() == unit.name.as_str() {
            log::trace!("{} enabled via {}", unit.name, entry.path().display());
            return true;
        }
        if let Some(fragment) = &fragment
            && entry.path_is_symlink()
            && fs::canonicalize(entry.path()).is_ok_and(|target| target == *fragment)
        {
            log::trace!("{} enabled via link {}", unit.name, entry.path().display());
            return true;
        }
    }
    false
}
