//! Resource implementations
//!
//! Every resource type has:
//! - a [`Schema`](prepare::Schema) describing its declaration
//! - a `prepare` function that coerces a declaration into a task
//! - a [`Task`](declarative::Task) implementation (check + apply)
//!
//! Collaborators that reach outside the process (user databases, systemd,
//! TCP dials) arrive through the [`Environment`] so tests can swap them.

use crate::accounts::{System, SystemUtils};
use anyhow::{Result, bail};
use fetchkit::{Checksum, HashType};
use prepare::Preparer;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use unitkit::{EnablementRoots, Executor};

pub mod fetch;
pub mod file_absent;
pub mod file_group;
pub mod file_mode;
pub mod file_owner;
pub mod group;
pub mod port;
pub mod query;
pub mod shell;
pub mod template;
pub mod unarchive;
pub mod unit;
pub mod user;
pub mod wait;

pub use port::{ConnectionCheck, TcpConnectionCheck};

/// Default cache for fetched artifacts
pub const DEFAULT_CACHE_DIR: &str = "/var/run/converge/cache";

/// Hash types accepted by `hash_type` fields
pub const HASH_TYPES: &[&str] = &["md5", "sha1", "sha256", "sha512"];

/// Host collaborators shared by every resource
#[derive(Clone)]
pub struct Environment {
    pub accounts: Arc<dyn SystemUtils>,
    /// Present only when the plan manages systemd units
    pub systemd: Option<Arc<dyn Executor>>,
    pub enablement: EnablementRoots,
    pub cache_dir: PathBuf,
    /// Interpreter used when a shell resource names none
    pub interpreter: Option<String>,
    /// Timeout used when a shell resource sets none
    pub command_timeout: Option<Duration>,
    pub connector: Arc<dyn ConnectionCheck>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            accounts: Arc::new(System),
            systemd: None,
            enablement: EnablementRoots::default(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            interpreter: None,
            command_timeout: None,
            connector: Arc::new(TcpConnectionCheck::default()),
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("accounts", &self.accounts)
            .field("systemd", &self.systemd.is_some())
            .field("enablement", &self.enablement)
            .field("cache_dir", &self.cache_dir)
            .field("interpreter", &self.interpreter)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

/// Whether an account should exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum State {
    #[default]
    Present,
    Absent,
}

pub const STATES: &[&str] = &["present", "absent"];

impl TryFrom<String> for State {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            _ => Err(value),
        }
    }
}

prepare::from_raw_via!(State, String);

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Present => "present",
            Self::Absent => "absent",
        })
    }
}

/// `hash_type` and `hash` must be set together
pub(crate) fn checksum(p: &mut Preparer<'_>) -> Result<Option<Checksum>> {
    let hash_type: Option<String> = p.get("hash_type")?;
    let hash: Option<String> = p.get("hash")?;
    match (hash_type, hash) {
        (None, None) => Ok(None),
        (Some(hash_type), Some(hash)) => {
            let hash_type: HashType = hash_type.parse()?;
            Ok(Some(Checksum::new(hash_type, &hash)?))
        }
        (Some(_), None) => bail!("\"hash\" is required when \"hash_type\" is set"),
        (None, Some(_)) => bail!("\"hash_type\" is required when \"hash\" is set"),
    }
}

/// Display form of an optional path-like value
pub(crate) fn or_absent(value: Option<&str>) -> String {
    value.map_or_else(|| "<absent>".to_string(), str::to_string)
}
