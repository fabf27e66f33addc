//! Agent configuration (`agent.toml`)
//!
//! ```toml
//! cache_dir = "/var/run/converge/cache"
//!
//! [systemd]
//! persistent_root = "/etc/systemd"
//! runtime_root = "/run/systemd"
//!
//! [command]
//! interpreter = "/bin/sh"
//! timeout = "5m"
//! ```
//!
//! Every key is optional; a missing file means all defaults.

use crate::paths;
use crate::resource::{DEFAULT_CACHE_DIR, Environment};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use unitkit::enablement::{DEFAULT_PERSISTENT_ROOT, DEFAULT_RUNTIME_ROOT};
use unitkit::{DbusExecutor, EnablementRoots, Executor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub cache_dir: String,
    pub systemd: SystemdConfig,
    pub command: CommandConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SystemdConfig {
    pub persistent_root: String,
    pub runtime_root: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandConfig {
    pub interpreter: String,
    /// Duration string, e.g. `30s` or `1h30m`
    pub timeout: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cache_dir: DEFAULT_CACHE_DIR.to_string(),
            systemd: SystemdConfig::default(),
            command: CommandConfig::default(),
        }
    }
}

impl Default for SystemdConfig {
    fn default() -> Self {
        Self {
            persistent_root: DEFAULT_PERSISTENT_ROOT.to_string(),
            runtime_root: DEFAULT_RUNTIME_ROOT.to_string(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            interpreter: crate::runner::DEFAULT_INTERPRETER.to_string(),
            timeout: None,
        }
    }
}

impl AgentConfig {
    /// Load from `path`, or defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no agent config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve the file per `--config`, `$CONVERGE_CONFIG` or the default
    pub fn discover(flag: Option<&Path>) -> Result<Self> {
        Self::load(&paths::agent_config_file(flag)?)
    }

    /// Collaborators for resources; `systemd` connects to the system bus
    pub fn environment(&self, systemd: bool) -> Result<Environment> {
        let command_timeout = self
            .command
            .timeout
            .as_deref()
            .map(declarative::parse_duration)
            .transpose()
            .context("command.timeout")?;

        let systemd: Option<Arc<dyn Executor>> = if systemd {
            let executor = DbusExecutor::system().context("Could not connect to systemd")?;
            Some(Arc::new(executor))
        } else {
            None
        };

        Ok(Environment {
            systemd,
            enablement: EnablementRoots::new(
                paths::expand(&self.systemd.persistent_root),
                paths::expand(&self.systemd.runtime_root),
            ),
            cache_dir: paths::expand(&self.cache_dir),
            interpreter: Some(paths::expand(&self.command.interpreter).display().to_string()),
            command_timeout,
            ..Environment::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig::load(&dir.path().join("agent.toml")).unwrap();
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.cache_dir, "/var/run/converge/cache");
        assert_eq!(config.systemd.runtime_root, "/run/systemd");
        assert_eq!(config.command.interpreter, "/bin/sh");
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        fs::write(
            &path,
            "cache_dir = \"/tmp/cache\"\n[command]\ntimeout = \"1m30s\"\n",
        )
        .unwrap();

        let config = AgentConfig::load(&path).unwrap();
        assert_eq!(config.cache_dir, "/tmp/cache");
        assert_eq!(config.systemd, SystemdConfig::default());

        let env = config.environment(false).unwrap();
        assert_eq!(env.cache_dir, PathBuf::from("/tmp/cache"));
        assert_eq!(env.command_timeout, Some(Duration::from_secs(90)));
        assert!(env.systemd.is_none());
        assert_eq!(env.enablement.persistent, PathBuf::from("/etc/systemd"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(AgentConfig::parse("cache = \"/tmp\"\n").is_err());
    }

    #[test]
    fn test_bad_timeout() {
        let config = AgentConfig::parse("[command]\ntimeout = \"soon\"\n").unwrap();
        let err = config.environment(false).unwrap_err();
        assert!(err.to_string().contains("command.timeout"));
    }
}
