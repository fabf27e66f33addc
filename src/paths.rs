//! Path resolution for converge
//!
//! # Environment Variables
//!
//! - `CONVERGE_CONFIG` - Agent config file, overridden by `--config`
//!
//! # Path Resolution Priority
//!
//! For agent_config_file():
//! 1. `--config` flag
//! 2. `CONVERGE_CONFIG` environment variable
//! 3. `<config_dir>/converge/agent.toml`, where `<config_dir>` is
//!    `XDG_CONFIG_HOME` or `~/.config` on Linux

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for the agent config file
pub const ENV_CONFIG: &str = "CONVERGE_CONFIG";

/// Config file name under the platform config directory
pub const CONFIG_FILE: &str = "agent.toml";

/// Get the agent config file path
pub fn agent_config_file(flag: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = flag {
        let path = expand(&path.to_string_lossy());
        log::debug!("Using config file from --config: {}", path.display());
        return Ok(path);
    }

    if let Ok(file) = std::env::var(ENV_CONFIG) {
        let path = expand(&file);
        log::debug!("Using config file from {}: {}", ENV_CONFIG, path.display());
        return Ok(path);
    }

    let dir = dirs::config_dir().context("Could not determine config directory")?;
    let path = dir.join("converge").join(CONFIG_FILE);
    log::debug!("Using default config file: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
