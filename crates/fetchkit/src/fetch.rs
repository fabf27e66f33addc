//! Retrieving a source into a destination file

use crate::error::{Error, Result};
use crate::hash::Checksum;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Largest body accepted from an HTTP source
const MAX_DOWNLOAD_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Where an artifact comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Http(String),
    Path(PathBuf),
}

impl Source {
    /// `http://` and `https://` URLs, `file://` URLs and bare paths
    pub fn parse(source: &str) -> Result<Self> {
        if source.starts_with("http://") || source.starts_with("https://") {
            return Ok(Self::Http(source.to_string()));
        }
        if let Some(path) = source.strip_prefix("file://") {
            return Ok(Self::Path(PathBuf::from(path)));
        }
        if let Some((scheme, _)) = source.split_once("://") {
            return Err(Error::UnsupportedScheme(scheme.to_string()));
        }
        Ok(Self::Path(PathBuf::from(source)))
    }

    /// Final path component, used to name cached copies
    pub fn basename(&self) -> String {
        let name = match self {
            Self::Http(url) => url
                .split(['?', '#'])
                .next()
                .and_then(|u| u.trim_end_matches('/').rsplit('/').next())
                .unwrap_or_default()
                .to_string(),
            Self::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        if name.is_empty() {
            "download".to_string()
        } else {
            name
        }
    }
}

/// Fetches sources with post-download checksum verification
///
/// The body lands in a temporary file next to the destination and is
/// renamed into place only once it verifies, so a failed or interrupted
/// fetch never leaves a half-written destination behind.
#[derive(Debug, Clone)]
pub struct Fetcher {
    agent: ureq::Agent,
    user_agent: String,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            user_agent: concat!("converge/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    pub fn fetch(&self, source: &str, destination: &Path, checksum: Option<&Checksum>) -> Result<()> {
        let source = Source::parse(source)?;
        let parent = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

        let mut staged = tempfile::Builder::new()
            .prefix(".fetch-")
            .tempfile_in(parent)
            .map_err(|e| Error::io(parent, e))?;

        match &source {
            Source::Http(url) => {
                log::info!("downloading {url}");
                let mut response = self
                    .agent
                    .get(url)
                    .header("User-Agent", &self.user_agent)
                    .call()?;
                let mut body = response
                    .body_mut()
                    .with_config()
                    .limit(MAX_DOWNLOAD_SIZE)
                    .reader();
                io::copy(&mut body, staged.as_file_mut()).map_err(|e| Error::io(staged.path(), e))?;
            }
            Source::Path(path) => {
                log::info!("copying {}", path.display());
                let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
                io::copy(&mut file, staged.as_file_mut()).map_err(|e| Error::io(staged.path(), e))?;
            }
        }
        staged
            .as_file()
            .sync_all()
            .map_err(|e| Error::io(staged.path(), e))?;

        if let Some(checksum) = checksum {
            checksum.verify_file(staged.path())?;
            log::debug!("{} verified ({})", destination.display(), checksum.hash_type);
        }

        staged
            .persist(destination)
            .map_err(|e| Error::io(destination, e.error))?;
        Ok(())
    }
}
