//! `unarchive`: unpack an archive into an existing directory
//!
//! The archive is first fetched into a per-source cache entry, then
//! extracted. Existing files in the destination are preserved unless
//! `force` is set.

use super::fetch::Fetch;
use super::{Environment, HASH_TYPES, checksum};
use anyhow::Context as _;
use declarative::{
    Context, ExportError, Exported, FailWith, Failure, FieldMap, Level, Monitor, Outcome, Status,
    Task, append_status, cancelled,
};
use fetchkit::{Checksum, Extractor, Source};
use prepare::{Field, Preparer, Schema};
use render::Render;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub fn schema() -> Schema {
    Schema::new()
        .field(Field::new("source").required())
        .field(Field::new("destination").required())
        .field(Field::new("hash_type").valid_values(HASH_TYPES))
        .field(Field::new("hash"))
        .field(Field::new("force"))
}

pub fn prepare(p: &mut Preparer<'_>, env: &Environment) -> anyhow::Result<Box<dyn Task>> {
    let source: String = p.require("source")?;
    let destination: String = p.require("destination")?;
    let checksum = checksum(p)?;
    let force = p.get_or("force", false)?;

    let parsed = Source::parse(&source)?;
    let cache_path = cache_path(&env.cache_dir, &source, &parsed);
    Ok(Box::new(Unarchive {
        source,
        parsed,
        destination: PathBuf::from(destination),
        checksum,
        force,
        cache_path,
        has_applied: false,
    }))
}

/// `<cache>/<sha256 of source>/<basename>`
pub fn cache_path(cache_dir: &Path, source: &str, parsed: &Source) -> PathBuf {
    let key = hex::encode(Sha256::digest(source.as_bytes()));
    cache_dir.join(key).join(parsed.basename())
}

#[derive(Debug)]
pub struct Unarchive {
    source: String,
    parsed: Source,
    destination: PathBuf,
    checksum: Option<Checksum>,
    force: bool,
    cache_path: PathBuf,
    has_applied: bool,
}

impl Unarchive {
    fn diff(&self) -> Outcome {
        let mut status = Status::new();
        if self.has_applied {
            status.add_message(format!("unarchived {}", self.source));
            return Ok(status);
        }

        if let Source::Path(path) = &self.parsed
            && !path.exists()
        {
            return Err(Failure::cant_change(
                status,
                anyhow::anyhow!("source {:?} does not exist", self.source),
            ));
        }
        if !self.destination.is_dir() {
            return Err(Failure::cant_change(
                status,
                anyhow::anyhow!(
                    "destination {} is not a directory",
                    self.destination.display()
                ),
            ));
        }

        status.add_difference(
            "unarchive",
            self.source.clone(),
            self.destination.display().to_string(),
            None,
        );
        status.raise_level_for_diffs();
        Ok(status)
    }
}

impl Exported for Unarchive {
    fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
        fields.insert("source", self.source.clone())?;
        fields.insert("destination", self.destination.display().to_string())?;
        fields.insert_opt("hash_type", self.checksum.as_ref().map(|c| c.hash_type.to_string()))?;
        fields.insert_opt("hash", self.checksum.as_ref().map(|c| c.hash.clone()))?;
        fields.insert("force", self.force)?;
        fields.insert("cache", self.cache_path.display().to_string())
    }
}

impl Monitor for Unarchive {
    fn check(&mut self, _ctx: &Context, _renderer: &mut dyn Render) -> Outcome {
        self.diff()
    }
}

impl Task for Unarchive {
    fn apply(&mut self, ctx: &Context) -> Outcome {
        let mut status = self.diff()?;
        if status.status_code() < Level::WillChange {
            return Ok(status);
        }

        // a stale cache entry is replaced, a verified one reused
        let mut fetch = Fetch::new(
            self.source.clone(),
            self.cache_path.clone(),
            self.checksum.clone(),
            true,
        );
        match fetch.apply(ctx) {
            Ok(fetched) => append_status(fetched, &mut status),
            Err(mut failure) => {
                append_status(failure.status, &mut status);
                failure.status = status;
                return Err(failure);
            }
        }

        let extractor = Extractor::new(self.force, self.checksum.as_ref().map(|c| c.hash_type));
        let archive = fetch.destination().to_path_buf();
        let destination = self.destination.clone();
        let report = ctx
            .run(move || extractor.extract(&archive, &destination))
            .map_err(|e| cancelled(e, status.clone()))?
            .with_context(|| format!("unpack {}", self.source))
            .fail_with(&status)?;

        status.add_message(format!(
            "unpacked {} into {}: {} created, {} replaced, {} preserved",
            self.source,
            self.destination.display(),
            report.created.len(),
            report.replaced.len(),
            report.preserved.len()
        ));
        self.has_applied = true;
        Ok(status)
    }
}
