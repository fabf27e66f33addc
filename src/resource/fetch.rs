//! `file.fetch`: retrieve a file, optionally verified by checksum

use super::{Environment, HASH_TYPES, checksum, or_absent};
use anyhow::Context as _;
use declarative::{
    Context, ExportError, Exported, FailWith, Failure, FieldMap, Level, Monitor, Outcome, Status,
    Task, cancelled,
};
use fetchkit::{Checksum, Fetcher};
use prepare::{Field, Preparer, Schema};
use render::Render;
use std::path::{Path, PathBuf};

pub fn schema() -> Schema {
    Schema::new()
        .field(Field::new("source").required())
        .field(Field::new("destination").required())
        .field(Field::new("hash_type").valid_values(HASH_TYPES))
        .field(Field::new("hash"))
        .field(Field::new("force"))
}

pub fn prepare(p: &mut Preparer<'_>, _env: &Environment) -> anyhow::Result<Box<dyn Task>> {
    let source: String = p.require("source")?;
    let destination: String = p.require("destination")?;
    let checksum = checksum(p)?;
    let force = p.get_or("force", false)?;

    fetchkit::Source::parse(&source)?;
    Ok(Box::new(Fetch::new(
        source,
        PathBuf::from(destination),
        checksum,
        force,
    )))
}

#[derive(Debug)]
pub struct Fetch {
    source: String,
    destination: PathBuf,
    checksum: Option<Checksum>,
    force: bool,
    has_applied: bool,
    fetcher: Fetcher,
}

impl Fetch {
    pub fn new(source: String, destination: PathBuf, checksum: Option<Checksum>, force: bool) -> Self {
        Self {
            source,
            destination,
            checksum,
            force,
            has_applied: false,
            fetcher: Fetcher::new(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Whether a fetch is needed; cant-change outcomes come back as failures
    fn diff(&self) -> Outcome {
        let mut status = Status::new();
        let destination = self.destination.display().to_string();

        if self.has_applied {
            status.add_message("file exists");
            return Ok(status);
        }

        if self.destination.is_dir() {
            return Err(Failure::cant_change(
                status,
                anyhow::anyhow!("invalid destination {destination:?}: is a directory"),
            ));
        }

        if !self.destination.exists() {
            status.add_difference("destination", or_absent(None), destination, None);
            status.raise_level_for_diffs();
            return Ok(status);
        }

        match &self.checksum {
            Some(checksum) => {
                let actual = checksum
                    .hash_type
                    .digest_file(&self.destination)
                    .fail_with(&status)?;
                if actual == checksum.hash {
                    status.add_message("file exists");
                } else if self.force {
                    status.add_difference("checksum", actual, checksum.hash.clone(), None);
                } else {
                    return Err(Failure::cant_change(
                        status,
                        anyhow::anyhow!(
                            "checksum mismatch: {destination} has {actual}, expected {}",
                            checksum.hash
                        ),
                    ));
                }
            }
            None if self.force => {
                status.add_message("force fetch");
                status.add_difference("destination", destination.clone(), destination, None);
            }
            None => status.add_message("file exists"),
        }
        status.raise_level_for_diffs();
        Ok(status)
    }
}

impl Exported for Fetch {
    fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
        fields.insert("source", self.source.clone())?;
        fields.insert("destination", self.destination.display().to_string())?;
        fields.insert_opt("hash_type", self.checksum.as_ref().map(|c| c.hash_type.to_string()))?;
        fields.insert_opt("hash", self.checksum.as_ref().map(|c| c.hash.clone()))?;
        fields.insert("force", self.force)
    }
}

impl Monitor for Fetch {
    fn check(&mut self, _ctx: &Context, _renderer: &mut dyn Render) -> Outcome {
        self.diff()
    }
}

impl Task for Fetch {
    fn apply(&mut self, ctx: &Context) -> Outcome {
        let mut status = self.diff()?;
        if status.status_code() < Level::WillChange {
            return Ok(status);
        }

        let fetcher = self.fetcher.clone();
        let source = self.source.clone();
        let destination = self.destination.clone();
        let checksum = self.checksum.clone();
        ctx.run(move || fetcher.fetch(&source, &destination, checksum.as_ref()))
            .map_err(|e| cancelled(e, status.clone()))?
            .with_context(|| format!("fetch {}", self.source))
            .fail_with(&status)?;

        status.add_message(format!("fetched {}", self.source));
        self.has_applied = true;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::prepare_json;
    use render::ModuleRenderer;
    use serde_json::{Value, json};
    use std::fs;

    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    fn task(fields: Value) -> Box<dyn Task> {
        prepare_json(&schema(), prepare, &Environment::default(), fields).unwrap()
    }

    #[test]
    fn test_fetch_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "hello").unwrap();

        let fields = json!({
            "source": a, "destination": b, "hash_type": "md5", "hash": HELLO_MD5,
        });
        let ctx = Context::new();
        let mut renderer = ModuleRenderer::new();

        let mut first = task(fields.clone());
        let status = first.check(&ctx, &mut renderer).unwrap();
        assert_eq!(status.status_code(), Level::WillChange);
        assert_eq!(status.diffs()["destination"].original, "<absent>");
        first.apply(&ctx).unwrap();
        assert_eq!(fs::read_to_string(&b).unwrap(), "hello");
        let again = first.check(&ctx, &mut renderer).unwrap();
        assert!(!again.has_changes());
        assert_eq!(again.messages(), ["file exists"]);

        let mut second = task(fields);
        let status = second.check(&ctx, &mut renderer).unwrap();
        assert_eq!(status.status_code(), Level::NoChange);
        assert!(status.messages().contains(&"file exists".to_string()));
    }

    #[test]
    fn test_destination_directory_cant_change() {
        let dir = tempfile::tempdir().unwrap();
        let failure = task(json!({ "source": "/etc/hostname", "destination": dir.path() }))
            .check(&Context::new(), &mut ModuleRenderer::new())
            .unwrap_err();
        assert_eq!(failure.level(), Level::CantChange);
    }

    #[test]
    fn test_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "hello").unwrap();
        fs::write(&b, "stale").unwrap();
        let ctx = Context::new();
        let mut renderer = ModuleRenderer::new();

        let failure = task(json!({
            "source": a, "destination": b, "hash_type": "md5", "hash": HELLO_MD5,
        }))
        .check(&ctx, &mut renderer)
        .unwrap_err();
        assert_eq!(failure.level(), Level::CantChange);
        assert!(failure.error.to_string().contains("checksum mismatch"));

        let mut forced = task(json!({
            "source": a, "destination": b, "hash_type": "md5", "hash": HELLO_MD5, "force": true,
        }));
        let status = forced.check(&ctx, &mut renderer).unwrap();
        assert_eq!(status.diffs()["checksum"].current, HELLO_MD5);
        forced.apply(&ctx).unwrap();
        assert_eq!(fs::read_to_string(&b).unwrap(), "hello");
    }

    #[test]
    fn test_existing_without_hash() {
        let dir = tempfile::tempdir().unwrap();
        let b = dir.path().join("b");
        fs::write(&b, "x").unwrap();
        let ctx = Context::new();
        let mut renderer = ModuleRenderer::new();

        let status = task(json!({ "source": "/etc/hostname", "destination": b }))
            .check(&ctx, &mut renderer)
            .unwrap();
        assert_eq!(status.status_code(), Level::NoChange);

        let status = task(json!({ "source": "/etc/hostname", "destination": b, "force": "true" }))
            .check(&ctx, &mut renderer)
            .unwrap();
        assert_eq!(status.status_code(), Level::WillChange);
    }

    #[test]
    fn test_hash_requires_hash_type() {
        let err = prepare_json(
            &schema(),
            prepare,
            &Environment::default(),
            json!({ "source": "/a", "destination": "/b", "hash": HELLO_MD5 }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("hash_type"));
    }

    #[test]
    fn test_invalid_hash_type() {
        let err = prepare_json(
            &schema(),
            prepare,
            &Environment::default(),
            json!({ "source": "/a", "destination": "/b", "hash_type": "crc32", "hash": "x" }),
        )
        .unwrap_err();
        assert!(err.to_string().contains("must be one of"));
    }
}
