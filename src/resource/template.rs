//! `file.content`: a file holding rendered template content
//!
//! The content is rendered once, when the declaration is prepared.

use super::{Environment, or_absent};
use anyhow::{Context as _, ensure};
use declarative::{
    Context, ExportError, Exported, FailWith, Failure, FieldMap, Monitor, Outcome, Status, Task,
    cancelled,
};
use prepare::{Field, Preparer, Schema};
use render::Render;
use std::fs::{self, OpenOptions, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// Mode of every written file
pub const CONTENT_MODE: u32 = 0o600;

pub fn schema() -> Schema {
    Schema::new()
        .field(Field::new("content"))
        .field(Field::new("destination").required())
}

pub fn prepare(p: &mut Preparer<'_>, _env: &Environment) -> anyhow::Result<Box<dyn Task>> {
    Ok(Box::new(Template {
        content: p.get_or("content", String::new())?,
        destination: PathBuf::from(p.require::<String>("destination")?),
    }))
}

#[derive(Debug)]
pub struct Template {
    content: String,
    destination: PathBuf,
}

impl Template {
    fn diff(&self) -> Outcome {
        let mut status = Status::new();
        if self.destination.is_dir() {
            return Err(Failure::fatal(
                status,
                anyhow::anyhow!("{} is a directory", self.destination.display()),
            ));
        }

        match fs::read(&self.destination) {
            Ok(current) if current == self.content.as_bytes() => {
                status.add_message(format!("{} is up to date", self.destination.display()));
            }
            Ok(current) => status.add_difference(
                "content",
                String::from_utf8_lossy(&current),
                self.content.clone(),
                None,
            ),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                status.add_difference("content", or_absent(None), self.content.clone(), None);
            }
            Err(e) => {
                return Err(Failure::fatal(
                    status,
                    anyhow::Error::new(e)
                        .context(format!("read {}", self.destination.display())),
                ));
            }
        }
        status.raise_level_for_diffs();
        Ok(status)
    }
}

fn write_content(path: &Path, content: &str) -> anyhow::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(CONTENT_MODE)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    // an existing file keeps its mode through open
    fs::set_permissions(path, Permissions::from_mode(CONTENT_MODE))
        .with_context(|| format!("chmod {}", path.display()))?;

    let written = fs::read(path).with_context(|| format!("re-read {}", path.display()))?;
    ensure!(
        written == content.as_bytes(),
        "{} does not hold the rendered content after writing",
        path.display()
    );
    Ok(())
}

impl Exported for Template {
    fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
        fields.insert("content", self.content.clone())?;
        fields.insert("destination", self.destination.display().to_string())
    }
}

impl Monitor for Template {
    fn check(&mut self, _ctx: &Context, _renderer: &mut dyn Render) -> Outcome {
        self.diff()
    }
}

impl Task for Template {
    fn apply(&mut self, ctx: &Context) -> Outcome {
        let status = self.diff()?;
        if !status.has_changes() {
            return Ok(status);
        }
        ctx.check().map_err(|e| cancelled(e, status.clone()))?;

        log::info!("writing {}", self.destination.display());
        write_content(&self.destination, &self.content).fail_with(&status)?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::prepare_json;
    use declarative::Level;
    use render::ModuleRenderer;
    use serde_json::json;

    #[test]
    fn test_writes_rendered_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        let ctx = Context::new();
        let mut renderer = ModuleRenderer::new();
        let mut task = prepare_json(
            &schema(),
            prepare,
            &Environment::default(),
            json!({ "content": "{{ 1 }}", "destination": path }),
        )
        .unwrap();

        let status = task.check(&ctx, &mut renderer).unwrap();
        assert_eq!(status.status_code(), Level::WillChange);
        assert_eq!(status.diffs()["content"].original, "<absent>");

        task.apply(&ctx).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1");
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o600);
        assert!(!task.check(&ctx, &mut renderer).unwrap().has_changes());
    }

    #[test]
    fn test_overwrite_resets_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, Permissions::from_mode(0o644)).unwrap();

        let mut task = prepare_json(
            &schema(),
            prepare,
            &Environment::default(),
            json!({ "content": "new", "destination": path }),
        )
        .unwrap();
        let status = task.check(&Context::new(), &mut ModuleRenderer::new()).unwrap();
        assert_eq!(status.diffs()["content"].original, "old");

        task.apply(&Context::new()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o7777, 0o600);
    }

    #[test]
    fn test_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let failure = prepare_json(
            &schema(),
            prepare,
            &Environment::default(),
            json!({ "content": "x", "destination": dir.path() }),
        )
        .unwrap()
        .check(&Context::new(), &mut ModuleRenderer::new())
        .unwrap_err();
        assert_eq!(failure.level(), Level::Fatal);
    }
}
