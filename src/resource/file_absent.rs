//! `file.absent`: a path that must not exist
//!
//! Files and symlinks are unlinked. Directories are refused.

use super::Environment;
use anyhow::Context as _;
use declarative::{
    Context, ExportError, Exported, FailWith, Failure, FieldMap, Monitor, Outcome, Status, Task,
    cancelled,
};
use prepare::{Field, Preparer, Schema};
use render::Render;
use std::fs;
use std::path::PathBuf;

pub fn schema() -> Schema {
    Schema::new().field(Field::new("destination").required())
}

pub fn prepare(p: &mut Preparer<'_>, _env: &Environment) -> anyhow::Result<Box<dyn Task>> {
    let destination: String = p.require("destination")?;
    Ok(Box::new(FileAbsent {
        destination: PathBuf::from(destination),
        present: None,
    }))
}

#[derive(Debug)]
pub struct FileAbsent {
    destination: PathBuf,
    present: Option<bool>,
}

impl FileAbsent {
    fn diff(&mut self) -> Outcome {
        let mut status = Status::new();
        // a dangling symlink still counts as present
        let meta = fs::symlink_metadata(&self.destination).ok();
        self.present = Some(meta.is_some());
        match meta {
            Some(meta) if meta.is_dir() => {
                return Err(Failure::cant_change(
                    status,
                    anyhow::anyhow!("{} is a directory", self.destination.display()),
                ));
            }
            Some(_) => status.add_difference(
                self.destination.display().to_string(),
                "absent",
                "present",
                None,
            ),
            None => status.add_message(format!("{} does not exist", self.destination.display())),
        }
        status.raise_level_for_diffs();
        Ok(status)
    }
}

impl Exported for FileAbsent {
    fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
        fields.insert("destination", self.destination.display().to_string())?;
        fields.insert_opt("present", self.present)
    }
}

impl Monitor for FileAbsent {
    fn check(&mut self, _ctx: &Context, _renderer: &mut dyn Render) -> Outcome {
        self.diff()
    }
}

impl Task for FileAbsent {
    fn apply(&mut self, ctx: &Context) -> Outcome {
        let status = self.diff()?;
        if !status.has_changes() {
            return Ok(status);
        }
        ctx.check().map_err(|e| cancelled(e, status.clone()))?;

        let path = &self.destination;
        log::info!("removing {}", path.display());
        fs::remove_file(path)
            .with_context(|| format!("remove {}", path.display()))
            .fail_with(&status)?;

        self.present = Some(false);
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

    fn task(destination: &std::path::Path) -> Box<dyn Task> {
        prepare_json(
            &schema(),
            prepare,
            &Environment::default(),
            json!({ "destination": destination }),
        )
        .unwrap()
    }

    #[test]
    fn test_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone");
        fs::write(&path, "x").unwrap();

        let ctx = Context::new();
        let mut renderer = ModuleRenderer::new();
        let mut task = task(&path);

        let status = task.check(&ctx, &mut renderer).unwrap();
        assert_eq!(status.status_code(), Level::WillChange);
        let diff = &status.diffs()[&path.display().to_string()];
        assert_eq!((diff.original.as_str(), diff.current.as_str()), ("absent", "present"));

        task.apply(&ctx).unwrap();
        assert!(!path.exists());
        assert!(!task.check(&ctx, &mut renderer).unwrap().has_changes());
    }

    #[test]
    fn test_directory_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree");
        fs::create_dir_all(path.join("a")).unwrap();

        let failure = task(&path).apply(&Context::new()).unwrap_err();
        assert_eq!(failure.level(), Level::CantChange);
        assert!(path.join("a").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_unlinks_dangling_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(dir.path().join("missing"), &link).unwrap();

        task(&link).apply(&Context::new()).unwrap();
        assert!(fs::symlink_metadata(&link).is_err());
    }

    #[test]
    fn test_absent_path_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let status = task(&dir.path().join("never"))
            .apply(&Context::new())
            .unwrap();
        assert_eq!(status.status_code(), Level::NoChange);
    }
}
