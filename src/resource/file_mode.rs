//! `file.mode`: permission bits of an existing file

use super::Environment;
use anyhow::Context as _;
use declarative::{
    Context, ExportError, Exported, FailWith, FieldMap, Monitor, Outcome, Status, Task, cancelled,
};
use prepare::{Field, Preparer, Schema};
use render::Render;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

pub fn schema() -> Schema {
    Schema::new()
        .field(Field::new("destination").required())
        .field(Field::new("mode").required().base(8))
}

pub fn prepare(p: &mut Preparer<'_>, _env: &Environment) -> anyhow::Result<Box<dyn Task>> {
    let destination: String = p.require("destination")?;
    let mode: u32 = p.require("mode")?;
    if mode > 0o7777 {
        anyhow::bail!("mode {mode:o} is out of range");
    }
    Ok(Box::new(FileMode {
        destination: PathBuf::from(destination),
        mode,
        current: None,
    }))
}

#[derive(Debug)]
pub struct FileMode {
    destination: PathBuf,
    mode: u32,
    /// Mode observed by the last check or apply
    current: Option<u32>,
}

impl FileMode {
    fn diff(&mut self) -> Outcome {
        let mut status = Status::new();
        let meta = fs::metadata(&self.destination)
            .with_context(|| format!("stat {}", self.destination.display()))
            .fail_with(&status)?;
        let current = meta.permissions().mode() & 0o7777;
        self.current = Some(current);

        if current == self.mode {
            status.add_message(format!("{} has mode {:o}", self.destination.display(), current));
        } else {
            status.add_difference("mode", format!("{current:o}"), format!("{:o}", self.mode), None);
        }
        status.raise_level_for_diffs();
        Ok(status)
    }
}

impl Exported for FileMode {
    fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
        fields.insert("destination", self.destination.display().to_string())?;
        fields.insert("mode", format!("{:o}", self.mode))?;
        fields.insert_opt("status", self.current.map(|m| format!("{m:o}")))
    }
}

impl Monitor for FileMode {
    fn check(&mut self, _ctx: &Context, _renderer: &mut dyn Render) -> Outcome {
        self.diff()
    }
}

impl Task for FileMode {
    fn apply(&mut self, ctx: &Context) -> Outcome {
        let status = self.diff()?;
        if !status.has_changes() {
            return Ok(status);
        }
        ctx.check().map_err(|e| cancelled(e, status.clone()))?;

        log::info!("chmod {:o} {}", self.mode, self.destination.display());
        fs::set_permissions(&self.destination, fs::Permissions::from_mode(self.mode))
            .with_context(|| format!("chmod {}", self.destination.display()))
            .fail_with(&status)?;
        self.current = Some(self.mode);
        Ok(status)
    }
}
