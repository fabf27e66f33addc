//! `file.owner`: the user owning a file

use super::Environment;
use crate::accounts::{SystemUtils, UserEntry};
use anyhow::{Context as _, bail};
use declarative::{
    Context, ExportError, Exported, FailWith, Failure, FieldMap, Monitor, Outcome, Status, Task, cancelled,
};
use prepare::{Field, Preparer, Schema};
use render::Render;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::sync::Arc;

pub fn schema() -> Schema {
    Schema::new()
        .field(Field::new("destination").required())
        .field(Field::new("owner"))
        .field(Field::new("uid"))
        .exclusive(&["owner", "uid"])
}

pub fn prepare(p: &mut Preparer<'_>, env: &Environment) -> anyhow::Result<Box<dyn Task>> {
    let destination: String = p.require("destination")?;
    let owner: Option<String> = p.get("owner")?;
    let uid: Option<u32> = p.get("uid")?;

    let user = match (owner, uid) {
        (Some(name), _) => env
            .accounts
            .lookup_user(&name)?
            .with_context(|| format!("user {name:?} does not exist"))?,
        (None, Some(uid)) => env
            .accounts
            .lookup_user_id(uid)?
            .with_context(|| format!("uid {uid} does not exist"))?,
        (None, None) => bail!("one of \"owner\" or \"uid\" is required"),
    };

    Ok(Box::new(FileOwner {
        destination: PathBuf::from(destination),
        user,
        current: None,
        accounts: Arc::clone(&env.accounts),
    }))
}

#[derive(Debug)]
pub struct FileOwner {
    destination: PathBuf,
    user: UserEntry,
    /// Owner observed by the last check, by name when it resolves
    current: Option<(u32, String)>,
    accounts: Arc<dyn SystemUtils>,
}

impl FileOwner {
    fn diff(&mut self) -> Result<Status, Failure> {
        let mut status = Status::new();
        let meta = fs::metadata(&self.destination)
            .with_context(|| format!("stat {}", self.destination.display()))
            .fail_with(&status)?;

        let uid = meta.uid();
        let name = self
            .accounts
            .lookup_user_id(uid)
            .fail_with(&status)?
            .map_or_else(|| uid.to_string(), |u| u.name);
        self.current = Some((uid, name.clone()));

        if uid == self.user.uid {
            status.add_message(format!("{} is owned by {name}", self.destination.display()));
        } else {
            status.add_difference("user", name, self.user.name.clone(), None);
            status.add_difference("uid", uid.to_string(), self.user.uid.to_string(), None);
        }
        let gid = meta.gid();
        if gid != self.user.gid {
            status.add_difference("gid", gid.to_string(), self.user.gid.to_string(), None);
        }
        status.raise_level_for_diffs();
        Ok(status)
    }
}

impl Exported for FileOwner {
    fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
        fields.insert("destination", self.destination.display().to_string())?;
        fields.insert("username", self.user.name.clone())?;
        fields.insert("uid", self.user.uid)?;
        fields.insert("gid", self.user.gid)?;
        fields.insert_opt("current_username", self.current.as_ref().map(|(_, n)| n.clone()))?;
        fields.insert_opt("current_uid", self.current.as_ref().map(|(u, _)| *u))
    }
}

impl Monitor for FileOwner {
    fn check(&mut self, _ctx: &Context, _renderer: &mut dyn Render) -> Outcome {
        self.diff()
    }
}

impl Task for FileOwner {
    fn apply(&mut self, ctx: &Context) -> Outcome {
        let status = self.diff()?;
        if !status.has_changes() {
            return Ok(status);
        }
        ctx.check().map_err(|e| cancelled(e, status.clone()))?;

        log::info!("chown {} {}", self.user.name, self.destination.display());
        self.accounts
            .chown(&self.destination, self.user.uid, self.user.gid)
            .fail_with(&status)?;
        self.current = Some((self.user.uid, self.user.name.clone()));
        Ok(status)
    }
}
