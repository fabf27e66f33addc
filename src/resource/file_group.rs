//! `file.group`: the group owning a file

use super::Environment;
use crate::accounts::{GroupEntry, SystemUtils};
use anyhow::{Context as _, bail};
use declarative::{
    Context, ExportError, Exported, FailWith, Failure, FieldMap, Monitor, Outcome, Status, Task,
    cancelled,
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
        .field(Field::new("group"))
        .field(Field::new("gid"))
        .exclusive(&["group", "gid"])
}

pub fn prepare(p: &mut Preparer<'_>, env: &Environment) -> anyhow::Result<Box<dyn Task>> {
    let destination: String = p.require("destination")?;
    let group: Option<String> = p.get("group")?;
    let gid: Option<u32> = p.get("gid")?;

    let group = match (group, gid) {
        (Some(name), _) => env
            .accounts
            .lookup_group(&name)?
            .with_context(|| format!("group {name:?} does not exist"))?,
        (None, Some(gid)) => env
            .accounts
            .lookup_group_id(gid)?
            .with_context(|| format!("gid {gid} does not exist"))?,
        (None, None) => bail!("one of \"group\" or \"gid\" is required"),
    };

    Ok(Box::new(FileGroup {
        destination: PathBuf::from(destination),
        group,
        current: None,
        accounts: Arc::clone(&env.accounts),
    }))
}

#[derive(Debug)]
pub struct FileGroup {
    destination: PathBuf,
    group: GroupEntry,
    current: Option<GroupEntry>,
    accounts: Arc<dyn SystemUtils>,
}

impl FileGroup {
    /// Status plus the file's current uid, kept on chown
    fn diff(&mut self) -> Result<(Status, u32), Failure> {
        let mut status = Status::new();
        let meta = fs::metadata(&self.destination)
            .with_context(|| format!("stat {}", self.destination.display()))
            .fail_with(&status)?;

        let gid = meta.gid();
        let name = self
            .accounts
            .lookup_group_id(gid)
            .fail_with(&status)?
            .map_or_else(|| gid.to_string(), |g| g.name);
        self.current = Some(GroupEntry {
            name: name.clone(),
            gid,
        });

        if gid != self.group.gid {
            status.add_difference("group", name, self.group.name.clone(), None);
        }
        status.raise_level_for_diffs();
        Ok((status, meta.uid()))
    }
}

impl Exported for FileGroup {
    fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
        fields.insert("destination", self.destination.display().to_string())?;
        fields.insert("group", self.group.name.clone())?;
        fields.insert("gid", self.group.gid)?;
        fields.insert_opt("current_group", self.current.as_ref().map(|g| g.name.clone()))
    }
}

impl Monitor for FileGroup {
    fn check(&mut self, _ctx: &Context, _renderer: &mut dyn Render) -> Outcome {
        self.diff().map(|(status, _)| status)
    }
}

impl Task for FileGroup {
    fn apply(&mut self, ctx: &Context) -> Outcome {
        let (status, uid) = self.diff()?;
        if !status.has_changes() {
            return Ok(status);
        }
        ctx.check().map_err(|e| cancelled(e, status.clone()))?;

        log::info!("chgrp {} {}", self.group.name, self.destination.display());
        self.accounts
            .chown(&self.destination, uid, self.group.gid)
            .fail_with(&status)?;
        self.current = Some(self.group.clone());
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::fake::FakeAccounts;
    use crate::resource::testing::prepare_json;
    use declarative::Level;
    use render::ModuleRenderer;
    use serde_json::json;

    fn file_with_gid() -> (tempfile::TempDir, PathBuf, u32) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grouped");
        fs::write(&path, "").unwrap();
        let gid = fs::metadata(&path).unwrap().gid();
        (dir, path, gid)
    }

    #[test]
    fn test_group_check() {
        let (_dir, path, gid) = file_with_gid();
        let env = Environment {
            accounts: Arc::new(
                FakeAccounts::new()
                    .with_group("mine", gid)
                    .with_group("theirs", gid + 1),
            ),
            ..Environment::default()
        };
        let ctx = Context::new();
        let mut renderer = ModuleRenderer::new();

        let mut same =
            prepare_json(&schema(), prepare, &env, json!({ "destination": path, "gid": gid }))
                .unwrap();
        assert_eq!(
            same.check(&ctx, &mut renderer).unwrap().status_code(),
            Level::NoChange
        );

        let mut other = prepare_json(
            &schema(),
            prepare,
            &env,
            json!({ "destination": path, "group": "theirs" }),
        )
        .unwrap();
        let status = other.check(&ctx, &mut renderer).unwrap();
        assert_eq!(status.status_code(), Level::WillChange);
        assert_eq!(status.diffs()["group"].original, "mine");
        assert_eq!(status.diffs()["group"].current, "theirs");
    }

    #[test]
    fn test_group_apply_keeps_owner() {
        let (_dir, path, gid) = file_with_gid();
        let uid = fs::metadata(&path).unwrap().uid();
        let accounts = Arc::new(
            FakeAccounts::new()
                .with_group("mine", gid)
                .with_group("theirs", gid + 1),
        );
        let env = Environment {
            accounts: accounts.clone(),
            ..Environment::default()
        };
        let mut task = prepare_json(
            &schema(),
            prepare,
            &env,
            json!({ "destination": path, "group": "theirs" }),
        )
        .unwrap();

        let status = task.apply(&Context::new()).unwrap();
        assert!(status.has_changes());
        assert_eq!(
            accounts.calls(),
            [format!("chown {uid}:{} {}", gid + 1, path.display())]
        );
    }

    #[test]
    fn test_unknown_group_fails_prepare() {
        let env = Environment {
            accounts: Arc::new(FakeAccounts::new()),
            ..Environment::default()
        };
        let err = prepare_json(
            &schema(),
            prepare,
            &env,
            json!({ "destination": "/tmp/x", "gid": 4242 }),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "gid 4242 does not exist");
    }
}
