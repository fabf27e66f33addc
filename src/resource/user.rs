//! `user.user`: a local user account, present or absent
//!
//! A present user that already exists is modified in place when its uid,
//! primary group, comment or home directory drift from the declaration.

use super::{Environment, STATES, State};
use crate::accounts::{SystemUtils, UserEntry, UserOptions};
use anyhow::Context as _;
use declarative::{
    Context, ExportError, Exported, FailWith, Failure, FieldMap, Monitor, Outcome, Status, Task,
    cancelled,
};
use prepare::{Field, Preparer, Schema};
use render::Render;
use std::path::PathBuf;
use std::sync::Arc;

pub fn schema() -> Schema {
    Schema::new()
        .field(Field::new("username").required())
        .field(Field::new("uid"))
        .field(Field::new("group"))
        .field(Field::new("gid"))
        .field(Field::new("name"))
        .field(Field::new("home_dir"))
        .field(Field::new("create_home"))
        .field(Field::new("move_dir"))
        .field(Field::new("state").valid_values(STATES))
        .exclusive(&["group", "gid"])
}

pub fn prepare(p: &mut Preparer<'_>, env: &Environment) -> anyhow::Result<Box<dyn Task>> {
    let home_dir: Option<String> = p.get("home_dir")?;
    Ok(Box::new(User {
        username: p.require("username")?,
        uid: p.get("uid")?,
        group: p.get("group")?,
        gid: p.get("gid")?,
        comment: p.get("name")?,
        home_dir: home_dir.map(PathBuf::from),
        create_home: p.get_or("create_home", false)?,
        move_dir: p.get_or("move_dir", false)?,
        state: p.get_or("state", State::Present)?,
        accounts: Arc::clone(&env.accounts),
    }))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Plan {
    Unchanged(String),
    Add,
    Modify(UserOptions),
    Delete,
    Refuse { fatal: bool, reason: String },
}

#[derive(Debug)]
pub struct User {
    username: String,
    uid: Option<u32>,
    group: Option<String>,
    gid: Option<u32>,
    comment: Option<String>,
    home_dir: Option<PathBuf>,
    create_home: bool,
    move_dir: bool,
    state: State,
    accounts: Arc<dyn SystemUtils>,
}

impl User {
    fn description(&self) -> String {
        match self.uid {
            Some(uid) => format!("user {} with uid {uid}", self.username),
            None => format!("user {}", self.username),
        }
    }

    /// The declared primary group as given, for `useradd -g`
    fn group_arg(&self) -> Option<String> {
        self.group
            .clone()
            .or_else(|| self.gid.map(|gid| gid.to_string()))
    }

    fn add_options(&self) -> UserOptions {
        UserOptions {
            uid: self.uid,
            group: self.group_arg(),
            comment: self.comment.clone(),
            home: self.home_dir.clone(),
            create_home: self.create_home,
            move_home: false,
        }
    }

    /// Options covering only the attributes that drifted
    fn modify_options(&self, current: &UserEntry, gid: Option<u32>) -> UserOptions {
        let mut options = UserOptions::default();
        if let Some(uid) = self.uid.filter(|uid| *uid != current.uid) {
            options.uid = Some(uid);
        }
        if gid.is_some_and(|gid| gid != current.gid) {
            options.group = self.group_arg();
        }
        if let Some(comment) = self.comment.as_ref().filter(|c| **c != current.comment) {
            options.comment = Some(comment.clone());
        }
        if let Some(home) = self.home_dir.as_ref().filter(|h| **h != current.home) {
            options.home = Some(home.clone());
            options.move_home = self.move_dir;
        }
        options
    }

    fn plan(
        &self,
        by_name: Option<&UserEntry>,
        by_uid: Option<&UserEntry>,
        gid: Option<u32>,
    ) -> Plan {
        let name = &self.username;
        let refuse = |fatal, reason: String| Plan::Refuse { fatal, reason };
        let present = |current: &UserEntry| {
            let options = self.modify_options(current, gid);
            if options == UserOptions::default() {
                Plan::Unchanged(format!("user {name} already exists"))
            } else {
                Plan::Modify(options)
            }
        };

        match (self.state, by_name, self.uid, by_uid) {
            (_, None, Some(uid), Some(other)) => refuse(
                true,
                format!("uid {uid} already belongs to user {}", other.name),
            ),
            (_, Some(a), Some(uid), Some(b)) if a.name != b.name => refuse(
                false,
                format!("user {name} and uid {uid} refer to different users"),
            ),
            (State::Present, None, _, _) => Plan::Add,
            (State::Present, Some(current), _, _) => present(current),
            (State::Absent, None, _, _) => Plan::Unchanged(format!("user {name} does not exist")),
            (State::Absent, Some(current), Some(uid), None) => refuse(
                true,
                format!("user {name} exists with uid {}, not {uid}", current.uid),
            ),
            (State::Absent, Some(_), _, _) => Plan::Delete,
        }
    }

    fn diff(&self) -> Result<(Status, Plan), Failure> {
        let mut status = Status::new();

        let gid = match (&self.group, self.gid) {
            (Some(group), _) => match self.accounts.lookup_group(group).fail_with(&status)? {
                Some(entry) => Some(entry.gid),
                None => {
                    return Err(Failure::cant_change(
                        status,
                        anyhow::anyhow!("group {group} does not exist"),
                    ));
                }
            },
            (None, Some(gid)) => match self.accounts.lookup_group_id(gid).fail_with(&status)? {
                Some(entry) => Some(entry.gid),
                None => {
                    return Err(Failure::cant_change(
                        status,
                        anyhow::anyhow!("group gid {gid} does not exist"),
                    ));
                }
            },
            (None, None) => None,
        };

        let by_name = self
            .accounts
            .lookup_user(&self.username)
            .fail_with(&status)?;
        let by_uid = match self.uid {
            Some(uid) => self.accounts.lookup_user_id(uid).fail_with(&status)?,
            None => None,
        };

        let plan = self.plan(by_name.as_ref(), by_uid.as_ref(), gid);
        match &plan {
            Plan::Unchanged(message) => status.add_message(message.clone()),
            Plan::Add => status.add_difference("user", "absent", self.description(), None),
            Plan::Delete => status.add_difference("user", self.description(), "absent", None),
            Plan::Modify(options) => {
                let Some(current) = by_name.as_ref() else {
                    return Err(Failure::fatal(status, anyhow::anyhow!("user vanished")));
                };
                if let Some(uid) = options.uid {
                    status.add_difference("uid", current.uid.to_string(), uid.to_string(), None);
                }
                if let (Some(_), Some(gid)) = (&options.group, gid) {
                    status.add_difference("gid", current.gid.to_string(), gid.to_string(), None);
                }
                if let Some(comment) = &options.comment {
                    status.add_difference("comment", current.comment.clone(), comment.clone(), None);
                }
                if let Some(home) = &options.home {
                    status.add_difference(
                        "home_dir",
                        current.home.display().to_string(),
                        home.display().to_string(),
                        None,
                    );
                }
            }
            Plan::Refuse { .. } => {}
        }
        status.raise_level_for_diffs();
        Ok((status, plan))
    }
}

impl Exported for User {
    fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
        fields.insert("username", self.username.clone())?;
        fields.insert_opt("uid", self.uid)?;
        fields.insert_opt("group", self.group.clone())?;
        fields.insert_opt("gid", self.gid)?;
        fields.insert_opt("name", self.comment.clone())?;
        fields.insert_opt("home_dir", self.home_dir.as_ref().map(|h| h.display().to_string()))?;
        fields.insert("create_home", self.create_home)?;
        fields.insert("move_dir", self.move_dir)?;
        fields.insert("state", self.state.to_string())
    }
}

impl Monitor for User {
    fn check(&mut self, _ctx: &Context, _renderer: &mut dyn Render) -> Outcome {
        match self.diff()? {
            (status, Plan::Refuse { fatal: true, reason }) => {
                Err(Failure::fatal(status, anyhow::anyhow!(reason)))
            }
            (status, Plan::Refuse { fatal: false, reason }) => {
                Err(Failure::cant_change(status, anyhow::anyhow!(reason)))
            }
            (status, _) => Ok(status),
        }
    }
}

impl Task for User {
    fn apply(&mut self, ctx: &Context) -> Outcome {
        let (status, plan) = self.diff()?;
        ctx.check().map_err(|e| cancelled(e, status.clone()))?;

        let name = &self.username;
        match plan {
            Plan::Unchanged(_) => return Ok(status),
            Plan::Add => {
                log::info!("adding {}", self.description());
                self.accounts
                    .add_user(name, &self.add_options())
                    .with_context(|| format!("useradd {name}"))
                    .fail_with(&status)?;
            }
            Plan::Modify(options) => {
                log::info!("modifying user {name}");
                self.accounts
                    .mod_user(name, &options)
                    .with_context(|| format!("usermod {name}"))
                    .fail_with(&status)?;
            }
            Plan::Delete => {
                log::info!("deleting user {name}");
                self.accounts
                    .del_user(name)
                    .with_context(|| format!("userdel {name}"))
                    .fail_with(&status)?;
            }
            Plan::Refuse { reason, .. } => {
                let verb = match self.state {
                    State::Present => "add",
                    State::Absent => "delete",
                };
                return Err(Failure::cant_change(
                    status,
                    anyhow::anyhow!("will not attempt {verb}: {reason}"),
                ));
            }
        }
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
    use serde_json::{Value, json};

    fn task(accounts: &Arc<FakeAccounts>, fields: Value) -> Box<dyn Task> {
        let env = Environment {
            accounts: Arc::clone(accounts) as Arc<dyn SystemUtils>,
            ..Environment::default()
        };
        prepare_json(&schema(), prepare, &env, fields).unwrap()
    }

    #[test]
    fn test_add_user() {
        let accounts = Arc::new(FakeAccounts::new().with_group("staff", 50));
        let ctx = Context::new();
        let mut renderer = ModuleRenderer::new();
        let mut task = task(
            &accounts,
            json!({
                "username": "deploy", "uid": 1500, "group": "staff",
                "name": "Deploy bot", "home_dir": "/srv/deploy", "create_home": true,
            }),
        );

        let status = task.check(&ctx, &mut renderer).unwrap();
        assert_eq!(status.status_code(), Level::WillChange);
        assert_eq!(status.diffs()["user"].current, "user deploy with uid 1500");

        task.apply(&ctx).unwrap();
        assert_eq!(
            accounts.calls(),
            vec!["useradd -u 1500 -g staff -c Deploy bot -d /srv/deploy -m".to_string()]
        );
        assert!(!task.check(&ctx, &mut renderer).unwrap().has_changes());
    }

    #[test]
    fn test_modify_drifted_user() {
        let accounts = Arc::new(
            FakeAccounts::new()
                .with_group("staff", 50)
                .with_group("ops", 60)
                .with_user("deploy", 1500, 50),
        );
        let ctx = Context::new();
        let mut renderer = ModuleRenderer::new();
        let mut task = task(
            &accounts,
            json!({ "username": "deploy", "gid": 60, "home_dir": "/srv/deploy", "move_dir": true }),
        );

        let status = task.check(&ctx, &mut renderer).unwrap();
        assert_eq!(status.diffs()["gid"].original, "50");
        assert_eq!(status.diffs()["gid"].current, "60");
        assert_eq!(status.diffs()["home_dir"].original, "/home/deploy");
        assert!(!status.diffs().contains_key("uid"));

        task.apply(&ctx).unwrap();
        assert_eq!(accounts.calls(), vec!["usermod -g 60 -d /srv/deploy -m".to_string()]);
        assert!(!task.check(&ctx, &mut renderer).unwrap().has_changes());
    }

    #[test]
    fn test_new_uid_for_existing_user() {
        let accounts = Arc::new(FakeAccounts::new().with_user("deploy", 1500, 1500));
        let status = task(&accounts, json!({ "username": "deploy", "uid": 1600 }))
            .check(&Context::new(), &mut ModuleRenderer::new())
            .unwrap();
        assert_eq!(status.diffs()["uid"].current, "1600");
    }

    #[test]
    fn test_missing_group_cant_change() {
        let accounts = Arc::new(FakeAccounts::new());
        let failure = task(&accounts, json!({ "username": "deploy", "group": "nope" }))
            .check(&Context::new(), &mut ModuleRenderer::new())
            .unwrap_err();
        assert_eq!(failure.level(), Level::CantChange);
        assert_eq!(failure.error.to_string(), "group nope does not exist");
    }

    #[test]
    fn test_uid_taken() {
        let accounts = Arc::new(FakeAccounts::new().with_user("alice", 1500, 1500));
        let failure = task(&accounts, json!({ "username": "deploy", "uid": 1500 }))
            .check(&Context::new(), &mut ModuleRenderer::new())
            .unwrap_err();
        assert_eq!(failure.level(), Level::Fatal);
    }

    #[test]
    fn test_name_and_uid_disagree() {
        let accounts = Arc::new(
            FakeAccounts::new()
                .with_user("alice", 1500, 1500)
                .with_user("deploy", 1600, 1600),
        );
        let failure = task(&accounts, json!({ "username": "deploy", "uid": 1500 }))
            .apply(&Context::new())
            .unwrap_err();
        assert_eq!(failure.level(), Level::CantChange);
        assert!(failure.error.to_string().starts_with("will not attempt add"));
        assert!(accounts.calls().is_empty());
    }

    #[test]
    fn test_delete_user() {
        let accounts = Arc::new(FakeAccounts::new().with_user("old", 1700, 1700));
        let ctx = Context::new();
        let mut task = task(&accounts, json!({ "username": "old", "state": "absent" }));
        let status = task.check(&ctx, &mut ModuleRenderer::new()).unwrap();
        assert_eq!(status.diffs()["user"].original, "user old");
        task.apply(&ctx).unwrap();
        assert_eq!(accounts.calls(), vec!["userdel old".to_string()]);
    }

    #[test]
    fn test_group_and_gid_exclusive() {
        let env = Environment {
            accounts: Arc::new(FakeAccounts::new()),
            ..Environment::default()
        };
        let err = prepare_json(
            &schema(),
            prepare,
            &env,
            json!({ "username": "a", "group": "staff", "gid": 50 }),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "only one of \"group\" or \"gid\" can be set");
    }
}
