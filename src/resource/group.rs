//! `user.group`: a local group, present or absent

use super::{Environment, STATES, State};
use crate::accounts::{GroupEntry, SystemUtils};
use anyhow::Context as _;
use declarative::{
    Context, ExportError, Exported, FailWith, Failure, FieldMap, Monitor, Outcome, Status, Task,
    cancelled,
};
use prepare::{Field, Preparer, Schema};
use render::Render;
use std::sync::Arc;

pub fn schema() -> Schema {
    Schema::new()
        .field(Field::new("name").required())
        .field(Field::new("gid"))
        .field(Field::new("state").valid_values(STATES))
}

pub fn prepare(p: &mut Preparer<'_>, env: &Environment) -> anyhow::Result<Box<dyn Task>> {
    Ok(Box::new(Group {
        name: p.require("name")?,
        gid: p.get("gid")?,
        state: p.get_or("state", State::Present)?,
        accounts: Arc::clone(&env.accounts),
    }))
}

/// What the current databases allow for a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Unchanged(String),
    Add,
    Delete,
    Refuse { fatal: bool, reason: String },
}

/// Decide from the lookups by name and, when a gid is wanted, by gid
pub fn plan(
    name: &str,
    gid: Option<u32>,
    state: State,
    by_name: Option<&GroupEntry>,
    by_gid: Option<&GroupEntry>,
) -> Plan {
    let refuse = |fatal, reason: String| Plan::Refuse { fatal, reason };
    match (state, by_name, gid, by_gid) {
        (State::Present, Some(_), None, _) => Plan::Unchanged(format!("group {name} already exists")),
        (State::Present, None, None, _) | (State::Present, None, Some(_), None) => Plan::Add,
        (State::Absent, Some(_), None, _) => Plan::Delete,
        (State::Absent, None, None, _) | (State::Absent, None, Some(_), None) => {
            Plan::Unchanged(format!("group {name} does not exist"))
        }
        (_, None, Some(gid), Some(other)) => refuse(
            true,
            format!("gid {gid} already belongs to group {}", other.name),
        ),
        (_, Some(found), Some(gid), None) => refuse(
            true,
            format!("group {name} exists with gid {}, not {gid}", found.gid),
        ),
        (_, Some(a), Some(gid), Some(b)) if a != b => refuse(
            false,
            format!("group {name} and gid {gid} refer to different groups"),
        ),
        (State::Present, Some(_), Some(gid), Some(_)) => {
            Plan::Unchanged(format!("group {name} with gid {gid} already exists"))
        }
        (State::Absent, Some(_), Some(_), Some(_)) => Plan::Delete,
    }
}

#[derive(Debug)]
pub struct Group {
    name: String,
    gid: Option<u32>,
    state: State,
    accounts: Arc<dyn SystemUtils>,
}

impl Group {
    fn description(&self) -> String {
        match self.gid {
            Some(gid) => format!("group {} with gid {gid}", self.name),
            None => format!("group {}", self.name),
        }
    }

    fn diff(&self) -> Result<(Status, Plan), Failure> {
        let mut status = Status::new();
        let by_name = self
            .accounts
            .lookup_group(&self.name)
            .fail_with(&status)?;
        let by_gid = match self.gid {
            Some(gid) => self.accounts.lookup_group_id(gid).fail_with(&status)?,
            None => None,
        };

        let plan = plan(&self.name, self.gid, self.state, by_name.as_ref(), by_gid.as_ref());
        match &plan {
            Plan::Unchanged(message) => status.add_message(message.clone()),
            Plan::Add => status.add_difference("group", "absent", self.description(), None),
            Plan::Delete => status.add_difference("group", self.description(), "absent", None),
            Plan::Refuse { .. } => {}
        }
        status.raise_level_for_diffs();
        Ok((status, plan))
    }
}

impl Exported for Group {
    fn export(&self, fields: &mut FieldMap) -> Result<(), ExportError> {
        fields.insert("name", self.name.clone())?;
        fields.insert_opt("gid", self.gid)?;
        fields.insert("state", self.state.to_string())
    }
}

impl Monitor for Group {
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

impl Task for Group {
    fn apply(&mut self, ctx: &Context) -> Outcome {
        let (status, plan) = self.diff()?;
        ctx.check().map_err(|e| cancelled(e, status.clone()))?;

        match plan {
            Plan::Unchanged(_) => return Ok(status),
            Plan::Add => {
                log::info!("adding {}", self.description());
                self.accounts
                    .add_group(&self.name, self.gid)
                    .with_context(|| format!("groupadd {}", self.name))
                    .fail_with(&status)?;
            }
            Plan::Delete => {
                log::info!("deleting group {}", self.name);
                self.accounts
                    .del_group(&self.name)
                    .with_context(|| format!("groupdel {}", self.name))
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
