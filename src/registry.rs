//! Resource types by their stable name
//!
//! The plan loader resolves every `type = "..."` through [`find`].

use crate::resource::{
    Environment, fetch, file_absent, file_group, file_mode, file_owner, group, port, query, shell,
    template, unarchive, unit, user, wait,
};
use declarative::Task;
use prepare::{Preparer, Schema};

pub type PrepareFn = fn(&mut Preparer<'_>, &Environment) -> anyhow::Result<Box<dyn Task>>;

/// One registered resource type
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    pub name: &'static str,
    pub schema: fn() -> Schema,
    pub prepare: PrepareFn,
}

pub const SYSTEMD_UNIT_STATE: &str = "systemd.unit.state";

pub static REGISTRY: &[Registration] = &[
    Registration {
        name: "file.mode",
        schema: file_mode::schema,
        prepare: file_mode::prepare,
    },
    Registration {
        name: "file.owner",
        schema: file_owner::schema,
        prepare: file_owner::prepare,
    },
    Registration {
        name: "file.group",
        schema: file_group::schema,
        prepare: file_group::prepare,
    },
    Registration {
        name: "file.absent",
        schema: file_absent::schema,
        prepare: file_absent::prepare,
    },
    Registration {
        name: "file.fetch",
        schema: fetch::schema,
        prepare: fetch::prepare,
    },
    Registration {
        name: "file.content",
        schema: template::schema,
        prepare: template::prepare,
    },
    Registration {
        name: "unarchive",
        schema: unarchive::schema,
        prepare: unarchive::prepare,
    },
    Registration {
        name: "user.group",
        schema: group::schema,
        prepare: group::prepare,
    },
    Registration {
        name: "user.user",
        schema: user::schema,
        prepare: user::prepare,
    },
    Registration {
        name: "task",
        schema: shell::schema,
        prepare: shell::prepare,
    },
    Registration {
        name: "query",
        schema: query::schema,
        prepare: query::prepare,
    },
    Registration {
        name: "wait.query",
        schema: wait::schema,
        prepare: wait::prepare,
    },
    Registration {
        name: "wait.port",
        schema: port::schema,
        prepare: port::prepare,
    },
    Registration {
        name: SYSTEMD_UNIT_STATE,
        schema: unit::schema,
        prepare: unit::prepare,
    },
];

pub fn find(name: &str) -> Option<&'static Registration> {
    REGISTRY.iter().find(|r| r.name == name)
}

/// Registered names, closest first, for an unknown `type`
pub fn suggest(name: &str) -> Vec<&'static str> {
    let mut scored: Vec<(usize, &'static str)> = REGISTRY
        .iter()
        .map(|r| (prepare::levenshtein(name, r.name), r.name))
        .filter(|(distance, _)| *distance <= 3)
        .collect();
    scored.sort_unstable();
    scored.into_iter().map(|(_, name)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_names_are_unique() {
        let names: BTreeSet<_> = REGISTRY.iter().map(|r| r.name).collect();
        assert_eq!(names.len(), REGISTRY.len());
        assert_eq!(REGISTRY.len(), 14);
    }

    #[test]
    fn test_find() {
        assert!(find("file.mode").is_some());
        assert!(find("systemd.unit.state").is_some());
        assert!(find("file.modes").is_none());
    }

    #[test]
    fn test_suggest() {
        assert_eq!(suggest("file.mdoe").first(), Some(&"file.mode"));
        assert!(suggest("completely.unrelated.thing").is_empty());
    }

    #[test]
    fn test_schemas_do_not_claim_depends() {
        for r in REGISTRY {
            assert!((r.schema)().get("depends").is_none(), "{}", r.name);
        }
    }
}
