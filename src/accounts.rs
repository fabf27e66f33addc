//! Local users and groups
//!
//! Lookups read the system databases through `nix`; changes shell out to
//! the shadow utilities. Everything sits behind [`SystemUtils`] so resources
//! can be exercised against an in-memory fake.

use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum AccountsError {
    #[error("user and group management is not supported on this system")]
    Unsupported,

    #[error("lookup of {what} failed: {message}")]
    Lookup { what: String, message: String },

    #[error("chown {}: {message}", path.display())]
    Chown { path: PathBuf, message: String },

    #[error(transparent)]
    Command(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AccountsError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub name: String,
    pub uid: u32,
    /// Primary group
    pub gid: u32,
    pub comment: String,
    pub home: PathBuf,
}

/// Attributes passed to `useradd`/`usermod`; unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserOptions {
    pub uid: Option<u32>,
    /// Primary group, by name or gid
    pub group: Option<String>,
    pub comment: Option<String>,
    pub home: Option<PathBuf>,
    pub create_home: bool,
    pub move_home: bool,
}

impl UserOptions {
    fn add_args(&self) -> Vec<String> {
        let mut args = self.common_args();
        if self.create_home {
            args.push("-m".into());
        }
        args
    }

    fn mod_args(&self) -> Vec<String> {
        let mut args = self.common_args();
        if self.move_home && self.home.is_some() {
            args.push("-m".into());
        }
        args
    }

    fn common_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(uid) = self.uid {
            args.extend(["-u".into(), uid.to_string()]);
        }
        if let Some(group) = &self.group {
            args.extend(["-g".into(), group.clone()]);
        }
        if let Some(comment) = &self.comment {
            args.extend(["-c".into(), comment.clone()]);
        }
        if let Some(home) = &self.home {
            args.extend(["-d".into(), home.display().to_string()]);
        }
        args
    }
}

/// User and group database access
pub trait SystemUtils: Send + Sync + fmt::Debug {
    fn lookup_group(&self, name: &str) -> Result<Option<GroupEntry>>;
    fn lookup_group_id(&self, gid: u32) -> Result<Option<GroupEntry>>;
    fn lookup_user(&self, name: &str) -> Result<Option<UserEntry>>;
    fn lookup_user_id(&self, uid: u32) -> Result<Option<UserEntry>>;

    fn add_group(&self, name: &str, gid: Option<u32>) -> Result<()>;
    fn del_group(&self, name: &str) -> Result<()>;
    fn add_user(&self, name: &str, options: &UserOptions) -> Result<()>;
    fn mod_user(&self, name: &str, options: &UserOptions) -> Result<()>;
    fn del_user(&self, name: &str) -> Result<()>;

    /// Set both owner and group of `path`
    fn chown(&self, path: &Path, uid: u32, gid: u32) -> Result<()>;
}

/// The host's databases and shadow utilities
#[derive(Debug, Clone, Copy, Default)]
pub struct System;

#[cfg(target_os = "linux")]
mod host {
    use super::{AccountsError, GroupEntry, Result, System, SystemUtils, UserEntry, UserOptions};
    use crate::runner::run_capture;
    use nix::unistd::{Gid, Group, Uid, User, chown};
    use std::path::Path;

    fn lookup_error(what: String, e: nix::Error) -> AccountsError {
        AccountsError::Lookup {
            what,
            message: e.to_string(),
        }
    }

    fn group_entry(group: Group) -> GroupEntry {
        GroupEntry {
            name: group.name,
            gid: group.gid.as_raw(),
        }
    }

    fn user_entry(user: User) -> UserEntry {
        UserEntry {
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            comment: user.gecos.to_string_lossy().into_owned(),
            home: user.dir,
        }
    }

    fn run(cmd: &str, args: &[String]) -> Result<()> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_capture(cmd, &args)?;
        Ok(())
    }

    impl SystemUtils for System {
        fn lookup_group(&self, name: &str) -> Result<Option<GroupEntry>> {
            Group::from_name(name)
                .map(|g| g.map(group_entry))
                .map_err(|e| lookup_error(format!("group {name:?}"), e))
        }

        fn lookup_group_id(&self, gid: u32) -> Result<Option<GroupEntry>> {
            Group::from_gid(Gid::from_raw(gid))
                .map(|g| g.map(group_entry))
                .map_err(|e| lookup_error(format!("gid {gid}"), e))
        }

        fn lookup_user(&self, name: &str) -> Result<Option<UserEntry>> {
            User::from_name(name)
                .map(|u| u.map(user_entry))
                .map_err(|e| lookup_error(format!("user {name:?}"), e))
        }

        fn lookup_user_id(&self, uid: u32) -> Result<Option<UserEntry>> {
            User::from_uid(Uid::from_raw(uid))
                .map(|u| u.map(user_entry))
                .map_err(|e| lookup_error(format!("uid {uid}"), e))
        }

        fn add_group(&self, name: &str, gid: Option<u32>) -> Result<()> {
            let mut args = Vec::new();
            if let Some(gid) = gid {
                args.extend(["-g".to_string(), gid.to_string()]);
            }
            args.push(name.to_string());
            run("groupadd", &args)
        }

        fn del_group(&self, name: &str) -> Result<()> {
            run("groupdel", &[name.to_string()])
        }

        fn add_user(&self, name: &str, options: &UserOptions) -> Result<()> {
            let mut args = options.add_args();
            args.push(name.to_string());
            run("useradd", &args)
        }

        fn mod_user(&self, name: &str, options: &UserOptions) -> Result<()> {
            let mut args = options.mod_args();
            args.push(name.to_string());
            run("usermod", &args)
        }

        fn del_user(&self, name: &str) -> Result<()> {
            run("userdel", &[name.to_string()])
        }

        fn chown(&self, path: &Path, uid: u32, gid: u32) -> Result<()> {
            chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid))).map_err(|e| {
                AccountsError::Chown {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
            })
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl SystemUtils for System {
    fn lookup_group(&self, _: &str) -> Result<Option<GroupEntry>> {
        Err(AccountsError::Unsupported)
    }

    fn lookup_group_id(&self, _: u32) -> Result<Option<GroupEntry>> {
        Err(AccountsError::Unsupported)
    }

    fn lookup_user(&self, _: &str) -> Result<Option<UserEntry>> {
        Err(AccountsError::Unsupported)
    }

    fn lookup_user_id(&self, _: u32) -> Result<Option<UserEntry>> {
        Err(AccountsError::Unsupported)
    }

    fn add_group(&self, _: &str, _: Option<u32>) -> Result<()> {
        Err(AccountsError::Unsupported)
    }

    fn del_group(&self, _: &str) -> Result<()> {
        Err(AccountsError::Unsupported)
    }

    fn add_user(&self, _: &str, _: &UserOptions) -> Result<()> {
        Err(AccountsError::Unsupported)
    }

    fn mod_user(&self, _: &str, _: &UserOptions) -> Result<()> {
        Err(AccountsError::Unsupported)
    }

    fn del_user(&self, _: &str) -> Result<()> {
        Err(AccountsError::Unsupported)
    }

    fn chown(&self, _: &Path, _: u32, _: u32) -> Result<()> {
        Err(AccountsError::Unsupported)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_option_args() {
        let options = UserOptions {
            uid: Some(1500),
            group: Some("staff".into()),
            comment: Some("Deploy".into()),
            home: Some("/srv/deploy".into()),
            create_home: true,
            move_home: true,
        };
        assert_eq!(
            options.add_args(),
            ["-u", "1500", "-g", "staff", "-c", "Deploy", "-d", "/srv/deploy", "-m"]
        );
        assert_eq!(
            UserOptions {
                create_home: true,
                ..UserOptions::default()
            }
            .mod_args(),
            Vec::<String>::new()
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_lookup_root() {
        let root = System.lookup_user_id(0).unwrap().unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(System.lookup_user("root").unwrap().unwrap().uid, 0);
        assert!(System.lookup_user("converge-no-such-user").unwrap().is_none());
        assert_eq!(System.lookup_group_id(0).unwrap().unwrap().gid, 0);
    }
}
