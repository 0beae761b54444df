//! Host capability interface.
//!
//! Reconcilers never touch the OS directly. Everything they probe or mutate
//! goes through [`Host`], so the same logic runs against the real machine
//! ([`SystemHost`]) or an in-memory fake ([`MemoryHost`]).

pub mod memory;
pub mod system;

pub use memory::{AccountChange, MemoryHost, RecordedCommand};
pub use system::SystemHost;

use crate::error::Result;
use crate::types::Principal;
use std::path::{Path, PathBuf};

/// What occupies a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Socket, fifo, device
    Other,
}

/// Metadata of an existing path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Kind of entry
    pub kind: FileKind,
    /// Permission bits (`0o7777` mask)
    pub mode: u32,
    /// Owning uid
    pub uid: u32,
    /// Owning gid
    pub gid: u32,
}

impl FileStat {
    /// Whether this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Whether this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }
}

/// An existing OS user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    /// Login name
    pub name: String,
    /// Numeric uid
    pub uid: u32,
    /// Primary gid
    pub gid: u32,
    /// Home directory, if the account has one
    pub home: Option<PathBuf>,
}

/// Where a new user's home goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HomePolicy {
    /// Let `useradd` pick (normally `/home/<name>`)
    #[default]
    Default,
    /// No home directory
    None,
    /// An explicit path
    Path(PathBuf),
}

/// Attributes for creating a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    /// Login name
    pub name: String,
    /// Home policy
    pub home: HomePolicy,
    /// Fixed uid
    pub uid: Option<u32>,
    /// Primary group (name or gid)
    pub gid: Option<Principal>,
    /// Login shell
    pub shell: Option<String>,
    /// GECOS comment
    pub comment: Option<String>,
}

impl NewUser {
    /// Arguments for `useradd`, ending in the login name. Without a primary
    /// group, `-U` asks for a same-named one (useradd rejects `-U` with `-g`).
    pub fn useradd_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match &self.home {
            HomePolicy::Default => {}
            HomePolicy::None => args.push("-M".to_string()),
            HomePolicy::Path(path) => {
                args.push("-d".to_string());
                args.push(path.display().to_string());
            }
        }
        if let Some(uid) = self.uid {
            args.extend(["-u".to_string(), uid.to_string()]);
        }
        if let Some(gid) = &self.gid {
            args.extend(["-g".to_string(), gid.to_string()]);
        }
        if let Some(shell) = &self.shell {
            args.extend(["-s".to_string(), shell.clone()]);
        }
        if let Some(comment) = &self.comment {
            args.extend(["-c".to_string(), comment.clone()]);
        }
        if self.gid.is_none() {
            args.push("-U".to_string());
        }
        args.push(self.name.clone());
        args
    }
}

/// A password to set for a user.
#[derive(Clone, PartialEq, Eq)]
pub enum Password {
    /// Cleartext, hashed by the OS
    Plain(String),
    /// Already in crypt(3) form
    Hashed(String),
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Plain(***)"),
            Self::Hashed(_) => f.write_str("Hashed(***)"),
        }
    }
}

/// Captured output of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (`None` if killed by a signal)
    pub status: Option<i32>,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Whether the process exited 0.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Everything reconcilers need from the machine.
pub trait Host: Send + Sync {
    // Filesystem

    /// Metadata for `path` with symlinks followed, or `None` if nothing is
    /// there (a dangling link counts as nothing).
    fn stat(&self, path: &Path) -> Result<Option<FileStat>>;

    /// Create one directory. The parent must exist.
    fn create_dir(&self, path: &Path) -> Result<()>;

    /// Read a whole file.
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Replace a file's content, creating it if needed. Writing through a
    /// symlink replaces the target and leaves the link.
    fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Set permission bits.
    fn set_mode(&self, path: &Path, mode: u32) -> Result<()>;

    /// Change owner and/or group; `None` leaves that id alone.
    fn set_owner(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()>;

    // Accounts

    /// Look up a user by name.
    fn user(&self, name: &str) -> Result<Option<UserEntry>>;

    /// Look up a group's gid by name.
    fn group(&self, name: &str) -> Result<Option<u32>>;

    /// Every group the user belongs to, primary included.
    fn user_groups(&self, name: &str) -> Result<Vec<String>>;

    /// Create a group.
    fn create_group(&self, name: &str, gid: Option<u32>) -> Result<()>;

    /// Create a user. Without a primary group, a same-named one is created
    /// alongside it.
    fn create_user(&self, user: &NewUser) -> Result<()>;

    /// Add a user to a secondary group.
    fn add_to_group(&self, user: &str, group: &str) -> Result<()>;

    /// Remove a user from a secondary group.
    fn remove_from_group(&self, user: &str, group: &str) -> Result<()>;

    /// Set a user's password.
    fn set_password(&self, user: &str, password: &Password) -> Result<()>;

    // Processes

    /// Run a program to completion, optionally feeding `stdin`.
    fn run(&self, program: &str, args: &[String], stdin: Option<&str>) -> Result<CommandOutput>;
}

/// Parse `groups <user>` output (`"name : a b c"` or just `"a b c"`).
pub fn parse_groups_output(output: &str) -> Vec<String> {
    let list = output.rsplit(':').next().unwrap_or("");
    let mut groups: Vec<String> = list.split_whitespace().map(str::to_string).collect();
    groups.sort();
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_useradd_args_minimal() {
        let user = NewUser {
            name: "deploy".into(),
            ..NewUser::default()
        };
        assert_eq!(user.useradd_args(), vec!["-U", "deploy"]);
    }

    #[test]
    fn test_useradd_args_full() {
        let user = NewUser {
            name: "consul".into(),
            home: HomePolicy::Path("/var/consul".into()),
            uid: Some(1500),
            gid: Some(Principal::Name("daemon".into())),
            shell: Some("/bin/false".into()),
            comment: Some("Consul agent".into()),
        };
        assert_eq!(
            user.useradd_args(),
            vec![
                "-d", "/var/consul", "-u", "1500", "-g", "daemon", "-s", "/bin/false", "-c",
                "Consul agent", "consul"
            ]
        );
    }

    #[test]
    fn test_useradd_args_no_home() {
        let user = NewUser {
            name: "svc".into(),
            home: HomePolicy::None,
            gid: Some(Principal::Id(999)),
            ..NewUser::default()
        };
        assert_eq!(user.useradd_args(), vec!["-M", "-g", "999", "svc"]);
    }

    #[test]
    fn test_parse_groups_output() {
        assert_eq!(
            parse_groups_output("carl : carl sudo adm\n"),
            vec!["adm", "carl", "sudo"]
        );
        assert_eq!(parse_groups_output("wheel users"), vec!["users", "wheel"]);
        assert!(parse_groups_output("").is_empty());
    }

    #[test]
    fn test_password_debug_is_redacted() {
        let shown = format!("{:?}", Password::Plain("hunter2".into()));
        assert!(!shown.contains("hunter2"));
    }
}
