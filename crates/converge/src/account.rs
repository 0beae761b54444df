//! OS users, groups and SSH authorized keys.

use crate::content::{File, reconcile_file};
use crate::directory::{self, Directory};
use crate::error::{Error, Result};
use crate::host::{HomePolicy, Host, NewUser, Password, UserEntry};
use crate::template::TemplateEngines;
use crate::trigger::{Gate, impl_gated};
use crate::types::{Permissions, Principal, deserialize_mode, one_or_many};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeSet;
use std::fmt::Write;
use std::path::PathBuf;

/// Mode applied to home directories unless told otherwise.
pub const DEFAULT_HOME_MODE: u32 = 0o755;
/// Mode of `~/.ssh`.
pub const SSH_DIR_MODE: u32 = 0o700;
/// Mode of `~/.ssh/authorized_keys`.
pub const AUTHORIZED_KEYS_MODE: u32 = 0o600;

/// Ensure a group exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Group {
    /// Group name
    pub name: String,
    /// gid to use when creating it
    pub gid: Option<u32>,
    /// Trigger wiring
    #[serde(skip)]
    pub gate: Gate,
}

impl_gated!(Group);

impl Group {
    /// Request a group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create with a fixed gid.
    pub fn gid(mut self, gid: u32) -> Self {
        self.gid = Some(gid);
        self
    }
}

/// Apply a [`Group`] request (ignoring its gate). Existing groups are left
/// alone, even if their gid differs.
pub fn reconcile_group(host: &dyn Host, request: &Group) -> Result<bool> {
    if request.name.is_empty() {
        return Err(Error::invalid("group name must not be empty"));
    }
    if host.group(&request.name)?.is_some() {
        log::debug!("group {} exists", request.name);
        return Ok(false);
    }
    log::info!("creating group {}", request.name);
    host.create_group(&request.name, request.gid)?;
    Ok(true)
}

/// Ensure a user exists, with home, memberships, password and keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct User {
    /// Login name
    pub name: String,
    /// `true` (default location), `false` (none) or a path
    #[serde(default, deserialize_with = "deserialize_home")]
    pub home: HomePolicy,
    /// Mode for the home directory (0755 if unset)
    #[serde(default, deserialize_with = "deserialize_mode")]
    pub home_mode: Option<u32>,
    /// uid for a new user
    pub uid: Option<u32>,
    /// Primary group for a new user
    pub gid: Option<Principal>,
    /// Exact set of secondary groups. `Some(vec![])` removes them all.
    pub groups: Option<Vec<String>>,
    /// Login shell for a new user
    pub shell: Option<String>,
    /// GECOS comment for a new user
    pub comment: Option<String>,
    /// Cleartext password
    pub password: Option<String>,
    /// Password already in crypt(3) form
    #[serde(alias = "encrypted_password")]
    pub hashed_password: Option<String>,
    /// Set a random password nobody knows
    #[serde(default)]
    pub random_password: bool,
    /// Keys for `~/.ssh/authorized_keys`
    #[serde(default, deserialize_with = "optional_keys")]
    pub authorized_keys: Option<Vec<String>>,
    /// Count a password update as a change
    #[serde(default)]
    pub password_assume_changed: bool,
    /// Trigger wiring
    #[serde(skip)]
    pub gate: Gate,
}

impl_gated!(User);

fn deserialize_home<'de, D>(deserializer: D) -> std::result::Result<HomePolicy, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Path(PathBuf),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Flag(true) => HomePolicy::Default,
        Raw::Flag(false) => HomePolicy::None,
        Raw::Path(path) => HomePolicy::Path(path),
    })
}

fn optional_keys<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    one_or_many(deserializer).map(Some)
}

impl User {
    /// Request a user.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Home directory policy.
    pub fn home(mut self, home: HomePolicy) -> Self {
        self.home = home;
        self
    }

    /// Mode for the home directory.
    pub fn home_mode(mut self, mode: u32) -> Self {
        self.home_mode = Some(mode);
        self
    }

    /// uid for a new user.
    pub fn uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }

    /// Primary group for a new user.
    pub fn gid(mut self, gid: impl Into<Principal>) -> Self {
        self.gid = Some(gid.into());
        self
    }

    /// Exact set of secondary groups.
    pub fn groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    /// Login shell for a new user.
    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    /// GECOS comment for a new user.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set a password on every run.
    pub fn password(mut self, password: Password) -> Self {
        match password {
            Password::Plain(p) => self.password = Some(p),
            Password::Hashed(p) => self.hashed_password = Some(p),
        }
        self
    }

    /// Set a random password.
    pub fn random_password(mut self) -> Self {
        self.random_password = true;
        self
    }

    /// Report password updates as changes.
    pub fn password_assume_changed(mut self) -> Self {
        self.password_assume_changed = true;
        self
    }

    /// Manage `~/.ssh/authorized_keys`.
    pub fn authorized_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorized_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    fn new_user(&self) -> NewUser {
        NewUser {
            name: self.name.clone(),
            home: self.home.clone(),
            uid: self.uid,
            gid: self.gid.clone(),
            shell: self.shell.clone(),
            comment: self.comment.clone(),
        }
    }

    /// Passwords to set, in order.
    fn passwords(&self) -> Vec<Password> {
        let mut passwords = Vec::new();
        if self.random_password {
            passwords.push(Password::Plain(random_secret()));
        } else if let Some(plain) = &self.password {
            passwords.push(Password::Plain(plain.clone()));
        }
        if let Some(hashed) = &self.hashed_password {
            passwords.push(Password::Hashed(hashed.clone()));
        }
        passwords
    }
}

/// 20 random bytes as hex.
fn random_secret() -> String {
    let bytes: [u8; 20] = rand::random();
    bytes.iter().fold(String::with_capacity(40), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Owned by the user and their primary group, whatever that group is named.
fn owned_by_account(entry: &UserEntry) -> Permissions {
    Permissions::none().owner(entry.name.as_str()).group(entry.gid)
}

/// Apply a [`User`] request (ignoring its gate).
pub fn reconcile_user(host: &dyn Host, engines: &TemplateEngines, request: &User) -> Result<bool> {
    let name = request.name.as_str();
    if name.is_empty() {
        return Err(Error::invalid("user name must not be empty"));
    }

    let created = if host.user(name)?.is_none() {
        log::info!("creating user {name}");
        host.create_user(&request.new_user())?;
        true
    } else {
        false
    };

    let mut home_changed = false;
    if request.home != HomePolicy::None {
        let entry = host.user(name)?.ok_or_else(|| Error::unknown_user(name))?;
        if let Some(home) = &entry.home {
            let dir = Directory::new(home).permissions(
                owned_by_account(&entry).mode(request.home_mode.unwrap_or(DEFAULT_HOME_MODE)),
            );
            home_changed = directory::reconcile(host, &dir)?;
        }
    }

    let groups_changed = match &request.groups {
        Some(groups) => sync_groups(host, name, groups)?,
        None => false,
    };

    let mut password_set = false;
    for password in request.passwords() {
        log::info!("setting password for {name}");
        host.set_password(name, &password)?;
        password_set = true;
    }

    let keys_changed = match &request.authorized_keys {
        Some(keys) => reconcile_keys(host, engines, name, keys)?,
        None => false,
    };

    Ok(created
        || home_changed
        || groups_changed
        || keys_changed
        || (password_set && request.password_assume_changed))
}

/// Make `user`'s secondary groups exactly `desired`.
///
/// Missing memberships are added first, then extra ones removed, each in
/// name order. The primary group (matched by gid) is never touched.
pub fn sync_groups(host: &dyn Host, user: &str, desired: &[String]) -> Result<bool> {
    let primary = host.user(user)?.ok_or_else(|| Error::unknown_user(user))?.gid;
    let mut current = BTreeSet::new();
    for group in host.user_groups(user)? {
        if host.group(&group)? != Some(primary) {
            current.insert(group);
        }
    }
    let desired: BTreeSet<String> = desired.iter().cloned().collect();

    if current == desired {
        log::debug!("{user} group membership up to date");
        return Ok(false);
    }

    for group in desired.difference(&current) {
        log::info!("adding {user} to {group}");
        host.add_to_group(user, group)?;
    }
    for group in current.difference(&desired) {
        log::info!("removing {user} from {group}");
        host.remove_from_group(user, group)?;
    }
    Ok(true)
}

/// Ensure a user's `~/.ssh/authorized_keys` holds exactly these keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthorizedKeys {
    /// Account owning the keys
    pub user: String,
    /// One key per line
    #[serde(alias = "authorized_keys", deserialize_with = "one_or_many")]
    pub keys: Vec<String>,
    /// Trigger wiring
    #[serde(skip)]
    pub gate: Gate,
}

impl_gated!(AuthorizedKeys);

impl AuthorizedKeys {
    /// Request keys for `user`.
    pub fn new<I, S>(user: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user: user.into(),
            keys: keys.into_iter().map(Into::into).collect(),
            gate: Gate::default(),
        }
    }
}

/// Write `keys` to `~user/.ssh/authorized_keys`, owned by the user.
pub fn reconcile_keys(
    host: &dyn Host,
    engines: &TemplateEngines,
    user: &str,
    keys: &[String],
) -> Result<bool> {
    let entry = host.user(user)?.ok_or_else(|| Error::unknown_user(user))?;
    let ssh_dir = entry
        .home
        .as_ref()
        .ok_or_else(|| Error::unknown_user(user))?
        .join(".ssh");

    let dir = Directory::new(&ssh_dir).permissions(owned_by_account(&entry).mode(SSH_DIR_MODE));
    let dir_changed = directory::reconcile(host, &dir)?;

    let file = File::new(ssh_dir.join("authorized_keys"))
        .data(keys.join("\n"))
        .permissions(owned_by_account(&entry).mode(AUTHORIZED_KEYS_MODE));
    let file_changed = reconcile_file(host, engines, &file)?;

    Ok(dir_changed || file_changed)
}
