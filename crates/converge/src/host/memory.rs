//! In-memory host for tests.
//!
//! Holds a fake filesystem and account database behind a shared mutex, so a
//! test can hand one clone to a [`Context`](crate::Context) and inspect the
//! result through another. Account mutations and commands are logged in
//! order.

use super::{
    CommandOutput, FileKind, FileStat, Host, HomePolicy, NewUser, Password, UserEntry,
};
use crate::error::{Error, Result};
use crate::types::Principal;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mode given to files created by [`Host::write`].
const NEW_FILE_MODE: u32 = 0o644;
/// Mode given to directories created by [`Host::create_dir`].
const NEW_DIR_MODE: u32 = 0o755;
/// First id handed out to new accounts.
const FIRST_ID: u32 = 1000;

/// One recorded account mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountChange {
    /// `groupadd`
    CreateGroup {
        /// Group name
        name: String,
        /// Requested gid
        gid: Option<u32>,
    },
    /// `useradd`
    CreateUser(NewUser),
    /// `gpasswd -a`
    AddToGroup {
        /// User
        user: String,
        /// Group
        group: String,
    },
    /// `gpasswd -d`
    RemoveFromGroup {
        /// User
        user: String,
        /// Group
        group: String,
    },
    /// `chpasswd`
    SetPassword {
        /// User
        user: String,
        /// Whether the password was pre-hashed
        hashed: bool,
    },
}

#[derive(Debug, Clone)]
struct Node {
    kind: FileKind,
    data: Vec<u8>,
    mode: u32,
    uid: u32,
    gid: u32,
}

impl Node {
    fn dir(mode: u32) -> Self {
        Self {
            kind: FileKind::Directory,
            data: Vec::new(),
            mode,
            uid: 0,
            gid: 0,
        }
    }

    fn stat(&self) -> FileStat {
        FileStat {
            kind: self.kind,
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
        }
    }
}

/// A recorded command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    /// Program name
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Data fed to stdin
    pub stdin: Option<String>,
}

#[derive(Debug)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    users: BTreeMap<String, UserEntry>,
    groups: BTreeMap<String, u32>,
    members: BTreeMap<String, BTreeSet<String>>,
    passwords: BTreeMap<String, Password>,
    changes: Vec<AccountChange>,
    commands: Vec<RecordedCommand>,
    scripted: HashMap<String, CommandOutput>,
    next_id: u32,
}

impl Default for State {
    fn default() -> Self {
        let mut state = Self {
            nodes: BTreeMap::new(),
            users: BTreeMap::new(),
            groups: BTreeMap::new(),
            members: BTreeMap::new(),
            passwords: BTreeMap::new(),
            changes: Vec::new(),
            commands: Vec::new(),
            scripted: HashMap::new(),
            next_id: FIRST_ID,
        };
        state.nodes.insert(PathBuf::from("/"), Node::dir(NEW_DIR_MODE));
        state.groups.insert("root".to_string(), 0);
        state.users.insert(
            "root".to_string(),
            UserEntry {
                name: "root".to_string(),
                uid: 0,
                gid: 0,
                home: Some(PathBuf::from("/root")),
            },
        );
        state
    }
}

impl State {
    fn node(&self, path: &Path) -> Result<&Node> {
        self.nodes.get(path).ok_or_else(|| not_found(path))
    }

    fn node_mut(&mut self, path: &Path) -> Result<&mut Node> {
        self.nodes.get_mut(path).ok_or_else(|| not_found(path))
    }

    fn require_parent_dir(&self, path: &Path) -> Result<()> {
        match path.parent() {
            None => Ok(()),
            Some(parent) => match self.nodes.get(parent) {
                Some(node) if node.kind == FileKind::Directory => Ok(()),
                Some(_) => Err(Error::io(
                    path,
                    io::Error::other("parent is not a directory"),
                )),
                None => Err(not_found(path)),
            },
        }
    }

    fn allocate_id(&mut self) -> u32 {
        loop {
            let id = self.next_id;
            self.next_id += 1;
            let taken = self.users.values().any(|u| u.uid == id || u.gid == id)
                || self.groups.values().any(|g| *g == id);
            if !taken {
                return id;
            }
        }
    }

    fn resolve_gid(&self, principal: &Principal) -> Result<u32> {
        match principal {
            Principal::Id(id) => Ok(*id),
            Principal::Name(name) => self
                .groups
                .get(name)
                .copied()
                .ok_or_else(|| Error::command("useradd", format!("group '{name}' does not exist"))),
        }
    }
}

fn not_found(path: &Path) -> Error {
    Error::io(path, io::Error::from(io::ErrorKind::NotFound))
}

fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}

/// In-memory [`Host`] with shared state.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    state: Arc<Mutex<State>>,
}

impl MemoryHost {
    /// A host containing only `/`, the root user and the root group.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a directory and any missing parents (mode 0755, root-owned).
    pub fn with_dir(self, path: impl AsRef<Path>) -> Self {
        {
            let mut state = self.state();
            let path = normalize(path.as_ref());
            for ancestor in path.ancestors().collect::<Vec<_>>().into_iter().rev() {
                state
                    .nodes
                    .entry(ancestor.to_path_buf())
                    .or_insert_with(|| Node::dir(NEW_DIR_MODE));
            }
        }
        self
    }

    /// Add a file (parents created as needed).
    pub fn with_file(self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) -> Self {
        let path = normalize(path.as_ref());
        let host = match path.parent() {
            Some(parent) => self.with_dir(parent),
            None => self,
        };
        host.state().nodes.insert(
            path,
            Node {
                kind: FileKind::File,
                data: data.into(),
                mode: NEW_FILE_MODE,
                uid: 0,
                gid: 0,
            },
        );
        host
    }

    /// Add a group.
    pub fn with_group(self, name: &str, gid: u32) -> Self {
        self.state().groups.insert(name.to_string(), gid);
        self
    }

    /// Add a user with a same-named primary group.
    pub fn with_user(self, name: &str, uid: u32, home: Option<&str>) -> Self {
        {
            let mut state = self.state();
            state.groups.insert(name.to_string(), uid);
            state.users.insert(
                name.to_string(),
                UserEntry {
                    name: name.to_string(),
                    uid,
                    gid: uid,
                    home: home.map(PathBuf::from),
                },
            );
        }
        self
    }

    /// Make `user` a secondary member of `group`.
    pub fn with_member(self, user: &str, group: &str) -> Self {
        self.state()
            .members
            .entry(user.to_string())
            .or_default()
            .insert(group.to_string());
        self
    }

    /// Answer every later call of `program` with `output`.
    pub fn script(&self, program: &str, output: CommandOutput) {
        self.state().scripted.insert(program.to_string(), output);
    }

    /// File content, if a regular file exists at `path`.
    pub fn file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let state = self.state();
        state
            .nodes
            .get(&normalize(path.as_ref()))
            .filter(|n| n.kind == FileKind::File)
            .map(|n| n.data.clone())
    }

    /// File content as UTF-8 (lossy).
    pub fn file_string(&self, path: impl AsRef<Path>) -> Option<String> {
        self.file(path)
            .map(|data| String::from_utf8_lossy(&data).into_owned())
    }

    /// Metadata of any entry at `path`.
    pub fn entry(&self, path: impl AsRef<Path>) -> Option<FileStat> {
        self.state()
            .nodes
            .get(&normalize(path.as_ref()))
            .map(Node::stat)
    }

    /// Secondary groups of `user`, sorted.
    pub fn secondary_groups(&self, user: &str) -> Vec<String> {
        self.state()
            .members
            .get(user)
            .map(|groups| groups.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Last password set for `user`.
    pub fn password(&self, user: &str) -> Option<Password> {
        self.state().passwords.get(user).cloned()
    }

    /// Every account mutation so far.
    pub fn changes(&self) -> Vec<AccountChange> {
        self.state().changes.clone()
    }

    /// Every command run so far.
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state().commands.clone()
    }
}

impl Host for MemoryHost {
    fn stat(&self, path: &Path) -> Result<Option<FileStat>> {
        Ok(self.state().nodes.get(&normalize(path)).map(Node::stat))
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        let path = normalize(path);
        let mut state = self.state();
        if state.nodes.contains_key(&path) {
            return Err(Error::io(&path, io::Error::from(io::ErrorKind::AlreadyExists)));
        }
        state.require_parent_dir(&path)?;
        state.nodes.insert(path, Node::dir(NEW_DIR_MODE));
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = normalize(path);
        let state = self.state();
        let node = state.node(&path)?;
        if node.kind != FileKind::File {
            return Err(Error::io(&path, io::Error::other("not a regular file")));
        }
        Ok(node.data.clone())
    }

    fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = normalize(path);
        let mut state = self.state();
        if let Some(node) = state.nodes.get_mut(&path) {
            if node.kind != FileKind::File {
                return Err(Error::io(&path, io::Error::other("not a regular file")));
            }
            node.data = data.to_vec();
            return Ok(());
        }
        state.require_parent_dir(&path)?;
        state.nodes.insert(
            path,
            Node {
                kind: FileKind::File,
                data: data.to_vec(),
                mode: NEW_FILE_MODE,
                uid: 0,
                gid: 0,
            },
        );
        Ok(())
    }

    fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        let path = normalize(path);
        self.state().node_mut(&path)?.mode = mode & 0o7777;
        Ok(())
    }

    fn set_owner(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        let path = normalize(path);
        let mut state = self.state();
        let node = state.node_mut(&path)?;
        if let Some(uid) = uid {
            node.uid = uid;
        }
        if let Some(gid) = gid {
            node.gid = gid;
        }
        Ok(())
    }

    fn user(&self, name: &str) -> Result<Option<UserEntry>> {
        Ok(self.state().users.get(name).cloned())
    }

    fn group(&self, name: &str) -> Result<Option<u32>> {
        Ok(self.state().groups.get(name).copied())
    }

    fn user_groups(&self, name: &str) -> Result<Vec<String>> {
        let state = self.state();
        let user = state
            .users
            .get(name)
            .ok_or_else(|| Error::command(format!("groups {name}"), "no such user"))?;
        let mut groups: BTreeSet<String> = state
            .groups
            .iter()
            .filter(|(_, gid)| **gid == user.gid)
            .map(|(group, _)| group.clone())
            .collect();
        if let Some(extra) = state.members.get(name) {
            groups.extend(extra.iter().cloned());
        }
        Ok(groups.into_iter().collect())
    }

    fn create_group(&self, name: &str, gid: Option<u32>) -> Result<()> {
        let mut state = self.state();
        if state.groups.contains_key(name) {
            return Err(Error::command(
                format!("groupadd {name}"),
                format!("group '{name}' already exists"),
            ));
        }
        let gid = match gid {
            Some(gid) => gid,
            None => state.allocate_id(),
        };
        state.groups.insert(name.to_string(), gid);
        state.changes.push(AccountChange::CreateGroup {
            name: name.to_string(),
            gid: Some(gid),
        });
        Ok(())
    }

    fn create_user(&self, user: &NewUser) -> Result<()> {
        let args = user.useradd_args();
        let has = |flag: &str| args.iter().any(|a| a == flag);
        if has("-U") && has("-g") {
            return Err(Error::command(
                format!("useradd {}", args.join(" ")),
                "options -U and -g conflict",
            ));
        }
        let mut state = self.state();
        if state.users.contains_key(&user.name) {
            return Err(Error::command(
                format!("useradd {}", user.name),
                format!("user '{}' already exists", user.name),
            ));
        }
        let uid = match user.uid {
            Some(uid) => uid,
            None => state.allocate_id(),
        };
        let gid = match &user.gid {
            Some(principal) => state.resolve_gid(principal)?,
            None => uid,
        };
        if has("-U") {
            state.groups.insert(user.name.clone(), gid);
        }
        let home = match &user.home {
            HomePolicy::Path(path) => path.clone(),
            HomePolicy::Default | HomePolicy::None => PathBuf::from("/home").join(&user.name),
        };
        state.users.insert(
            user.name.clone(),
            UserEntry {
                name: user.name.clone(),
                uid,
                gid,
                home: Some(home),
            },
        );
        state.changes.push(AccountChange::CreateUser(user.clone()));
        Ok(())
    }

    fn add_to_group(&self, user: &str, group: &str) -> Result<()> {
        let mut state = self.state();
        if !state.groups.contains_key(group) {
            return Err(Error::command(
                format!("gpasswd -a {user} {group}"),
                format!("group '{group}' does not exist"),
            ));
        }
        state
            .members
            .entry(user.to_string())
            .or_default()
            .insert(group.to_string());
        state.changes.push(AccountChange::AddToGroup {
            user: user.to_string(),
            group: group.to_string(),
        });
        Ok(())
    }

    fn remove_from_group(&self, user: &str, group: &str) -> Result<()> {
        let mut state = self.state();
        if let Some(groups) = state.members.get_mut(user) {
            groups.remove(group);
        }
        state.changes.push(AccountChange::RemoveFromGroup {
            user: user.to_string(),
            group: group.to_string(),
        });
        Ok(())
    }

    fn set_password(&self, user: &str, password: &Password) -> Result<()> {
        let mut state = self.state();
        if !state.users.contains_key(user) {
            return Err(Error::command("chpasswd", format!("user '{user}' does not exist")));
        }
        state.passwords.insert(user.to_string(), password.clone());
        state.changes.push(AccountChange::SetPassword {
            user: user.to_string(),
            hashed: matches!(password, Password::Hashed(_)),
        });
        Ok(())
    }

    fn run(&self, program: &str, args: &[String], stdin: Option<&str>) -> Result<CommandOutput> {
        let mut state = self.state();
        state.commands.push(RecordedCommand {
            program: program.to_string(),
            args: args.to_vec(),
            stdin: stdin.map(str::to_string),
        });
        Ok(state
            .scripted
            .get(program)
            .cloned()
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}
