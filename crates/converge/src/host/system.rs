//! The real machine: std filesystem calls, libc account lookups and the
//! shadow-utils commands for account changes.

use super::{CommandOutput, FileKind, FileStat, Host, NewUser, Password, UserEntry, parse_groups_output};
use crate::error::{Error, Result};
use std::ffi::{CStr, CString};
use std::fs;
use std::io::{self, Write};
use std::mem::MaybeUninit;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Initial buffer for the reentrant passwd/group lookups.
const LOOKUP_BUFFER: usize = 4096;
/// Give up growing the lookup buffer past this.
const LOOKUP_BUFFER_MAX: usize = 1024 * 1024;

/// Host backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl SystemHost {
    /// Create a new SystemHost.
    pub fn new() -> Self {
        Self
    }

    fn run_checked(&self, program: &str, args: &[String], stdin: Option<&str>) -> Result<String> {
        let output = self.run(program, args, stdin)?;
        if !output.success() {
            return Err(Error::command(
                format!("{} {}", program, args.join(" ")),
                output.stderr.trim().to_string(),
            ));
        }
        Ok(output.stdout)
    }
}

impl Host for SystemHost {
    fn stat(&self, path: &Path) -> Result<Option<FileStat>> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(path, e)),
        };
        let file_type = meta.file_type();
        let kind = if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_file() {
            FileKind::File
        } else {
            FileKind::Other
        };
        Ok(Some(FileStat {
            kind,
            mode: meta.mode() & 0o7777,
            uid: meta.uid(),
            gid: meta.gid(),
        }))
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir(path).map_err(|e| Error::io(path, e))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| Error::io(path, e))
    }

    fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let existing = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return fs::write(path, data).map_err(|e| Error::io(path, e));
            }
            Err(e) => return Err(Error::io(path, e)),
        };
        // Replace the link target, not the link
        let path = &fs::canonicalize(path).map_err(|e| Error::io(path, e))?;

        // Replace through a sibling temp file so readers never see a torn write
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
        tmp.write_all(data).map_err(|e| Error::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::io(tmp.path(), e))?;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(existing.mode() & 0o7777))
            .map_err(|e| Error::io(tmp.path(), e))?;
        std::os::unix::fs::chown(tmp.path(), Some(existing.uid()), Some(existing.gid()))
            .map_err(|e| Error::io(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
        Ok(())
    }

    fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| Error::io(path, e))
    }

    fn set_owner(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        std::os::unix::fs::chown(path, uid, gid).map_err(|e| Error::io(path, e))
    }

    fn user(&self, name: &str) -> Result<Option<UserEntry>> {
        lookup_user(name)
    }

    fn group(&self, name: &str) -> Result<Option<u32>> {
        lookup_group(name)
    }

    fn user_groups(&self, name: &str) -> Result<Vec<String>> {
        let stdout = self.run_checked("groups", &[name.to_string()], None)?;
        Ok(parse_groups_output(&stdout))
    }

    fn create_group(&self, name: &str, gid: Option<u32>) -> Result<()> {
        let mut args = Vec::new();
        if let Some(gid) = gid {
            args.extend(["-g".to_string(), gid.to_string()]);
        }
        args.push(name.to_string());
        self.run_checked("groupadd", &args, None)?;
        Ok(())
    }

    fn create_user(&self, user: &NewUser) -> Result<()> {
        self.run_checked("useradd", &user.useradd_args(), None)?;
        Ok(())
    }

    fn add_to_group(&self, user: &str, group: &str) -> Result<()> {
        let args = ["-a".to_string(), user.to_string(), group.to_string()];
        self.run_checked("gpasswd", &args, None)?;
        Ok(())
    }

    fn remove_from_group(&self, user: &str, group: &str) -> Result<()> {
        let args = ["-d".to_string(), user.to_string(), group.to_string()];
        self.run_checked("gpasswd", &args, None)?;
        Ok(())
    }

    fn set_password(&self, user: &str, password: &Password) -> Result<()> {
        let (args, secret) = match password {
            Password::Plain(secret) => (Vec::new(), secret),
            Password::Hashed(secret) => (vec!["-e".to_string()], secret),
        };
        let line = format!("{user}:{secret}\n");
        self.run_checked("chpasswd", &args, Some(&line))
            .map_err(|e| match e {
                // stderr may echo the secret back
                Error::ExternalCommandFailure { command, .. } => Error::command(
                    command,
                    format!("could not set password for {user}"),
                ),
                other => other,
            })?;
        Ok(())
    }

    fn run(&self, program: &str, args: &[String], stdin: Option<&str>) -> Result<CommandOutput> {
        log::debug!("running {} {}", program, args.join(" "));
        let command_line = || format!("{} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::command(command_line(), e.to_string()))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .map_err(|e| Error::command(command_line(), e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::command(command_line(), e.to_string()))?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

fn c_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| Error::invalid(format!("account name contains NUL: {name:?}")))
}

/// Whether a reentrant lookup's return code means "no such entry".
fn is_missing(rc: libc::c_int) -> bool {
    matches!(rc, 0 | libc::ENOENT | libc::ESRCH | libc::EBADF | libc::EPERM)
}

#[allow(unsafe_code)]
fn lookup_user(name: &str) -> Result<Option<UserEntry>> {
    let c_name = c_name(name)?;
    let mut size = LOOKUP_BUFFER;
    loop {
        let mut buf: Vec<libc::c_char> = vec![0; size];
        let mut pwd: MaybeUninit<libc::passwd> = MaybeUninit::uninit();
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        // SAFETY: every pointer handed to getpwnam_r outlives the call, and
        // `pwd` is only read when `result` says it was filled in. Its string
        // fields point into `buf`, which is still alive while we copy them.
        let rc = unsafe {
            libc::getpwnam_r(
                c_name.as_ptr(),
                pwd.as_mut_ptr(),
                buf.as_mut_ptr(),
                buf.len(),
                &raw mut result,
            )
        };

        if rc == libc::ERANGE && size < LOOKUP_BUFFER_MAX {
            size *= 2;
            continue;
        }
        if result.is_null() {
            if is_missing(rc) {
                return Ok(None);
            }
            return Err(Error::io("/etc/passwd", io::Error::from_raw_os_error(rc)));
        }

        // SAFETY: see above; `result` is non-null so `pwd` is initialised.
        let entry = unsafe {
            let pwd = pwd.assume_init();
            let home = if pwd.pw_dir.is_null() {
                None
            } else {
                let dir = CStr::from_ptr(pwd.pw_dir).to_string_lossy().into_owned();
                (!dir.is_empty()).then(|| PathBuf::from(dir))
            };
            UserEntry {
                name: name.to_string(),
                uid: pwd.pw_uid,
                gid: pwd.pw_gid,
                home,
            }
        };
        return Ok(Some(entry));
    }
}

#[allow(unsafe_code)]
fn lookup_group(name: &str) -> Result<Option<u32>> {
    let c_name = c_name(name)?;
    let mut size = LOOKUP_BUFFER;
    loop {
        let mut buf: Vec<libc::c_char> = vec![0; size];
        let mut grp: MaybeUninit<libc::group> = MaybeUninit::uninit();
        let mut result: *mut libc::group = std::ptr::null_mut();

        // SAFETY: same contract as getpwnam_r above.
        let rc = unsafe {
            libc::getgrnam_r(
                c_name.as_ptr(),
                grp.as_mut_ptr(),
                buf.as_mut_ptr(),
                buf.len(),
                &raw mut result,
            )
        };

        if rc == libc::ERANGE && size < LOOKUP_BUFFER_MAX {
            size *= 2;
            continue;
        }
        if result.is_null() {
            if is_missing(rc) {
                return Ok(None);
            }
            return Err(Error::io("/etc/group", io::Error::from_raw_os_error(rc)));
        }

        // SAFETY: `result` is non-null so `grp` is initialised.
        let gid = unsafe { grp.assume_init().gr_gid };
        return Ok(Some(gid));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stat_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let host = SystemHost::new();
        assert_eq!(host.stat(&dir.path().join("nope")).unwrap(), None);
        assert!(host.stat(dir.path()).unwrap().unwrap().is_dir());
    }

    #[test]
    fn test_write_preserves_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf");
        let host = SystemHost::new();

        host.write(&path, b"one").unwrap();
        host.set_mode(&path, 0o640).unwrap();
        host.write(&path, b"two").unwrap();

        assert_eq!(host.read(&path).unwrap(), b"two");
        assert_eq!(host.stat(&path).unwrap().unwrap().mode, 0o640);
    }

    #[test]
    fn test_stat_follows_symlinks() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();
        let host = SystemHost::new();
        assert!(host.stat(&dir.path().join("link")).unwrap().unwrap().is_dir());

        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling")).unwrap();
        assert_eq!(host.stat(&dir.path().join("dangling")).unwrap(), None);
    }

    #[test]
    fn test_write_through_symlink_keeps_link() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target.conf");
        let link = dir.path().join("app.conf");
        fs::write(&target, "old").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let host = SystemHost::new();
        host.write(&link, b"new").unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
    }

    #[test]
    fn test_create_dir_needs_parent() {
        let dir = TempDir::new().unwrap();
        let host = SystemHost::new();
        assert!(host.create_dir(&dir.path().join("a/b")).is_err());
        host.create_dir(&dir.path().join("a")).unwrap();
    }

    #[test]
    fn test_lookup_root() {
        let host = SystemHost::new();
        let root = host.user("root").unwrap().unwrap();
        assert_eq!(root.uid, 0);
        assert_eq!(host.group("root").unwrap(), Some(0));
    }

    #[test]
    fn test_lookup_unknown_account() {
        let host = SystemHost::new();
        assert_eq!(host.user("no-such-user-settle").unwrap(), None);
        assert_eq!(host.group("no-such-group-settle").unwrap(), None);
    }

    #[test]
    fn test_run_with_stdin() {
        let host = SystemHost::new();
        let out = host.run("cat", &[], Some("hello")).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello");
    }

    #[test]
    fn test_run_nonzero_exit() {
        let host = SystemHost::new();
        let out = host.run("false", &[], None).unwrap();
        assert!(!out.success());
    }
}
