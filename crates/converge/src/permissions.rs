//! Ownership and mode reconciliation.

use crate::error::{Error, Result};
use crate::host::Host;
use crate::trigger::{Gate, impl_gated};
use crate::types::{Permissions, Principal, format_mode};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Ensure an existing path has the given owner, group and mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Attributes {
    /// Existing file or directory
    pub path: PathBuf,
    /// Owner, group and mode
    #[serde(flatten)]
    pub permissions: Permissions,
    /// Trigger wiring
    #[serde(skip)]
    pub gate: Gate,
}

impl_gated!(Attributes);

impl Attributes {
    /// Request `permissions` on `path`.
    pub fn new(path: impl Into<PathBuf>, permissions: Permissions) -> Self {
        Self {
            path: path.into(),
            permissions,
            gate: Gate::default(),
        }
    }
}

/// Resolve a user to a uid through the host account database.
pub fn resolve_uid(host: &dyn Host, owner: &Principal) -> Result<u32> {
    match owner {
        Principal::Id(uid) => Ok(*uid),
        Principal::Name(name) => host
            .user(name)?
            .map(|u| u.uid)
            .ok_or_else(|| Error::unknown_user(name.as_str())),
    }
}

/// Resolve a group to a gid through the host account database.
pub fn resolve_gid(host: &dyn Host, group: &Principal) -> Result<u32> {
    match group {
        Principal::Id(gid) => Ok(*gid),
        Principal::Name(name) => host
            .group(name)?
            .ok_or_else(|| Error::unknown_group(name.as_str())),
    }
}

/// Bring `path`'s owner, group and mode in line with `perms`.
///
/// Only fields that are set and differ are touched. Returns whether any of
/// them differed beforehand.
pub fn apply_permissions(host: &dyn Host, path: &Path, perms: &Permissions) -> Result<bool> {
    if perms.is_empty() {
        return Ok(false);
    }

    let before = host.stat(path)?.ok_or_else(|| Error::NotFound {
        path: path.to_path_buf(),
    })?;

    // Resolve names before mutating anything
    let uid = perms.owner.as_ref().map(|o| resolve_uid(host, o)).transpose()?;
    let gid = perms.group.as_ref().map(|g| resolve_gid(host, g)).transpose()?;

    let mut changed = false;

    if let Some(mode) = perms.mode {
        if before.mode != mode {
            log::info!(
                "chmod {} {} (was {})",
                format_mode(mode),
                path.display(),
                format_mode(before.mode)
            );
            host.set_mode(path, mode)?;
            changed = true;
        }
    }

    let new_uid = uid.filter(|uid| *uid != before.uid);
    let new_gid = gid.filter(|gid| *gid != before.gid);
    if new_uid.is_some() || new_gid.is_some() {
        log::info!(
            "chown {}:{} {}",
            new_uid.map_or_else(|| "-".to_string(), |u| u.to_string()),
            new_gid.map_or_else(|| "-".to_string(), |g| g.to_string()),
            path.display()
        );
        host.set_owner(path, new_uid, new_gid)?;
        changed = true;
    }

    if changed {
        if let Some(after) = host.stat(path)? {
            let holds = perms.mode.is_none_or(|m| m == after.mode)
                && uid.is_none_or(|u| u == after.uid)
                && gid.is_none_or(|g| g == after.gid);
            if !holds {
                log::warn!(
                    "permissions on {} still differ after update (mode {}, uid {}, gid {})",
                    path.display(),
                    format_mode(after.mode),
                    after.uid,
                    after.gid
                );
            }
        }
    } else {
        log::debug!("permissions on {} already match", path.display());
    }

    Ok(changed)
}

/// Apply an [`Attributes`] request (ignoring its gate).
pub fn reconcile(host: &dyn Host, request: &Attributes) -> Result<bool> {
    apply_permissions(host, &request.path, &request.permissions)
}
