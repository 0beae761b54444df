//! Directory reconciliation.

use crate::error::{Error, Result};
use crate::host::Host;
use crate::permissions::apply_permissions;
use crate::trigger::{Gate, impl_gated};
use crate::types::Permissions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Ensure a directory exists with the given permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Directory {
    /// Directory path
    pub path: PathBuf,
    /// Owner, group and mode
    #[serde(flatten)]
    pub permissions: Permissions,
    /// Trigger wiring
    #[serde(skip)]
    pub gate: Gate,
}

impl_gated!(Directory);

impl Directory {
    /// Request a directory at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set owner, group and mode.
    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }
}

/// Create `path` and any missing parents, outermost first.
///
/// Returns whether anything was created. A non-directory occupying any
/// segment is a [`Error::PathConflict`].
pub fn ensure_path(host: &dyn Host, path: &Path) -> Result<bool> {
    let segments: Vec<&Path> = path
        .ancestors()
        .filter(|p| !p.as_os_str().is_empty())
        .collect();

    let mut created = false;
    for segment in segments.into_iter().rev() {
        match host.stat(segment)? {
            Some(stat) if stat.is_dir() => {}
            Some(_) => {
                return Err(Error::conflict(segment, "exists and is not a directory"));
            }
            None => {
                log::info!("mkdir {}", segment.display());
                host.create_dir(segment)?;
                created = true;
            }
        }
    }
    Ok(created)
}

/// Apply a [`Directory`] request (ignoring its gate).
pub fn reconcile(host: &dyn Host, request: &Directory) -> Result<bool> {
    let created = ensure_path(host, &request.path)?;
    let perms_changed = apply_permissions(host, &request.path, &request.permissions)?;
    if !created && !perms_changed {
        log::debug!("directory {} already in place", request.path.display());
    }
    Ok(created || perms_changed)
}
