//! Backend abstraction for package managers.
//!
//! The [`Backend`] trait defines the interface for listing and installing
//! packages, allowing for different implementations (apt, pip, mock for
//! testing).

pub mod apt;
pub mod pip;

use crate::error::{Error, Result};
use crate::types::{InstallRequest, InstalledPackage};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Backend trait for package manager operations.
pub trait Backend: Send + Sync {
    /// Short name used in logs (e.g. "apt").
    fn name(&self) -> &'static str;

    /// Check if the package manager is available.
    fn is_available(&self) -> bool;

    /// List every installed package with its version.
    fn list_installed(&self) -> Result<Vec<InstalledPackage>>;

    /// Refresh the package index.
    fn update(&self) -> Result<()>;

    /// Install a batch of packages in a single invocation.
    fn install(&self, requests: &[InstallRequest]) -> Result<()>;

    /// The form two spellings of one package name share. Names are compared
    /// exactly unless a backend says otherwise.
    fn canonical_name(&self, name: &str) -> String {
        name.to_string()
    }
}

/// Mock backend for testing without touching the system.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the code under test owns another.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    installed: BTreeMap<String, String>,
    available: BTreeMap<String, String>,
    installs: Vec<Vec<InstallRequest>>,
    listings: usize,
    updates: usize,
    fail_install: Option<String>,
}

impl MockBackend {
    /// Create a new empty mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a package as installed at a version.
    pub fn with_installed(self, name: &str, version: &str) -> Self {
        self.state()
            .installed
            .insert(name.to_string(), version.to_string());
        self
    }

    /// Set the version an unpinned install resolves to.
    pub fn with_available(self, name: &str, version: &str) -> Self {
        self.state()
            .available
            .insert(name.to_string(), version.to_string());
        self
    }

    /// Make the next install fail with the given stderr.
    pub fn fail_next_install(&self, stderr: &str) {
        self.state().fail_install = Some(stderr.to_string());
    }

    /// Every install batch seen so far, in order.
    pub fn installs(&self) -> Vec<Vec<InstallRequest>> {
        self.state().installs.clone()
    }

    /// How many times the installed list was read.
    pub fn listings(&self) -> usize {
        self.state().listings
    }

    /// How many index refreshes were requested.
    pub fn updates(&self) -> usize {
        self.state().updates
    }

    /// Currently installed version of a package.
    pub fn installed_version(&self, name: &str) -> Option<String> {
        self.state().installed.get(name).cloned()
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn list_installed(&self) -> Result<Vec<InstalledPackage>> {
        let mut state = self.state();
        state.listings += 1;
        Ok(state
            .installed
            .iter()
            .map(|(name, version)| InstalledPackage {
                name: name.clone(),
                version: version.clone(),
            })
            .collect())
    }

    fn update(&self) -> Result<()> {
        self.state().updates += 1;
        Ok(())
    }

    fn install(&self, requests: &[InstallRequest]) -> Result<()> {
        let mut state = self.state();
        if let Some(stderr) = state.fail_install.take() {
            return Err(Error::from_command_output("mock install", &stderr));
        }
        state.installs.push(requests.to_vec());
        for request in requests {
            let version = match &request.version {
                Some(v) => v.clone(),
                None => state
                    .available
                    .get(&request.name)
                    .cloned()
                    .unwrap_or_else(|| "0".to_string()),
            };
            state.installed.insert(request.name.clone(), version);
        }
        Ok(())
    }
}
