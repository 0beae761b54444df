//! Package reconciliation over a backend with a memoized installed list.

use crate::backend::Backend;
use crate::error::Result;
use crate::types::{Constraint, InstallRequest};
use std::collections::BTreeMap;

/// A package manager plus its cache of installed versions.
///
/// The cache is filled on first use and dropped after every install or
/// index update, so a run never reads the listing more than once between
/// mutations.
pub struct Manager {
    backend: Box<dyn Backend>,
    cache: Option<BTreeMap<String, String>>,
}

impl Manager {
    /// Wrap a backend.
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            cache: None,
        }
    }

    /// Name of the underlying backend.
    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    /// Check if the underlying package manager is available.
    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    /// Installed packages keyed by canonical name, read from the backend on
    /// first use.
    pub fn installed(&mut self) -> Result<&BTreeMap<String, String>> {
        if self.cache.is_none() {
            let listing = self.backend.list_installed()?;
            log::debug!("{}: {} packages installed", self.backend.name(), listing.len());
            self.cache = Some(
                listing
                    .into_iter()
                    .map(|p| (self.backend.canonical_name(&p.name), p.version))
                    .collect(),
            );
        }
        Ok(self.cache.get_or_insert_with(BTreeMap::new))
    }

    /// Installed version of one package.
    pub fn version_of(&mut self, name: &str) -> Result<Option<String>> {
        let key = self.backend.canonical_name(name);
        Ok(self.installed()?.get(&key).cloned())
    }

    /// Forget the cached listing.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Work out which installs would bring the constraints into line.
    ///
    /// The result is sorted by name. When a name appears more than once the
    /// later constraint wins.
    pub fn plan(&mut self, constraints: &[Constraint]) -> Result<Vec<InstallRequest>> {
        self.installed()?;
        let installed = self.cache.get_or_insert_with(BTreeMap::new);
        let mut wanted: BTreeMap<String, Option<InstallRequest>> = BTreeMap::new();
        for constraint in constraints {
            let key = self.backend.canonical_name(&constraint.name);
            let current = installed.get(&key).map(String::as_str);
            wanted.insert(key, constraint.action(current));
        }
        Ok(wanted.into_values().flatten().collect())
    }

    /// Install whatever the constraints require in one backend call.
    ///
    /// Returns `true` if anything was installed.
    pub fn ensure(&mut self, constraints: &[Constraint]) -> Result<bool> {
        let requests = self.plan(constraints)?;
        if requests.is_empty() {
            log::debug!("{}: all {} packages satisfied", self.backend.name(), constraints.len());
            return Ok(false);
        }

        let names: Vec<&str> = requests.iter().map(|r| r.name.as_str()).collect();
        log::info!("{}: installing {}", self.backend.name(), names.join(", "));
        let result = self.backend.install(&requests);
        self.invalidate();
        result?;
        Ok(true)
    }

    /// Refresh the package index and drop the cache.
    pub fn update(&mut self) -> Result<()> {
        log::info!("{}: updating package index", self.backend.name());
        let result = self.backend.update();
        self.invalidate();
        result
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("backend", &self.backend.name())
            .field("cached", &self.cache.as_ref().map(BTreeMap::len))
            .finish()
    }
}
