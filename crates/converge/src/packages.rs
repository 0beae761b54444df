//! Package set reconciliation on top of `pkgkit`.

use crate::error::{Error, Result};
use crate::trigger::{Gate, impl_gated};
use pkgkit::{Constraint, Manager};
use serde::{Deserialize, Deserializer};

/// Ensure a set of packages is installed.
///
/// Each entry is a constraint string: `nginx`, `nginx=1.24.0`,
/// `nginx>=1.20`, `nginx=latest`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Packages {
    /// Constraint strings
    #[serde(alias = "packages", deserialize_with = "names")]
    pub names: Vec<String>,
    /// Trigger wiring
    #[serde(skip)]
    pub gate: Gate,
}

impl_gated!(Packages);

/// A whitespace separated string or a list.
fn names<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Line(String),
        List(Vec<String>),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Line(line) => line.split_whitespace().map(str::to_string).collect(),
        Raw::List(list) => list,
    })
}

impl Packages {
    /// Request these constraint strings.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            gate: Gate::default(),
        }
    }

    /// Parse every constraint up front.
    pub fn constraints(&self) -> Result<Vec<Constraint>> {
        self.names
            .iter()
            .map(|spec| Constraint::parse(spec).map_err(Error::from))
            .collect()
    }
}

/// Refresh a package manager's index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IndexUpdate {
    /// Trigger wiring
    #[serde(skip)]
    pub gate: Gate,
}

impl_gated!(IndexUpdate);

/// Apply a [`Packages`] request (ignoring its gate).
pub fn reconcile(manager: Option<&mut Manager>, request: &Packages) -> Result<bool> {
    let constraints = request.constraints()?;
    if constraints.is_empty() {
        return Ok(false);
    }
    let manager = require(manager)?;
    Ok(manager.ensure(&constraints)?)
}

/// Refresh the index. Always reports a change.
pub fn update_index(manager: Option<&mut Manager>) -> Result<bool> {
    require(manager)?.update()?;
    Ok(true)
}

fn require(manager: Option<&mut Manager>) -> Result<&mut Manager> {
    manager.ok_or_else(|| Error::invalid("no package manager configured"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgkit::{InstallRequest, MockBackend};
    use serde_json::json;

    fn manager(mock: &MockBackend) -> Manager {
        Manager::new(Box::new(mock.clone()))
    }

    #[test]
    fn test_installs_missing_in_one_sorted_batch() {
        let mock = MockBackend::new().with_installed("curl", "8.5.0");
        let mut mgr = manager(&mock);
        let request = Packages::new(["zsh", "curl", "git=1:2.43.0"]);

        assert!(reconcile(Some(&mut mgr), &request).unwrap());
        assert_eq!(
            mock.installs(),
            vec![vec![
                InstallRequest::pinned("git", "1:2.43.0"),
                InstallRequest::unpinned("zsh"),
            ]]
        );
        assert!(!reconcile(Some(&mut mgr), &request).unwrap());
        assert_eq!(mock.installs().len(), 1);
    }

    #[test]
    fn test_listing_read_once_between_installs() {
        let mock = MockBackend::new().with_installed("curl", "8.5.0");
        let mut mgr = manager(&mock);
        reconcile(Some(&mut mgr), &Packages::new(["curl"])).unwrap();
        reconcile(Some(&mut mgr), &Packages::new(["curl>=8"])).unwrap();
        assert_eq!(mock.listings(), 1);
    }

    #[test]
    fn test_greater_than_rejected_before_install() {
        let mock = MockBackend::new();
        let mut mgr = manager(&mock);
        let err = reconcile(Some(&mut mgr), &Packages::new(["curl>8"])).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(mock.installs().is_empty());
    }

    #[test]
    fn test_install_failure_is_command_failure() {
        let mock = MockBackend::new();
        mock.fail_next_install("E: Unable to locate package nope");
        let mut mgr = manager(&mock);
        let err = reconcile(Some(&mut mgr), &Packages::new(["nope"])).unwrap_err();
        assert!(matches!(err, Error::ExternalCommandFailure { .. }));
    }

    #[test]
    fn test_update_always_changes() {
        let mock = MockBackend::new();
        let mut mgr = manager(&mock);
        assert!(update_index(Some(&mut mgr)).unwrap());
        assert!(update_index(Some(&mut mgr)).unwrap());
        assert_eq!(mock.updates(), 2);
    }

    #[test]
    fn test_missing_manager() {
        assert!(!reconcile(None, &Packages::default()).unwrap());
        assert!(matches!(
            reconcile(None, &Packages::new(["git"])),
            Err(Error::InvalidArgument(_))
        ));
        assert!(update_index(None).is_err());
    }

    #[test]
    fn test_names_from_string_or_list() {
        let line: Packages = serde_json::from_value(json!({"names": "git  curl\nzsh"})).unwrap();
        assert_eq!(line.names, vec!["git", "curl", "zsh"]);
        let list: Packages =
            serde_json::from_value(json!({"packages": ["nginx=1.24.0"]})).unwrap();
        assert_eq!(list.names, vec!["nginx=1.24.0"]);
    }
}
