//! Core types for package reconciliation.

use crate::error::{Error, Result};
use crate::version::compare;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a requested version relates to the installed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparator {
    /// Any installed version is fine
    Any,
    /// Always install or upgrade to the newest available version
    Latest,
    /// Installed version must be at least this
    AtLeast(String),
    /// Installed version must be exactly this
    Exact(String),
}

/// A package name plus the versions it may be installed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    /// Package name
    pub name: String,
    /// Version requirement
    pub comparator: Comparator,
}

impl Constraint {
    /// Constraint satisfied by any installed version.
    pub fn any(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comparator: Comparator::Any,
        }
    }

    /// Parse a constraint string.
    ///
    /// Operators are tried in order: `>=`, then `==`, then `=`; a bare name
    /// means any version. The versions `any` and `latest` are keywords.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let invalid = |message: &str| Error::InvalidConstraint {
            constraint: spec.to_string(),
            message: message.to_string(),
        };

        let (name, version, at_least) = if let Some((name, version)) = spec.split_once(">=") {
            (name, Some(version), true)
        } else if spec.contains('>') {
            return Err(invalid("only >= is supported, not >"));
        } else if let Some((name, version)) = spec.split_once("==") {
            (name, Some(version), false)
        } else if let Some((name, version)) = spec.split_once('=') {
            (name, Some(version), false)
        } else {
            (spec, None, false)
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(invalid("missing package name"));
        }

        let comparator = match version.map(str::trim) {
            None | Some("any") => Comparator::Any,
            Some("latest") => Comparator::Latest,
            Some("") => return Err(invalid("missing version after operator")),
            Some(v) if v.contains('=') || v.contains('>') => {
                return Err(invalid("more than one operator"));
            }
            Some(v) if at_least => Comparator::AtLeast(v.to_string()),
            Some(v) => Comparator::Exact(v.to_string()),
        };

        Ok(Self {
            name: name.to_string(),
            comparator,
        })
    }

    /// Decide what, if anything, must be installed given the current version.
    ///
    /// Returns `None` when the installed package already satisfies the
    /// constraint.
    pub fn action(&self, installed: Option<&str>) -> Option<InstallRequest> {
        let unpinned = || Some(InstallRequest::unpinned(&self.name));
        match (&self.comparator, installed) {
            (Comparator::Any, None) => unpinned(),
            (Comparator::Any, Some(_)) => None,
            (Comparator::Latest, _) => unpinned(),
            (Comparator::AtLeast(_), None) => unpinned(),
            (Comparator::AtLeast(min), Some(current)) => {
                if compare(current, min).is_ge() {
                    None
                } else {
                    unpinned()
                }
            }
            (Comparator::Exact(wanted), Some(current)) if current == wanted => None,
            (Comparator::Exact(wanted), _) => Some(InstallRequest::pinned(&self.name, wanted)),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.comparator {
            Comparator::Any => write!(f, "{}", self.name),
            Comparator::Latest => write!(f, "{}=latest", self.name),
            Comparator::AtLeast(v) => write!(f, "{}>={}", self.name, v),
            Comparator::Exact(v) => write!(f, "{}={}", self.name, v),
        }
    }
}

impl std::str::FromStr for Constraint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// One package a backend has been asked to install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRequest {
    /// Package name
    pub name: String,
    /// Pinned version, or `None` for the newest available
    pub version: Option<String>,
}

impl InstallRequest {
    /// Install the newest available version.
    pub fn unpinned(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Install exactly this version.
    pub fn pinned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }
}

/// Information about an installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    /// Package name
    pub name: String,
    /// Installed version
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_name() {
        let c = Constraint::parse("htop").unwrap();
        assert_eq!(c.name, "htop");
        assert_eq!(c.comparator, Comparator::Any);
    }

    #[test]
    fn test_parse_operators() {
        assert_eq!(
            Constraint::parse("consul>=1.9.0").unwrap().comparator,
            Comparator::AtLeast("1.9.0".into())
        );
        assert_eq!(
            Constraint::parse("requests==2.31.0").unwrap().comparator,
            Comparator::Exact("2.31.0".into())
        );
        assert_eq!(
            Constraint::parse("curl=7.68.0-1ubuntu2").unwrap().comparator,
            Comparator::Exact("7.68.0-1ubuntu2".into())
        );
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(Constraint::parse("git=latest").unwrap().comparator, Comparator::Latest);
        assert_eq!(Constraint::parse("git=any").unwrap().comparator, Comparator::Any);
        assert_eq!(Constraint::parse("git>=latest").unwrap().comparator, Comparator::Latest);
    }

    #[test]
    fn test_parse_rejects_bare_greater_than() {
        let err = Constraint::parse("git>2").unwrap_err();
        assert!(matches!(err, Error::InvalidConstraint { .. }));
    }

    #[test]
    fn test_parse_rejects_empty_parts() {
        assert!(Constraint::parse("=1.0").is_err());
        assert!(Constraint::parse("git=").is_err());
        assert!(Constraint::parse("git==1=2").is_err());
    }

    #[test]
    fn test_action_any() {
        let c = Constraint::parse("htop").unwrap();
        assert_eq!(c.action(None), Some(InstallRequest::unpinned("htop")));
        assert_eq!(c.action(Some("3.0.5")), None);
    }

    #[test]
    fn test_action_latest_always_installs() {
        let c = Constraint::parse("htop=latest").unwrap();
        assert_eq!(c.action(None), Some(InstallRequest::unpinned("htop")));
        assert_eq!(c.action(Some("3.0.5")), Some(InstallRequest::unpinned("htop")));
    }

    #[test]
    fn test_action_at_least() {
        let c = Constraint::parse("consul>=1.9.0").unwrap();
        assert_eq!(c.action(None), Some(InstallRequest::unpinned("consul")));
        assert_eq!(c.action(Some("1.10.0")), None);
        assert_eq!(c.action(Some("1.9.0")), None);
        assert_eq!(c.action(Some("1.8.9")), Some(InstallRequest::unpinned("consul")));
    }

    #[test]
    fn test_action_exact() {
        let c = Constraint::parse("consul=1.9.0").unwrap();
        assert_eq!(c.action(None), Some(InstallRequest::pinned("consul", "1.9.0")));
        assert_eq!(c.action(Some("1.9.0")), None);
        assert_eq!(
            c.action(Some("1.10.0")),
            Some(InstallRequest::pinned("consul", "1.9.0"))
        );
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        for spec in ["htop", "git=latest", "consul>=1.9.0", "curl=7.68.0"] {
            assert_eq!(Constraint::parse(spec).unwrap().to_string(), spec);
        }
    }
}
