//! Shared value types: operation outcomes, run summaries and permission specs.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Result of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Gated off: none of the `triggered_by` triggers had fired.
    Skipped,
    /// The desired state already held.
    Unchanged,
    /// Something on the host was modified.
    Changed,
}

impl Outcome {
    /// `Changed` if `changed`, else `Unchanged`.
    pub fn from_changed(changed: bool) -> Self {
        if changed { Self::Changed } else { Self::Unchanged }
    }

    /// Whether the host was modified.
    pub fn changed(self) -> bool {
        self == Self::Changed
    }

    /// Whether the operation was gated off.
    pub fn skipped(self) -> bool {
        self == Self::Skipped
    }
}

impl From<Outcome> for bool {
    fn from(outcome: Outcome) -> Self {
        outcome.changed()
    }
}

impl From<bool> for Outcome {
    fn from(changed: bool) -> Self {
        Self::from_changed(changed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Changed => write!(f, "changed"),
        }
    }
}

/// Tally of outcomes across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Operations that modified the host
    pub changed: usize,
    /// Operations whose state already held
    pub unchanged: usize,
    /// Operations gated off
    pub skipped: usize,
}

impl Summary {
    /// Count one outcome.
    pub fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Changed => self.changed += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }

    /// Operations counted so far.
    pub fn total(&self) -> usize {
        self.changed + self.unchanged + self.skipped
    }
}

/// A user or group given by name or numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Principal {
    /// Numeric uid/gid
    Id(u32),
    /// Account name, resolved through the host
    Name(String),
}

impl From<&str> for Principal {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Principal {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<u32> for Principal {
    fn from(id: u32) -> Self {
        Self::Id(id)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Desired ownership and mode. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    /// Owning user
    pub owner: Option<Principal>,
    /// Owning group
    pub group: Option<Principal>,
    /// Permission bits
    #[serde(deserialize_with = "deserialize_mode")]
    pub mode: Option<u32>,
}

impl Permissions {
    /// No requirements at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Set the owner.
    pub fn owner(mut self, owner: impl Into<Principal>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Set the group.
    pub fn group(mut self, group: impl Into<Principal>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Set the mode bits.
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Owner and group both set to the same account name.
    pub fn owned_by(name: &str) -> Self {
        Self::none().owner(name).group(name)
    }

    /// Whether nothing is requested.
    pub fn is_empty(&self) -> bool {
        self.owner.is_none() && self.group.is_none() && self.mode.is_none()
    }
}

/// Parse an octal mode string such as `"0755"`, `"755"` or `"0o755"`.
pub fn parse_mode(text: &str) -> Option<u32> {
    let text = text.trim();
    let digits = text.strip_prefix("0o").unwrap_or(text);
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 8).ok().filter(|m| *m <= 0o7777)
}

/// Modes arrive as integers (taken literally, so TOML `0o755` works) or as
/// octal strings.
pub(crate) fn deserialize_mode<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u32),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(mode)) if mode <= 0o7777 => Ok(Some(mode)),
        Some(Raw::Int(mode)) => Err(serde::de::Error::custom(format!(
            "mode {mode} is out of range"
        ))),
        Some(Raw::Text(text)) => parse_mode(&text).map(Some).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid octal mode: {text:?}"))
        }),
    }
}

/// A single string or a list of strings.
pub(crate) fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::One(item) => vec![item],
        Raw::Many(items) => items,
    })
}

/// Format mode bits as four octal digits.
pub fn format_mode(mode: u32) -> String {
    format!("{:04o}", mode & 0o7777)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_boolean_contract() {
        assert!(bool::from(Outcome::Changed));
        assert!(!bool::from(Outcome::Unchanged));
        assert!(!bool::from(Outcome::Skipped));
        assert_eq!(Outcome::from(false), Outcome::Unchanged);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = Summary::default();
        for outcome in [Outcome::Changed, Outcome::Skipped, Outcome::Changed, Outcome::Unchanged] {
            summary.add(outcome);
        }
        assert_eq!((summary.changed, summary.unchanged, summary.skipped), (2, 1, 1));
        assert_eq!(summary.total(), 4);
    }

    #[test]
    fn test_parse_mode_variants() {
        assert_eq!(parse_mode("0755"), Some(0o755));
        assert_eq!(parse_mode("755"), Some(0o755));
        assert_eq!(parse_mode("0o600"), Some(0o600));
        assert_eq!(parse_mode("4755"), Some(0o4755));
        assert_eq!(parse_mode("789"), None);
        assert_eq!(parse_mode(""), None);
        assert_eq!(parse_mode("77777"), None);
    }

    #[test]
    fn test_permissions_from_json() {
        let perms: Permissions =
            serde_json::from_value(json!({"owner": "deploy", "group": 50, "mode": "0640"}))
                .unwrap();
        assert_eq!(perms.owner, Some(Principal::Name("deploy".into())));
        assert_eq!(perms.group, Some(Principal::Id(50)));
        assert_eq!(perms.mode, Some(0o640));
    }

    #[test]
    fn test_permissions_integer_mode_is_literal() {
        let perms: Permissions = serde_json::from_value(json!({"mode": 493})).unwrap();
        assert_eq!(perms.mode, Some(0o755));
    }

    #[test]
    fn test_permissions_rejects_bad_mode() {
        assert!(serde_json::from_value::<Permissions>(json!({"mode": "rwx"})).is_err());
        assert!(serde_json::from_value::<Permissions>(json!({"mode": 70000})).is_err());
    }

    #[test]
    fn test_permissions_defaults_to_empty() {
        let perms: Permissions = serde_json::from_value(json!({})).unwrap();
        assert!(perms.is_empty());
    }

    #[test]
    fn test_format_mode() {
        assert_eq!(format_mode(0o755), "0755");
        assert_eq!(format_mode(0o100_644), "0644");
    }
}
