//! TOML manifests: optional `[settings]` plus an ordered list of `[[step]]`
//! tables, each naming an action and carrying its arguments.

use anyhow::{Context, Result};
use converge::Registry;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Engine for templates that don't name one
    pub template_engine: Option<String>,
    /// System package manager
    pub packages: PackageManager,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    #[default]
    Apt,
    None,
}

/// One action invocation. Everything but `action` is passed through as the
/// argument object, gate keys included.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub action: String,
    #[serde(flatten)]
    pub args: Map<String, Value>,
}

impl Step {
    pub fn args(&self) -> Value {
        Value::Object(self.args.clone())
    }
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Actions the manifest uses that `registry` doesn't have, in step order.
    pub fn unknown_actions<'a>(&'a self, registry: &Registry) -> Vec<&'a str> {
        self.steps
            .iter()
            .map(|s| s.action.as_str())
            .filter(|name| !registry.contains(name))
            .collect()
    }
}
