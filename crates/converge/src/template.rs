//! Pluggable template engines for file content.

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Name of the built-in engine.
pub const JINJA2: &str = "jinja2";

/// Something that turns template text plus parameters into a string.
pub trait TemplateEngine: Send + Sync {
    /// Render `template` with `params` (normally a JSON object).
    fn render(&self, template: &str, params: &Value) -> Result<String>;
}

impl<F> TemplateEngine for F
where
    F: Fn(&str, &Value) -> Result<String> + Send + Sync,
{
    fn render(&self, template: &str, params: &Value) -> Result<String> {
        self(template, params)
    }
}

/// Jinja2-compatible engine backed by minijinja.
#[derive(Debug, Default)]
pub struct Jinja;

impl TemplateEngine for Jinja {
    fn render(&self, template: &str, params: &Value) -> Result<String> {
        let env = minijinja::Environment::new();
        env.render_str(template, params)
            .map_err(|e| Error::Render(format!("{e:#}")))
    }
}

/// Engines by name, plus which one templates use when none is named.
pub struct TemplateEngines {
    engines: BTreeMap<String, Box<dyn TemplateEngine>>,
    default: String,
}

impl TemplateEngines {
    /// Only the `jinja2` engine, which is also the default.
    pub fn new() -> Self {
        let mut engines: BTreeMap<String, Box<dyn TemplateEngine>> = BTreeMap::new();
        engines.insert(JINJA2.to_string(), Box::new(Jinja));
        Self {
            engines,
            default: JINJA2.to_string(),
        }
    }

    /// Add or replace an engine.
    pub fn register(&mut self, name: impl Into<String>, engine: Box<dyn TemplateEngine>) {
        self.engines.insert(name.into(), engine);
    }

    /// Use `name` when a template does not pick an engine.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.engines.contains_key(name) {
            return Err(Error::invalid(format!("unknown template engine: {name}")));
        }
        self.default = name.to_string();
        Ok(())
    }

    /// Name of the default engine.
    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// Registered engine names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    /// Render with the named engine, or the default one.
    pub fn render(&self, engine: Option<&str>, template: &str, params: &Value) -> Result<String> {
        let name = engine.unwrap_or(&self.default);
        let engine = self
            .engines
            .get(name)
            .ok_or_else(|| Error::invalid(format!("unknown template engine: {name}")))?;
        engine.render(template, params)
    }
}

impl Default for TemplateEngines {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateEngines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngines")
            .field("engines", &self.engines.keys().collect::<Vec<_>>())
            .field("default", &self.default)
            .finish()
    }
}
