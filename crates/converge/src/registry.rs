//! Named operations invoked with dynamic JSON arguments.
//!
//! Manifests and other data-driven callers reach every reconciler through
//! here. An [`Action`] receives the argument object with `triggers` and
//! `triggered_by` already removed; the registry applies the gate around it.

use crate::account::{AuthorizedKeys, Group, User};
use crate::command::{Command, Shell};
use crate::content::{File, LineInFile};
use crate::context::Context;
use crate::directory::Directory;
use crate::download::Download;
use crate::error::{Error, Result};
use crate::packages::{IndexUpdate, Packages};
use crate::permissions::Attributes;
use crate::trigger::Gate;
use crate::types::Outcome;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Something that can be invoked by name.
pub trait Action: Send + Sync {
    /// Perform the action. Returns whether anything changed.
    fn run(&self, ctx: &mut Context, args: Value) -> Result<bool>;
}

impl<F> Action for F
where
    F: Fn(&mut Context, Value) -> Result<bool> + Send + Sync,
{
    fn run(&self, ctx: &mut Context, args: Value) -> Result<bool> {
        self(ctx, args)
    }
}

/// An action wrapped in the trigger gate.
#[derive(Clone)]
pub struct GatedAction {
    name: String,
    inner: Arc<dyn Action>,
}

impl GatedAction {
    fn new(name: String, inner: Arc<dyn Action>) -> Self {
        Self { name, inner }
    }

    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Split the gate out of `args`, then run the action if the gate admits.
    ///
    /// `args` must be a JSON object (or null for no arguments).
    pub fn invoke(&self, ctx: &mut Context, args: Value) -> Result<Outcome> {
        let mut map = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(Error::invalid(format!(
                    "{}: arguments must be an object, got {other}",
                    self.name
                )));
            }
        };
        let gate = Gate::from_args(&mut map)?;
        let inner = Arc::clone(&self.inner);
        ctx.gated(&gate, &self.name, |ctx| inner.run(ctx, Value::Object(map)))
    }
}

impl fmt::Debug for GatedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatedAction").field("name", &self.name).finish()
    }
}

/// A named batch of actions.
pub trait ActionModule {
    /// Module name; a second registration under the same name is ignored.
    fn name(&self) -> &str;

    /// Actions to register, by name.
    fn actions(&self) -> Vec<(String, Arc<dyn Action>)>;
}

/// Actions by name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    actions: BTreeMap<String, GatedAction>,
    modules: BTreeSet<String>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the [`CoreActions`].
    pub fn with_core() -> Self {
        let mut registry = Self::new();
        registry.add_module(&CoreActions);
        registry
    }

    /// Register (or replace) one action.
    pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn Action>) {
        let name = name.into();
        if self.actions.contains_key(&name) {
            log::debug!("replacing action {name}");
        }
        self.actions
            .insert(name.clone(), GatedAction::new(name, action));
    }

    /// Register every action of `module`, once. Returns whether it was new.
    pub fn add_module(&mut self, module: &dyn ActionModule) -> bool {
        if !self.modules.insert(module.name().to_string()) {
            log::debug!("action module {} already registered", module.name());
            return false;
        }
        for (name, action) in module.actions() {
            self.register(name, action);
        }
        true
    }

    /// Look up an action.
    pub fn get(&self, name: &str) -> Result<&GatedAction> {
        self.actions
            .get(name)
            .ok_or_else(|| Error::invalid(format!("unknown action: {name}")))
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered action names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Registered module names, sorted.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(String::as_str)
    }
}

/// Decode `args` into `T` and hand it to `op`.
pub fn typed<T, F>(op: F) -> Arc<dyn Action>
where
    T: DeserializeOwned + 'static,
    F: Fn(&mut Context, T) -> Result<Outcome> + Send + Sync + 'static,
{
    Arc::new(move |ctx: &mut Context, args: Value| -> Result<bool> {
        let request: T = serde_json::from_value(args)?;
        Ok(op(ctx, request)?.changed())
    })
}

/// Every built-in operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreActions;

/// Name [`CoreActions`] registers under.
pub const CORE: &str = "core";

impl ActionModule for CoreActions {
    fn name(&self) -> &str {
        CORE
    }

    fn actions(&self) -> Vec<(String, Arc<dyn Action>)> {
        let actions: Vec<(&str, Arc<dyn Action>)> = vec![
            ("directory", typed(|ctx, r: Directory| ctx.directory(&r))),
            ("file", typed(|ctx, r: File| ctx.file(&r))),
            ("download", typed(|ctx, r: Download| ctx.download(&r))),
            ("line_in_file", typed(|ctx, r: LineInFile| ctx.line_in_file(&r))),
            ("permissions", typed(|ctx, r: Attributes| ctx.attributes(&r))),
            ("group", typed(|ctx, r: Group| ctx.group(&r))),
            ("user", typed(|ctx, r: User| ctx.user(&r))),
            (
                "authorized_keys",
                typed(|ctx, r: AuthorizedKeys| ctx.authorized_keys(&r)),
            ),
            ("packages", typed(|ctx, r: Packages| ctx.packages(&r))),
            ("pip_packages", typed(|ctx, r: Packages| ctx.pip_packages(&r))),
            (
                "package_manager_update",
                typed(|ctx, r: IndexUpdate| ctx.package_manager_update(&r)),
            ),
            ("command", typed(|ctx, r: Command| ctx.command(&r))),
            ("shell", typed(|ctx, r: Shell| ctx.shell(&r))),
        ];
        actions
            .into_iter()
            .map(|(name, action)| (name.to_string(), action))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use serde_json::json;

    fn context() -> (MemoryHost, Context) {
        let host = MemoryHost::new();
        (host.clone(), Context::new(host))
    }

    struct Extras;

    impl ActionModule for Extras {
        fn name(&self) -> &str {
            "extras"
        }

        fn actions(&self) -> Vec<(String, Arc<dyn Action>)> {
            let touch: Arc<dyn Action> =
                Arc::new(|ctx: &mut Context, _args: Value| -> Result<bool> {
                    ctx.host().write(std::path::Path::new("/flag"), b"")?;
                    Ok(true)
                });
            vec![("touch_flag".to_string(), touch)]
        }
    }

    #[test]
    fn test_core_actions_registered() {
        let registry = Registry::with_core();
        for name in [
            "directory",
            "file",
            "download",
            "line_in_file",
            "group",
            "user",
            "authorized_keys",
            "packages",
            "pip_packages",
            "package_manager_update",
            "command",
            "shell",
        ] {
            assert!(registry.contains(name), "{name} missing");
        }
        assert_eq!(registry.modules().collect::<Vec<_>>(), vec![CORE]);
    }

    #[test]
    fn test_module_registered_once() {
        let mut registry = Registry::new();
        assert!(registry.add_module(&Extras));
        assert!(!registry.add_module(&Extras));
        assert!(registry.contains("touch_flag"));
    }

    #[test]
    fn test_invoke_directory_with_triggers() {
        let (host, mut ctx) = context();
        let outcome = ctx
            .invoke("directory", json!({"path": "/opt/app", "mode": "0750", "triggers": "app"}))
            .unwrap();
        assert_eq!(outcome, Outcome::Changed);
        assert!(ctx.is_fired("app"));
        assert_eq!(host.entry("/opt/app").unwrap().mode, 0o750);
    }

    #[test]
    fn test_invoke_gated_off() {
        let (host, mut ctx) = context();
        let outcome = ctx
            .invoke("directory", json!({"path": "/opt/app", "triggered_by": ["never"]}))
            .unwrap();
        assert_eq!(outcome, Outcome::Skipped);
        assert!(host.entry("/opt/app").is_none());
    }

    #[test]
    fn test_invoke_rejects_malformed_triggers() {
        let (host, mut ctx) = context();
        for args in [
            json!({"path": "/opt/app", "triggers": 3}),
            json!({"path": "/opt/app", "triggers": ["ok", 1]}),
            json!({"path": "/opt/app", "triggered_by": ""}),
        ] {
            let err = ctx.invoke("directory", args).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)));
        }
        assert!(host.entry("/opt/app").is_none());
    }

    #[test]
    fn test_invoke_unknown_action_and_bad_args() {
        let (_host, mut ctx) = context();
        assert!(matches!(
            ctx.invoke("frobnicate", json!({})),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ctx.invoke("directory", json!({"mode": "0755"})),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ctx.invoke("directory", json!(["/opt"])),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_custom_action_through_context() {
        let (host, mut ctx) = context();
        ctx.add_action_module(&Extras);
        assert!(ctx.invoke("touch_flag", Value::Null).unwrap().changed());
        assert!(host.file("/flag").is_some());
    }
}
