//! The reconciliation context: host, collaborators and trigger ledger for
//! one run.

use crate::account::{self, AuthorizedKeys, Group, User};
use crate::command::{self, Command, Shell};
use crate::content::{self, File, LineInFile};
use crate::directory::{self, Directory};
use crate::download::{self, Download};
use crate::error::Result;
use crate::host::{Host, SystemHost};
use crate::metadata::InstanceMetadata;
use crate::module::{Module, package_union};
use crate::packages::{self, IndexUpdate, Packages};
use crate::permissions::{self, Attributes};
use crate::registry::{Action, ActionModule, Registry};
use crate::template::{TemplateEngine, TemplateEngines};
use crate::trigger::{Gate, Gated, TriggerLedger};
use crate::types::Outcome;
use fetchkit::{Fetcher, HttpFetcher};
use pkgkit::backend::apt::AptBackend;
use pkgkit::backend::pip::PipBackend;
use pkgkit::Manager;
use serde_json::Value;
use std::sync::Arc;

/// Everything one run needs.
///
/// Operations run one at a time, in call order. Each returns an
/// [`Outcome`]; a change fires the operation's triggers, which later
/// operations may be gated on. Nothing outlives the context.
pub struct Context {
    host: Box<dyn Host>,
    ledger: TriggerLedger,
    packages: Option<Manager>,
    pip: Option<Manager>,
    fetcher: Box<dyn Fetcher>,
    templates: TemplateEngines,
    metadata: Option<InstanceMetadata>,
    registry: Registry,
    modules: Vec<Box<dyn Module>>,
}

impl Context {
    /// A context over `host` with no package managers and a real HTTP
    /// fetcher.
    pub fn new(host: impl Host + 'static) -> Self {
        Self {
            host: Box::new(host),
            ledger: TriggerLedger::new(),
            packages: None,
            pip: None,
            fetcher: Box::new(HttpFetcher::new()),
            templates: TemplateEngines::new(),
            metadata: None,
            registry: Registry::with_core(),
            modules: Vec::new(),
        }
    }

    /// A context for this machine: apt, pip and HTTP.
    pub fn system() -> Self {
        Self::new(SystemHost::new())
            .with_packages(Manager::new(Box::new(AptBackend::new())))
            .with_pip(Manager::new(Box::new(PipBackend::new())))
    }

    /// Use `manager` for system packages.
    pub fn with_packages(mut self, manager: Manager) -> Self {
        self.packages = Some(manager);
        self
    }

    /// Use `manager` for pip packages.
    pub fn with_pip(mut self, manager: Manager) -> Self {
        self.pip = Some(manager);
        self
    }

    /// Use `fetcher` for downloads and metadata.
    pub fn with_fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }

    /// Make a template engine available by name.
    pub fn register_template_engine(
        &mut self,
        name: impl Into<String>,
        engine: impl TemplateEngine + 'static,
    ) {
        self.templates.register(name, Box::new(engine));
    }

    /// Engine used when a template names none.
    pub fn set_default_template_engine(&mut self, name: &str) -> Result<()> {
        self.templates.set_default(name)
    }

    /// Register (or replace) a single action.
    pub fn register_action(&mut self, name: impl Into<String>, action: impl Action + 'static) {
        self.registry.register(name, Arc::new(action));
    }

    /// Register a batch of actions once.
    pub fn add_action_module(&mut self, module: &dyn ActionModule) -> bool {
        self.registry.add_module(module)
    }

    /// Queue a module for [`run_modules`](Self::run_modules).
    pub fn add_module(&mut self, module: impl Module + 'static) {
        self.modules.push(Box::new(module));
    }

    /// The host operations run against.
    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    /// Available actions.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Trigger state so far.
    pub fn ledger(&self) -> &TriggerLedger {
        &self.ledger
    }

    /// Triggers fired so far, in firing order.
    pub fn fired(&self) -> &[String] {
        self.ledger.fired()
    }

    /// Whether `name` has fired.
    pub fn is_fired(&self, name: &str) -> bool {
        self.ledger.is_fired(name)
    }

    /// Run `op` unless `gate` says otherwise, then record what it fired.
    pub(crate) fn gated<F>(&mut self, gate: &Gate, what: &str, op: F) -> Result<Outcome>
    where
        F: FnOnce(&mut Self) -> Result<bool>,
    {
        gate.validate()?;
        if !gate.admits(&self.ledger) {
            log::debug!(
                "{what}: skipped, waiting on {}",
                gate.triggered_by.join(", ")
            );
            return Ok(Outcome::Skipped);
        }
        let outcome = Outcome::from_changed(op(self)?);
        log::debug!("{what}: {outcome}");
        gate.record(outcome, &mut self.ledger);
        Ok(outcome)
    }

    /// Invoke a registered action with a JSON argument object.
    pub fn invoke(&mut self, action: &str, args: Value) -> Result<Outcome> {
        let action = self.registry.get(action)?.clone();
        action.invoke(self, args)
    }

    /// Ensure a directory and its parents exist.
    pub fn directory(&mut self, request: &Directory) -> Result<Outcome> {
        self.gated(request.gate(), "directory", |ctx| {
            directory::reconcile(ctx.host(), request)
        })
    }

    /// Ensure a file holds the requested content.
    pub fn file(&mut self, request: &File) -> Result<Outcome> {
        self.gated(request.gate(), "file", |ctx| {
            content::reconcile_file(ctx.host.as_ref(), &ctx.templates, request)
        })
    }

    /// Ensure a file holds what a URL serves.
    pub fn download(&mut self, request: &Download) -> Result<Outcome> {
        self.gated(request.gate(), "download", |ctx| {
            download::reconcile(ctx.host.as_ref(), ctx.fetcher.as_ref(), request)
        })
    }

    /// Ensure a line is present in, or absent from, a file.
    pub fn line_in_file(&mut self, request: &LineInFile) -> Result<Outcome> {
        self.gated(request.gate(), "line_in_file", |ctx| {
            content::reconcile_line(ctx.host.as_ref(), &ctx.templates, request)
        })
    }

    /// Ensure an existing path's owner, group and mode.
    pub fn attributes(&mut self, request: &Attributes) -> Result<Outcome> {
        self.gated(request.gate(), "permissions", |ctx| {
            permissions::reconcile(ctx.host(), request)
        })
    }

    /// Ensure a group exists.
    pub fn group(&mut self, request: &Group) -> Result<Outcome> {
        self.gated(request.gate(), "group", |ctx| {
            account::reconcile_group(ctx.host(), request)
        })
    }

    /// Ensure a user exists with its home, groups, password and keys.
    pub fn user(&mut self, request: &User) -> Result<Outcome> {
        self.gated(request.gate(), "user", |ctx| {
            account::reconcile_user(ctx.host.as_ref(), &ctx.templates, request)
        })
    }

    /// Ensure a user's authorized keys.
    pub fn authorized_keys(&mut self, request: &AuthorizedKeys) -> Result<Outcome> {
        self.gated(request.gate(), "authorized_keys", |ctx| {
            account::reconcile_keys(ctx.host.as_ref(), &ctx.templates, &request.user, &request.keys)
        })
    }

    /// Ensure system packages.
    pub fn packages(&mut self, request: &Packages) -> Result<Outcome> {
        self.gated(request.gate(), "packages", |ctx| {
            packages::reconcile(ctx.packages.as_mut(), request)
        })
    }

    /// Ensure pip packages.
    pub fn pip_packages(&mut self, request: &Packages) -> Result<Outcome> {
        self.gated(request.gate(), "pip_packages", |ctx| {
            packages::reconcile(ctx.pip.as_mut(), request)
        })
    }

    /// Refresh the system package index.
    pub fn package_manager_update(&mut self, request: &IndexUpdate) -> Result<Outcome> {
        self.gated(request.gate(), "package_manager_update", |ctx| {
            packages::update_index(ctx.packages.as_mut())
        })
    }

    /// Run a program.
    pub fn command(&mut self, request: &Command) -> Result<Outcome> {
        self.gated(request.gate(), "command", |ctx| command::run(ctx.host(), request))
    }

    /// Run a shell script.
    pub fn shell(&mut self, request: &Shell) -> Result<Outcome> {
        self.gated(request.gate(), "shell", |ctx| {
            command::run_shell(ctx.host(), request)
        })
    }

    /// Zone, region and instance id, fetched on first use.
    pub fn instance_metadata(&mut self) -> Result<&InstanceMetadata> {
        let metadata = match self.metadata.take() {
            Some(metadata) => metadata,
            None => InstanceMetadata::fetch(self.fetcher.as_ref())?,
        };
        Ok(self.metadata.insert(metadata))
    }

    /// Install the packages of every queued module, then apply each module.
    pub fn run_modules(&mut self) -> Result<()> {
        let modules = std::mem::take(&mut self.modules);
        let result = self.apply_modules(&modules);
        let added = std::mem::replace(&mut self.modules, modules);
        self.modules.extend(added);
        result
    }

    fn apply_modules(&mut self, modules: &[Box<dyn Module>]) -> Result<()> {
        let wanted = package_union(modules);
        if !wanted.is_empty() {
            self.packages(&Packages::new(wanted))?;
        }
        for module in modules {
            log::info!("applying module {}", module.name());
            module.apply(self)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("fired", &self.ledger.fired())
            .field("packages", &self.packages)
            .field("pip", &self.pip)
            .field("templates", &self.templates)
            .field("registry", &self.registry)
            .field("modules", &self.modules.len())
            .finish_non_exhaustive()
    }
}
