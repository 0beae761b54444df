//! # converge
//!
//! Idempotent reconcilers for a single host, tied together by triggers.
//!
//! Every operation inspects current state, changes only what differs and
//! reports an [`Outcome`]. An operation may fire named triggers when it
//! changes something; a later operation gated on one of them runs only if
//! it fired earlier in the same [`Context`].
//!
//! Resources covered:
//! - Directories, file content (literal, copied, templated, JSON, YAML)
//! - Ownership and mode
//! - Single lines in files
//! - OS groups, users, passwords and SSH authorized keys
//! - apt and pip packages
//! - Downloads verified by digest
//! - Commands and shell scripts
//!
//! ## Example
//!
//! ```no_run
//! use converge::{Command, Context, File, Gated, Permissions};
//!
//! let mut ctx = Context::system();
//! ctx.file(
//!     &File::new("/etc/consul.d/server.json")
//!         .json(serde_json::json!({"server": true}))
//!         .permissions(Permissions::owned_by("consul").mode(0o640))
//!         .fires("consul-config"),
//! )?;
//! ctx.command(&Command::new(["systemctl", "restart", "consul"]).after("consul-config"))?;
//! # Ok::<(), converge::Error>(())
//! ```
//!
//! Data-driven callers go through [`Context::invoke`] with a JSON object;
//! `triggers` and `triggered_by` keys carry the gate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod account;
pub mod command;
pub mod content;
pub mod context;
pub mod directory;
pub mod download;
pub mod error;
pub mod host;
pub mod metadata;
pub mod module;
pub mod packages;
pub mod permissions;
pub mod registry;
pub mod template;
pub mod trigger;
pub mod types;

pub use account::{AuthorizedKeys, Group, User};
pub use command::{Command, Shell};
pub use content::{File, InsertAt, LineInFile, LineState};
pub use context::Context;
pub use directory::Directory;
pub use download::Download;
pub use error::{Error, Result};
pub use host::{HomePolicy, Host, MemoryHost, Password, SystemHost};
pub use metadata::InstanceMetadata;
pub use module::Module;
pub use packages::{IndexUpdate, Packages};
pub use permissions::Attributes;
pub use registry::{Action, ActionModule, CoreActions, Registry};
pub use template::{TemplateEngine, TemplateEngines};
pub use trigger::{Gate, Gated, TriggerLedger};
pub use types::{Outcome, Permissions, Principal, Summary};
