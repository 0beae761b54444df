//! # pkgkit
//!
//! Package manager backends with version-constraint reconciliation.
//!
//! This crate provides functionality for:
//! - Parsing constraints such as `htop`, `curl=7.68.0`, `consul>=1.9.0`
//! - Comparing versions run by run (`1.10.0` is newer than `1.9.0`)
//! - Listing and installing packages through apt/dpkg or pip
//! - Memoizing the installed list between mutations
//!
//! ## Example
//!
//! ```no_run
//! use pkgkit::{Constraint, Manager, backend::apt::AptBackend};
//!
//! let mut manager = Manager::new(Box::new(AptBackend::new()));
//! let wanted = vec![
//!     Constraint::parse("htop").unwrap(),
//!     Constraint::parse("curl>=7.68.0").unwrap(),
//! ];
//! if manager.ensure(&wanted).unwrap() {
//!     println!("installed something");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod manager;
pub mod types;
pub mod version;

pub use backend::{Backend, MockBackend};
pub use error::{Error, ErrorCategory, Result};
pub use manager::Manager;
pub use types::{Comparator, Constraint, InstallRequest, InstalledPackage};
pub use version::Version;
