//! # fetchkit
//!
//! Blocking URL fetching plus digest verification.
//!
//! [`HttpFetcher`] talks to the network through ureq; [`MockFetcher`]
//! serves canned bodies for tests. [`HashAlgorithm`] checks downloaded
//! bytes against an expected hex digest.
//!
//! ```no_run
//! use fetchkit::{Fetcher, HashAlgorithm, HttpFetcher};
//!
//! let body = HttpFetcher::new().get("https://example.com/tool.tar.gz").unwrap();
//! let algo = HashAlgorithm::parse("sha256sum").unwrap();
//! println!("{}", algo.hex_digest(&body));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checksum;
pub mod error;
pub mod fetcher;

pub use checksum::HashAlgorithm;
pub use error::{Error, ErrorCategory, Result};
pub use fetcher::{Fetcher, HttpFetcher, MockFetcher};
