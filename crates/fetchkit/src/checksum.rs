//! Hash algorithms for verifying downloaded content.

use crate::error::{Error, Result};
use sha2::Digest;
use std::fmt;
use std::str::FromStr;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashAlgorithm {
    /// SHA-224
    Sha224,
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
    /// BLAKE3 (256-bit output)
    Blake3,
}

impl HashAlgorithm {
    /// All supported algorithms.
    pub const ALL: [HashAlgorithm; 5] = [
        Self::Sha224,
        Self::Sha256,
        Self::Sha384,
        Self::Sha512,
        Self::Blake3,
    ];

    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
            Self::Blake3 => "blake3",
        }
    }

    /// Parse an algorithm name. `sha256sum` style spellings are accepted.
    pub fn parse(name: &str) -> Result<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let bare = lower.strip_suffix("sum").unwrap_or(&lower);
        Self::ALL
            .into_iter()
            .find(|algo| algo.name() == bare)
            .ok_or_else(|| Error::UnsupportedAlgorithm(name.to_string()))
    }

    /// Lowercase hex digest of `data`.
    pub fn hex_digest(&self, data: &[u8]) -> String {
        match self {
            Self::Sha224 => to_hex(&sha2::Sha224::digest(data)),
            Self::Sha256 => to_hex(&sha2::Sha256::digest(data)),
            Self::Sha384 => to_hex(&sha2::Sha384::digest(data)),
            Self::Sha512 => to_hex(&sha2::Sha512::digest(data)),
            Self::Blake3 => blake3::hash(data).to_hex().to_string(),
        }
    }

    /// Whether `data` hashes to `expected` (hex, case-insensitive).
    pub fn matches(&self, data: &[u8], expected: &str) -> bool {
        self.hex_digest(data).eq_ignore_ascii_case(expected.trim())
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
