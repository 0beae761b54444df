//! Network downloads verified against digests.

use crate::directory::ensure_path;
use crate::error::{Error, Result};
use crate::host::Host;
use crate::permissions::apply_permissions;
use crate::trigger::{Gate, impl_gated};
use crate::types::Permissions;
use fetchkit::{Fetcher, HashAlgorithm};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Ensure a file holds what `url` serves.
///
/// Without checksums an existing file is trusted forever; with them, a
/// file whose digest differs is fetched again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawDownload")]
pub struct Download {
    /// Destination file
    pub path: PathBuf,
    /// Source URL
    pub url: String,
    /// Algorithm name (`sha256` or `sha256sum`) to expected hex digest
    pub checksums: BTreeMap<String, String>,
    /// Owner, group and mode
    pub permissions: Permissions,
    /// Trigger wiring
    pub gate: Gate,
}

impl_gated!(Download);

/// Manifest shape: checksums may sit in a `checksums` table or directly
/// under their algorithm name next to the permission keys.
#[derive(Deserialize)]
struct RawDownload {
    path: PathBuf,
    url: String,
    #[serde(default)]
    checksums: BTreeMap<String, String>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl TryFrom<RawDownload> for Download {
    type Error = Error;

    fn try_from(raw: RawDownload) -> Result<Self> {
        let mut checksums = raw.checksums;
        let mut permissions = Map::new();
        for (key, value) in raw.rest {
            match key.as_str() {
                "owner" | "group" | "mode" => {
                    permissions.insert(key, value);
                }
                _ => {
                    HashAlgorithm::parse(&key).map_err(|_| {
                        Error::invalid(format!("download: unknown argument {key:?}"))
                    })?;
                    let Value::String(digest) = value else {
                        return Err(Error::invalid(format!("download: {key} must be a string")));
                    };
                    checksums.insert(key, digest);
                }
            }
        }
        Ok(Self {
            path: raw.path,
            url: raw.url,
            checksums,
            permissions: serde_json::from_value(Value::Object(permissions))?,
            gate: Gate::default(),
        })
    }
}

impl Download {
    /// Fetch `url` into `path`.
    pub fn new(path: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Require a digest.
    pub fn checksum(mut self, algorithm: &str, hex: impl Into<String>) -> Self {
        self.checksums.insert(algorithm.to_string(), hex.into());
        self
    }

    /// Set owner, group and mode.
    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    fn parsed_checksums(&self) -> Result<Vec<(HashAlgorithm, &str)>> {
        self.checksums
            .iter()
            .map(|(name, hex)| {
                HashAlgorithm::parse(name)
                    .map(|algo| (algo, hex.as_str()))
                    .map_err(|_| Error::invalid(format!("unsupported hash algorithm: {name}")))
            })
            .collect()
    }
}

/// Apply a [`Download`] request (ignoring its gate).
pub fn reconcile(host: &dyn Host, fetcher: &dyn Fetcher, request: &Download) -> Result<bool> {
    let checks = request.parsed_checksums()?;
    let path = &request.path;

    let needs_fetch = match host.stat(path)? {
        Some(stat) if stat.is_dir() => return Err(Error::conflict(path, "is a directory")),
        None => true,
        Some(_) if checks.is_empty() => false,
        Some(_) => {
            let current = host.read(path)?;
            checks.iter().any(|(algo, hex)| !algo.matches(&current, hex))
        }
    };

    if needs_fetch {
        log::info!("downloading {} -> {}", request.url, path.display());
        let body = fetcher.get(&request.url)?;
        if let Some(parent) = path.parent() {
            ensure_path(host, parent)?;
        }
        host.write(path, &body)?;
        for (algo, expected) in &checks {
            if !algo.matches(&body, expected) {
                return Err(Error::ChecksumMismatch {
                    path: path.clone(),
                    algorithm: algo.to_string(),
                    expected: (*expected).to_string(),
                    actual: algo.hex_digest(&body),
                });
            }
        }
    } else {
        log::debug!("{} already downloaded", path.display());
    }

    let perms_changed = apply_permissions(host, path, &request.permissions)?;
    Ok(needs_fetch || perms_changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use fetchkit::MockFetcher;
    use serde_json::json;

    const URL: &str = "https://releases.example.com/consul_0.4.1_linux_amd64.zip";

    fn sha256(data: &[u8]) -> String {
        HashAlgorithm::Sha256.hex_digest(data)
    }

    #[test]
    fn test_downloads_once_without_checksum() {
        let host = MemoryHost::new();
        let fetcher = MockFetcher::new().with_response(URL, "zipdata");
        let request = Download::new("/opt/consul/consul.zip", URL);

        assert!(reconcile(&host, &fetcher, &request).unwrap());
        assert!(!reconcile(&host, &fetcher, &request).unwrap());
        assert_eq!(fetcher.request_count(), 1);
        assert_eq!(host.file("/opt/consul/consul.zip").unwrap(), b"zipdata");
    }

    #[test]
    fn test_existing_file_never_refetched_without_checksum() {
        let host = MemoryHost::new().with_file("/opt/x", "stale");
        let fetcher = MockFetcher::new().with_response(URL, "fresh");
        assert!(!reconcile(&host, &fetcher, &Download::new("/opt/x", URL)).unwrap());
        assert_eq!(fetcher.request_count(), 0);
    }

    #[test]
    fn test_checksum_mismatch_triggers_redownload() {
        let host = MemoryHost::new().with_file("/opt/x", "corrupted");
        let fetcher = MockFetcher::new().with_response(URL, "good");
        let request = Download::new("/opt/x", URL).checksum("sha256sum", sha256(b"good"));

        assert!(reconcile(&host, &fetcher, &request).unwrap());
        assert_eq!(host.file("/opt/x").unwrap(), b"good");
        assert!(!reconcile(&host, &fetcher, &request).unwrap());
        assert_eq!(fetcher.request_count(), 1);
    }

    #[test]
    fn test_bad_download_is_checksum_error_and_not_accepted() {
        let host = MemoryHost::new();
        let fetcher = MockFetcher::new().with_response(URL, "tampered");
        let request = Download::new("/opt/x", URL).checksum("sha256", sha256(b"good"));

        let err = reconcile(&host, &fetcher, &request).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));

        // Next run sees the wrong digest and fetches again
        fetcher.set_response(URL, "good");
        assert!(reconcile(&host, &fetcher, &request).unwrap());
        assert_eq!(fetcher.request_count(), 2);
    }

    #[test]
    fn test_fetch_failure_leaves_nothing_behind() {
        let host = MemoryHost::new();
        let fetcher = MockFetcher::new();
        let err = reconcile(&host, &fetcher, &Download::new("/opt/x", URL)).unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
        assert!(host.entry("/opt/x").is_none());
    }

    #[test]
    fn test_unknown_algorithm_is_invalid() {
        let host = MemoryHost::new();
        let fetcher = MockFetcher::new().with_response(URL, "x");
        let request = Download::new("/opt/x", URL).checksum("md5", "abc");
        assert!(matches!(
            reconcile(&host, &fetcher, &request),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(fetcher.request_count(), 0);
    }

    #[test]
    fn test_permissions_applied_after_download() {
        let host = MemoryHost::new();
        let fetcher = MockFetcher::new().with_response(URL, "bin");
        let request = Download::new("/usr/local/bin/tool", URL)
            .permissions(Permissions::none().mode(0o755));
        reconcile(&host, &fetcher, &request).unwrap();
        assert_eq!(host.entry("/usr/local/bin/tool").unwrap().mode, 0o755);
    }

    #[test]
    fn test_deserialize_inline_checksums() {
        let request: Download = serde_json::from_value(json!({
            "path": "/opt/x",
            "url": URL,
            "sha256sum": "ab",
            "checksums": {"blake3": "cd"},
            "mode": "0755"
        }))
        .unwrap();
        assert_eq!(request.checksums.get("sha256sum").map(String::as_str), Some("ab"));
        assert_eq!(request.checksums.get("blake3").map(String::as_str), Some("cd"));
        assert_eq!(request.permissions.mode, Some(0o755));
    }

    #[test]
    fn test_deserialize_rejects_unknown_keys() {
        let result: std::result::Result<Download, _> =
            serde_json::from_value(json!({"path": "/x", "url": URL, "colour": "red"}));
        assert!(result.is_err());
    }
}
