//! Python packages via `pip freeze` / `pip install`.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{InstallRequest, InstalledPackage};
use std::process::Command;

/// Backend that executes a real `pip` executable.
#[derive(Debug, Clone)]
pub struct PipBackend {
    program: String,
}

impl PipBackend {
    /// Create a backend using `pip` from PATH.
    pub fn new() -> Self {
        Self::with_program("pip")
    }

    /// Create a backend using a specific pip executable (e.g. `pip3`).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run_checked(&self, args: &[&str]) -> Result<String> {
        log::debug!("running {} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ManagerNotFound {
                        manager: self.program.clone(),
                    }
                } else {
                    Error::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let command = format!("{} {}", self.program, args.join(" "));
            return Err(Error::from_command_output(&command, &stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for PipBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for PipBackend {
    fn name(&self) -> &'static str {
        "pip"
    }

    fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    fn list_installed(&self) -> Result<Vec<InstalledPackage>> {
        let stdout = self.run_checked(&["freeze"])?;
        Ok(parse_freeze(&stdout))
    }

    fn update(&self) -> Result<()> {
        // pip resolves against the index on every install
        Ok(())
    }

    fn install(&self, requests: &[InstallRequest]) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }
        let args = install_args(requests);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_checked(&args)?;
        Ok(())
    }

    fn canonical_name(&self, name: &str) -> String {
        canonical_name(name)
    }
}

/// PEP 503 normalization: lowercase, with runs of `-`, `_` and `.` folded
/// into a single `-`.
pub fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.push(c.to_ascii_lowercase());
            in_separator = false;
        }
    }
    out
}

/// Build `pip install` arguments: pins as `name==version`, and `--upgrade`
/// whenever any request is unpinned.
pub fn install_args(requests: &[InstallRequest]) -> Vec<String> {
    let mut args = vec!["install".to_string()];
    if requests.iter().any(|r| r.version.is_none()) {
        args.push("--upgrade".to_string());
    }
    args.extend(requests.iter().map(|r| match &r.version {
        Some(v) => format!("{}=={}", r.name, v),
        None => r.name.clone(),
    }));
    args
}

/// Parse `pip freeze` output; lines that are not `name==version` are ignored.
pub fn parse_freeze(output: &str) -> Vec<InstalledPackage> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.trim().split("==").collect();
            match parts.as_slice() {
                [name, version] => Some(InstalledPackage {
                    name: (*name).to_string(),
                    version: (*version).to_string(),
                }),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_freeze() {
        let out = "requests==2.31.0\n-e git+https://example.com/x.git#egg=x\nboto==2.49.0\n";
        let packages = parse_freeze(out);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "requests");
        assert_eq!(packages[1].version, "2.49.0");
    }

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("PyYAML"), "pyyaml");
        assert_eq!(canonical_name("ruamel.yaml"), "ruamel-yaml");
        assert_eq!(canonical_name("Foo__Bar-.baz"), "foo-bar-baz");
        assert_eq!(canonical_name("requests"), "requests");
    }

    #[test]
    fn test_install_args_pinned_only() {
        let args = install_args(&[InstallRequest::pinned("boto", "2.49.0")]);
        assert_eq!(args, vec!["install", "boto==2.49.0"]);
    }

    #[test]
    fn test_install_args_upgrade_when_unpinned() {
        let args = install_args(&[
            InstallRequest::pinned("boto", "2.49.0"),
            InstallRequest::unpinned("requests"),
        ]);
        assert_eq!(args, vec!["install", "--upgrade", "boto==2.49.0", "requests"]);
    }
}
