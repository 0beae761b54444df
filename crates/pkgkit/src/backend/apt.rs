//! Debian/Ubuntu backend using `dpkg` and `apt-get`.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{InstallRequest, InstalledPackage};
use std::process::{Command, Output};

/// Backend that executes real `dpkg -l` / `apt-get` commands.
#[derive(Debug, Clone, Default)]
pub struct AptBackend;

impl AptBackend {
    /// Create a new AptBackend.
    pub fn new() -> Self {
        Self
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        log::debug!("running {} {}", program, args.join(" "));
        Command::new(program)
            .args(args)
            .env("DEBIAN_FRONTEND", "noninteractive")
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ManagerNotFound {
                        manager: program.to_string(),
                    }
                } else {
                    Error::Io(e)
                }
            })
    }

    fn run_checked(&self, program: &str, args: &[&str]) -> Result<String> {
        let output = self.run(program, args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let command = format!("{} {}", program, args.join(" "));
            return Err(Error::from_command_output(&command, &stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Backend for AptBackend {
    fn name(&self) -> &'static str {
        "apt"
    }

    fn is_available(&self) -> bool {
        which::which("apt-get").is_ok() && which::which("dpkg").is_ok()
    }

    fn list_installed(&self) -> Result<Vec<InstalledPackage>> {
        let stdout = self.run_checked("dpkg", &["-l"])?;
        Ok(parse_dpkg_list(&stdout))
    }

    fn update(&self) -> Result<()> {
        self.run_checked("apt-get", &["update"])?;
        Ok(())
    }

    fn install(&self, requests: &[InstallRequest]) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }
        let specs = install_specs(requests);
        let mut args = vec!["install", "-y"];
        args.extend(specs.iter().map(String::as_str));
        self.run_checked("apt-get", &args)?;
        Ok(())
    }
}

/// Format requests as `apt-get install` arguments (`name` or `name=version`).
pub fn install_specs(requests: &[InstallRequest]) -> Vec<String> {
    requests
        .iter()
        .map(|r| match &r.version {
            Some(v) => format!("{}={}", r.name, v),
            None => r.name.clone(),
        })
        .collect()
}

/// Parse `dpkg -l` output, keeping only fully installed (`ii`) packages.
///
/// Architecture qualifiers (`libc6:amd64`) are stripped from names.
pub fn parse_dpkg_list(output: &str) -> Vec<InstalledPackage> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("ii"))
        .filter_map(|line| {
            let mut fields = line.split_whitespace().skip(1);
            let name = fields.next()?;
            let version = fields.next()?;
            let name = name.split(':').next().unwrap_or(name);
            Some(InstalledPackage {
                name: name.to_string(),
                version: version.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DPKG_OUTPUT: &str = "\
Desired=Unknown/Install/Remove/Purge/Hold
| Status=Not/Inst/Conf-files/Unpacked/halF-conf/Half-inst/trig-aWait/Trig-pend
|/ Err?=(none)/Reinst-required (Status,Err: uppercase=bad)
||/ Name           Version          Architecture Description
+++-==============-================-============-=================================
ii  adduser        3.118ubuntu2     all          add and remove users and groups
rc  oldthing       1.0              amd64        removed but configured
ii  libc6:amd64    2.35-0ubuntu3.6  amd64        GNU C Library: Shared libraries
ii  htop           3.0.5-7build2    amd64        interactive processes viewer
";

    #[test]
    fn test_parse_dpkg_list() {
        let packages = parse_dpkg_list(DPKG_OUTPUT);
        let names: Vec<_> = packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["adduser", "libc6", "htop"]);
        assert_eq!(packages[2].version, "3.0.5-7build2");
    }

    #[test]
    fn test_parse_dpkg_list_skips_short_lines() {
        assert!(parse_dpkg_list("ii\nii onlyname\n").is_empty());
    }

    #[test]
    fn test_install_specs() {
        let specs = install_specs(&[
            InstallRequest::unpinned("htop"),
            InstallRequest::pinned("curl", "7.68.0-1ubuntu2"),
        ]);
        assert_eq!(specs, vec!["htop", "curl=7.68.0-1ubuntu2"]);
    }
}
