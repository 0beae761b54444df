//! Arbitrary commands. These cannot know whether they changed anything, so a
//! run that is not gated off always reports a change.

use crate::error::{Error, Result};
use crate::host::{CommandOutput, Host};
use crate::trigger::{Gate, impl_gated};
use serde::{Deserialize, Deserializer};

/// Run a program with arguments, no shell involved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Command {
    /// Program followed by its arguments
    #[serde(alias = "cmd", alias = "command", deserialize_with = "argv")]
    pub argv: Vec<String>,
    /// Keep output out of the log
    #[serde(default)]
    pub quiet: bool,
    /// Trigger wiring
    #[serde(skip)]
    pub gate: Gate,
}

impl_gated!(Command);

/// A list, or a string split on whitespace.
fn argv<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Line(String),
        List(Vec<String>),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Line(line) => line.split_whitespace().map(str::to_string).collect(),
        Raw::List(list) => list,
    })
}

impl Command {
    /// Run `argv[0]` with the rest as arguments.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Don't log output.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

/// Run a script through `sh -c`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Shell {
    /// Script text
    #[serde(alias = "cmd", alias = "command")]
    pub script: String,
    /// Keep output out of the log
    #[serde(default)]
    pub quiet: bool,
    /// Trigger wiring
    #[serde(skip)]
    pub gate: Gate,
}

impl_gated!(Shell);

impl Shell {
    /// Run `script` with `sh -c`.
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..Self::default()
        }
    }

    /// Don't log output.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

/// Apply a [`Command`] request (ignoring its gate).
pub fn run(host: &dyn Host, request: &Command) -> Result<bool> {
    let Some((program, args)) = request.argv.split_first() else {
        return Err(Error::invalid("command: empty argv"));
    };
    let output = host.run(program, args, None)?;
    finish(&request.argv.join(" "), &output, request.quiet)
}

/// Apply a [`Shell`] request (ignoring its gate).
pub fn run_shell(host: &dyn Host, request: &Shell) -> Result<bool> {
    if request.script.trim().is_empty() {
        return Err(Error::invalid("shell: empty script"));
    }
    let args = ["-c".to_string(), request.script.clone()];
    let output = host.run("sh", &args, None)?;
    finish(&request.script, &output, request.quiet)
}

fn finish(display: &str, output: &CommandOutput, quiet: bool) -> Result<bool> {
    if !quiet {
        for line in output.stdout.lines().chain(output.stderr.lines()) {
            log::info!("{line}");
        }
    }
    if output.success() {
        return Ok(true);
    }
    let status = output
        .status
        .map_or_else(|| "killed by signal".to_string(), |code| format!("exit status {code}"));
    let detail = output.stderr.trim();
    Err(Error::command(
        display,
        if detail.is_empty() {
            status
        } else {
            format!("{status}: {detail}")
        },
    ))
}
