use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "settle")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge this host to the state a manifest declares", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run every step of a manifest against this host
    Apply(ManifestArgs),

    /// Parse a manifest and verify every action exists, without running it
    Check(ManifestArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ManifestArgs {
    /// Manifest file (TOML)
    #[arg(env = "SETTLE_MANIFEST")]
    pub manifest: PathBuf,
}
