mod cli;
mod manifest;
mod ui;

use anyhow::{Context as _, Result, bail};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use converge::{Context, Registry, Summary, SystemHost};
use manifest::{Manifest, PackageManager};
use pkgkit::Manager;
use pkgkit::backend::apt::AptBackend;
use pkgkit::backend::pip::PipBackend;
use std::io;
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match cli.command {
        Command::Apply(args) => apply(&args.manifest, cli.quiet),
        Command::Check(args) => check(&args.manifest, cli.quiet),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "settle", &mut io::stdout());
            Ok(())
        }
    }
}

/// Build a context for this host from the manifest settings.
fn context(manifest: &Manifest) -> Result<Context> {
    let mut ctx =
        Context::new(SystemHost::new()).with_pip(Manager::new(Box::new(PipBackend::new())));
    if manifest.settings.packages == PackageManager::Apt {
        ctx = ctx.with_packages(Manager::new(Box::new(AptBackend::new())));
    }
    if let Some(engine) = &manifest.settings.template_engine {
        ctx.set_default_template_engine(engine)
            .context("Invalid template_engine setting")?;
    }
    Ok(ctx)
}

fn apply(path: &Path, quiet: bool) -> Result<()> {
    let manifest = Manifest::load(path)?;
    let mut ctx = context(&manifest)?;
    let total = manifest.steps.len();
    let mut summary = Summary::default();

    for (i, step) in manifest.steps.iter().enumerate() {
        log::debug!("step {}: {}", i + 1, step.action);
        let outcome = match ctx.invoke(&step.action, step.args()) {
            Ok(outcome) => outcome,
            Err(e) => {
                ui::error(&format!("step {} ({}) failed", i + 1, step.action));
                return Err(e).with_context(|| format!("step {} ({})", i + 1, step.action));
            }
        };
        summary.add(outcome);
        if !quiet {
            ui::step(i + 1, total, &step.action, outcome);
        }
    }

    if !quiet {
        ui::summary(&summary, ctx.fired());
    }
    Ok(())
}

fn check(path: &Path, quiet: bool) -> Result<()> {
    let manifest = Manifest::load(path)?;
    let unknown = manifest.unknown_actions(&Registry::with_core());
    if !unknown.is_empty() {
        bail!("Unknown actions in {}: {}", path.display(), unknown.join(", "));
    }
    if !quiet {
        ui::success(&format!(
            "{}: {} steps, all actions known",
            path.display(),
            manifest.steps.len()
        ));
    }
    Ok(())
}
