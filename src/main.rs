//! buildpane CLI entry point

use anyhow::{bail, Result};
use buildpane::catalog::CatalogEntry;
use buildpane::ui::TUI;
use buildpane::{App, BuildSession, BuildTarget, Config};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "buildpane", version, about = "Pick a build target and watch it build")]
struct Cli {
    /// Config file (defaults to <config dir>/buildpane/config.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive target picker and console
    Ui,
    /// Print the known build targets
    Targets {
        /// Run discovery again instead of using the cached list
        #[arg(long)]
        refresh: bool,
    },
    /// Build one target, streaming output to stdout
    Build {
        /// Target name or glob
        target: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Ui);

    // Log lines would tear the alternate screen
    let default_filter = match command {
        Command::Ui => "warn",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    log::info!("buildpane v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(cli.config.as_deref())?;

    match command {
        Command::Ui => run_ui(config),
        Command::Targets { refresh } => list_targets(config, refresh),
        Command::Build { target } => {
            let runtime = tokio::runtime::Runtime::new()?;
            let succeeded = runtime.block_on(build(config, target))?;
            if !succeeded {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn run_ui(config: Config) -> Result<()> {
    let (session, event_rx) = BuildSession::new(config);
    let mut app = App::new(session, event_rx);

    let mut tui = TUI::new()?;
    app.run(&mut tui)
}

fn list_targets(config: Config, refresh: bool) -> Result<()> {
    let (mut session, _event_rx) = BuildSession::new(config);
    let entries = if refresh {
        session.recompute_targets()?
    } else {
        session.targets()?
    };

    let mut stdout = std::io::stdout().lock();
    for entry in &entries {
        match entry.annotation() {
            Some(note) if matches!(entry, CatalogEntry::Target(_)) => {
                writeln!(stdout, "{} {}", entry.label(), note)?
            }
            _ => writeln!(stdout, "{}", entry.label())?,
        }
    }
    Ok(())
}

/// Stream one build to stdout. Returns false when the build should fail the
/// command: errors were indexed, or the stream was cancelled or undecodable.
async fn build(config: Config, target: String) -> Result<bool> {
    let (mut session, mut event_rx) = BuildSession::new(config);
    let target = BuildTarget::parse(&target)
        .ok_or_else(|| anyhow::anyhow!("target name must not be empty"))?;

    session.start_build(&target)?;

    let console = session.console().clone();
    let mut printed = 0;
    let mut stdout = std::io::stdout();

    while let Some(event) = event_rx.recv().await {
        let summary = session.apply(event);

        let text = console.text_from(printed);
        if !text.is_empty() {
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
            printed += text.len();
        }

        if let Some(summary) = summary {
            writeln!(stdout)?;
            let base_dir = session.config().result_base_dir();
            for diagnostic in session.diagnostics() {
                writeln!(
                    stdout,
                    "{}:{}:{}: {}: {}",
                    diagnostic.resolve(&base_dir).display(),
                    diagnostic.line,
                    diagnostic.column,
                    diagnostic.severity,
                    diagnostic.message
                )?;
            }
            writeln!(
                stdout,
                "{}: {} ({} errors, {} warnings)",
                summary.target, summary.outcome, summary.counts.errors, summary.counts.warnings
            )?;
            return Ok(summary.succeeded());
        }
    }

    bail!("build event stream ended unexpectedly")
}
