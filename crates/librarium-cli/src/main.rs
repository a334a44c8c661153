//! # librarium
//!
//! Command-line front-end: fan one research query out to many remote
//! search / research providers, deduplicate what comes back, and keep a
//! machine-readable record per run.

#![deny(unsafe_code)]

mod bootstrap;
mod commands;
mod progress;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Fan a research query out to many search and research providers.
#[derive(Parser, Debug)]
#[command(name = "librarium", version, about)]
struct Cli {
    /// Raise log verbosity to debug (overridden by LIBRARIUM_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dispatch a query to the selected providers.
    Run(commands::run::RunArgs),
    /// Show, poll, or retrieve pending async research tasks.
    Status(commands::status::StatusArgs),
    /// List past runs under the output directory.
    Ls(commands::ls::LsArgs),
    /// Show or edit named provider groups.
    Groups(commands::groups::GroupsArgs),
    /// Create starter configuration files.
    Init(commands::init::InitArgs),
    /// Diagnose configuration, keys, and provider connectivity.
    Doctor(commands::doctor::DoctorArgs),
    /// Print the resolved (or global) configuration.
    Config(commands::config::ConfigArgs),
    /// Delete old run directories.
    Cleanup(commands::cleanup::CleanupArgs),
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("LIBRARIUM_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// First interrupt cancels the run (partial artifacts are already on
/// disk); a second one exits immediately.
fn install_interrupt_handler() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    drop(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling in-flight work");
            token.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    }));
    cancel
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cancel = install_interrupt_handler();

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(error) => {
            eprintln!("error: cannot determine working directory: {error}");
            return ExitCode::from(2);
        }
    };

    let outcome: Result<i32> = match cli.command {
        Command::Run(args) => commands::run::run(args, &cwd, cancel).await,
        Command::Status(args) => commands::status::run(args, &cwd, cancel).await,
        Command::Ls(args) => commands::ls::run(&args, &cwd),
        Command::Groups(args) => commands::groups::run(args),
        Command::Init(args) => commands::init::run(&args, &cwd),
        Command::Doctor(args) => commands::doctor::run(&args, &cwd).await,
        Command::Config(args) => commands::config::run(&args, &cwd),
        Command::Cleanup(args) => commands::cleanup::run(&args, &cwd),
    };

    match outcome {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(2)),
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(2)
        }
    }
}
