// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! synclock - distributed locks for cron jobs and scripts

mod commands;
mod error;
mod output;
mod runtime;

use clap::{Parser, Subcommand};
use commands::{lock, status, tick};
use error::CliError;
use runtime::{GlobalArgs, Runtime};
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "synclock",
    version,
    about = "synclock - Distributed locks for short-lived processes"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire a lock, retrying with backoff while it is held
    Acquire(lock::AcquireArgs),
    /// Release a lock
    Release(lock::KeyArgs),
    /// Exit 0 if the lock is held, 1 otherwise
    IsLocked(lock::KeyArgs),
    /// Show who holds a lock, as JSON
    Info(lock::KeyArgs),
    /// Record a heartbeat for a held lock
    Heartbeat(lock::HeartbeatArgs),
    /// Push a held lock's expiry further out
    Extend(lock::ExtendArgs),
    /// List active locks
    List(lock::ListArgs),
    /// Show whether a sync may start
    Status(status::StatusArgs),
    /// Run one heartbeat cycle, including cleanup when due
    Tick(tick::TickArgs),
    /// Run cleanup if its interval has elapsed
    Cleanup,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging();

    match run(cli) {
        Ok(code) => code,
        Err(e) => match e.downcast_ref::<CliError>() {
            Some(cli_error) => {
                eprint!("{cli_error}");
                ExitCode::from(cli_error.exit_code)
            }
            None => {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let runtime = Runtime::open(&cli.global)?;

    match cli.command {
        Commands::Acquire(args) => lock::acquire(&runtime, args),
        Commands::Release(args) => lock::release(&runtime, args),
        Commands::IsLocked(args) => lock::is_locked(&runtime, args),
        Commands::Info(args) => lock::info(&runtime, args),
        Commands::Heartbeat(args) => lock::heartbeat(&runtime, args),
        Commands::Extend(args) => lock::extend(&runtime, args),
        Commands::List(args) => lock::list(&runtime, args),
        Commands::Status(args) => status::status(&runtime, args),
        Commands::Tick(args) => tick::tick(&runtime, args),
        Commands::Cleanup => tick::cleanup(&runtime),
    }
}

/// Log to stderr, filtered by `SYNCLOCK_LOG` (default `warn`)
fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_env("SYNCLOCK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
