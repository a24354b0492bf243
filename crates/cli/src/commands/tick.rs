// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler commands, meant to be run from cron or a systemd timer

use crate::runtime::Runtime;
use anyhow::Result;
use clap::Args;
use std::process::ExitCode;
use synclock_core::coordination::{CleanupReport, CycleReport, RunKind, RunPersistence};

#[derive(Args)]
pub struct TickArgs {
    /// Run the cycle even if the next heartbeat is not due yet
    #[arg(long)]
    pub force: bool,
}

pub fn tick(runtime: &Runtime, args: TickArgs) -> Result<ExitCode> {
    if !args.force && !runtime.scheduler.is_due(&runtime.coordinator, RunKind::Heartbeat) {
        match runtime
            .scheduler
            .next_run(&runtime.coordinator, RunKind::Heartbeat)
        {
            Some(next) => println!("heartbeat not due until {}", next.to_rfc3339()),
            None => println!("heartbeat not due"),
        }
        return Ok(ExitCode::SUCCESS);
    }

    let report = runtime.scheduler.run_heartbeat_cycle(&runtime.coordinator);
    if report.cleanup.is_some() {
        purge_cache(runtime);
    }
    print!("{}", describe_cycle(&report));

    if report.errors.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }
    for error in &report.errors {
        eprintln!("warning: {error}");
    }
    Ok(ExitCode::FAILURE)
}

pub fn cleanup(runtime: &Runtime) -> Result<ExitCode> {
    match runtime.scheduler.run_cleanup_if_due(&runtime.coordinator) {
        Some(report) => {
            purge_cache(runtime);
            println!("{}", describe_cleanup(&report));
        }
        None => match runtime
            .scheduler
            .next_run(&runtime.coordinator, RunKind::Cleanup)
        {
            Some(next) => println!("cleanup not due until {}", next.to_rfc3339()),
            None => println!("cleanup not due"),
        },
    }
    Ok(ExitCode::SUCCESS)
}

fn purge_cache(runtime: &Runtime) {
    if let Err(e) = runtime.coordinator.cache().purge_expired() {
        tracing::warn!(error = %e, "failed to purge expired cache entries");
    }
}

pub(crate) fn describe_cycle(report: &CycleReport) -> String {
    let mut out = format!("renewed {} heartbeat(s)\n", report.renewed.len());
    for key in &report.stale {
        out.push_str(&format!("stale: {key}\n"));
    }
    if let Some(cleanup) = &report.cleanup {
        out.push_str(&describe_cleanup(cleanup));
        out.push('\n');
    }
    out.push_str(&format!(
        "next heartbeat at {}{}\n",
        report.next_execution.to_rfc3339(),
        persistence_note(report.persisted)
    ));
    out
}

pub(crate) fn describe_cleanup(report: &CleanupReport) -> String {
    let mut out = format!(
        "cleanup released {} lock(s): {} expired, {} dead owner, {} ownerless",
        report.released_count(),
        report.expired.len(),
        report.deadlocks.released.len(),
        report.ownerless.len()
    );
    for record in &report.deadlocks.long_running {
        out.push_str(&format!(
            "\nlong-running: {} (owner {})",
            record.key, record.owner_id
        ));
    }
    out
}

fn persistence_note(persisted: RunPersistence) -> &'static str {
    match persisted {
        RunPersistence::Durable => "",
        RunPersistence::Fallback => " (recorded in fallback marker)",
        RunPersistence::Lost => " (not recorded)",
    }
}

#[cfg(test)]
#[path = "tick_tests.rs"]
mod tests;
