// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status command

use crate::output::{self, OutputFormat};
use crate::runtime::Runtime;
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::fmt;
use std::process::ExitCode;
use synclock_core::StatusView;

#[derive(Args)]
pub struct StatusArgs {
    /// Limit the view to one lock key
    pub key: Option<String>,

    /// Recompute instead of using the cached view
    #[arg(long)]
    pub refresh: bool,

    /// Print JSON
    #[arg(long)]
    pub json: bool,
}

/// Exit 0 if a sync may start, 1 otherwise
pub fn status(runtime: &Runtime, args: StatusArgs) -> Result<ExitCode> {
    let coordinator = &runtime.coordinator;
    let key = args.key.as_deref();
    let view = if args.refresh {
        runtime.status.get_status(coordinator, key, true)
    } else {
        runtime.status.verified_status(coordinator, key)
    };

    output::print(&StatusReport(&view), OutputFormat::from_json_flag(args.json))?;
    Ok(if view.can_proceed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

#[derive(Serialize)]
#[serde(transparent)]
pub(crate) struct StatusReport<'a>(pub &'a StatusView);

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

impl fmt::Display for StatusReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = self.0;
        let scope = view.key.as_deref().unwrap_or("all locks");
        writeln!(f, "status: {scope}")?;
        writeln!(f, "  can proceed:       {}", yes_no(view.can_proceed))?;
        writeln!(f, "  sync in progress:  {}", yes_no(view.sync_in_progress))?;
        writeln!(f, "  heartbeat healthy: {}", yes_no(view.heartbeat_healthy))?;
        writeln!(f, "  needs cleanup:     {}", yes_no(view.needs_cleanup))?;
        writeln!(f, "  active locks:      {}", view.active_locks.len())?;
        for lock in &view.active_locks {
            writeln!(
                f,
                "    {} (owner {}, expires {})",
                lock.key,
                lock.owner_id,
                lock.expires_at.to_rfc3339()
            )?;
        }
        if !view.inconsistencies.is_empty() {
            writeln!(f, "  inconsistencies:")?;
            for issue in &view.inconsistencies {
                writeln!(f, "    - {issue}")?;
            }
        }
        write!(
            f,
            "  generated {} for {}{}",
            view.generated_at.to_rfc3339(),
            view.context,
            if view.cached { " (cached)" } else { "" }
        )
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
