// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock commands

use crate::error::CliError;
use crate::output::{self, OutputFormat};
use crate::runtime::Runtime;
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use std::fmt;
use std::process::ExitCode;
use std::time::Duration;
use synclock_core::coordination::LockContext;
use synclock_core::{AcquireError, LockRecord};

#[derive(Args)]
pub struct KeyArgs {
    /// Lock key
    pub key: String,
}

#[derive(Args)]
pub struct AcquireArgs {
    /// Lock key
    pub key: String,

    /// Seconds until the lock expires unless renewed
    #[arg(long, default_value_t = 3600)]
    pub timeout: u64,

    /// Attempts before giving up while another live process holds the lock
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Metadata stored with the lock (key=value, value parsed as JSON if possible)
    #[arg(long = "meta", value_parser = parse_meta)]
    pub meta: Vec<(String, serde_json::Value)>,
}

#[derive(Args)]
pub struct HeartbeatArgs {
    /// Lock key
    pub key: String,

    /// Make sure the lock outlives this many seconds from now
    #[arg(long, default_value_t = 0)]
    pub extend: u64,
}

#[derive(Args)]
pub struct ExtendArgs {
    /// Lock key
    pub key: String,

    /// Seconds to add to the current expiry
    pub secs: u64,
}

#[derive(Args)]
pub struct ListArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Parse a `key=value` pair; values that are not valid JSON are kept as strings
pub(crate) fn parse_meta(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty metadata key in '{s}'"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub fn acquire(runtime: &Runtime, args: AcquireArgs) -> Result<ExitCode> {
    let coordinator = &runtime.coordinator;
    let context: LockContext = args.meta.into_iter().collect();

    match coordinator.acquire(
        &args.key,
        Duration::from_secs(args.timeout),
        args.retries,
        context,
    ) {
        Ok(record) => {
            runtime.status.invalidate(coordinator, Some(&args.key));
            println!(
                "acquired {} (id {}, owner {}, expires {})",
                record.key,
                record.id,
                record.owner_id,
                record.expires_at.to_rfc3339()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(AcquireError::Concurrency(e)) => {
            let holder = coordinator.lock_info(&args.key);
            Err(CliError::contended(&e, holder.record(), Utc::now()).into())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn release(runtime: &Runtime, args: KeyArgs) -> Result<ExitCode> {
    let coordinator = &runtime.coordinator;
    if coordinator.release(&args.key) {
        runtime.status.invalidate(coordinator, Some(&args.key));
        println!("released {}", args.key);
    } else {
        println!("{} was not locked", args.key);
    }
    Ok(ExitCode::SUCCESS)
}

pub fn is_locked(runtime: &Runtime, args: KeyArgs) -> Result<ExitCode> {
    if runtime.coordinator.is_locked(&args.key) {
        println!("locked");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("unlocked");
        Ok(ExitCode::from(1))
    }
}

pub fn info(runtime: &Runtime, args: KeyArgs) -> Result<ExitCode> {
    let info = runtime.coordinator.lock_info(&args.key);
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(ExitCode::SUCCESS)
}

pub fn heartbeat(runtime: &Runtime, args: HeartbeatArgs) -> Result<ExitCode> {
    let coordinator = &runtime.coordinator;
    if !coordinator.update_heartbeat(&args.key, Duration::from_secs(args.extend)) {
        return Err(CliError::not_held(&args.key, coordinator.owner_id()).into());
    }
    println!("heartbeat recorded for {}", args.key);
    Ok(ExitCode::SUCCESS)
}

pub fn extend(runtime: &Runtime, args: ExtendArgs) -> Result<ExitCode> {
    let coordinator = &runtime.coordinator;
    if !coordinator.extend_lock(&args.key, Duration::from_secs(args.secs)) {
        return Err(CliError::not_held(&args.key, coordinator.owner_id()).into());
    }
    runtime.status.invalidate(coordinator, Some(&args.key));
    println!("extended {} by {}s", args.key, args.secs);
    Ok(ExitCode::SUCCESS)
}

pub fn list(runtime: &Runtime, args: ListArgs) -> Result<ExitCode> {
    let now = Utc::now();
    let rows: Vec<LockRow> = runtime
        .coordinator
        .active_locks()
        .iter()
        .map(|record| LockRow::new(record, now))
        .collect();

    let format = OutputFormat::from_json_flag(args.json);
    if rows.is_empty() && format == OutputFormat::Text {
        println!("No active locks");
        return Ok(ExitCode::SUCCESS);
    }
    if format == OutputFormat::Text {
        println!(
            "{:<24} {:>8} {:>8} {:>10} EXPIRES",
            "KEY", "ID", "OWNER", "HEARTBEAT"
        );
    }
    output::print_list(&rows, format)?;
    Ok(ExitCode::SUCCESS)
}

/// One line of `synclock list`
#[derive(Serialize)]
pub(crate) struct LockRow {
    key: String,
    id: i64,
    owner_id: u32,
    acquired_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    heartbeat_age_secs: u64,
}

impl LockRow {
    pub(crate) fn new(record: &LockRecord, now: DateTime<Utc>) -> Self {
        Self {
            key: record.key.clone(),
            id: record.id,
            owner_id: record.owner_id,
            acquired_at: record.acquired_at,
            expires_at: record.expires_at,
            heartbeat_age_secs: record.heartbeat_age(now).as_secs(),
        }
    }
}

impl fmt::Display for LockRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<24} {:>8} {:>8} {:>9}s {}",
            self.key,
            self.id,
            self.owner_id,
            self.heartbeat_age_secs,
            self.expires_at.to_rfc3339()
        )
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
