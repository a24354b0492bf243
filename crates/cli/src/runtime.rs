// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wiring from flags and the state directory to the coordinator

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use synclock_core::coordination::{ConfiguredLiveness, OsProcessProbe};
use synclock_core::{
    ContextClassifier, EnvClassifier, ExecutionContext, HeartbeatScheduler, LockCoordinator,
    Settings, SystemClock, UnifiedStatusCache,
};
use synclock_storage::{FileCache, FileSyncSignal, MarkerFallback, SqliteStore, StateDir};

/// Environment variable overriding the state directory
pub const STATE_DIR_ENV_VAR: &str = "SYNCLOCK_STATE_DIR";

pub type Coordinator = LockCoordinator<SqliteStore, FileCache, ConfiguredLiveness<OsProcessProbe>>;
pub type Scheduler = HeartbeatScheduler<MarkerFallback>;
pub type StatusCache = UnifiedStatusCache<FileSyncSignal, ExecutionContext>;

/// Flags shared by every command
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// State directory holding the lock table and cache
    #[arg(long, global = true, env = STATE_DIR_ENV_VAR)]
    pub state_dir: Option<PathBuf>,

    /// Settings file [default: <state-dir>/synclock.toml]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Act on behalf of this process id [default: the parent process]
    #[arg(long, global = true)]
    pub owner: Option<u32>,

    /// Execution context (admin, automated-trigger, background-job, script)
    #[arg(long, global = true)]
    pub context: Option<ExecutionContext>,
}

/// Everything a command needs, built once per invocation
pub struct Runtime {
    pub coordinator: Coordinator,
    pub scheduler: Scheduler,
    pub status: StatusCache,
}

impl Runtime {
    pub fn open(args: &GlobalArgs) -> Result<Self> {
        let root = match &args.state_dir {
            Some(dir) => dir.clone(),
            None => default_state_dir()?,
        };
        let state = StateDir::new(root);
        state
            .create()
            .with_context(|| format!("cannot create state directory {}", state.root.display()))?;

        let config_path = args
            .config
            .clone()
            .unwrap_or_else(|| state.config_path.clone());
        let settings = Settings::load_or_default(&config_path)?;

        let owner = args.owner.unwrap_or_else(default_owner);
        let context = args
            .context
            .unwrap_or_else(|| EnvClassifier::new(ExecutionContext::Script).classify());
        tracing::debug!(state_dir = %state.root.display(), owner, %context, "opening runtime");

        let store = SqliteStore::open(&state.db_path)
            .with_context(|| format!("cannot open lock table {}", state.db_path.display()))?;
        let cache = FileCache::open(&state.cache_path)?;
        let liveness = settings.coordinator.liveness.build(OsProcessProbe, owner);
        let coordinator = LockCoordinator::new(
            store,
            cache,
            liveness,
            SystemClock,
            settings.coordinator.clone(),
        )
        .with_owner_id(owner);

        let scheduler = HeartbeatScheduler::with_fallback(
            settings.scheduler.clone(),
            MarkerFallback::new(&state.runs_path),
        );
        let status = UnifiedStatusCache::new(
            settings.status.clone(),
            FileSyncSignal::new(&state.syncs_path),
            context,
        );

        Ok(Self {
            coordinator,
            scheduler,
            status,
        })
    }
}

/// `$XDG_STATE_HOME/synclock`, else `~/.local/state/synclock`
fn default_state_dir() -> Result<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("synclock"));
    }
    let home = std::env::var("HOME")
        .context("cannot locate a state directory: set --state-dir or SYNCLOCK_STATE_DIR")?;
    Ok(PathBuf::from(home).join(".local/state/synclock"))
}

/// The calling shell or script outlives each CLI invocation, so it owns the lock
#[cfg(unix)]
fn default_owner() -> u32 {
    std::os::unix::process::parent_id()
}

#[cfg(not(unix))]
fn default_owner() -> u32 {
    std::process::id()
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
