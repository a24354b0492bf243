// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat and cleanup scheduling
//!
//! There is no resident process. An external trigger (cron, the CLI `tick`
//! command) runs one cycle at a time, and each cycle persists when the next
//! one is due so that early triggers can be skipped.

use super::cache::FastCache;
use super::liveness::LivenessPolicy;
use super::lock::LockRecord;
use super::manager::LockCoordinator;
use super::storage::{DurableStore, RunKind, SchedulerRun, StoreError};
use super::sweep::DeadlockReport;
use crate::clock::{self, Clock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the scheduler
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum heartbeat age before a live holder is renewed
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    /// Minimum time between cleanup runs
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn interval(&self, kind: RunKind) -> Duration {
        match kind {
            RunKind::Heartbeat => self.heartbeat_interval,
            RunKind::Cleanup => self.cleanup_interval,
        }
    }

    /// Run record for a `kind` run that executed at `now`
    fn completed_run(&self, kind: RunKind, now: DateTime<Utc>) -> SchedulerRun {
        SchedulerRun {
            kind,
            next_execution: clock::after(now, self.interval(kind)),
            last_execution: Some(now),
        }
    }
}

/// Where run records go when the durable store rejects them
pub trait FallbackScheduler: Send + Sync {
    fn schedule(&self, run: &SchedulerRun) -> Result<(), StoreError>;

    /// The last run handed to this fallback, if it keeps any
    fn scheduled(&self, _kind: RunKind) -> Option<SchedulerRun> {
        None
    }
}

/// Fallback that only records the missed write in the log
#[derive(Clone, Copy, Debug, Default)]
pub struct LogFallback;

impl FallbackScheduler for LogFallback {
    fn schedule(&self, run: &SchedulerRun) -> Result<(), StoreError> {
        tracing::warn!(
            kind = %run.kind,
            next_execution = %run.next_execution,
            "scheduler run not persisted; next trigger is up to the caller"
        );
        Ok(())
    }
}

/// How a run record was stored
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPersistence {
    Durable,
    Fallback,
    Lost,
}

/// What a cleanup run released
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CleanupReport {
    pub expired: Vec<LockRecord>,
    pub deadlocks: DeadlockReport,
    pub ownerless: Vec<LockRecord>,
    pub persisted: RunPersistence,
}

impl CleanupReport {
    pub fn released_count(&self) -> usize {
        self.expired.len() + self.deadlocks.released.len() + self.ownerless.len()
    }
}

/// What one heartbeat cycle did
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CycleReport {
    /// Keys whose heartbeat was refreshed
    pub renewed: Vec<String>,
    /// Keys whose holder missed heartbeats and could not be renewed
    pub stale: Vec<String>,
    pub cleanup: Option<CleanupReport>,
    pub persisted: RunPersistence,
    pub next_execution: DateTime<Utc>,
    pub errors: Vec<String>,
}

/// Stateless heartbeat and cleanup tick
pub struct HeartbeatScheduler<B: FallbackScheduler = LogFallback> {
    config: SchedulerConfig,
    fallback: B,
}

impl HeartbeatScheduler<LogFallback> {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_fallback(config, LogFallback)
    }
}

impl<B: FallbackScheduler> HeartbeatScheduler<B> {
    pub fn with_fallback(config: SchedulerConfig, fallback: B) -> Self {
        Self { config, fallback }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn fallback(&self) -> &B {
        &self.fallback
    }

    /// Run a single heartbeat cycle
    ///
    /// Live holders with an aging heartbeat are renewed, holders that missed
    /// heartbeats are reported, cleanup runs if due, and the next heartbeat
    /// run is persisted.
    pub fn run_heartbeat_cycle<S, F, L, C>(
        &self,
        coordinator: &LockCoordinator<S, F, L, C>,
    ) -> CycleReport
    where
        S: DurableStore,
        F: FastCache,
        L: LivenessPolicy,
        C: Clock,
    {
        let span = tracing::info_span!("scheduler.heartbeat");
        let _guard = span.enter();

        let now = coordinator.clock().now();
        let heartbeat_timeout = coordinator.config().heartbeat_timeout;
        let mut renewed = Vec::new();
        let mut stale = Vec::new();
        let mut errors = Vec::new();

        match coordinator.store().list_active(now) {
            Ok(active) => {
                for record in active {
                    if !coordinator.liveness().is_alive(record.owner_id)
                        || record.heartbeat_age(now) < self.config.heartbeat_interval
                    {
                        continue;
                    }
                    if coordinator.renew_heartbeat(&record) {
                        renewed.push(record.key);
                    } else {
                        errors.push(format!("failed to renew heartbeat for '{}'", record.key));
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "heartbeat cycle failed to list locks");
                errors.push(e.to_string());
            }
        }

        let cutoff = clock::before(now, heartbeat_timeout);
        match coordinator.store().list_heartbeat_before(cutoff) {
            Ok(overdue) => {
                for record in overdue {
                    if record.is_expired(now) || coordinator.liveness().is_alive(record.owner_id) {
                        continue;
                    }
                    tracing::warn!(
                        key = %record.key,
                        holder = record.owner_id,
                        heartbeat_age_secs = record.heartbeat_age(now).as_secs(),
                        "dead-process candidate: heartbeat overdue"
                    );
                    stale.push(record.key);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "heartbeat cycle failed to scan overdue heartbeats");
                errors.push(e.to_string());
            }
        }

        let cleanup = self.run_cleanup_if_due(coordinator);

        let run = self.config.completed_run(RunKind::Heartbeat, now);
        let persisted = self.persist(coordinator, &run);
        if persisted == RunPersistence::Lost {
            errors.push("heartbeat run could not be persisted".to_string());
        }

        tracing::info!(
            renewed = renewed.len(),
            stale = stale.len(),
            cleaned = cleanup.as_ref().map_or(0, CleanupReport::released_count),
            ?persisted,
            "heartbeat cycle complete"
        );

        CycleReport {
            renewed,
            stale,
            cleanup,
            persisted,
            next_execution: run.next_execution,
            errors,
        }
    }

    /// Run the expired, deadlock and ownerless sweeps if the interval elapsed
    ///
    /// Returns `None` when the last durable cleanup run is too recent.
    pub fn run_cleanup_if_due<S, F, L, C>(
        &self,
        coordinator: &LockCoordinator<S, F, L, C>,
    ) -> Option<CleanupReport>
    where
        S: DurableStore,
        F: FastCache,
        L: LivenessPolicy,
        C: Clock,
    {
        let now = coordinator.clock().now();
        let last = match coordinator.store().load_run(RunKind::Cleanup) {
            Ok(run) => run.and_then(|r| r.last_execution),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load cleanup run, running cleanup");
                None
            }
        };
        if let Some(last) = last {
            let since = clock::elapsed(last, now);
            if since < self.config.cleanup_interval {
                tracing::debug!(since_secs = since.as_secs(), "cleanup not due");
                return None;
            }
        }

        let span = tracing::info_span!("scheduler.cleanup");
        let _guard = span.enter();

        let expired = coordinator.sweep_expired(None);
        let deadlocks = coordinator.detect_deadlocks();
        let ownerless = coordinator.sweep_ownerless();

        let run = self.config.completed_run(RunKind::Cleanup, now);
        let persisted = self.persist(coordinator, &run);

        let report = CleanupReport {
            expired,
            deadlocks,
            ownerless,
            persisted,
        };
        tracing::info!(released = report.released_count(), "cleanup complete");
        Some(report)
    }

    /// When the next run of `kind` is due, if one was recorded
    pub fn next_run<S, F, L, C>(
        &self,
        coordinator: &LockCoordinator<S, F, L, C>,
        kind: RunKind,
    ) -> Option<DateTime<Utc>>
    where
        S: DurableStore,
        F: FastCache,
        L: LivenessPolicy,
        C: Clock,
    {
        match coordinator.store().load_run(kind) {
            Ok(Some(run)) => Some(run.next_execution),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(%kind, error = %e, "reading fallback run");
                self.fallback.scheduled(kind).map(|run| run.next_execution)
            }
        }
    }

    /// Whether a trigger now would find `kind` due
    pub fn is_due<S, F, L, C>(
        &self,
        coordinator: &LockCoordinator<S, F, L, C>,
        kind: RunKind,
    ) -> bool
    where
        S: DurableStore,
        F: FastCache,
        L: LivenessPolicy,
        C: Clock,
    {
        match self.next_run(coordinator, kind) {
            Some(next) => coordinator.clock().now() >= next,
            None => true,
        }
    }

    fn persist<S, F, L, C>(
        &self,
        coordinator: &LockCoordinator<S, F, L, C>,
        run: &SchedulerRun,
    ) -> RunPersistence
    where
        S: DurableStore,
        F: FastCache,
        L: LivenessPolicy,
        C: Clock,
    {
        let Err(e) = coordinator.store().save_run(run) else {
            return RunPersistence::Durable;
        };
        tracing::warn!(kind = %run.kind, error = %e, "durable run write failed, using fallback");
        match self.fallback.schedule(run) {
            Ok(()) => RunPersistence::Fallback,
            Err(e) => {
                tracing::error!(kind = %run.kind, error = %e, "fallback run write failed");
                RunPersistence::Lost
            }
        }
    }
}

#[cfg(test)]
#[path = "maintenance_tests.rs"]
mod tests;
