// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified status view
//!
//! Combines active locks, the external "sync in progress" signal and
//! heartbeat health into one memoized answer to "can a new sync start?".
//! Inconsistencies are reported here and resolved only on request.

use super::cache::{self, FastCache};
use super::liveness::LivenessPolicy;
use super::lock::LockRecord;
use super::manager::LockCoordinator;
use super::storage::DurableStore;
use crate::clock::{self, Clock};
use crate::context::{ContextClassifier, ExecutionContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Reports which syncs are currently running, by lock key
pub trait SyncSignal: Send + Sync {
    fn active_syncs(&self) -> Vec<String>;
}

impl<T: SyncSignal + ?Sized> SyncSignal for Arc<T> {
    fn active_syncs(&self) -> Vec<String> {
        (**self).active_syncs()
    }
}

/// Signal for deployments without an external sync marker
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSyncSignal;

impl SyncSignal for NoSyncSignal {
    fn active_syncs(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Status cache lifetimes and verification window
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    #[serde(with = "humantime_serde")]
    pub min_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub max_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub admin_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub script_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub unknown_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub automated_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub background_ttl: Duration,
    /// Lock activity this recent lets non-interactive callers trust the cache
    #[serde(with = "humantime_serde")]
    pub activity_window: Duration,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            min_ttl: Duration::from_secs(15),
            max_ttl: Duration::from_secs(300),
            admin_ttl: Duration::from_secs(18),
            script_ttl: Duration::from_secs(24),
            unknown_ttl: Duration::from_secs(30),
            automated_ttl: Duration::from_secs(45),
            background_ttl: Duration::from_secs(60),
            activity_window: Duration::from_secs(30),
        }
    }
}

impl StatusConfig {
    /// Cache lifetime for a status computed in `context`
    pub fn ttl_for(&self, context: ExecutionContext) -> Duration {
        let ttl = match context {
            ExecutionContext::Admin => self.admin_ttl,
            ExecutionContext::Script => self.script_ttl,
            ExecutionContext::Unknown => self.unknown_ttl,
            ExecutionContext::AutomatedTrigger => self.automated_ttl,
            ExecutionContext::BackgroundJob => self.background_ttl,
        };
        ttl.max(self.min_ttl).min(self.max_ttl)
    }

    pub fn with_activity_window(mut self, window: Duration) -> Self {
        self.activity_window = window;
        self
    }
}

/// A disagreement between locks, sync markers and heartbeats
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inconsistency {
    /// A lock is held but no sync reports running under it
    LockWithoutSync { key: String },
    /// A sync reports running without holding its lock
    SyncWithoutLock { key: String },
    /// A lock's heartbeat is older than the heartbeat timeout
    StaleHeartbeat { key: String, age_secs: u64 },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inconsistency::LockWithoutSync { key } => {
                write!(f, "lock '{key}' held with no sync running")
            }
            Inconsistency::SyncWithoutLock { key } => {
                write!(f, "sync '{key}' running without its lock")
            }
            Inconsistency::StaleHeartbeat { key, age_secs } => {
                write!(f, "lock '{key}' heartbeat is {age_secs}s old")
            }
        }
    }
}

/// Snapshot answering whether a new sync may start
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    /// Lock key in scope, or `None` for every key
    pub key: Option<String>,
    pub can_proceed: bool,
    pub needs_cleanup: bool,
    pub active_locks: Vec<LockRecord>,
    pub sync_in_progress: bool,
    pub heartbeat_healthy: bool,
    pub inconsistencies: Vec<Inconsistency>,
    pub generated_at: DateTime<Utc>,
    pub context: ExecutionContext,
    /// Whether this view was served from the cache
    #[serde(skip)]
    pub cached: bool,
}

/// What an explicit `resolve` released
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Resolution {
    pub released: Vec<LockRecord>,
    pub long_running: Vec<LockRecord>,
}

/// Cache key for the status of `key`, or of every key
pub fn status_cache_key(key: Option<&str>) -> String {
    format!("status:{}", key.unwrap_or("*"))
}

/// Memoized, context-aware status
pub struct UnifiedStatusCache<G, K> {
    config: StatusConfig,
    signal: G,
    classifier: K,
}

impl<G: SyncSignal, K: ContextClassifier> UnifiedStatusCache<G, K> {
    pub fn new(config: StatusConfig, signal: G, classifier: K) -> Self {
        Self {
            config,
            signal,
            classifier,
        }
    }

    pub fn config(&self) -> &StatusConfig {
        &self.config
    }

    /// Cache lifetime for the current context
    pub fn ttl(&self) -> Duration {
        self.config.ttl_for(self.classifier.classify())
    }

    /// Status for `key` (or every key), from the cache unless `force_refresh`
    pub fn get_status<S, F, L, C>(
        &self,
        coordinator: &LockCoordinator<S, F, L, C>,
        key: Option<&str>,
        force_refresh: bool,
    ) -> StatusView
    where
        S: DurableStore,
        F: FastCache,
        L: LivenessPolicy,
        C: Clock,
    {
        let cache_key = status_cache_key(key);
        if !force_refresh {
            match cache::get_json::<StatusView>(coordinator.cache(), &cache_key) {
                Ok(Some(mut view)) => {
                    view.cached = true;
                    return view;
                }
                Ok(None) => {}
                Err(e) => tracing::debug!(key = %cache_key, error = %e, "unreadable cached status"),
            }
        }

        let view = self.compute(coordinator, key);
        let ttl = self.config.ttl_for(view.context);
        if let Err(e) = cache::set_json(coordinator.cache(), &cache_key, &view, ttl) {
            tracing::debug!(key = %cache_key, error = %e, "failed to cache status");
        }
        view
    }

    /// Drop the cached status for `key` and the all-keys status
    pub fn invalidate<S, F, L, C>(
        &self,
        coordinator: &LockCoordinator<S, F, L, C>,
        key: Option<&str>,
    )
    where
        S: DurableStore,
        F: FastCache,
        L: LivenessPolicy,
        C: Clock,
    {
        let mut keys = vec![status_cache_key(None)];
        if key.is_some() {
            keys.push(status_cache_key(key));
        }
        for cache_key in keys {
            if let Err(e) = coordinator.cache().delete(&cache_key) {
                tracing::warn!(key = %cache_key, error = %e, "failed to invalidate status");
            }
        }
    }

    /// Run the reclaim sweeps, then invalidate affected status entries
    pub fn resolve<S, F, L, C>(&self, coordinator: &LockCoordinator<S, F, L, C>) -> Resolution
    where
        S: DurableStore,
        F: FastCache,
        L: LivenessPolicy,
        C: Clock,
    {
        let mut released = coordinator.sweep_expired(None);
        let deadlocks = coordinator.detect_deadlocks();
        released.extend(deadlocks.released);
        released.extend(coordinator.sweep_ownerless());

        self.invalidate(coordinator, None);
        for record in &released {
            self.invalidate(coordinator, Some(&record.key));
        }
        tracing::info!(released = released.len(), "status inconsistencies resolved");

        Resolution {
            released,
            long_running: deadlocks.long_running,
        }
    }

    /// Whether the current caller should bypass the cached status
    ///
    /// Interactive contexts always verify. Others trust the cache while lock
    /// activity falls inside the activity window.
    pub fn needs_verification<S, F, L, C>(&self, coordinator: &LockCoordinator<S, F, L, C>) -> bool
    where
        S: DurableStore,
        F: FastCache,
        L: LivenessPolicy,
        C: Clock,
    {
        if self.classifier.classify().is_interactive() {
            return true;
        }
        match coordinator.last_activity() {
            Some(at) => clock::elapsed(at, coordinator.clock().now()) > self.config.activity_window,
            None => true,
        }
    }

    /// Status that is refreshed only when the caller needs verification
    pub fn verified_status<S, F, L, C>(
        &self,
        coordinator: &LockCoordinator<S, F, L, C>,
        key: Option<&str>,
    ) -> StatusView
    where
        S: DurableStore,
        F: FastCache,
        L: LivenessPolicy,
        C: Clock,
    {
        let refresh = self.needs_verification(coordinator);
        self.get_status(coordinator, key, refresh)
    }

    fn compute<S, F, L, C>(
        &self,
        coordinator: &LockCoordinator<S, F, L, C>,
        key: Option<&str>,
    ) -> StatusView
    where
        S: DurableStore,
        F: FastCache,
        L: LivenessPolicy,
        C: Clock,
    {
        let now = coordinator.clock().now();
        let in_scope = |k: &str| key.is_none() || key == Some(k);

        let active_locks: Vec<LockRecord> = coordinator
            .active_locks()
            .into_iter()
            .filter(|r| in_scope(r.key.as_str()))
            .collect();
        let syncs: Vec<String> = self
            .signal
            .active_syncs()
            .into_iter()
            .filter(|s| in_scope(s.as_str()))
            .collect();

        let mut inconsistencies = Vec::new();
        for record in &active_locks {
            if !syncs.contains(&record.key) {
                inconsistencies.push(Inconsistency::LockWithoutSync {
                    key: record.key.clone(),
                });
            }
            let age = record.heartbeat_age(now);
            if age > coordinator.config().heartbeat_timeout {
                inconsistencies.push(Inconsistency::StaleHeartbeat {
                    key: record.key.clone(),
                    age_secs: age.as_secs(),
                });
            }
        }
        for sync in &syncs {
            if !active_locks.iter().any(|r| &r.key == sync) {
                inconsistencies.push(Inconsistency::SyncWithoutLock { key: sync.clone() });
            }
        }

        let sync_in_progress = !syncs.is_empty();
        let heartbeat_healthy = !inconsistencies
            .iter()
            .any(|i| matches!(i, Inconsistency::StaleHeartbeat { .. }));

        StatusView {
            key: key.map(str::to_string),
            can_proceed: active_locks.is_empty() && !sync_in_progress,
            needs_cleanup: !inconsistencies.is_empty(),
            active_locks,
            sync_in_progress,
            heartbeat_healthy,
            inconsistencies,
            generated_at: now,
            context: self.classifier.classify(),
            cached: false,
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
