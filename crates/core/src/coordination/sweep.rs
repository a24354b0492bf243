// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reclaim sweeps and dual-store reconciliation
//!
//! None of these routines return errors. Failures are logged and the sweep
//! reports whatever it managed to release.

use super::cache::{self, FastCache};
use super::liveness::LivenessPolicy;
use super::lock::{lock_cache_key, CacheEntry, LockRecord, ReleaseReason};
use super::manager::LockCoordinator;
use super::storage::{DurableStore, InsertOutcome};
use crate::clock::Clock;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of the unified deadlock scan
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DeadlockReport {
    /// Dead-owner rows released by this scan
    pub released: Vec<LockRecord>,
    /// Live rows held long enough to be probable deadlocks; left in place
    pub long_running: Vec<LockRecord>,
}

impl DeadlockReport {
    pub fn is_clean(&self) -> bool {
        self.released.is_empty() && self.long_running.is_empty()
    }
}

/// What `reconcile` did for one key
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reconciliation {
    /// Neither store knows the key
    Empty,
    /// Both stores agree, or only an inactive row exists
    Consistent,
    /// The table row won; the cache entry was rewritten from it
    CacheRefreshed,
    /// A newer cache lock replaced the table row
    CacheWon,
    /// A cache-only lock was written into the table
    Migrated,
    /// A cache-only lock was no longer valid and was deleted
    CacheDropped,
    /// Reconciliation could not complete
    Failed,
}

impl<S, F, L, C> LockCoordinator<S, F, L, C>
where
    S: DurableStore,
    F: FastCache,
    L: LivenessPolicy,
    C: Clock,
{
    /// Release rows whose `expires_at` has passed, optionally for one key
    pub fn sweep_expired(&self, scope: Option<&str>) -> Vec<LockRecord> {
        let now = self.clock().now();
        let expired = match self.store().list_expired(now) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "expired sweep failed to list locks");
                return Vec::new();
            }
        };
        let candidates = expired
            .into_iter()
            .filter(|r| scope.is_none() || scope == Some(r.key.as_str()));
        self.release_all(candidates, ReleaseReason::Expired)
    }

    /// Release rows held by owners that are gone
    ///
    /// A dead owner alone is not enough: the row must also be older than
    /// `deadlock_age` or have missed heartbeats for `heartbeat_timeout`.
    pub fn sweep_orphans(&self) -> Vec<LockRecord> {
        let now = self.clock().now();
        let candidates = self
            .unreleased("orphan")
            .into_iter()
            .filter(|r| r.has_owner() && self.is_orphaned(r, now));
        self.release_all(candidates, ReleaseReason::DeadProcess)
    }

    /// Release rows with no recorded owner
    pub fn sweep_ownerless(&self) -> Vec<LockRecord> {
        let candidates = self
            .unreleased("ownerless")
            .into_iter()
            .filter(|r| !r.has_owner());
        self.release_all(candidates, ReleaseReason::Orphan)
    }

    /// Rows held for more than twice `deadlock_age`
    ///
    /// These are logged as probable deadlocks but never released.
    pub fn long_running(&self) -> Vec<LockRecord> {
        let now = self.clock().now();
        let threshold = self.config().deadlock_age.saturating_mul(2);
        let rows: Vec<_> = self
            .unreleased("long-running")
            .into_iter()
            .filter(|r| r.age(now) >= threshold)
            .collect();
        for record in &rows {
            tracing::warn!(
                key = %record.key,
                holder = record.owner_id,
                age_secs = record.age(now).as_secs(),
                "probable deadlock: lock held unusually long"
            );
        }
        rows
    }

    /// Unified deadlock scan: release dead-owner rows, flag long holders
    pub fn detect_deadlocks(&self) -> DeadlockReport {
        let released = self.sweep_orphans();
        let long_running = self.long_running();
        DeadlockReport {
            released,
            long_running,
        }
    }

    /// Resolve disagreement between the table and the cache for `key`
    ///
    /// When both hold a lock, the newer `acquired_at` wins. A cache-only lock
    /// that is still valid is migrated into the table; an invalid one is
    /// deleted.
    pub fn reconcile(&self, key: &str) -> Reconciliation {
        let now = self.clock().now();
        let row = match self.store().find_unreleased(key) {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(key, error = %e, "reconcile failed to read lock");
                return Reconciliation::Failed;
            }
        };
        let entry = self.cached_entry(key);

        match (row, entry) {
            (None, None) => Reconciliation::Empty,
            (Some(row), None) => {
                if row.is_expired(now) {
                    return Reconciliation::Consistent;
                }
                self.mirror_live(&row);
                Reconciliation::CacheRefreshed
            }
            (Some(row), Some(entry)) if entry.describes(&row) => Reconciliation::Consistent,
            (Some(row), Some(entry))
                if entry.acquired_at.timestamp_millis() > row.acquired_at.timestamp_millis() =>
            {
                if !self.is_valid(&entry, now) {
                    self.drop_entry(key);
                    self.mirror_live(&row);
                    return Reconciliation::CacheRefreshed;
                }
                tracing::warn!(
                    key,
                    table_owner = row.owner_id,
                    cache_owner = entry.owner_id,
                    "cache holds a newer lock than the table"
                );
                if let Err(e) = self.store().release(row.id, ReleaseReason::Orphan, now) {
                    tracing::warn!(key, error = %e, "failed to release superseded row");
                    return Reconciliation::Failed;
                }
                match self.insert_entry(key, entry) {
                    Some(_) => Reconciliation::CacheWon,
                    None => Reconciliation::Failed,
                }
            }
            (Some(row), Some(entry)) => {
                tracing::warn!(
                    key,
                    table_owner = row.owner_id,
                    cache_owner = entry.owner_id,
                    "cache entry is older than the table row"
                );
                self.mirror_live(&row);
                Reconciliation::CacheRefreshed
            }
            (None, Some(entry)) => {
                if !self.is_valid(&entry, now) {
                    self.drop_entry(key);
                    return Reconciliation::CacheDropped;
                }
                tracing::info!(key, owner = entry.owner_id, "migrating cache-only lock");
                match self.insert_entry(key, entry) {
                    Some(_) => Reconciliation::Migrated,
                    None => Reconciliation::Failed,
                }
            }
        }
    }

    /// Reconcile every key with an active table row
    ///
    /// Returns the keys whose stores disagreed.
    pub fn reconcile_active(&self) -> Vec<(String, Reconciliation)> {
        self.active_locks()
            .into_iter()
            .filter_map(|record| match self.reconcile(&record.key) {
                Reconciliation::Consistent | Reconciliation::Empty => None,
                outcome => Some((record.key, outcome)),
            })
            .collect()
    }

    fn is_orphaned(&self, record: &LockRecord, now: DateTime<Utc>) -> bool {
        let config = self.config();
        let overdue = record.age(now) >= config.deadlock_age
            || record.heartbeat_age(now) >= config.heartbeat_timeout;
        overdue && !self.liveness().is_alive(record.owner_id)
    }

    fn is_valid(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        !entry.is_expired(now) && self.liveness().is_alive(entry.owner_id)
    }

    fn unreleased(&self, sweep: &'static str) -> Vec<LockRecord> {
        self.store().list_unreleased().unwrap_or_else(|e| {
            tracing::warn!(sweep, error = %e, "sweep failed to list locks");
            Vec::new()
        })
    }

    fn release_all(
        &self,
        candidates: impl Iterator<Item = LockRecord>,
        reason: ReleaseReason,
    ) -> Vec<LockRecord> {
        let mut released = Vec::new();
        for record in candidates {
            match self.release_record(&record, reason) {
                Ok(true) => {
                    tracing::warn!(
                        key = %record.key,
                        holder = record.owner_id,
                        %reason,
                        "sweep released lock"
                    );
                    released.push(record);
                }
                // Released concurrently by someone else
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(key = %record.key, error = %e, "sweep failed to release lock");
                }
            }
        }
        released
    }

    fn cached_entry(&self, key: &str) -> Option<CacheEntry> {
        match cache::get_json(self.cache(), &lock_cache_key(key)) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "dropping unreadable cached lock");
                self.drop_entry(key);
                None
            }
        }
    }

    fn drop_entry(&self, key: &str) {
        if let Err(e) = self.cache().delete(&lock_cache_key(key)) {
            tracing::warn!(key, error = %e, "failed to drop cached lock");
        }
    }

    fn insert_entry(&self, key: &str, entry: CacheEntry) -> Option<LockRecord> {
        match self.store().try_insert(&entry.into_new_lock(key)) {
            Ok(InsertOutcome::Inserted(record)) => {
                self.mirror_live(&record);
                Some(record)
            }
            Ok(InsertOutcome::Held(holder)) => {
                tracing::warn!(
                    key,
                    holder = holder.owner_id,
                    "table acquired by another holder during reconcile"
                );
                self.mirror_live(&holder);
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to write cache lock into table");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "sweep_tests.rs"]
mod tests;
