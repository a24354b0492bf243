// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock coordinator
//!
//! Composes the durable table, the fast cache, a liveness policy and a clock
//! into the acquire / release / inspect / renew surface. The table is the
//! source of truth; the cache is a write-through projection that is read
//! directly only by [`LockCoordinator::is_locked`].

use super::backoff::BackoffPolicy;
use super::cache::{self, FastCache, ACTIVITY_KEY};
use super::error::{AcquireError, ConcurrencyError};
use super::liveness::{LivenessConfig, LivenessPolicy};
use super::lock::{
    lock_cache_key, whole_secs, CacheEntry, LockContext, LockInfo, LockRecord, NewLock,
    ReleaseReason,
};
use super::storage::{DurableStore, InsertOutcome, LockUpdate, StoreError};
use crate::clock::{self, Clock, SystemClock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How long the last-activity marker stays in the cache
const ACTIVITY_TTL: Duration = Duration::from_secs(3600);

/// Coordinator thresholds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Heartbeat age after which a holder is considered stale
    #[serde(with = "humantime_serde")]
    pub heartbeat_timeout: Duration,
    /// Acquisition age after which a dead-owner lock is a deadlock candidate
    #[serde(with = "humantime_serde")]
    pub deadlock_age: Duration,
    pub backoff: BackoffPolicy,
    pub liveness: LivenessConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(300),
            deadlock_age: Duration::from_secs(600),
            backoff: BackoffPolicy::default(),
            liveness: LivenessConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_deadlock_age(mut self, age: Duration) -> Self {
        self.deadlock_age = age;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_liveness(mut self, liveness: LivenessConfig) -> Self {
        self.liveness = liveness;
        self
    }
}

/// How a caller relates to the owner recorded on a row
enum Ownership {
    Held,
    /// Recorded owner differs but identity churn is expected
    Adopted,
    Lost,
}

/// Distributed lock coordinator
pub struct LockCoordinator<S, F, L, C = SystemClock> {
    store: S,
    cache: F,
    liveness: L,
    clock: C,
    config: CoordinatorConfig,
    owner_id: u32,
}

impl<S, F, L, C> LockCoordinator<S, F, L, C>
where
    S: DurableStore,
    F: FastCache,
    L: LivenessPolicy,
    C: Clock,
{
    /// Build a coordinator acting on behalf of the current process
    pub fn new(store: S, cache: F, liveness: L, clock: C, config: CoordinatorConfig) -> Self {
        Self {
            store,
            cache,
            liveness,
            clock,
            config,
            owner_id: std::process::id(),
        }
    }

    /// Act on behalf of another process id
    pub fn with_owner_id(mut self, owner_id: u32) -> Self {
        self.owner_id = owner_id;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &F {
        &self.cache
    }

    pub fn liveness(&self) -> &L {
        &self.liveness
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn owner_id(&self) -> u32 {
        self.owner_id
    }

    /// Acquire `key` for `timeout`, backing off while another holder is alive
    ///
    /// Expired rows and rows whose owner is dead are reclaimed and retried
    /// immediately. Only contended attempts count toward `max_retries` and
    /// sleep between tries.
    pub fn acquire(
        &self,
        key: &str,
        timeout: Duration,
        max_retries: u32,
        context: LockContext,
    ) -> Result<LockRecord, AcquireError> {
        if key.is_empty() {
            return Err(AcquireError::InvalidRequest("lock key is empty".to_string()));
        }
        if timeout.is_zero() {
            return Err(AcquireError::InvalidRequest(
                "timeout must be positive".to_string(),
            ));
        }
        if max_retries == 0 {
            return Err(AcquireError::InvalidRequest(
                "max_retries must be at least 1".to_string(),
            ));
        }

        let span = tracing::info_span!("lock.acquire", key, owner_id = self.owner_id);
        let _guard = span.enter();
        let start = Instant::now();

        let mut attempts = 0u32;
        let mut reclaims = 0u32;
        let mut first = true;

        loop {
            self.store.ensure_schema()?;
            if first {
                first = false;
                self.reconcile(key);
                self.detect_deadlocks();
            }

            let now = self.clock.now();
            let lock = NewLock::new(key, self.owner_id, now, timeout, context.clone());
            let existing = match self.store.try_insert(&lock)? {
                InsertOutcome::Inserted(record) => {
                    self.mirror(&record);
                    self.note_activity(now);
                    tracing::info!(
                        lock_id = record.id,
                        timeout_secs = timeout.as_secs(),
                        attempts = attempts + 1,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "lock acquired"
                    );
                    return Ok(record);
                }
                InsertOutcome::Held(existing) => existing,
            };

            let reclaim = if existing.is_expired(now) {
                Some(ReleaseReason::Expired)
            } else if !self.liveness.is_alive(existing.owner_id) {
                Some(ReleaseReason::DeadProcess)
            } else {
                None
            };

            if let Some(reason) = reclaim {
                if reclaims < max_retries {
                    reclaims += 1;
                    tracing::warn!(
                        lock_id = existing.id,
                        holder = existing.owner_id,
                        %reason,
                        "reclaiming lock"
                    );
                    self.release_record(&existing, reason)?;
                    continue;
                }
                tracing::warn!(
                    reclaims,
                    "reclaim budget exhausted, treating lock as contended"
                );
            }

            attempts += 1;
            tracing::debug!(
                holder = existing.owner_id,
                attempt = attempts,
                max_retries,
                "lock contended"
            );
            if attempts >= max_retries {
                return Err(ConcurrencyError {
                    key: key.to_string(),
                    timeout_secs: timeout.as_secs(),
                    retries: max_retries,
                    attempts_made: attempts,
                }
                .into());
            }
            self.clock.sleep(self.config.backoff.next_delay(attempts));
        }
    }

    /// Release `key` regardless of owner
    ///
    /// Returns true if a cache entry or an unreleased row was removed.
    pub fn release(&self, key: &str) -> bool {
        let start = Instant::now();
        let now = self.clock.now();

        let from_cache = match self.cache.delete(&lock_cache_key(key)) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to drop cached lock");
                false
            }
        };
        let from_table = match self.store.find_unreleased(key) {
            Ok(Some(record)) => match self.store.release(record.id, ReleaseReason::Manual, now) {
                Ok(released) => {
                    // A concurrent reconcile may have re-mirrored the row
                    self.drop_projection(&record);
                    released
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "failed to release lock row");
                    false
                }
            },
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to load lock row");
                false
            }
        };

        let origin = match (from_table, from_cache) {
            (true, true) => "table+cache",
            (true, false) => "table",
            (false, true) => "cache",
            (false, false) => {
                tracing::debug!(key, "release found nothing to release");
                return false;
            }
        };
        self.note_activity(now);
        tracing::info!(
            key,
            origin,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "lock released"
        );
        true
    }

    /// Fast check against the cache projection
    ///
    /// An entry that is expired, owned by a dead process, or has a stale
    /// heartbeat is evicted and reported as unlocked.
    pub fn is_locked(&self, key: &str) -> bool {
        let entry: CacheEntry = match cache::get_json(&self.cache, &lock_cache_key(key)) {
            Ok(Some(entry)) => entry,
            Ok(None) => return false,
            Err(e) => {
                tracing::debug!(key, error = %e, "unreadable cached lock");
                return false;
            }
        };

        let now = self.clock.now();
        let reason = if entry.is_expired(now) {
            ReleaseReason::Expired
        } else if !self.liveness.is_alive(entry.owner_id) {
            ReleaseReason::DeadProcess
        } else if entry.heartbeat_age(now) > self.config.heartbeat_timeout {
            ReleaseReason::Orphan
        } else {
            return true;
        };

        tracing::warn!(key, holder = entry.owner_id, %reason, "evicting invalid lock");
        self.evict(key, &entry, reason);
        false
    }

    /// Authoritative view of `key` from the durable table
    pub fn lock_info(&self, key: &str) -> LockInfo {
        let now = self.clock.now();
        match self.store.find_unreleased(key) {
            Ok(Some(record)) if !record.is_expired(now) => LockInfo::Held(record),
            Ok(_) => LockInfo::Absent {
                key: key.to_string(),
            },
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read lock");
                LockInfo::Absent {
                    key: key.to_string(),
                }
            }
        }
    }

    /// Record liveness for `key` and make sure it outlives `extend_by`
    ///
    /// The granted timeout becomes `max(granted, extend_by)` and the expiry
    /// the later of the current one and `now + granted`. Repeated heartbeats
    /// keep the lock at most one granted timeout ahead of the last beat.
    pub fn update_heartbeat(&self, key: &str, extend_by: Duration) -> bool {
        let now = self.clock.now();
        let Some(record) = self.active_row(key, now) else {
            return false;
        };
        let owner_id = match self.ownership(&record) {
            Ownership::Held => None,
            Ownership::Adopted => Some(self.owner_id),
            Ownership::Lost => return false,
        };

        let granted = record.timeout_secs.max(whole_secs(extend_by));
        let target = clock::after(now, Duration::from_secs(granted));
        let update = LockUpdate {
            owner_id,
            last_heartbeat: Some(now),
            expires_at: Some(record.expires_at.max(target)),
            timeout_secs: (granted != record.timeout_secs).then_some(granted),
        };
        self.apply_update(record, &update)
    }

    /// Push the expiry of `key` out by `additional`
    pub fn extend_lock(&self, key: &str, additional: Duration) -> bool {
        let now = self.clock.now();
        let Some(record) = self.active_row(key, now) else {
            return false;
        };
        let owner_id = match self.ownership(&record) {
            Ownership::Held => None,
            Ownership::Adopted => Some(self.owner_id),
            Ownership::Lost => return false,
        };

        let update = LockUpdate {
            owner_id,
            last_heartbeat: Some(now),
            expires_at: Some(clock::after(record.expires_at, additional)),
            ..LockUpdate::default()
        };
        let extended = self.apply_update(record, &update);
        if extended {
            tracing::info!(key, additional_secs = additional.as_secs(), "lock extended");
        }
        extended
    }

    /// Unreleased, unexpired rows
    pub fn active_locks(&self) -> Vec<LockRecord> {
        self.store
            .list_active(self.clock.now())
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to list active locks");
                Vec::new()
            })
    }

    /// Refresh the heartbeat of a row on its owner's behalf
    ///
    /// Used by the scheduler; no ownership check and no expiry change.
    pub fn renew_heartbeat(&self, record: &LockRecord) -> bool {
        let update = LockUpdate {
            last_heartbeat: Some(self.clock.now()),
            ..LockUpdate::default()
        };
        self.apply_update(record.clone(), &update)
    }

    /// When a lock was last acquired or released, if recently
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        cache::get_json(&self.cache, ACTIVITY_KEY).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "unreadable activity marker");
            None
        })
    }

    /// Write the cache projection of `record`
    pub fn mirror(&self, record: &LockRecord) {
        let ttl = record.remaining(self.clock.now());
        if ttl.is_zero() {
            return;
        }
        let entry = CacheEntry::from_record(record);
        if let Err(e) = cache::set_json(&self.cache, &lock_cache_key(&record.key), &entry, ttl) {
            tracing::warn!(key = %record.key, error = %e, "failed to mirror lock into cache");
        }
    }

    /// Terminate a specific row and drop its cache projection
    ///
    /// The cache entry is removed only while it still describes this row, so
    /// a newer holder's projection survives.
    pub(crate) fn release_record(
        &self,
        record: &LockRecord,
        reason: ReleaseReason,
    ) -> Result<bool, StoreError> {
        self.drop_projection(record);
        let now = self.clock.now();
        let released = self.store.release(record.id, reason, now)?;
        if released {
            self.drop_projection(record);
            self.note_activity(now);
        }
        Ok(released)
    }

    /// Mirror `record`, undoing the write if the row was released meanwhile
    pub(crate) fn mirror_live(&self, record: &LockRecord) {
        self.mirror(record);
        match self.store.find_unreleased(&record.key) {
            Ok(Some(current)) if current.id == record.id => {}
            Ok(_) => self.drop_projection(record),
            Err(e) => {
                tracing::debug!(key = %record.key, error = %e, "could not recheck mirrored lock");
            }
        }
    }

    /// Delete the cache entry for `record.key` if it still projects `record`
    fn drop_projection(&self, record: &LockRecord) {
        let cache_key = lock_cache_key(&record.key);
        match cache::get_json::<CacheEntry>(&self.cache, &cache_key) {
            Ok(Some(entry)) if entry.describes(record) => {
                if let Err(e) = self.cache.delete(&cache_key) {
                    tracing::warn!(key = %record.key, error = %e, "failed to drop cached lock");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(key = %record.key, error = %e, "unreadable cached lock");
            }
        }
    }

    pub(crate) fn note_activity(&self, at: DateTime<Utc>) {
        if let Err(e) = cache::set_json(&self.cache, ACTIVITY_KEY, &at, ACTIVITY_TTL) {
            tracing::debug!(error = %e, "failed to record lock activity");
        }
    }

    fn active_row(&self, key: &str, now: DateTime<Utc>) -> Option<LockRecord> {
        match self.store.find_unreleased(key) {
            Ok(Some(record)) if !record.is_expired(now) => Some(record),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read lock");
                None
            }
        }
    }

    fn ownership(&self, record: &LockRecord) -> Ownership {
        if record.owner_id == self.owner_id {
            return Ownership::Held;
        }
        if self.liveness.expects_identity_churn() {
            tracing::info!(
                key = %record.key,
                from = record.owner_id,
                to = self.owner_id,
                "adopting lock after owner id change"
            );
            return Ownership::Adopted;
        }

        tracing::warn!(
            key = %record.key,
            holder = record.owner_id,
            caller = self.owner_id,
            "lock owned by another process, releasing as orphan"
        );
        if let Err(e) = self.release_record(record, ReleaseReason::Orphan) {
            tracing::warn!(key = %record.key, error = %e, "failed to release orphaned lock");
        }
        Ownership::Lost
    }

    fn apply_update(&self, mut record: LockRecord, update: &LockUpdate) -> bool {
        match self.store.update(record.id, update) {
            Ok(true) => {
                update.apply(&mut record);
                self.mirror_live(&record);
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(key = %record.key, error = %e, "failed to update lock");
                false
            }
        }
    }

    fn evict(&self, key: &str, entry: &CacheEntry, reason: ReleaseReason) {
        match self.store.find_unreleased(key) {
            Ok(Some(record)) if entry.describes(&record) => {
                if let Err(e) = self.release_record(&record, reason) {
                    tracing::warn!(key, error = %e, "failed to release evicted lock");
                }
            }
            Ok(_) => {
                // Table has no matching row; only the projection is stale
                if let Err(e) = self.cache.delete(&lock_cache_key(key)) {
                    tracing::warn!(key, error = %e, "failed to drop cached lock");
                }
            }
            Err(e) => tracing::warn!(key, error = %e, "failed to read lock"),
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
