// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scoped lock ownership
//!
//! A [`LockGuard`] releases its lock when dropped, so a holder that returns
//! early or unwinds does not leave the key blocked until expiry. A guard only
//! ever touches the row it acquired: once that row expires and the key passes
//! to another holder, the guard's operations become no-ops.

use super::cache::FastCache;
use super::error::AcquireError;
use super::liveness::LivenessPolicy;
use super::lock::{LockContext, LockRecord, ReleaseReason};
use super::manager::LockCoordinator;
use super::storage::DurableStore;
use crate::clock::Clock;
use std::time::Duration;

/// A held lock that is released on drop
pub struct LockGuard<'a, S, F, L, C>
where
    S: DurableStore,
    F: FastCache,
    L: LivenessPolicy,
    C: Clock,
{
    coordinator: &'a LockCoordinator<S, F, L, C>,
    record: LockRecord,
    released: bool,
}

impl<'a, S, F, L, C> LockGuard<'a, S, F, L, C>
where
    S: DurableStore,
    F: FastCache,
    L: LivenessPolicy,
    C: Clock,
{
    pub fn key(&self) -> &str {
        &self.record.key
    }

    /// The row as it was at acquisition
    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    /// Whether the key is still held by the row this guard acquired
    pub fn is_current(&self) -> bool {
        self.coordinator
            .lock_info(&self.record.key)
            .record()
            .is_some_and(|r| r.id == self.record.id)
    }

    pub fn heartbeat(&self, extend_by: Duration) -> bool {
        self.is_current() && self.coordinator.update_heartbeat(&self.record.key, extend_by)
    }

    pub fn extend(&self, additional: Duration) -> bool {
        self.is_current() && self.coordinator.extend_lock(&self.record.key, additional)
    }

    /// Release now instead of on drop
    pub fn release(mut self) -> bool {
        self.released = true;
        self.release_own()
    }

    /// Keep the lock held past the guard's lifetime
    pub fn leak(mut self) -> LockRecord {
        self.released = true;
        self.record.clone()
    }

    fn release_own(&self) -> bool {
        match self
            .coordinator
            .release_record(&self.record, ReleaseReason::Manual)
        {
            Ok(released) => {
                if released {
                    tracing::info!(
                        key = %self.record.key,
                        lock_id = self.record.id,
                        "guard released lock"
                    );
                }
                released
            }
            Err(e) => {
                tracing::warn!(key = %self.record.key, error = %e, "guard failed to release lock");
                false
            }
        }
    }
}

impl<S, F, L, C> Drop for LockGuard<'_, S, F, L, C>
where
    S: DurableStore,
    F: FastCache,
    L: LivenessPolicy,
    C: Clock,
{
    fn drop(&mut self) {
        if !self.released {
            self.release_own();
        }
    }
}

impl<S, F, L, C> LockCoordinator<S, F, L, C>
where
    S: DurableStore,
    F: FastCache,
    L: LivenessPolicy,
    C: Clock,
{
    /// [`acquire`](Self::acquire) wrapped in a guard that releases on drop
    pub fn acquire_guard(
        &self,
        key: &str,
        timeout: Duration,
        max_retries: u32,
        context: LockContext,
    ) -> Result<LockGuard<'_, S, F, L, C>, AcquireError> {
        let record = self.acquire(key, timeout, max_retries, context)?;
        Ok(LockGuard {
            coordinator: self,
            record,
            released: false,
        })
    }
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
