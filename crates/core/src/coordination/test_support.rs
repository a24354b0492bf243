// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for coordination unit tests

use super::backoff::BackoffPolicy;
use super::liveness::{FakeProbe, StrictLiveness, TolerantLiveness};
use super::lock::{LockContext, LockRecord, NewLock};
use super::manager::{CoordinatorConfig, LockCoordinator};
use super::memory::{MemoryCache, MemoryStore};
use crate::clock::{self, Clock, FakeClock};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

pub type StrictCoordinator = LockCoordinator<
    Arc<MemoryStore>,
    Arc<MemoryCache<FakeClock>>,
    StrictLiveness<FakeProbe>,
    FakeClock,
>;

pub type TolerantCoordinator = LockCoordinator<
    Arc<MemoryStore>,
    Arc<MemoryCache<FakeClock>>,
    TolerantLiveness<FakeProbe>,
    FakeClock,
>;

/// One shared store, cache, clock and process table
pub struct Fixture {
    pub clock: FakeClock,
    pub probe: FakeProbe,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache<FakeClock>>,
    pub config: CoordinatorConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let clock = FakeClock::at(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
        Self {
            cache: Arc::new(MemoryCache::with_clock(clock.clone())),
            store: Arc::new(MemoryStore::new()),
            probe: FakeProbe::new(),
            config: CoordinatorConfig::default().with_backoff(
                BackoffPolicy::default().with_jitter(Duration::ZERO),
            ),
            clock,
        }
    }

    /// Coordinator for a live process `owner`
    pub fn coordinator(&self, owner: u32) -> StrictCoordinator {
        self.probe.spawn(owner);
        LockCoordinator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.cache),
            StrictLiveness::new(self.probe.clone()),
            self.clock.clone(),
            self.config.clone(),
        )
        .with_owner_id(owner)
    }

    /// Coordinator that expects owner ids to churn
    pub fn tolerant(&self, owner: u32) -> TolerantCoordinator {
        LockCoordinator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.cache),
            TolerantLiveness::new(self.probe.clone(), owner)
                .with_drift_window(10)
                .with_assume_alive(false),
            self.clock.clone(),
            self.config.clone(),
        )
        .with_owner_id(owner)
    }

    /// Seed a table row as another process would have written it
    pub fn seed(&self, key: &str, owner: u32, age: Duration, timeout: Duration) -> LockRecord {
        let acquired_at = clock::before(self.clock.now(), age);
        self.store
            .seed(NewLock::new(key, owner, acquired_at, timeout, LockContext::new()))
    }
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}
