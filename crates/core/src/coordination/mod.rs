// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Distributed lock coordination
//!
//! This module provides:
//! - **LockCoordinator** - Acquire, release, inspect and renew named locks
//! - **Sweeps** - Reclaim expired, orphaned and ownerless rows; reconcile stores
//! - **HeartbeatScheduler** - Externally triggered heartbeat and cleanup cycles
//! - **UnifiedStatusCache** - Memoized "can a sync start" view
//! - **Storage contracts** - `DurableStore` and `FastCache`, with in-memory backends

pub mod backoff;
pub mod cache;
pub mod error;
pub mod guard;
pub mod liveness;
pub mod lock;
pub mod maintenance;
pub mod manager;
pub mod memory;
pub mod status;
pub mod storage;
pub mod sweep;

#[cfg(test)]
mod test_support;

pub use backoff::BackoffPolicy;
pub use cache::{FastCache, ACTIVITY_KEY};
pub use error::{AcquireError, ConcurrencyError};
pub use guard::LockGuard;
#[cfg(any(test, feature = "test-support"))]
pub use liveness::FakeProbe;
pub use liveness::{
    ConfiguredLiveness, LivenessConfig, LivenessMode, LivenessPolicy, OsProcessProbe,
    ProcessProbe, StrictLiveness, TolerantLiveness,
};
pub use lock::{
    lock_cache_key, CacheEntry, LockContext, LockInfo, LockRecord, NewLock, ReleaseReason,
    UNKNOWN_OWNER,
};
pub use maintenance::{
    CleanupReport, CycleReport, FallbackScheduler, HeartbeatScheduler, LogFallback,
    RunPersistence, SchedulerConfig,
};
pub use manager::{CoordinatorConfig, LockCoordinator};
pub use memory::{MemoryCache, MemoryStore};
pub use status::{
    status_cache_key, Inconsistency, NoSyncSignal, Resolution, StatusConfig, StatusView,
    SyncSignal, UnifiedStatusCache,
};
pub use storage::{DurableStore, InsertOutcome, LockUpdate, RunKind, SchedulerRun, StoreError};
pub use sweep::{DeadlockReport, Reconciliation};
