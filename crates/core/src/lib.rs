// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! synclock-core: distributed locks for short-lived processes
//!
//! This crate provides:
//! - A lock coordinator over a durable table and a fast TTL cache
//! - Liveness policies for crashed and churning lock holders
//! - An externally triggered heartbeat and cleanup scheduler
//! - A memoized, context-aware status view

pub mod clock;
pub mod config;
pub mod context;
pub mod coordination;

// Re-exports
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConfigError, Settings};
pub use context::{ContextClassifier, EnvClassifier, ExecutionContext, CONTEXT_ENV_VAR};
pub use coordination::{
    AcquireError, BackoffPolicy, ConcurrencyError, CoordinatorConfig, DurableStore, FastCache,
    HeartbeatScheduler, LivenessConfig, LivenessPolicy, LockCoordinator, LockGuard, LockInfo,
    LockRecord, ReleaseReason, SchedulerConfig, StatusConfig, StatusView, StoreError,
    UnifiedStatusCache,
};
