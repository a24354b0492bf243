// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! synclock-storage: on-disk backends for the lock coordinator
//!
//! - [`SqliteStore`] - the durable lock table
//! - [`FileCache`] - a TTL cache of JSON files in a directory
//! - [`FileSyncSignal`] and [`MarkerFallback`] - marker files in the state directory

mod file_cache;
mod markers;
mod paths;
mod sqlite;

pub use file_cache::FileCache;
pub use markers::{FileSyncSignal, MarkerFallback};
pub use paths::StateDir;
pub use sqlite::SqliteStore;
