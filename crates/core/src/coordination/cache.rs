// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fast TTL cache contract
//!
//! The cache is never authoritative. It holds lock projections for cheap
//! reads, the memoized unified status, and the last lock-activity marker.

use super::storage::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Cache key holding the time of the most recent acquire or release
pub const ACTIVITY_KEY: &str = "activity:last";

/// Key/value store with per-entry TTL
pub trait FastCache: Send + Sync {
    /// The live value for `key`; expired entries read as absent
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Remove `key`; returns true if a live entry was removed
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

impl<T: FastCache + ?Sized> FastCache for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).set(key, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        (**self).delete(key)
    }
}

/// Read and decode a JSON value
pub fn get_json<T: DeserializeOwned>(
    cache: &impl FastCache,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match cache.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and store a JSON value
pub fn set_json<T: Serialize>(
    cache: &impl FastCache,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    cache.set(key, &raw, ttl)
}
