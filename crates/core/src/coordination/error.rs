// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Acquisition errors

use super::storage::StoreError;
use thiserror::Error;

/// The lock stayed contended through every retry
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error(
    "lock '{key}' still held after {attempts_made} attempt(s) \
     (timeout {timeout_secs}s, retries {retries})"
)]
pub struct ConcurrencyError {
    pub key: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub attempts_made: u32,
}

/// Errors returned by `LockCoordinator::acquire`
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),
    #[error("lock storage failed: {0}")]
    Storage(#[from] StoreError),
    #[error("invalid acquire request: {0}")]
    InvalidRequest(String),
}

impl AcquireError {
    /// The contention details, if the lock was simply busy
    pub fn as_concurrency(&self) -> Option<&ConcurrencyError> {
        match self {
            AcquireError::Concurrency(e) => Some(e),
            _ => None,
        }
    }
}
