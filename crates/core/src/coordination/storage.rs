// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable lock table contract
//!
//! The durable store is the single source of truth. Its conditional insert is
//! the only real mutual-exclusion primitive in the system: it must check for
//! an unreleased row and insert a new one inside one transaction.

use super::lock::{LockRecord, NewLock, ReleaseReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by lock storage backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt row for '{key}': {message}")]
    Corrupt { key: String, message: String },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a conditional insert
#[derive(Clone, Debug, PartialEq)]
pub enum InsertOutcome {
    /// No unreleased row existed; this is the new row
    Inserted(LockRecord),
    /// An unreleased row (possibly expired) already holds the key
    Held(LockRecord),
}

/// Fields to change on an unreleased row; `None` leaves a field untouched
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LockUpdate {
    pub owner_id: Option<u32>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub timeout_secs: Option<u64>,
}

impl LockUpdate {
    /// Apply the update to an in-memory copy of the row
    pub fn apply(&self, record: &mut LockRecord) {
        if let Some(owner_id) = self.owner_id {
            record.owner_id = owner_id;
        }
        if let Some(at) = self.last_heartbeat {
            record.last_heartbeat = at;
        }
        if let Some(at) = self.expires_at {
            record.expires_at = at;
        }
        if let Some(secs) = self.timeout_secs {
            record.timeout_secs = secs;
        }
    }
}

/// Which scheduler cycle a run record belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Heartbeat,
    Cleanup,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Heartbeat => "heartbeat",
            RunKind::Cleanup => "cleanup",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "heartbeat" => Some(RunKind::Heartbeat),
            "cleanup" => Some(RunKind::Cleanup),
            _ => None,
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable replacement for an in-process timer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerRun {
    pub kind: RunKind,
    pub next_execution: DateTime<Utc>,
    pub last_execution: Option<DateTime<Utc>>,
}

/// Transactional lock table
pub trait DurableStore: Send + Sync {
    /// Create tables and indexes if missing; idempotent
    fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Insert `lock` unless an unreleased row exists for its key
    fn try_insert(&self, lock: &NewLock) -> Result<InsertOutcome, StoreError>;

    /// The unreleased row for `key`, expired or not
    fn find_unreleased(&self, key: &str) -> Result<Option<LockRecord>, StoreError>;

    /// Every unreleased row, expired or not
    fn list_unreleased(&self) -> Result<Vec<LockRecord>, StoreError>;

    /// Update an unreleased row; returns false if it is gone or released
    fn update(&self, id: i64, update: &LockUpdate) -> Result<bool, StoreError>;

    /// Mark a row released; returns false if it was already released
    fn release(&self, id: i64, reason: ReleaseReason, at: DateTime<Utc>)
        -> Result<bool, StoreError>;

    fn load_run(&self, kind: RunKind) -> Result<Option<SchedulerRun>, StoreError>;

    fn save_run(&self, run: &SchedulerRun) -> Result<(), StoreError>;

    /// Unreleased rows that have not expired at `now`
    fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<LockRecord>, StoreError> {
        Ok(self
            .list_unreleased()?
            .into_iter()
            .filter(|r| !r.is_expired(now))
            .collect())
    }

    /// Unreleased rows with `expires_at <= now`
    fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<LockRecord>, StoreError> {
        Ok(self
            .list_unreleased()?
            .into_iter()
            .filter(|r| r.is_expired(now))
            .collect())
    }

    /// Unreleased rows whose last heartbeat is older than `cutoff`
    fn list_heartbeat_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LockRecord>, StoreError> {
        Ok(self
            .list_unreleased()?
            .into_iter()
            .filter(|r| r.last_heartbeat < cutoff)
            .collect())
    }
}

impl<T: DurableStore + ?Sized> DurableStore for Arc<T> {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        (**self).ensure_schema()
    }

    fn try_insert(&self, lock: &NewLock) -> Result<InsertOutcome, StoreError> {
        (**self).try_insert(lock)
    }

    fn find_unreleased(&self, key: &str) -> Result<Option<LockRecord>, StoreError> {
        (**self).find_unreleased(key)
    }

    fn list_unreleased(&self) -> Result<Vec<LockRecord>, StoreError> {
        (**self).list_unreleased()
    }

    fn update(&self, id: i64, update: &LockUpdate) -> Result<bool, StoreError> {
        (**self).update(id, update)
    }

    fn release(
        &self,
        id: i64,
        reason: ReleaseReason,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        (**self).release(id, reason, at)
    }

    fn load_run(&self, kind: RunKind) -> Result<Option<SchedulerRun>, StoreError> {
        (**self).load_run(kind)
    }

    fn save_run(&self, run: &SchedulerRun) -> Result<(), StoreError> {
        (**self).save_run(run)
    }

    fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<LockRecord>, StoreError> {
        (**self).list_active(now)
    }

    fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<LockRecord>, StoreError> {
        (**self).list_expired(now)
    }

    fn list_heartbeat_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LockRecord>, StoreError> {
        (**self).list_heartbeat_before(cutoff)
    }
}
