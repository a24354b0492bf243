// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock records as stored in the durable table and projected into the cache

use crate::clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Caller-supplied metadata stored verbatim with a lock
pub type LockContext = BTreeMap<String, serde_json::Value>;

/// Owner id recorded when the acquiring process is not known
pub const UNKNOWN_OWNER: u32 = 0;

/// Why a lock row was terminated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    /// `expires_at` passed without renewal
    Expired,
    /// The owning process no longer exists
    DeadProcess,
    /// No usable owner, or superseded by another holder
    Orphan,
    /// Explicit release by a caller
    Manual,
}

impl ReleaseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseReason::Expired => "expired",
            ReleaseReason::DeadProcess => "dead_process",
            ReleaseReason::Orphan => "orphan",
            ReleaseReason::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "expired" => Some(ReleaseReason::Expired),
            "dead_process" => Some(ReleaseReason::DeadProcess),
            "orphan" => Some(ReleaseReason::Orphan),
            "manual" => Some(ReleaseReason::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the durable lock table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub id: i64,
    pub key: String,
    pub owner_id: u32,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Lifetime each heartbeat grants from the moment it is recorded
    pub timeout_secs: u64,
    pub last_heartbeat: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub release_reason: Option<ReleaseReason>,
    #[serde(default)]
    pub context: LockContext,
}

impl LockRecord {
    pub fn is_released(&self) -> bool {
        self.released_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Unreleased and not yet expired
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_released() && !self.is_expired(now)
    }

    /// Lifetime granted per heartbeat; `extend_lock` does not change it
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        clock::elapsed(now, self.expires_at)
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        clock::elapsed(self.acquired_at, now)
    }

    pub fn heartbeat_age(&self, now: DateTime<Utc>) -> Duration {
        clock::elapsed(self.last_heartbeat, now)
    }

    pub fn has_owner(&self) -> bool {
        self.owner_id != UNKNOWN_OWNER
    }
}

/// A lock row about to be inserted
#[derive(Clone, Debug, PartialEq)]
pub struct NewLock {
    pub key: String,
    pub owner_id: u32,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub timeout_secs: u64,
    pub last_heartbeat: DateTime<Utc>,
    pub context: LockContext,
}

impl NewLock {
    pub fn new(
        key: impl Into<String>,
        owner_id: u32,
        now: DateTime<Utc>,
        timeout: Duration,
        context: LockContext,
    ) -> Self {
        Self {
            key: key.into(),
            owner_id,
            acquired_at: now,
            expires_at: clock::after(now, timeout),
            timeout_secs: whole_secs(timeout),
            last_heartbeat: now,
            context,
        }
    }

    /// Materialize the row once the store has assigned an id
    pub fn into_record(self, id: i64) -> LockRecord {
        LockRecord {
            id,
            key: self.key,
            owner_id: self.owner_id,
            acquired_at: self.acquired_at,
            expires_at: self.expires_at,
            timeout_secs: self.timeout_secs,
            last_heartbeat: self.last_heartbeat,
            released_at: None,
            release_reason: None,
            context: self.context,
        }
    }
}

/// Authoritative answer to "who holds this key"
///
/// Never a bare `false`: absent keys still report which key was asked about.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockInfo {
    Held(LockRecord),
    Absent { key: String },
}

impl LockInfo {
    pub fn is_held(&self) -> bool {
        matches!(self, LockInfo::Held(_))
    }

    pub fn key(&self) -> &str {
        match self {
            LockInfo::Held(record) => &record.key,
            LockInfo::Absent { key } => key,
        }
    }

    pub fn record(&self) -> Option<&LockRecord> {
        match self {
            LockInfo::Held(record) => Some(record),
            LockInfo::Absent { .. } => None,
        }
    }
}

/// Cache projection of a held lock, stored as JSON under `lock:<key>`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub owner_id: u32,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub timeout_secs: u64,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default)]
    pub context: LockContext,
}

impl CacheEntry {
    pub fn from_record(record: &LockRecord) -> Self {
        Self {
            owner_id: record.owner_id,
            acquired_at: record.acquired_at,
            expires_at: record.expires_at,
            timeout_secs: record.timeout_secs,
            last_heartbeat: record.last_heartbeat,
            context: record.context.clone(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn heartbeat_age(&self, now: DateTime<Utc>) -> Duration {
        clock::elapsed(self.last_heartbeat, now)
    }

    /// Whether this entry projects the given row
    ///
    /// Compared at millisecond precision since table backends may truncate.
    pub fn describes(&self, record: &LockRecord) -> bool {
        self.owner_id == record.owner_id
            && self.acquired_at.timestamp_millis() == record.acquired_at.timestamp_millis()
    }

    pub fn into_new_lock(self, key: impl Into<String>) -> NewLock {
        NewLock {
            key: key.into(),
            owner_id: self.owner_id,
            acquired_at: self.acquired_at,
            expires_at: self.expires_at,
            timeout_secs: self.timeout_secs,
            last_heartbeat: self.last_heartbeat,
            context: self.context,
        }
    }
}

/// Cache key holding the projection of `key`
pub fn lock_cache_key(key: &str) -> String {
    format!("lock:{key}")
}

/// Seconds in `d`, rounded up so sub-second timeouts still grant a lifetime
pub(crate) fn whole_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
