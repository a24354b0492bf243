// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process store and cache backends
//!
//! The memory store is a complete table-backed implementation: a mutex makes
//! the conditional insert atomic for every thread sharing it. It also serves
//! as the test double for outages via [`MemoryStore::set_unavailable`].

use super::cache::FastCache;
use super::lock::{LockRecord, NewLock, ReleaseReason};
use super::storage::{
    DurableStore, InsertOutcome, LockUpdate, RunKind, SchedulerRun, StoreError,
};
use crate::clock::{self, Clock, SystemClock};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct Tables {
    rows: Vec<LockRecord>,
    next_id: i64,
    runs: HashMap<RunKind, SchedulerRun>,
}

/// Mutex-guarded lock table
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a storage outage; every call fails while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every row ever written, released ones included
    pub fn history(&self) -> Vec<LockRecord> {
        self.tables().rows.clone()
    }

    /// Insert a row verbatim, bypassing the conditional insert
    ///
    /// Used to seed rows written by other processes or older code paths.
    pub fn seed(&self, lock: NewLock) -> LockRecord {
        let mut tables = self.tables();
        tables.next_id += 1;
        let record = lock.into_record(tables.next_id);
        tables.rows.push(record.clone());
        record
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

impl DurableStore for MemoryStore {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.check()
    }

    fn try_insert(&self, lock: &NewLock) -> Result<InsertOutcome, StoreError> {
        self.check()?;
        let mut tables = self.tables();
        if let Some(existing) = tables
            .rows
            .iter()
            .find(|r| r.key == lock.key && !r.is_released())
        {
            return Ok(InsertOutcome::Held(existing.clone()));
        }
        tables.next_id += 1;
        let record = lock.clone().into_record(tables.next_id);
        tables.rows.push(record.clone());
        Ok(InsertOutcome::Inserted(record))
    }

    fn find_unreleased(&self, key: &str) -> Result<Option<LockRecord>, StoreError> {
        self.check()?;
        Ok(self
            .tables()
            .rows
            .iter()
            .find(|r| r.key == key && !r.is_released())
            .cloned())
    }

    fn list_unreleased(&self) -> Result<Vec<LockRecord>, StoreError> {
        self.check()?;
        Ok(self
            .tables()
            .rows
            .iter()
            .filter(|r| !r.is_released())
            .cloned()
            .collect())
    }

    fn update(&self, id: i64, update: &LockUpdate) -> Result<bool, StoreError> {
        self.check()?;
        let mut tables = self.tables();
        match tables
            .rows
            .iter_mut()
            .find(|r| r.id == id && !r.is_released())
        {
            Some(row) => {
                update.apply(row);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn release(
        &self,
        id: i64,
        reason: ReleaseReason,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let mut tables = self.tables();
        match tables
            .rows
            .iter_mut()
            .find(|r| r.id == id && !r.is_released())
        {
            Some(row) => {
                row.released_at = Some(at);
                row.release_reason = Some(reason);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn load_run(&self, kind: RunKind) -> Result<Option<SchedulerRun>, StoreError> {
        self.check()?;
        Ok(self.tables().runs.get(&kind).cloned())
    }

    fn save_run(&self, run: &SchedulerRun) -> Result<(), StoreError> {
        self.check()?;
        self.tables().runs.insert(run.kind, run.clone());
        Ok(())
    }
}

/// Mutex-guarded TTL cache
#[derive(Debug, Default)]
pub struct MemoryCache<C: Clock = SystemClock> {
    entries: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
    clock: C,
    unavailable: AtomicBool,
}

impl MemoryCache<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<C: Clock> MemoryCache<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate a cache outage; every call fails while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory cache offline".to_string()));
        }
        Ok(())
    }
}

impl<C: Clock> FastCache for MemoryCache<C> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some((value, expires_at)) if now < *expires_at => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check()?;
        let expires_at = clock::after(self.clock.now(), ttl);
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check()?;
        let now = self.clock.now();
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(matches!(removed, Some((_, expires_at)) if now < expires_at))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
