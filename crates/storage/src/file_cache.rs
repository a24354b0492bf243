// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory-backed TTL cache
//!
//! Each key is one JSON file holding the value and its expiry. Writes go to a
//! temporary file that is renamed into place, so readers in other processes
//! never see a partial entry.

use crate::paths::{escape_name, is_hidden};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use synclock_core::clock;
use synclock_core::coordination::{FastCache, StoreError};
use synclock_core::{Clock, SystemClock};

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// TTL cache of JSON files in one directory
#[derive(Clone, Debug)]
pub struct FileCache<C: Clock = SystemClock> {
    dir: PathBuf,
    clock: C,
}

impl FileCache<SystemClock> {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        Self::with_clock(dir, SystemClock)
    }
}

impl<C: Clock> FileCache<C> {
    pub fn with_clock(dir: &Path, clock: C) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            clock,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", escape_name(key)))
    }

    fn read_entry(&self, path: &Path) -> Result<Option<StoredEntry>, StoreError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(path: &Path) -> Result<bool, StoreError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut purged = 0;
        for dirent in std::fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            if is_hidden(&path) {
                continue;
            }
            let expired = match self.read_entry(&path) {
                Ok(Some(entry)) => now >= entry.expires_at,
                Ok(None) => false,
                // Unreadable entries are dead weight
                Err(_) => true,
            };
            if expired && Self::remove(&path)? {
                purged += 1;
            }
        }
        if purged > 0 {
            tracing::debug!(purged, dir = %self.dir.display(), "purged expired cache entries");
        }
        Ok(purged)
    }
}

impl<C: Clock> FastCache for FileCache<C> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.entry_path(key);
        let Some(entry) = self.read_entry(&path)? else {
            return Ok(None);
        };
        if self.clock.now() >= entry.expires_at {
            Self::remove(&path)?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let entry = StoredEntry {
            value: value.to_string(),
            expires_at: clock::after(self.clock.now(), ttl),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut tmp, &entry)?;
        tmp.flush()?;
        tmp.persist(self.entry_path(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.entry_path(key);
        let live = match self.read_entry(&path) {
            Ok(Some(entry)) => self.clock.now() < entry.expires_at,
            Ok(None) => return Ok(false),
            Err(e) => {
                tracing::debug!(key, error = %e, "removing unreadable cache entry");
                false
            }
        };
        Ok(Self::remove(&path)? && live)
    }
}

#[cfg(test)]
#[path = "file_cache_tests.rs"]
mod tests;
