// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Marker files shared with sync jobs and the scheduler
//!
//! A sync job drops a file named after its lock key into `syncs/` while it
//! runs. Scheduler runs that could not reach the lock table are written as
//! `next-run-<kind>.json` so the next invocation still knows when to fire.

use crate::paths::{escape_name, is_hidden, unescape_name};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use synclock_core::coordination::{
    FallbackScheduler, RunKind, SchedulerRun, StoreError, SyncSignal,
};

/// Reads sync-in-progress markers from a directory
#[derive(Clone, Debug)]
pub struct FileSyncSignal {
    dir: PathBuf,
}

impl FileSyncSignal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the marker for `key`
    pub fn mark(&self, key: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.dir.join(escape_name(key)), b"")
    }

    /// Remove the marker for `key`; returns false if there was none
    pub fn clear(&self, key: &str) -> io::Result<bool> {
        match std::fs::remove_file(self.dir.join(escape_name(key))) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn scan(&self) -> io::Result<Vec<String>> {
        let mut keys = Vec::new();
        for dirent in std::fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            if is_hidden(&path) || !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            match unescape_name(name) {
                Some(key) => keys.push(key),
                None => tracing::debug!(path = %path.display(), "ignoring malformed sync marker"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl SyncSignal for FileSyncSignal {
    fn active_syncs(&self) -> Vec<String> {
        match self.scan() {
            Ok(keys) => keys,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "failed to read sync markers"
                );
                Vec::new()
            }
        }
    }
}

/// Keeps scheduler runs as JSON files when the lock table is unreachable
#[derive(Clone, Debug)]
pub struct MarkerFallback {
    dir: PathBuf,
}

impl MarkerFallback {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, kind: RunKind) -> PathBuf {
        marker_path(&self.dir, kind)
    }
}

fn marker_path(dir: &Path, kind: RunKind) -> PathBuf {
    dir.join(format!("next-run-{kind}.json"))
}

impl FallbackScheduler for MarkerFallback {
    fn schedule(&self, run: &SchedulerRun) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, run)?;
        tmp.flush()?;
        tmp.persist(self.path(run.kind)).map_err(|e| e.error)?;
        tracing::info!(
            kind = %run.kind,
            next_execution = %run.next_execution,
            "scheduler run written to marker file"
        );
        Ok(())
    }

    fn scheduled(&self, kind: RunKind) -> Option<SchedulerRun> {
        let path = self.path(kind);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read run marker");
                return None;
            }
        };
        match serde_json::from_str::<SchedulerRun>(&raw) {
            Ok(run) if run.kind == kind => Some(run),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt run marker");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "markers_tests.rs"]
mod tests;
