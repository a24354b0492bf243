// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State directory layout and marker file naming

use std::io;
use std::path::{Path, PathBuf};

/// Paths inside a synclock state directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateDir {
    pub root: PathBuf,
    /// SQLite lock table
    pub db_path: PathBuf,
    /// One JSON file per cache entry
    pub cache_path: PathBuf,
    /// Marker files for syncs in progress
    pub syncs_path: PathBuf,
    /// Fallback scheduler run markers
    pub runs_path: PathBuf,
    pub config_path: PathBuf,
}

impl StateDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            db_path: root.join("locks.db"),
            cache_path: root.join("cache"),
            syncs_path: root.join("syncs"),
            runs_path: root.join("runs"),
            config_path: root.join("synclock.toml"),
            root,
        }
    }

    /// Create the directory tree if missing
    pub fn create(&self) -> io::Result<()> {
        for dir in [&self.cache_path, &self.syncs_path, &self.runs_path] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Encode `name` as a single path component
///
/// Bytes outside `[A-Za-z0-9._-]` become `%XX`, so keys such as
/// `status:*` or `lock:a/b` map to distinct, portable file names.
pub(crate) fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => out.push(byte as char),
            // A leading dot would hide the file
            b'.' if !out.is_empty() => out.push('.'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Inverse of [`escape_name`]; `None` if `name` is not a valid encoding
pub(crate) fn unescape_name(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Whether `path` names a hidden or temporary file
pub(crate) fn is_hidden(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.starts_with('.'),
        None => true,
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
