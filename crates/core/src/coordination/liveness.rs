// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Owner liveness checks
//!
//! A [`ProcessProbe`] answers the raw OS question. A [`LivenessPolicy`] decides
//! how much to trust it: strict deployments (long-running workers) believe the
//! process table, while spawned-process deployments (one process per request)
//! expect owner ids to churn and assume holders are alive.

use super::lock::UNKNOWN_OWNER;
use serde::{Deserialize, Serialize};
#[cfg(any(test, feature = "test-support"))]
use std::collections::HashSet;
#[cfg(any(test, feature = "test-support"))]
use std::sync::{Arc, Mutex};

/// OS-level "is this process id running" primitive
pub trait ProcessProbe: Send + Sync {
    fn is_running(&self, pid: u32) -> bool;
}

/// Probe backed by `kill(pid, 0)`
#[derive(Clone, Copy, Debug, Default)]
pub struct OsProcessProbe;

#[cfg(unix)]
impl ProcessProbe for OsProcessProbe {
    fn is_running(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // pid 0 and negative pids address process groups
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }

        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            // Exists but owned by another user
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}

#[cfg(not(unix))]
impl ProcessProbe for OsProcessProbe {
    fn is_running(&self, pid: u32) -> bool {
        pid != UNKNOWN_OWNER
    }
}

/// Probe with a controllable process table
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Debug, Default)]
pub struct FakeProbe {
    running: Arc<Mutex<HashSet<u32>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_running(pids: impl IntoIterator<Item = u32>) -> Self {
        let probe = Self::new();
        for pid in pids {
            probe.spawn(pid);
        }
        probe
    }

    pub fn spawn(&self, pid: u32) {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pid);
    }

    pub fn kill(&self, pid: u32) {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&pid);
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ProcessProbe for FakeProbe {
    fn is_running(&self, pid: u32) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&pid)
    }
}

/// Decides whether a recorded owner should still be considered a live holder
pub trait LivenessPolicy: Send + Sync {
    fn is_alive(&self, owner_id: u32) -> bool;

    /// Whether owner ids are expected to change between calls from the same
    /// logical holder
    fn expects_identity_churn(&self) -> bool {
        false
    }
}

/// Trust the process table
#[derive(Clone, Debug)]
pub struct StrictLiveness<P> {
    probe: P,
}

impl<P: ProcessProbe> StrictLiveness<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }
}

impl<P: ProcessProbe> LivenessPolicy for StrictLiveness<P> {
    fn is_alive(&self, owner_id: u32) -> bool {
        owner_id != UNKNOWN_OWNER && self.probe.is_running(owner_id)
    }
}

/// Tolerate process-id churn in spawned-process environments
///
/// An owner is alive if the probe finds it, if its id lies within
/// `drift_window` of the current process id, or otherwise if `assume_alive`
/// is set.
#[derive(Clone, Debug)]
pub struct TolerantLiveness<P> {
    probe: P,
    current: u32,
    drift_window: u32,
    assume_alive: bool,
}

impl<P: ProcessProbe> TolerantLiveness<P> {
    pub fn new(probe: P, current: u32) -> Self {
        Self {
            probe,
            current,
            drift_window: LivenessConfig::default().drift_window,
            assume_alive: true,
        }
    }

    pub fn with_drift_window(mut self, window: u32) -> Self {
        self.drift_window = window;
        self
    }

    pub fn with_assume_alive(mut self, assume: bool) -> Self {
        self.assume_alive = assume;
        self
    }
}

impl<P: ProcessProbe> LivenessPolicy for TolerantLiveness<P> {
    fn is_alive(&self, owner_id: u32) -> bool {
        if owner_id == UNKNOWN_OWNER {
            return false;
        }
        if self.probe.is_running(owner_id) || owner_id.abs_diff(self.current) <= self.drift_window {
            return true;
        }
        tracing::debug!(
            owner_id,
            assume_alive = self.assume_alive,
            "owner not found in process table"
        );
        self.assume_alive
    }

    fn expects_identity_churn(&self) -> bool {
        true
    }
}

/// Which policy to build from configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessMode {
    #[default]
    Strict,
    Tolerant,
}

/// Liveness configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub mode: LivenessMode,
    /// Maximum pid distance treated as the same environment
    pub drift_window: u32,
    /// Tolerant mode: treat unverifiable owners as alive
    pub assume_alive: bool,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            mode: LivenessMode::Strict,
            drift_window: 64,
            assume_alive: true,
        }
    }
}

impl LivenessConfig {
    pub fn with_mode(mut self, mode: LivenessMode) -> Self {
        self.mode = mode;
        self
    }

    /// Build the configured policy around `probe`
    pub fn build<P: ProcessProbe>(&self, probe: P, current: u32) -> ConfiguredLiveness<P> {
        match self.mode {
            LivenessMode::Strict => ConfiguredLiveness::Strict(StrictLiveness::new(probe)),
            LivenessMode::Tolerant => ConfiguredLiveness::Tolerant(
                TolerantLiveness::new(probe, current)
                    .with_drift_window(self.drift_window)
                    .with_assume_alive(self.assume_alive),
            ),
        }
    }
}

/// Policy selected at runtime from [`LivenessConfig`]
#[derive(Clone, Debug)]
pub enum ConfiguredLiveness<P> {
    Strict(StrictLiveness<P>),
    Tolerant(TolerantLiveness<P>),
}

impl<P: ProcessProbe> LivenessPolicy for ConfiguredLiveness<P> {
    fn is_alive(&self, owner_id: u32) -> bool {
        match self {
            ConfiguredLiveness::Strict(policy) => policy.is_alive(owner_id),
            ConfiguredLiveness::Tolerant(policy) => policy.is_alive(owner_id),
        }
    }

    fn expects_identity_churn(&self) -> bool {
        match self {
            ConfiguredLiveness::Strict(policy) => policy.expects_identity_churn(),
            ConfiguredLiveness::Tolerant(policy) => policy.expects_identity_churn(),
        }
    }
}

#[cfg(test)]
#[path = "liveness_tests.rs"]
mod tests;
