// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential backoff with jitter for contended acquisitions

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay schedule between contended acquisition attempts
///
/// The delay after attempt `n` (1-based) is `base * 2^(n-1) + jitter`,
/// capped at `max`. Jitter is drawn uniformly from `[0, jitter)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    #[serde(with = "humantime_serde")]
    pub base: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
    #[serde(with = "humantime_serde")]
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
            jitter: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay after the given attempt with an explicit jitter sample
    pub fn delay(&self, attempt: u32, jitter: Duration) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let scaled = self.base.saturating_mul(1u32 << exponent);
        scaled
            .saturating_add(jitter.min(self.jitter))
            .min(self.max)
    }

    /// Delay after the given attempt with randomly sampled jitter
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.delay(attempt, self.sample_jitter())
    }

    fn sample_jitter(&self) -> Duration {
        let bound = u64::try_from(self.jitter.as_nanos()).unwrap_or(u64::MAX);
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rand::rng().random_range(0..bound))
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
