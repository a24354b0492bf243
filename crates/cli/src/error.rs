// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-facing errors with context, suggestions and an exit code

use chrono::{DateTime, Utc};
use std::fmt;
use synclock_core::{ConcurrencyError, LockRecord};

/// Exit code when a lock stayed held through every retry
pub const EXIT_CONTENDED: u8 = 3;

/// Error with context and recovery suggestions for display on stderr
#[derive(Debug)]
pub struct CliError {
    /// What went wrong
    pub message: String,
    /// Why it might have happened
    pub context: Vec<String>,
    /// How to fix it
    pub suggestions: Vec<String>,
    pub exit_code: u8,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: Vec::new(),
            suggestions: Vec::new(),
            exit_code: 1,
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_exit_code(mut self, code: u8) -> Self {
        self.exit_code = code;
        self
    }

    /// The lock was still held after the last retry
    pub fn contended(
        err: &ConcurrencyError,
        holder: Option<&LockRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut error = CliError::new(err.to_string()).with_exit_code(EXIT_CONTENDED);
        if let Some(holder) = holder {
            error = error
                .with_context(format!("held by process {}", holder.owner_id))
                .with_context(format!(
                    "held for {}s, expires at {}",
                    holder.age(now).as_secs(),
                    holder.expires_at.to_rfc3339()
                ));
        }
        error
            .with_suggestion("retry later, or raise --retries")
            .with_suggestion(format!("inspect the holder: synclock info {}", err.key))
    }

    /// Heartbeat or extend on a lock this owner does not hold
    pub fn not_held(key: &str, owner: u32) -> Self {
        CliError::new(format!("lock '{key}' is not held by process {owner}"))
            .with_context("the lock may have expired or been reclaimed")
            .with_suggestion(format!("check the current holder: synclock info {key}"))
            .with_suggestion("pass --owner if the lock was acquired by another process")
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            for ctx in &self.context {
                writeln!(f, "  -> {}", ctx)?;
            }
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            writeln!(f, "suggestions:")?;
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for CliError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
