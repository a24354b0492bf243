// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution-context classification
//!
//! The context only tunes cache lifetimes and verification eagerness. It never
//! changes whether a lock is granted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable read by [`EnvClassifier`] by default
pub const CONTEXT_ENV_VAR: &str = "SYNCLOCK_CONTEXT";

/// What kind of invocation the current process is serving
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionContext {
    /// Operator-facing request (admin screens)
    Admin,
    /// Externally triggered automation (webhooks, cron hits)
    AutomatedTrigger,
    /// Queued background work
    BackgroundJob,
    /// Script or command-line invocation
    Script,
    #[default]
    Unknown,
}

impl ExecutionContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionContext::Admin => "admin",
            ExecutionContext::AutomatedTrigger => "automated-trigger",
            ExecutionContext::BackgroundJob => "background-job",
            ExecutionContext::Script => "script",
            ExecutionContext::Unknown => "unknown",
        }
    }

    /// Whether a person is likely waiting on the result
    pub fn is_interactive(&self) -> bool {
        matches!(self, ExecutionContext::Admin | ExecutionContext::Script)
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(ExecutionContext::Admin),
            "automated-trigger" | "automated" | "trigger" | "cron" => {
                Ok(ExecutionContext::AutomatedTrigger)
            }
            "background-job" | "background" | "job" => Ok(ExecutionContext::BackgroundJob),
            "script" | "cli" => Ok(ExecutionContext::Script),
            "unknown" | "" => Ok(ExecutionContext::Unknown),
            other => Err(format!("unknown execution context: {other}")),
        }
    }
}

/// Maps the current invocation to an [`ExecutionContext`]
pub trait ContextClassifier: Send + Sync {
    fn classify(&self) -> ExecutionContext;
}

/// A fixed context classifies as itself
impl ContextClassifier for ExecutionContext {
    fn classify(&self) -> ExecutionContext {
        *self
    }
}

/// Classifier reading the context name from an environment variable
#[derive(Clone, Debug)]
pub struct EnvClassifier {
    var: String,
    fallback: ExecutionContext,
}

impl EnvClassifier {
    pub fn new(fallback: ExecutionContext) -> Self {
        Self {
            var: CONTEXT_ENV_VAR.to_string(),
            fallback,
        }
    }

    pub fn with_var(mut self, var: impl Into<String>) -> Self {
        self.var = var.into();
        self
    }
}

impl Default for EnvClassifier {
    fn default() -> Self {
        Self::new(ExecutionContext::Unknown)
    }
}

impl ContextClassifier for EnvClassifier {
    fn classify(&self) -> ExecutionContext {
        match std::env::var(&self.var) {
            Ok(value) => value.parse().unwrap_or_else(|e: String| {
                tracing::debug!(var = %self.var, error = %e, "falling back to default context");
                self.fallback
            }),
            Err(_) => self.fallback,
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
