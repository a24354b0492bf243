//! Shared helpers for CLI specs
//!
//! Every [`Project`] is a fresh state directory with a settings file tuned
//! for fast backoff, so contention specs finish in milliseconds.

pub use predicates::prelude::*;

use assert_cmd::assert::Assert;
use assert_cmd::Command;
use tempfile::TempDir;

/// Settings with millisecond backoff
pub const FAST_CONFIG: &str = r#"
[coordinator.backoff]
base = "10ms"
max = "50ms"
jitter = "5ms"
"#;

/// A pid that cannot belong to a running process
pub const DEAD_OWNER: &str = "4194400";

/// A pid that is always running (init)
pub const LIVE_OWNER: &str = "1";

pub struct Project {
    dir: TempDir,
}

impl Project {
    /// State directory with [`FAST_CONFIG`]
    pub fn empty() -> Self {
        let project = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        project.file("synclock.toml", FAST_CONFIG);
        project
    }

    /// Write a file relative to the state directory
    pub fn file(&self, rel: &str, contents: &str) {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    /// `synclock` pointed at this state directory
    pub fn synclock(&self) -> Cli {
        let mut cmd = Command::cargo_bin("synclock").unwrap();
        cmd.env("SYNCLOCK_STATE_DIR", self.dir.path())
            .env_remove("SYNCLOCK_CONTEXT")
            .env_remove("SYNCLOCK_LOG");
        Cli { cmd }
    }
}

pub struct Cli {
    cmd: Command,
}

impl Cli {
    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    pub fn passes(mut self) -> Outcome {
        Outcome(self.cmd.assert().success())
    }

    pub fn fails(mut self) -> Outcome {
        Outcome(self.cmd.assert().failure())
    }

    pub fn exits(mut self, code: i32) -> Outcome {
        Outcome(self.cmd.assert().code(code))
    }
}

pub struct Outcome(Assert);

impl Outcome {
    pub fn stdout_has(self, needle: &str) -> Self {
        Self(self.0.stdout(predicate::str::contains(needle)))
    }

    pub fn stdout_lacks(self, needle: &str) -> Self {
        Self(self.0.stdout(predicate::str::contains(needle).not()))
    }

    pub fn stderr_has(self, needle: &str) -> Self {
        Self(self.0.stderr(predicate::str::contains(needle)))
    }

    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.0.get_output().stdout).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout()).unwrap()
    }
}
