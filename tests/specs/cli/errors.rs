//! Error reporting specs

use crate::prelude::*;

#[test]
fn unknown_command_fails() {
    let temp = Project::empty();
    temp.synclock().args(&["frobnicate"]).exits(2);
}

#[test]
fn broken_config_is_reported_with_its_path() {
    let temp = Project::empty();
    temp.file("synclock.toml", "[coordinator\n");

    temp.synclock()
        .args(&["list"])
        .fails()
        .stderr_has("invalid config")
        .stderr_has("synclock.toml");
}

#[test]
fn malformed_meta_is_rejected() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["acquire", "k", "--meta", "novalue"])
        .exits(2)
        .stderr_has("expected key=value");
}

#[test]
fn zero_timeout_is_rejected() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["acquire", "k", "--timeout", "0"])
        .fails()
        .stderr_has("timeout must be positive");
}

#[test]
fn unknown_context_is_rejected() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["--context", "nightly", "status"])
        .exits(2)
        .stderr_has("unknown execution context");
}
