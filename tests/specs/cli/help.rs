//! Help output specs

use crate::prelude::*;

#[test]
fn help_lists_commands() {
    let temp = Project::empty();
    let out = temp.synclock().args(&["--help"]).passes();
    for command in [
        "acquire",
        "release",
        "is-locked",
        "info",
        "heartbeat",
        "extend",
        "list",
        "status",
        "tick",
        "cleanup",
    ] {
        assert!(out.stdout().contains(command), "missing {command}");
    }
}

#[test]
fn acquire_help_shows_defaults() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["acquire", "--help"])
        .passes()
        .stdout_has("--timeout")
        .stdout_has("3600")
        .stdout_has("--retries")
        .stdout_has("--meta");
}

#[test]
fn version_flag() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["--version"])
        .passes()
        .stdout_has("synclock");
}
