//! Heartbeat tick and cleanup specs

use crate::prelude::*;
use std::time::Duration;

#[test]
fn tick_reports_the_cycle() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["tick"])
        .passes()
        .stdout_has("renewed 0 heartbeat(s)")
        .stdout_has("next heartbeat at");
}

#[test]
fn early_tick_waits_for_the_schedule() {
    let temp = Project::empty();
    temp.synclock().args(&["tick"]).passes();

    temp.synclock()
        .args(&["tick"])
        .passes()
        .stdout_has("heartbeat not due until")
        .stdout_lacks("renewed");

    temp.synclock()
        .args(&["tick", "--force"])
        .passes()
        .stdout_has("renewed 0 heartbeat(s)");
}

#[test]
fn cleanup_runs_once_per_interval() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["cleanup"])
        .passes()
        .stdout_has("cleanup released 0 lock(s)");

    temp.synclock()
        .args(&["cleanup"])
        .passes()
        .stdout_has("cleanup not due until");
}

#[test]
fn cleanup_releases_expired_locks() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["--owner", LIVE_OWNER, "acquire", "k", "--timeout", "1"])
        .passes();

    std::thread::sleep(Duration::from_millis(1100));

    temp.synclock()
        .args(&["cleanup"])
        .passes()
        .stdout_has("cleanup released 1 lock(s): 1 expired");
    temp.synclock()
        .args(&["list"])
        .passes()
        .stdout_has("No active locks");
}
