//! Heartbeat and extend specs

use crate::prelude::*;

#[test]
fn holder_can_heartbeat() {
    let temp = Project::empty();
    temp.synclock().args(&["acquire", "k"]).passes();
    temp.synclock()
        .args(&["heartbeat", "k"])
        .passes()
        .stdout_has("heartbeat recorded for k");
}

#[test]
fn heartbeat_from_another_owner_fails() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["--owner", LIVE_OWNER, "acquire", "k"])
        .passes();

    temp.synclock()
        .args(&["heartbeat", "k"])
        .fails()
        .stderr_has("is not held by process")
        .stderr_has("synclock info k");
}

#[test]
fn heartbeat_without_lock_fails() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["heartbeat", "missing"])
        .fails()
        .stderr_has("lock 'missing' is not held");
}

#[test]
fn extend_moves_the_expiry() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["--owner", LIVE_OWNER, "acquire", "k", "--timeout", "60"])
        .passes();
    let before = temp.synclock().args(&["info", "k"]).passes().json();

    temp.synclock()
        .args(&["--owner", LIVE_OWNER, "extend", "k", "600"])
        .passes()
        .stdout_has("extended k by 600s");

    let after = temp.synclock().args(&["info", "k"]).passes().json();
    let parse = |v: &serde_json::Value| {
        chrono::DateTime::parse_from_rfc3339(v["expires_at"].as_str().unwrap()).unwrap()
    };
    assert_eq!((parse(&after) - parse(&before)).num_seconds(), 600);
}

#[test]
fn extend_without_lock_fails() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["extend", "k", "60"])
        .fails()
        .stderr_has("is not held");
}
