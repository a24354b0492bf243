//! Acquire and release specs

use crate::prelude::*;
use std::time::Duration;

#[test]
fn acquire_then_release() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["acquire", "sync-products"])
        .passes()
        .stdout_has("acquired sync-products");

    temp.synclock()
        .args(&["release", "sync-products"])
        .passes()
        .stdout_has("released sync-products");

    temp.synclock()
        .args(&["release", "sync-products"])
        .passes()
        .stdout_has("sync-products was not locked");
}

#[test]
fn contended_acquire_exits_3_and_names_the_holder() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["--owner", LIVE_OWNER, "acquire", "sync-products"])
        .passes();

    temp.synclock()
        .args(&["acquire", "sync-products", "--retries", "2"])
        .exits(3)
        .stderr_has("still held after 2 attempt(s)")
        .stderr_has("held by process 1")
        .stderr_has("synclock info sync-products");
}

#[test]
fn released_lock_can_be_taken_by_another_owner() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["--owner", LIVE_OWNER, "acquire", "k"])
        .passes();
    temp.synclock()
        .args(&["--owner", LIVE_OWNER, "release", "k"])
        .passes()
        .stdout_has("released k");

    temp.synclock()
        .args(&["acquire", "k", "--retries", "1"])
        .passes()
        .stdout_has("acquired k");
}

#[test]
fn dead_owner_is_reclaimed_immediately() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["--owner", DEAD_OWNER, "acquire", "k"])
        .passes();

    temp.synclock()
        .args(&["acquire", "k", "--retries", "1"])
        .passes()
        .stdout_has("acquired k");
}

#[test]
fn expired_lock_is_reclaimed() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["--owner", LIVE_OWNER, "acquire", "k", "--timeout", "1"])
        .passes();

    std::thread::sleep(Duration::from_millis(1100));

    temp.synclock()
        .args(&["acquire", "k", "--retries", "1"])
        .passes()
        .stdout_has("acquired k");
}

#[test]
fn metadata_is_stored_with_the_lock() {
    let temp = Project::empty();
    temp.synclock()
        .args(&[
            "acquire",
            "k",
            "--meta",
            "trigger=cron",
            "--meta",
            "batch=500",
        ])
        .passes();

    let info = temp.synclock().args(&["info", "k"]).passes().json();
    assert_eq!(info["state"], "held");
    assert_eq!(info["context"]["trigger"], "cron");
    assert_eq!(info["context"]["batch"], 500);
}
