//! is-locked, info and list specs

use crate::prelude::*;

#[test]
fn is_locked_reflects_the_lock() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["is-locked", "k"])
        .exits(1)
        .stdout_has("unlocked");

    temp.synclock().args(&["acquire", "k"]).passes();
    temp.synclock()
        .args(&["is-locked", "k"])
        .passes()
        .stdout_has("locked");

    temp.synclock().args(&["release", "k"]).passes();
    temp.synclock().args(&["is-locked", "k"]).exits(1);
}

#[test]
fn info_reports_absent_and_held() {
    let temp = Project::empty();
    let absent = temp.synclock().args(&["info", "k"]).passes().json();
    assert_eq!(absent["state"], "absent");

    temp.synclock()
        .args(&["--owner", LIVE_OWNER, "acquire", "k"])
        .passes();
    let held = temp.synclock().args(&["info", "k"]).passes().json();
    assert_eq!(held["state"], "held");
    assert_eq!(held["owner_id"], 1);
    assert_eq!(held["key"], "k");
}

#[test]
fn list_empty() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["list"])
        .passes()
        .stdout_has("No active locks");
}

#[test]
fn list_shows_active_locks() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["--owner", LIVE_OWNER, "acquire", "sync-products"])
        .passes();
    temp.synclock()
        .args(&["--owner", LIVE_OWNER, "acquire", "sync-orders"])
        .passes();
    temp.synclock()
        .args(&["--owner", LIVE_OWNER, "release", "sync-orders"])
        .passes();

    temp.synclock()
        .args(&["list"])
        .passes()
        .stdout_has("KEY")
        .stdout_has("sync-products")
        .stdout_lacks("sync-orders");
}

#[test]
fn list_json() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["--owner", LIVE_OWNER, "acquire", "sync-products"])
        .passes();

    let rows = temp.synclock().args(&["list", "--json"]).passes().json();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["key"], "sync-products");
    assert_eq!(rows[0]["owner_id"], 1);
}
