//! Status specs

use crate::prelude::*;

#[test]
fn idle_system_can_proceed() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["status"])
        .passes()
        .stdout_has("status: all locks")
        .stdout_has("can proceed:       yes");
}

#[test]
fn held_lock_blocks_proceeding() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["--owner", LIVE_OWNER, "acquire", "sync-products"])
        .passes();

    temp.synclock()
        .args(&["status", "sync-products"])
        .exits(1)
        .stdout_has("status: sync-products")
        .stdout_has("can proceed:       no");
}

#[test]
fn release_clears_the_blocking_status() {
    let temp = Project::empty();
    temp.synclock()
        .args(&["--owner", LIVE_OWNER, "acquire", "k"])
        .passes();
    temp.synclock().args(&["status"]).exits(1);

    temp.synclock()
        .args(&["--owner", LIVE_OWNER, "release", "k"])
        .passes();
    temp.synclock().args(&["status"]).passes();
}

#[test]
fn sync_marker_reports_sync_in_progress() {
    let temp = Project::empty();
    temp.file("syncs/sync-products", "");

    let out = temp
        .synclock()
        .args(&["status", "--refresh", "--json"])
        .exits(1);
    let view = out.json();
    assert_eq!(view["sync_in_progress"], true);
    assert_eq!(view["can_proceed"], false);
}

#[test]
fn sync_without_lock_is_an_inconsistency() {
    let temp = Project::empty();
    temp.file("syncs/sync-products", "");

    temp.synclock()
        .args(&["status", "--refresh"])
        .exits(1)
        .stdout_has("sync 'sync-products' running without its lock");
}
