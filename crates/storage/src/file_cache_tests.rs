// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use synclock_core::coordination::{cache, lock_cache_key, ACTIVITY_KEY};
use synclock_core::FakeClock;

fn setup() -> (tempfile::TempDir, FileCache<FakeClock>, FakeClock) {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::at(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
    let cache = FileCache::with_clock(&dir.path().join("cache"), clock.clone()).unwrap();
    (dir, cache, clock)
}

#[test]
fn set_then_get() {
    let (_dir, cache, _clock) = setup();
    cache
        .set(&lock_cache_key("sync-products"), "{\"owner_id\":1}", Duration::from_secs(60))
        .unwrap();
    assert_eq!(
        cache.get("lock:sync-products").unwrap().as_deref(),
        Some("{\"owner_id\":1}")
    );
    assert_eq!(cache.get("lock:other").unwrap(), None);
}

#[test]
fn entries_expire_at_ttl() {
    let (_dir, cache, clock) = setup();
    cache.set("k", "v", Duration::from_secs(30)).unwrap();

    clock.advance(Duration::from_secs(29));
    assert!(cache.get("k").unwrap().is_some());
    clock.advance(Duration::from_secs(1));
    assert_eq!(cache.get("k").unwrap(), None);
    // Expired reads clean up after themselves
    assert!(!cache.entry_path("k").exists());
}

#[test]
fn set_overwrites_and_resets_ttl() {
    let (_dir, cache, clock) = setup();
    cache.set("k", "old", Duration::from_secs(10)).unwrap();
    clock.advance(Duration::from_secs(5));
    cache.set("k", "new", Duration::from_secs(10)).unwrap();
    clock.advance(Duration::from_secs(8));
    assert_eq!(cache.get("k").unwrap().as_deref(), Some("new"));
}

#[test]
fn delete_reports_live_entries_only() {
    let (_dir, cache, clock) = setup();
    assert!(!cache.delete("k").unwrap());

    cache.set("k", "v", Duration::from_secs(10)).unwrap();
    assert!(cache.delete("k").unwrap());
    assert!(!cache.delete("k").unwrap());

    cache.set("k", "v", Duration::from_secs(10)).unwrap();
    clock.advance(Duration::from_secs(10));
    assert!(!cache.delete("k").unwrap());
    assert!(!cache.entry_path("k").exists());
}

#[test]
fn wildcard_keys_do_not_collide() {
    let (_dir, cache, _clock) = setup();
    cache.set("status:*", "all", Duration::from_secs(10)).unwrap();
    cache.set("status:a", "one", Duration::from_secs(10)).unwrap();

    assert_eq!(cache.get("status:*").unwrap().as_deref(), Some("all"));
    assert_eq!(cache.get("status:a").unwrap().as_deref(), Some("one"));
}

#[test]
fn corrupt_entry_is_an_error_but_deletable() {
    let (_dir, cache, _clock) = setup();
    std::fs::write(cache.entry_path("k"), "not json").unwrap();

    assert!(matches!(cache.get("k"), Err(StoreError::Json(_))));
    assert!(!cache.delete("k").unwrap());
    assert_eq!(cache.get("k").unwrap(), None);
}

#[test]
fn json_helpers_work_over_files() {
    let (_dir, cache, clock) = setup();
    let at = clock.now();
    cache::set_json(&cache, ACTIVITY_KEY, &at, Duration::from_secs(3600)).unwrap();
    let read: Option<DateTime<Utc>> = cache::get_json(&cache, ACTIVITY_KEY).unwrap();
    assert_eq!(read, Some(at));
}

#[test]
fn purge_removes_only_expired_entries() {
    let (_dir, cache, clock) = setup();
    cache.set("short", "v", Duration::from_secs(5)).unwrap();
    cache.set("long", "v", Duration::from_secs(500)).unwrap();
    std::fs::write(cache.entry_path("broken"), "{").unwrap();

    clock.advance(Duration::from_secs(6));
    assert_eq!(cache.purge_expired().unwrap(), 2);
    assert!(cache.get("long").unwrap().is_some());
    assert_eq!(cache.purge_expired().unwrap(), 0);
}

#[test]
fn caches_in_the_same_directory_share_entries() {
    let (dir, writer, clock) = setup();
    let reader = FileCache::with_clock(&dir.path().join("cache"), clock).unwrap();
    writer.set("k", "v", Duration::from_secs(10)).unwrap();
    assert_eq!(reader.get("k").unwrap().as_deref(), Some("v"));
}
