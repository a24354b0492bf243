// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::coordination::test_support::{secs, Fixture};
use yare::parameterized;

fn history_reason(fx: &Fixture, id: i64) -> Option<ReleaseReason> {
    fx.store
        .history()
        .into_iter()
        .find(|r| r.id == id)
        .and_then(|r| r.release_reason)
}

#[test]
fn acquire_inserts_and_mirrors() {
    let fx = Fixture::new();
    let coordinator = fx.coordinator(100);

    let record = coordinator
        .acquire("sync", secs(60), 3, LockContext::new())
        .unwrap();

    assert_eq!(record.owner_id, 100);
    assert_eq!(record.timeout(), secs(60));
    assert!(coordinator.is_locked("sync"));
    assert_eq!(coordinator.lock_info("sync"), LockInfo::Held(record.clone()));

    let entry: CacheEntry = cache::get_json(&fx.cache, "lock:sync").unwrap().unwrap();
    assert!(entry.describes(&record));
    assert_eq!(coordinator.last_activity(), Some(record.acquired_at));
}

#[test]
fn acquire_stores_context_verbatim() {
    let fx = Fixture::new();
    let mut context = LockContext::new();
    context.insert("batch".to_string(), serde_json::json!({"size": 50}));

    let record = fx
        .coordinator(100)
        .acquire("sync", secs(60), 1, context.clone())
        .unwrap();
    assert_eq!(record.context, context);
}

#[parameterized(
    empty_key = { "", 60, 3 },
    zero_timeout = { "sync", 0, 3 },
    zero_retries = { "sync", 60, 0 },
)]
fn acquire_rejects_invalid_requests(key: &str, timeout: u64, retries: u32) {
    let fx = Fixture::new();
    let result = fx
        .coordinator(100)
        .acquire(key, secs(timeout), retries, LockContext::new());
    assert!(matches!(result, Err(AcquireError::InvalidRequest(_))));
    assert!(fx.store.history().is_empty());
}

#[test]
fn contended_acquire_backs_off_then_fails() {
    let fx = Fixture::new();
    fx.coordinator(100)
        .acquire("sync", secs(3600), 3, LockContext::new())
        .unwrap();

    let err = fx
        .coordinator(200)
        .acquire("sync", secs(3600), 3, LockContext::new())
        .unwrap_err();

    let busy = err.as_concurrency().unwrap();
    assert_eq!(busy.key, "sync");
    assert_eq!(busy.attempts_made, 3);
    assert_eq!(busy.retries, 3);
    assert_eq!(busy.timeout_secs, 3600);
    // No sleep after the final attempt
    assert_eq!(fx.clock.sleeps(), vec![secs(1), secs(2)]);
}

#[test]
fn expired_lock_is_reclaimed_without_sleeping() {
    let fx = Fixture::new();
    fx.probe.spawn(100);
    let stale = fx.seed("sync", 100, secs(120), secs(60));

    let record = fx
        .coordinator(200)
        .acquire("sync", secs(60), 3, LockContext::new())
        .unwrap();

    assert_eq!(record.owner_id, 200);
    assert!(fx.clock.sleeps().is_empty());
    assert_eq!(history_reason(&fx, stale.id), Some(ReleaseReason::Expired));
}

#[test]
fn dead_owner_is_reclaimed_before_expiry() {
    let fx = Fixture::new();
    let stale = fx.seed("sync", 300, secs(10), secs(3600));

    let record = fx
        .coordinator(200)
        .acquire("sync", secs(60), 3, LockContext::new())
        .unwrap();

    assert_eq!(record.owner_id, 200);
    assert!(fx.clock.sleeps().is_empty());
    assert_eq!(history_reason(&fx, stale.id), Some(ReleaseReason::DeadProcess));
}

#[test]
fn acquire_surfaces_storage_failure() {
    let fx = Fixture::new();
    fx.store.set_unavailable(true);

    let err = fx
        .coordinator(100)
        .acquire("sync", secs(60), 3, LockContext::new())
        .unwrap_err();
    assert!(matches!(err, AcquireError::Storage(StoreError::Unavailable(_))));
}

#[test]
fn release_is_idempotent() {
    let fx = Fixture::new();
    let coordinator = fx.coordinator(100);
    let record = coordinator
        .acquire("sync", secs(60), 3, LockContext::new())
        .unwrap();

    assert!(coordinator.release("sync"));
    assert!(!coordinator.release("sync"));

    assert!(!coordinator.is_locked("sync"));
    assert!(!coordinator.lock_info("sync").is_held());
    assert_eq!(fx.cache.get("lock:sync").unwrap(), None);
    assert_eq!(history_reason(&fx, record.id), Some(ReleaseReason::Manual));
}

#[test]
fn release_clears_table_only_rows() {
    let fx = Fixture::new();
    fx.seed("sync", 100, secs(0), secs(60));

    assert!(fx.coordinator(200).release("sync"));
    assert!(fx.store.list_unreleased().unwrap().is_empty());
}

#[test]
fn release_degrades_when_storage_is_down() {
    let fx = Fixture::new();
    fx.store.set_unavailable(true);
    fx.cache.set_unavailable(true);
    assert!(!fx.coordinator(100).release("sync"));
}

#[test]
fn is_locked_evicts_dead_owner() {
    let fx = Fixture::new();
    let record = fx
        .coordinator(100)
        .acquire("sync", secs(3600), 3, LockContext::new())
        .unwrap();

    fx.probe.kill(100);
    let observer = fx.coordinator(200);
    assert!(!observer.is_locked("sync"));
    assert_eq!(history_reason(&fx, record.id), Some(ReleaseReason::DeadProcess));
    assert_eq!(fx.cache.get("lock:sync").unwrap(), None);
}

#[test]
fn is_locked_evicts_stale_heartbeat() {
    let fx = Fixture::new();
    let coordinator = fx.coordinator(100);
    let record = coordinator
        .acquire("sync", secs(3600), 3, LockContext::new())
        .unwrap();

    fx.clock.advance(secs(301));
    assert!(!coordinator.is_locked("sync"));
    assert_eq!(history_reason(&fx, record.id), Some(ReleaseReason::Orphan));
}

#[test]
fn is_locked_reports_false_after_expiry() {
    let fx = Fixture::new();
    let coordinator = fx.coordinator(100);
    coordinator
        .acquire("sync", secs(60), 3, LockContext::new())
        .unwrap();

    fx.clock.advance(secs(61));
    assert!(!coordinator.is_locked("sync"));
    assert!(!coordinator.lock_info("sync").is_held());
}

#[test]
fn is_locked_ignores_table_only_rows() {
    let fx = Fixture::new();
    fx.probe.spawn(100);
    fx.seed("sync", 100, secs(0), secs(60));

    let coordinator = fx.coordinator(200);
    assert!(!coordinator.is_locked("sync"));
    assert!(coordinator.lock_info("sync").is_held());
}

#[test]
fn lock_info_reports_absent_key() {
    let fx = Fixture::new();
    let info = fx.coordinator(100).lock_info("missing");
    assert_eq!(
        info,
        LockInfo::Absent {
            key: "missing".to_string()
        }
    );
}

#[test]
fn heartbeat_keeps_timeout_window_ahead() {
    let fx = Fixture::new();
    let coordinator = fx.coordinator(100);
    let record = coordinator
        .acquire("sync", secs(60), 3, LockContext::new())
        .unwrap();

    fx.clock.advance(secs(30));
    assert!(coordinator.update_heartbeat("sync", secs(10)));

    let LockInfo::Held(renewed) = coordinator.lock_info("sync") else {
        panic!("lock should still be held");
    };
    assert_eq!(renewed.last_heartbeat, fx.clock.now());
    assert_eq!(renewed.expires_at, clock::after(record.acquired_at, secs(90)));
}

#[test]
fn repeated_heartbeats_stay_one_timeout_ahead() {
    let fx = Fixture::new();
    let coordinator = fx.coordinator(100);
    coordinator
        .acquire("sync", secs(5), 3, LockContext::new())
        .unwrap();

    for _ in 0..10 {
        fx.clock.advance(secs(1));
        assert!(coordinator.update_heartbeat("sync", Duration::ZERO));
    }

    let held = coordinator.lock_info("sync").record().cloned().unwrap();
    assert_eq!(held.timeout(), secs(5));
    assert_eq!(held.remaining(fx.clock.now()), secs(5));

    let entry: CacheEntry = cache::get_json(&fx.cache, "lock:sync").unwrap().unwrap();
    assert_eq!(entry.timeout_secs, 5);
    assert_eq!(entry.expires_at, held.expires_at);
}

#[test]
fn larger_heartbeat_window_is_kept_for_later_beats() {
    let fx = Fixture::new();
    let coordinator = fx.coordinator(100);
    coordinator
        .acquire("sync", secs(60), 3, LockContext::new())
        .unwrap();

    assert!(coordinator.update_heartbeat("sync", secs(600)));
    fx.clock.advance(secs(300));
    assert!(coordinator.update_heartbeat("sync", Duration::ZERO));

    let held = coordinator.lock_info("sync").record().cloned().unwrap();
    assert_eq!(held.timeout(), secs(600));
    assert_eq!(held.remaining(fx.clock.now()), secs(600));
}

#[test]
fn extend_does_not_raise_heartbeat_window() {
    let fx = Fixture::new();
    let coordinator = fx.coordinator(100);
    coordinator
        .acquire("sync", secs(60), 3, LockContext::new())
        .unwrap();

    assert!(coordinator.extend_lock("sync", secs(600)));
    let held = coordinator.lock_info("sync").record().cloned().unwrap();
    assert_eq!(held.timeout(), secs(60));
    assert_eq!(held.remaining(fx.clock.now()), secs(660));
}

#[test]
fn heartbeat_extends_to_requested_window() {
    let fx = Fixture::new();
    let coordinator = fx.coordinator(100);
    coordinator
        .acquire("sync", secs(60), 3, LockContext::new())
        .unwrap();

    assert!(coordinator.update_heartbeat("sync", secs(600)));
    let renewed = coordinator.lock_info("sync").record().cloned().unwrap();
    assert_eq!(renewed.expires_at, clock::after(fx.clock.now(), secs(600)));
}

#[test]
fn heartbeat_from_foreign_owner_releases_as_orphan() {
    let fx = Fixture::new();
    let record = fx
        .coordinator(100)
        .acquire("sync", secs(60), 3, LockContext::new())
        .unwrap();

    assert!(!fx.coordinator(200).update_heartbeat("sync", secs(60)));
    assert_eq!(history_reason(&fx, record.id), Some(ReleaseReason::Orphan));
}

#[test]
fn tolerant_heartbeat_adopts_new_owner_id() {
    let fx = Fixture::new();
    fx.tolerant(100)
        .acquire("sync", secs(60), 3, LockContext::new())
        .unwrap();

    let next = fx.tolerant(105);
    assert!(next.update_heartbeat("sync", secs(60)));
    assert_eq!(next.lock_info("sync").record().unwrap().owner_id, 105);

    let entry: CacheEntry = cache::get_json(&fx.cache, "lock:sync").unwrap().unwrap();
    assert_eq!(entry.owner_id, 105);
}

#[test]
fn heartbeat_on_missing_lock_fails() {
    let fx = Fixture::new();
    assert!(!fx.coordinator(100).update_heartbeat("sync", secs(60)));
}

#[test]
fn extend_adds_to_expiry() {
    let fx = Fixture::new();
    let coordinator = fx.coordinator(100);
    let record = coordinator
        .acquire("sync", secs(60), 3, LockContext::new())
        .unwrap();

    assert!(coordinator.extend_lock("sync", secs(120)));
    let extended = coordinator.lock_info("sync").record().cloned().unwrap();
    assert_eq!(extended.expires_at, clock::after(record.acquired_at, secs(180)));
}

#[test]
fn extend_after_expiry_fails() {
    let fx = Fixture::new();
    let coordinator = fx.coordinator(100);
    coordinator
        .acquire("sync", secs(60), 3, LockContext::new())
        .unwrap();

    fx.clock.advance(secs(60));
    assert!(!coordinator.extend_lock("sync", secs(120)));
}

#[test]
fn active_locks_excludes_expired_and_released() {
    let fx = Fixture::new();
    let coordinator = fx.coordinator(100);
    coordinator
        .acquire("short", secs(10), 1, LockContext::new())
        .unwrap();
    coordinator
        .acquire("long", secs(600), 1, LockContext::new())
        .unwrap();
    coordinator
        .acquire("gone", secs(600), 1, LockContext::new())
        .unwrap();
    coordinator.release("gone");

    fx.clock.advance(secs(30));
    let keys: Vec<_> = coordinator
        .active_locks()
        .into_iter()
        .map(|r| r.key)
        .collect();
    assert_eq!(keys, vec!["long".to_string()]);
}

#[test]
fn renew_heartbeat_leaves_expiry_alone() {
    let fx = Fixture::new();
    let coordinator = fx.coordinator(100);
    let record = coordinator
        .acquire("sync", secs(600), 1, LockContext::new())
        .unwrap();

    fx.clock.advance(secs(90));
    assert!(fx.coordinator(999).renew_heartbeat(&record));

    let renewed = coordinator.lock_info("sync").record().cloned().unwrap();
    assert_eq!(renewed.owner_id, 100);
    assert_eq!(renewed.last_heartbeat, fx.clock.now());
    assert_eq!(renewed.expires_at, record.expires_at);
}
