// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::{TimeZone, Utc};
use synclock_core::coordination::Inconsistency;
use synclock_core::ExecutionContext;

fn view() -> StatusView {
    StatusView {
        key: Some("sync-products".to_string()),
        can_proceed: false,
        needs_cleanup: false,
        active_locks: Vec::new(),
        sync_in_progress: true,
        heartbeat_healthy: true,
        inconsistencies: vec![Inconsistency::SyncWithoutLock {
            key: "sync-products".to_string(),
        }],
        generated_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        context: ExecutionContext::Script,
        cached: true,
    }
}

#[test]
fn text_report_summarizes_view() {
    let view = view();
    let text = StatusReport(&view).to_string();
    assert!(text.starts_with("status: sync-products"));
    assert!(text.contains("can proceed:       no"));
    assert!(text.contains("sync in progress:  yes"));
    assert!(text.contains("- sync 'sync-products' running without its lock"));
    assert!(text.ends_with("for script (cached)"));
}

#[test]
fn json_report_is_the_view() {
    let view = view();
    let json = output::render(&StatusReport(&view), OutputFormat::Json).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["can_proceed"], false);
    assert_eq!(parsed["inconsistencies"][0]["kind"], "sync_without_lock");
    assert!(parsed.get("cached").is_none());
}
