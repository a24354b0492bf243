// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite lock table
//!
//! Every process opens its own connection to the same database file. The
//! conditional insert runs in an `IMMEDIATE` transaction, so the check for an
//! unreleased row and the insert happen under SQLite's write lock. A partial
//! unique index on unreleased keys backs this up at the schema level.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use synclock_core::coordination::{
    DurableStore, InsertOutcome, LockContext, LockRecord, LockUpdate, NewLock, ReleaseReason,
    RunKind, SchedulerRun, StoreError,
};

/// How long a connection waits on another writer before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS sync_locks (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    lock_key       TEXT    NOT NULL,
    owner_id       INTEGER NOT NULL,
    acquired_at    INTEGER NOT NULL,
    expires_at     INTEGER NOT NULL,
    timeout_secs   INTEGER NOT NULL,
    last_heartbeat INTEGER NOT NULL,
    released_at    INTEGER,
    release_reason TEXT,
    context        TEXT    NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS sync_locks_key ON sync_locks (lock_key);
CREATE UNIQUE INDEX IF NOT EXISTS sync_locks_one_holder
    ON sync_locks (lock_key) WHERE released_at IS NULL;
CREATE INDEX IF NOT EXISTS sync_locks_expires ON sync_locks (expires_at)
    WHERE released_at IS NULL;
CREATE TABLE IF NOT EXISTS scheduler_runs (
    kind           TEXT    PRIMARY KEY,
    next_execution INTEGER NOT NULL,
    last_execution INTEGER
);
";

const SELECT_LOCK: &str = "SELECT id, lock_key, owner_id, acquired_at, expires_at, \
     timeout_secs, last_heartbeat, released_at, release_reason, context FROM sync_locks";

/// Durable lock table in a SQLite database
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path` and bootstrap the schema
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_error)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_error)?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(db_error)?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened lock table");
        Self::init(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().map_err(db_error)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every row ever written for `key`, oldest first
    pub fn history(&self, key: &str) -> Result<Vec<LockRecord>, StoreError> {
        let conn = self.conn();
        query_locks(
            &conn,
            &format!("{SELECT_LOCK} WHERE lock_key = ?1 ORDER BY id"),
            params![key],
        )
    }
}

impl DurableStore for SqliteStore {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.conn().execute_batch(SCHEMA_SQL).map_err(db_error)
    }

    fn try_insert(&self, lock: &NewLock) -> Result<InsertOutcome, StoreError> {
        let mut conn = self.conn();
        // Rolls back on drop unless committed
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_error)?;

        if let Some(existing) = find_unreleased_in(&tx, &lock.key)? {
            return Ok(InsertOutcome::Held(existing));
        }

        let context = serde_json::to_string(&lock.context)?;
        let inserted = tx.execute(
            "INSERT INTO sync_locks (lock_key, owner_id, acquired_at, expires_at, \
             timeout_secs, last_heartbeat, context) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                lock.key,
                i64::from(lock.owner_id),
                lock.acquired_at.timestamp_millis(),
                lock.expires_at.timestamp_millis(),
                secs_column(lock.timeout_secs),
                lock.last_heartbeat.timestamp_millis(),
                context,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return match find_unreleased_in(&tx, &lock.key)? {
                    Some(existing) => Ok(InsertOutcome::Held(existing)),
                    None => Err(db_error(e)),
                };
            }
            Err(e) => return Err(db_error(e)),
        }

        let id = tx.last_insert_rowid();
        let record = query_locks(&tx, &format!("{SELECT_LOCK} WHERE id = ?1"), params![id])?
            .pop()
            .ok_or_else(|| StoreError::Corrupt {
                key: lock.key.clone(),
                message: format!("inserted row {id} not readable"),
            })?;
        tx.commit().map_err(db_error)?;
        Ok(InsertOutcome::Inserted(record))
    }

    fn find_unreleased(&self, key: &str) -> Result<Option<LockRecord>, StoreError> {
        find_unreleased_in(&self.conn(), key)
    }

    fn list_unreleased(&self) -> Result<Vec<LockRecord>, StoreError> {
        query_locks(
            &self.conn(),
            &format!("{SELECT_LOCK} WHERE released_at IS NULL ORDER BY acquired_at, id"),
            params![],
        )
    }

    fn update(&self, id: i64, update: &LockUpdate) -> Result<bool, StoreError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE sync_locks SET \
                 owner_id = COALESCE(?2, owner_id), \
                 last_heartbeat = COALESCE(?3, last_heartbeat), \
                 expires_at = COALESCE(?4, expires_at), \
                 timeout_secs = COALESCE(?5, timeout_secs) \
                 WHERE id = ?1 AND released_at IS NULL",
                params![
                    id,
                    update.owner_id.map(i64::from),
                    update.last_heartbeat.map(|t| t.timestamp_millis()),
                    update.expires_at.map(|t| t.timestamp_millis()),
                    update.timeout_secs.map(secs_column),
                ],
            )
            .map_err(db_error)?;
        Ok(changed == 1)
    }

    fn release(
        &self,
        id: i64,
        reason: ReleaseReason,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE sync_locks SET released_at = ?2, release_reason = ?3 \
                 WHERE id = ?1 AND released_at IS NULL",
                params![id, at.timestamp_millis(), reason.as_str()],
            )
            .map_err(db_error)?;
        Ok(changed == 1)
    }

    fn load_run(&self, kind: RunKind) -> Result<Option<SchedulerRun>, StoreError> {
        let raw: Option<(i64, Option<i64>)> = self
            .conn()
            .query_row(
                "SELECT next_execution, last_execution FROM scheduler_runs WHERE kind = ?1",
                params![kind.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_error)?;

        let Some((next, last)) = raw else {
            return Ok(None);
        };
        let key = format!("scheduler_runs.{kind}");
        Ok(Some(SchedulerRun {
            kind,
            next_execution: from_millis(&key, next)?,
            last_execution: last.map(|ms| from_millis(&key, ms)).transpose()?,
        }))
    }

    fn save_run(&self, run: &SchedulerRun) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO scheduler_runs (kind, next_execution, last_execution) \
                 VALUES (?1, ?2, ?3) \
                 ON CONFLICT (kind) DO UPDATE SET \
                 next_execution = excluded.next_execution, \
                 last_execution = excluded.last_execution",
                params![
                    run.kind.as_str(),
                    run.next_execution.timestamp_millis(),
                    run.last_execution.map(|t| t.timestamp_millis()),
                ],
            )
            .map_err(db_error)?;
        Ok(())
    }

    fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<LockRecord>, StoreError> {
        query_locks(
            &self.conn(),
            &format!(
                "{SELECT_LOCK} WHERE released_at IS NULL AND expires_at > ?1 \
                 ORDER BY acquired_at, id"
            ),
            params![now.timestamp_millis()],
        )
    }

    fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<LockRecord>, StoreError> {
        query_locks(
            &self.conn(),
            &format!(
                "{SELECT_LOCK} WHERE released_at IS NULL AND expires_at <= ?1 \
                 ORDER BY acquired_at, id"
            ),
            params![now.timestamp_millis()],
        )
    }

    fn list_heartbeat_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LockRecord>, StoreError> {
        query_locks(
            &self.conn(),
            &format!(
                "{SELECT_LOCK} WHERE released_at IS NULL AND last_heartbeat < ?1 \
                 ORDER BY acquired_at, id"
            ),
            params![cutoff.timestamp_millis()],
        )
    }
}

/// Row as stored, before validation
struct RawLock {
    id: i64,
    key: String,
    owner_id: i64,
    acquired_at: i64,
    expires_at: i64,
    timeout_secs: i64,
    last_heartbeat: i64,
    released_at: Option<i64>,
    release_reason: Option<String>,
    context: String,
}

impl RawLock {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            key: row.get(1)?,
            owner_id: row.get(2)?,
            acquired_at: row.get(3)?,
            expires_at: row.get(4)?,
            timeout_secs: row.get(5)?,
            last_heartbeat: row.get(6)?,
            released_at: row.get(7)?,
            release_reason: row.get(8)?,
            context: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<LockRecord, StoreError> {
        let key = self.key;
        let corrupt = |message: String| StoreError::Corrupt {
            key: key.clone(),
            message,
        };

        let owner_id = u32::try_from(self.owner_id)
            .map_err(|_| corrupt(format!("owner id {} out of range", self.owner_id)))?;
        let timeout_secs = u64::try_from(self.timeout_secs)
            .map_err(|_| corrupt(format!("timeout {} out of range", self.timeout_secs)))?;
        let release_reason = match self.release_reason.as_deref() {
            None => None,
            Some(s) => Some(
                ReleaseReason::parse(s)
                    .ok_or_else(|| corrupt(format!("unknown release reason '{s}'")))?,
            ),
        };
        let context: LockContext = serde_json::from_str(&self.context)
            .map_err(|e| corrupt(format!("bad context: {e}")))?;

        Ok(LockRecord {
            id: self.id,
            owner_id,
            acquired_at: from_millis(&key, self.acquired_at)?,
            expires_at: from_millis(&key, self.expires_at)?,
            timeout_secs,
            last_heartbeat: from_millis(&key, self.last_heartbeat)?,
            released_at: self
                .released_at
                .map(|ms| from_millis(&key, ms))
                .transpose()?,
            release_reason,
            context,
            key,
        })
    }
}

fn query_locks<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<LockRecord>, StoreError> {
    let mut stmt = conn.prepare(sql).map_err(db_error)?;
    let rows = stmt
        .query_map(params, RawLock::from_row)
        .map_err(db_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_error)?;
    rows.into_iter().map(RawLock::into_record).collect()
}

fn find_unreleased_in(conn: &Connection, key: &str) -> Result<Option<LockRecord>, StoreError> {
    Ok(query_locks(
        conn,
        &format!("{SELECT_LOCK} WHERE lock_key = ?1 AND released_at IS NULL LIMIT 1"),
        params![key],
    )?
    .pop())
}

fn from_millis(key: &str, ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| StoreError::Corrupt {
        key: key.to_string(),
        message: format!("timestamp {ms} out of range"),
    })
}

fn secs_column(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

fn db_error(e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;
