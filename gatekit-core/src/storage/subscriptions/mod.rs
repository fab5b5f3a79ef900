//! Durable subscription records backed by `SQLite`.

mod helpers;
mod schema;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};

use super::error::{StorageError, StorageResult};
use super::types::{SubscriptionRecord, SubscriptionStatus};
use helpers::{format_timestamp, map_db_err, map_record, RECORD_COLUMNS};
use schema::ensure_schema;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const LIST_PAGE_SIZE: i64 = 256;

/// Subscription table wrapper.
///
/// Every write is a single-row statement committed before the call returns.
/// Concurrent callers on different `external_id`s rely on `SQLite`'s own
/// locking; the connection itself is guarded by a mutex.
#[derive(Debug)]
pub struct SubscriptionStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SubscriptionStore {
    /// Opens or creates the subscription database at `path`.
    ///
    /// The schema is not created here; call [`ensure_schema`](Self::ensure_schema)
    /// once at startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or configured.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                StorageError::io(
                    format!("failed to create database directory {}", parent.display()),
                    err,
                )
            })?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let conn =
            Connection::open_with_flags(path, flags).map_err(|err| map_db_err(&err))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|err| map_db_err(&err))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;",
        )
        .map_err(|err| map_db_err(&err))?;
        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    /// Returns the database location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the backing tables if absent. Safe to call on every startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub fn ensure_schema(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        ensure_schema(&conn)
    }

    /// Inserts or fully replaces the row keyed by `record.external_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub fn upsert(&self, record: &SubscriptionRecord) -> StorageResult<()> {
        self.conn()?
            .execute(
                "INSERT INTO subscriptions (
                    external_id, client_id, label, access_key, status, created_at, expires_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(external_id) DO UPDATE SET
                    client_id  = excluded.client_id,
                    label      = excluded.label,
                    access_key = excluded.access_key,
                    status     = excluded.status,
                    created_at = excluded.created_at,
                    expires_at = excluded.expires_at",
                params![
                    record.external_id,
                    record.client_id,
                    record.label,
                    record.access_key,
                    record.status.as_ref(),
                    format_timestamp(&record.created_at),
                    record.expires_at.as_ref().map(format_timestamp),
                ],
            )
            .map_err(|err| map_db_err(&err))?;
        Ok(())
    }

    /// Fetches the record for `external_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is malformed.
    pub fn get(&self, external_id: i64) -> StorageResult<Option<SubscriptionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM subscriptions WHERE external_id = ?1"
            ))
            .map_err(|err| map_db_err(&err))?;
        let mut rows = stmt.query([external_id]).map_err(|err| map_db_err(&err))?;
        let record = match rows.next().map_err(|err| map_db_err(&err))? {
            Some(row) => Some(map_record(row)?),
            None => None,
        };
        Ok(record)
    }

    /// Returns every record whose `client_id` equals `client_id`.
    ///
    /// More than one hit means two subscribers share a credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is malformed.
    pub fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> StorageResult<Vec<SubscriptionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM subscriptions
                 WHERE client_id = ?1 ORDER BY external_id"
            ))
            .map_err(|err| map_db_err(&err))?;
        let mut rows = stmt.query([client_id]).map_err(|err| map_db_err(&err))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(|err| map_db_err(&err))? {
            records.push(map_record(row)?);
        }
        Ok(records)
    }

    /// Lazily iterates over all records.
    ///
    /// Rows are fetched in pages ordered by `external_id`; calling this again
    /// restarts from the beginning.
    #[must_use]
    pub const fn list_all(&self) -> SubscriptionIter<'_> {
        SubscriptionIter {
            store: self,
            buffer: VecDeque::new(),
            after: None,
            exhausted: false,
        }
    }

    /// Sets `status` and stamps `timestamp` into the expiry column.
    ///
    /// A missing `external_id` is a silent no-op; callers check existence
    /// with [`get`](Self::get) first.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub fn update_status(
        &self,
        external_id: i64,
        status: SubscriptionStatus,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE subscriptions SET status = ?1, expires_at = ?2 WHERE external_id = ?3",
                params![status.as_ref(), format_timestamp(&timestamp), external_id],
            )
            .map_err(|err| map_db_err(&err))?;
        if changed == 0 {
            log::debug!("update_status: no subscription for external_id {external_id}");
        }
        Ok(())
    }

    fn page_after(&self, after: Option<i64>) -> StorageResult<Vec<SubscriptionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM subscriptions
                 WHERE ?1 IS NULL OR external_id > ?1
                 ORDER BY external_id LIMIT ?2"
            ))
            .map_err(|err| map_db_err(&err))?;
        let mut rows = stmt
            .query(params![after, LIST_PAGE_SIZE])
            .map_err(|err| map_db_err(&err))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(|err| map_db_err(&err))? {
            records.push(map_record(row)?);
        }
        Ok(records)
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            StorageError::SubscriptionDb("connection mutex poisoned".to_string())
        })
    }
}

/// Paged iterator returned by [`SubscriptionStore::list_all`].
#[derive(Debug)]
pub struct SubscriptionIter<'a> {
    store: &'a SubscriptionStore,
    buffer: VecDeque<SubscriptionRecord>,
    after: Option<i64>,
    exhausted: bool,
}

impl Iterator for SubscriptionIter<'_> {
    type Item = StorageResult<SubscriptionRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self.store.page_after(self.after) {
                Ok(page) => {
                    self.exhausted =
                        i64::try_from(page.len()).is_ok_and(|len| len < LIST_PAGE_SIZE);
                    self.buffer.extend(page);
                }
                Err(err) => {
                    self.exhausted = true;
                    return Some(Err(err));
                }
            }
        }
        let record = self.buffer.pop_front()?;
        self.after = Some(record.external_id);
        Some(Ok(record))
    }
}
