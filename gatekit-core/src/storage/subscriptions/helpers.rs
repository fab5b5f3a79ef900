use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{SubscriptionRecord, SubscriptionStatus};

/// Column list matching [`map_record`].
pub(super) const RECORD_COLUMNS: &str =
    "external_id, client_id, label, access_key, status, created_at, expires_at";

pub(super) fn map_record(row: &Row<'_>) -> StorageResult<SubscriptionRecord> {
    let external_id: i64 = row.get(0).map_err(|err| map_db_err(&err))?;
    let client_id: String = row.get(1).map_err(|err| map_db_err(&err))?;
    let label: String = row.get(2).map_err(|err| map_db_err(&err))?;
    let access_key: String = row.get(3).map_err(|err| map_db_err(&err))?;
    let status: String = row.get(4).map_err(|err| map_db_err(&err))?;
    let created_at: String = row.get(5).map_err(|err| map_db_err(&err))?;
    let expires_at: Option<String> = row.get(6).map_err(|err| map_db_err(&err))?;
    Ok(SubscriptionRecord {
        external_id,
        client_id,
        label,
        access_key,
        status: SubscriptionStatus::from_str(&status).map_err(|_| {
            StorageError::CorruptedRecord(format!(
                "invalid status {status:?} for external_id {external_id}"
            ))
        })?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        expires_at: expires_at
            .as_deref()
            .map(|value| parse_timestamp(value, "expires_at"))
            .transpose()?,
    })
}

pub(super) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(value: &str, label: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| {
            StorageError::CorruptedRecord(format!("{label} {value:?} is not RFC 3339: {err}"))
        })
}

pub(super) fn map_db_err(err: &rusqlite::Error) -> StorageError {
    StorageError::SubscriptionDb(err.to_string())
}
