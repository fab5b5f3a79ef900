use rusqlite::Connection;

use crate::storage::error::StorageResult;

use super::helpers::map_db_err;

pub(super) const SUBSCRIPTIONS_SCHEMA_VERSION: i64 = 1;

pub(super) fn ensure_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS subscriptions_meta (
            schema_version  INTEGER NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_subscriptions_meta_schema_version
        ON subscriptions_meta (schema_version);

        CREATE TABLE IF NOT EXISTS subscriptions (
            external_id  INTEGER NOT NULL PRIMARY KEY,
            client_id    TEXT    NOT NULL,
            label        TEXT    NOT NULL,
            access_key   TEXT    NOT NULL,
            status       TEXT    NOT NULL,
            created_at   TEXT    NOT NULL,
            expires_at   TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_subscriptions_by_client
        ON subscriptions (client_id);",
    )
    .map_err(|err| map_db_err(&err))?;
    conn.execute(
        "INSERT OR IGNORE INTO subscriptions_meta (schema_version) VALUES (?1)",
        [SUBSCRIPTIONS_SCHEMA_VERSION],
    )
    .map_err(|err| map_db_err(&err))?;
    Ok(())
}
