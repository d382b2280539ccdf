//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use creditgate_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{current} is newer than supported v{CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "schema migrated");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per provisioned identity, keyed by credential digest
        CREATE TABLE identities (
            digest BLOB PRIMARY KEY CHECK (length(digest) = 32),
            contact TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1 CHECK (active IN (0, 1)),
            credits_remaining INTEGER NOT NULL CHECK (credits_remaining >= 0),
            initial_credits INTEGER NOT NULL CHECK (initial_credits >= 0),
            credits_issued INTEGER NOT NULL DEFAULT 0 CHECK (credits_issued >= 0),
            created_at INTEGER NOT NULL
        );

        -- Append-only audit ledger, one row per successful charge
        CREATE TABLE ledger (
            id INTEGER PRIMARY KEY,            -- monotonic, first entry is 1
            timestamp INTEGER NOT NULL,        -- Unix ms
            digest BLOB NOT NULL REFERENCES identities(digest),
            operation TEXT NOT NULL,
            credits_charged INTEGER NOT NULL CHECK (credits_charged > 0),
            usage_fee TEXT NOT NULL,           -- decimal text, e.g. "0.001"
            request_id TEXT NOT NULL UNIQUE,   -- hyphenated UUID
            metadata TEXT NOT NULL,            -- compact JSON
            balance_after INTEGER NOT NULL CHECK (balance_after >= 0),
            prev_hash BLOB NOT NULL,           -- 32 bytes
            entry_hash BLOB NOT NULL           -- 32 bytes, BLAKE3 over canonical bytes
        );

        CREATE INDEX idx_ledger_digest ON ledger(digest, id);
        CREATE INDEX idx_ledger_timestamp ON ledger(timestamp);

        CREATE TRIGGER ledger_no_update BEFORE UPDATE ON ledger
        BEGIN
            SELECT RAISE(ABORT, 'ledger is append-only');
        END;

        CREATE TRIGGER ledger_no_delete BEFORE DELETE ON ledger
        BEGIN
            SELECT RAISE(ABORT, 'ledger is append-only');
        END;
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_migration_creates_tables() {
        let conn = setup();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"identities".to_string()));
        assert!(tables.contains(&"ledger".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = setup();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_negative_balance_rejected_by_schema() {
        let conn = setup();
        let result = conn.execute(
            "INSERT INTO identities (digest, contact, credits_remaining, initial_credits, created_at)
             VALUES (?1, 'x', -1, 0, 0)",
            [vec![0u8; 32]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_ledger_rows_are_append_only() {
        let conn = setup();
        conn.execute(
            "INSERT INTO identities (digest, contact, credits_remaining, initial_credits, created_at)
             VALUES (?1, 'x', 10, 10, 0)",
            [vec![1u8; 32]],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO ledger (id, timestamp, digest, operation, credits_charged, usage_fee,
                                 request_id, metadata, balance_after, prev_hash, entry_hash)
             VALUES (1, 0, ?1, 'cloud_ops', 1, '0.001', 'r1', 'null', 9, ?2, ?2)",
            rusqlite::params![vec![1u8; 32], vec![0u8; 32]],
        )
        .unwrap();

        assert!(conn
            .execute("UPDATE ledger SET credits_charged = 5 WHERE id = 1", [])
            .is_err());
        assert!(conn.execute("DELETE FROM ledger WHERE id = 1", []).is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM ledger", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let mut conn = setup();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 0)",
            [],
        )
        .unwrap();
        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }
}
