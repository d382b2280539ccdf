//! SQLite implementation of the store traits.
//!
//! This is the primary storage backend for creditgate. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking. Settlements run
//! inside `BEGIN IMMEDIATE` transactions so the write lock is taken before the
//! balance is read.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use creditgate_core::{
    now_millis, Account, ChainHash, Credits, Decimal, EntryId, IdentityDigest, LedgerDraft,
    LedgerEntry, OperationTag, RequestId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{
    validate_debit, AccountSnapshot, AuditLedger, BalanceStore, SettleFn, SettleOutcome,
    Settlement, UsageTotals,
};

/// Default time a writer waits for a competing lock before giving up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ACCOUNT_COLUMNS: &str =
    "digest, contact, active, credits_remaining, initial_credits, credits_issued, created_at";

const ENTRY_COLUMNS: &str = "id, timestamp, digest, operation, credits_charged, usage_fee, \
                             request_id, metadata, balance_after, prev_hash, entry_hash";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist. A writer
    /// that cannot take the database lock within `busy_timeout` fails with a
    /// busy error instead of waiting indefinitely.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "opened sqlite store");
        Self::init(conn)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation against the connection off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Column conversions
// ─────────────────────────────────────────────────────────────────────────────

fn to_sql_credits(value: Credits) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::Overflow(format!("{value} exceeds the storable credit range")))
}

fn to_sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn credits_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Credits> {
    let value: i64 = row.get(idx)?;
    Credits::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

fn blob32_at(row: &Row<'_>, idx: usize, name: &str) -> rusqlite::Result<[u8; 32]> {
    let bytes: Vec<u8> = row.get(idx)?;
    bytes
        .try_into()
        .map_err(|_| rusqlite::Error::InvalidColumnType(idx, name.into(), Type::Blob))
}

fn parse_text<T, E>(
    row: &Row<'_>,
    idx: usize,
    parse: impl FnOnce(&str) -> std::result::Result<T, E>,
) -> rusqlite::Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    parse(&text).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_account(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        digest: IdentityDigest::from_bytes(blob32_at(row, 0, "digest")?),
        contact: row.get(1)?,
        active: row.get(2)?,
        credits_remaining: credits_at(row, 3)?,
        initial_credits: credits_at(row, 4)?,
        credits_issued: credits_at(row, 5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let id: i64 = row.get(0)?;
    Ok(LedgerEntry {
        id: EntryId(u64::try_from(id).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(0, id))?),
        timestamp: row.get(1)?,
        digest: IdentityDigest::from_bytes(blob32_at(row, 2, "digest")?),
        operation: parse_text(row, 3, |s| OperationTag::new(s))?,
        credits_charged: credits_at(row, 4)?,
        usage_fee: parse_text(row, 5, Decimal::from_str)?,
        request_id: parse_text(row, 6, RequestId::parse)?,
        metadata: parse_text(row, 7, |s| serde_json::from_str::<serde_json::Value>(s))?,
        balance_after: credits_at(row, 8)?,
        prev_hash: ChainHash::from_bytes(blob32_at(row, 9, "prev_hash")?),
        entry_hash: ChainHash::from_bytes(blob32_at(row, 10, "entry_hash")?),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Queries shared by settlements and plain appends
// ─────────────────────────────────────────────────────────────────────────────

fn select_account(conn: &Connection, digest: &IdentityDigest) -> Result<Option<Account>> {
    Ok(conn
        .query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM identities WHERE digest = ?1"),
            params![digest.as_bytes().as_slice()],
            row_to_account,
        )
        .optional()?)
}

fn select_entry_by_request(conn: &Connection, request_id: &RequestId) -> Result<Option<LedgerEntry>> {
    Ok(conn
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM ledger WHERE request_id = ?1"),
            params![request_id.to_hyphenated()],
            row_to_entry,
        )
        .optional()?)
}

/// Seal `draft` after the current chain head and insert it.
fn insert_entry(conn: &Connection, draft: LedgerDraft, balance_after: Credits) -> Result<LedgerEntry> {
    let head: Option<(i64, Vec<u8>)> = conn
        .query_row(
            "SELECT id, entry_hash FROM ledger ORDER BY id DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (id, prev_hash) = match head {
        Some((id, hash)) => {
            let id = u64::try_from(id)
                .map_err(|_| StoreError::InvalidData(format!("negative ledger id {id}")))?;
            let hash = ChainHash::try_from(hash.as_slice())
                .map_err(|_| StoreError::InvalidData(format!("malformed entry hash at #{id}")))?;
            (EntryId(id).next(), hash)
        }
        None => (EntryId(1), ChainHash::GENESIS),
    };

    let entry = draft.seal(id, balance_after, prev_hash)?;
    let metadata = serde_json::to_string(&entry.metadata)
        .map_err(|e| StoreError::InvalidData(format!("metadata: {e}")))?;

    conn.execute(
        &format!("INSERT INTO ledger ({ENTRY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
        params![
            to_sql_credits(entry.id.0)?,
            entry.timestamp,
            entry.digest.as_bytes().as_slice(),
            entry.operation.as_str(),
            to_sql_credits(entry.credits_charged)?,
            entry.usage_fee.to_string(),
            entry.request_id.to_hyphenated(),
            metadata,
            to_sql_credits(entry.balance_after)?,
            entry.prev_hash.as_bytes().as_slice(),
            entry.entry_hash.as_bytes().as_slice(),
        ],
    )?;

    Ok(entry)
}

fn fold_totals(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<UsageTotals> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok((credits_at(row, 0)?, parse_text(row, 1, Decimal::from_str)?))
    })?;

    let mut totals = UsageTotals::default();
    for row in rows {
        let (credits, fee) = row?;
        totals.entries += 1;
        totals.credits_charged = totals.credits_charged.saturating_add(credits);
        totals.usage_fees += fee;
    }
    Ok(totals)
}

#[async_trait]
impl BalanceStore for SqliteStore {
    async fn create_identity(
        &self,
        digest: &IdentityDigest,
        contact: &str,
        initial_credits: Credits,
    ) -> Result<Account> {
        let account = Account::new(*digest, contact.to_string(), initial_credits, now_millis());

        self.blocking(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO identities (
                    digest, contact, active, credits_remaining, initial_credits,
                    credits_issued, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    account.digest.as_bytes().as_slice(),
                    account.contact,
                    account.active,
                    to_sql_credits(account.credits_remaining)?,
                    to_sql_credits(account.initial_credits)?,
                    to_sql_credits(account.credits_issued)?,
                    account.created_at,
                ],
            )?;
            if inserted == 0 {
                return Err(StoreError::AlreadyExists(account.digest));
            }
            Ok(account)
        })
        .await
    }

    async fn get_account(&self, digest: &IdentityDigest) -> Result<Option<Account>> {
        let digest = *digest;
        self.blocking(move |conn| select_account(conn, &digest)).await
    }

    async fn set_active(&self, digest: &IdentityDigest, active: bool) -> Result<Account> {
        let digest = *digest;
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE identities SET active = ?1 WHERE digest = ?2",
                params![active, digest.as_bytes().as_slice()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(digest));
            }
            select_account(conn, &digest)?.ok_or(StoreError::NotFound(digest))
        })
        .await
    }

    async fn issue_credits(&self, digest: &IdentityDigest, amount: Credits) -> Result<Account> {
        if amount == 0 {
            return Err(StoreError::InvalidSettlement("issuance must be positive".into()));
        }
        let digest = *digest;

        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let account = select_account(&tx, &digest)?.ok_or(StoreError::NotFound(digest))?;

            let overflow = || StoreError::Overflow(format!("issuing {amount} to {digest}"));
            let remaining = account.credits_remaining.checked_add(amount).ok_or_else(overflow)?;
            let issued = account.credits_issued.checked_add(amount).ok_or_else(overflow)?;

            tx.execute(
                "UPDATE identities SET credits_remaining = ?1, credits_issued = ?2 WHERE digest = ?3",
                params![
                    to_sql_credits(remaining)?,
                    to_sql_credits(issued)?,
                    digest.as_bytes().as_slice()
                ],
            )?;
            tx.commit()?;

            Ok(Account {
                credits_remaining: remaining,
                credits_issued: issued,
                ..account
            })
        })
        .await
    }

    async fn settle(
        &self,
        digest: &IdentityDigest,
        request_id: &RequestId,
        decide: SettleFn,
    ) -> Result<SettleOutcome> {
        let digest = *digest;
        let request_id = *request_id;

        self.blocking(move |conn| {
            // Dropping the transaction without commit rolls it back.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let snapshot = AccountSnapshot {
                account: select_account(&tx, &digest)?,
                prior: select_entry_by_request(&tx, &request_id)?,
            };

            let entry = match decide(&snapshot) {
                Settlement::Decline(denial) => return Ok(SettleOutcome::Declined(denial)),
                Settlement::Replay(entry) => return Ok(SettleOutcome::Replayed(entry)),
                Settlement::Debit(draft) => {
                    let balance_after = validate_debit(&snapshot, &digest, &request_id, &draft)?;
                    let changed = tx.execute(
                        "UPDATE identities SET credits_remaining = credits_remaining - ?1
                         WHERE digest = ?2 AND active = 1 AND credits_remaining >= ?1",
                        params![
                            to_sql_credits(draft.credits_charged)?,
                            digest.as_bytes().as_slice()
                        ],
                    )?;
                    if changed != 1 {
                        return Err(StoreError::InvalidSettlement(format!(
                            "balance of {digest} changed during settlement"
                        )));
                    }
                    insert_entry(&tx, draft, balance_after)?
                }
            };

            tx.commit()?;
            Ok(SettleOutcome::Debited(entry))
        })
        .await
    }
}

#[async_trait]
impl AuditLedger for SqliteStore {
    async fn append(&self, draft: LedgerDraft) -> Result<LedgerEntry> {
        self.blocking(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if select_entry_by_request(&tx, &draft.request_id)?.is_some() {
                return Err(StoreError::DuplicateRequest(draft.request_id));
            }
            let balance = select_account(&tx, &draft.digest)?
                .map(|a| a.credits_remaining)
                .ok_or(StoreError::NotFound(draft.digest))?;

            let entry = insert_entry(&tx, draft, balance)?;
            tx.commit()?;
            Ok(entry)
        })
        .await
    }

    async fn find_by_request(&self, request_id: &RequestId) -> Result<Option<LedgerEntry>> {
        let request_id = *request_id;
        self.blocking(move |conn| select_entry_by_request(conn, &request_id))
            .await
    }

    async fn recent_entries(
        &self,
        digest: &IdentityDigest,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let digest = *digest;
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM ledger WHERE digest = ?1 ORDER BY id DESC LIMIT ?2"
            ))?;
            let entries = stmt
                .query_map(
                    params![digest.as_bytes().as_slice(), to_sql_limit(limit)],
                    row_to_entry,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
        .await
    }

    async fn usage_totals(&self, digest: &IdentityDigest) -> Result<UsageTotals> {
        let digest = *digest;
        self.blocking(move |conn| {
            fold_totals(
                conn,
                "SELECT credits_charged, usage_fee FROM ledger WHERE digest = ?1",
                params![digest.as_bytes().as_slice()],
            )
        })
        .await
    }

    async fn ledger_totals(&self) -> Result<UsageTotals> {
        self.blocking(|conn| fold_totals(conn, "SELECT credits_charged, usage_fee FROM ledger", params![]))
            .await
    }

    async fn entries_after(&self, after: EntryId, limit: usize) -> Result<Vec<LedgerEntry>> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM ledger WHERE id > ?1 ORDER BY id LIMIT ?2"
            ))?;
            let entries = stmt
                .query_map(
                    params![to_sql_credits(after.0)?, to_sql_limit(limit)],
                    row_to_entry,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
        .await
    }
}
