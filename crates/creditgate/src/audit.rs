//! Read-only audit views over the ledger.
//!
//! Nothing here influences a gate decision. The auditor answers three
//! questions: what was charged recently, does an identity's balance agree
//! with its ledger entries, and is the hash chain intact.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use creditgate_core::{ChainHash, Credits, Decimal, EntryId, IdentityDigest, LedgerEntry};
use creditgate_store::{AuditLedger, BalanceStore, StoreError, UsageTotals};

use crate::error::Result;

/// Entries fetched per page while walking the chain.
const VERIFY_PAGE: usize = 512;

/// Balance-versus-ledger comparison for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub digest: IdentityDigest,
    /// Credits charged according to the ledger.
    pub charged: Credits,
    /// Credits consumed according to the account: initial + issued - remaining.
    pub expected: Credits,
    /// Usage fees recorded for the identity.
    pub fees: Decimal,
    pub entries: u64,
    pub balanced: bool,
}

/// Why a chain walk stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainBreak {
    /// Ids are not consecutive.
    Gap { expected: EntryId },
    /// `prev_hash` does not match the previous entry's hash.
    Unlinked,
    /// The stored hash does not match the entry's contents.
    Tampered,
    /// The entry could not be re-encoded.
    Unencodable,
}

impl fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainBreak::Gap { expected } => write!(f, "gap, expected {expected}"),
            ChainBreak::Unlinked => f.write_str("prev_hash does not link"),
            ChainBreak::Tampered => f.write_str("entry hash mismatch"),
            ChainBreak::Unencodable => f.write_str("entry cannot be encoded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ChainStatus {
    Intact,
    Broken { id: EntryId, reason: ChainBreak },
}

/// Result of walking the whole ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub entries_checked: u64,
    /// Hash of the last entry that verified, if any.
    pub head: Option<ChainHash>,
    pub status: ChainStatus,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.status == ChainStatus::Intact
    }
}

/// Check that `entry` is a valid successor of `prev` (or the first entry).
pub fn check_link(
    prev: Option<&LedgerEntry>,
    entry: &LedgerEntry,
) -> std::result::Result<(), ChainBreak> {
    let (expected_id, expected_prev) = match prev {
        Some(prev) => (prev.id.next(), prev.entry_hash),
        None => (EntryId(1), ChainHash::GENESIS),
    };
    if entry.id != expected_id {
        return Err(ChainBreak::Gap {
            expected: expected_id,
        });
    }
    if entry.prev_hash != expected_prev {
        return Err(ChainBreak::Unlinked);
    }
    match entry.verify_hash() {
        Ok(true) => Ok(()),
        Ok(false) => Err(ChainBreak::Tampered),
        Err(_) => Err(ChainBreak::Unencodable),
    }
}

/// Audit front end over the ledger and balances.
pub struct Auditor<S> {
    store: Arc<S>,
    recent_limit: usize,
}

impl<S: BalanceStore + AuditLedger> Auditor<S> {
    /// `recent_limit` caps [`recent`](Self::recent) when no limit is given.
    pub fn new(store: Arc<S>, recent_limit: usize) -> Self {
        Self {
            store,
            recent_limit,
        }
    }

    /// Most recent entries for an identity, newest first.
    pub async fn recent(
        &self,
        digest: &IdentityDigest,
        limit: Option<usize>,
    ) -> Result<Vec<LedgerEntry>> {
        let limit = limit.unwrap_or(self.recent_limit);
        Ok(self.store.recent_entries(digest, limit).await?)
    }

    /// Compare an identity's balance with its ledger entries.
    pub async fn reconcile(&self, digest: &IdentityDigest) -> Result<Reconciliation> {
        let account = self
            .store
            .get_account(digest)
            .await?
            .ok_or(StoreError::NotFound(*digest))?;
        let usage = self.store.usage_totals(digest).await?;

        let expected = account.credits_consumed();
        let report = Reconciliation {
            digest: *digest,
            charged: usage.credits_charged,
            expected,
            fees: usage.usage_fees,
            entries: usage.entries,
            balanced: usage.credits_charged == expected,
        };
        if !report.balanced {
            warn!(
                digest = %digest,
                charged = report.charged,
                expected = report.expected,
                "ledger does not reconcile with balance"
            );
        }
        Ok(report)
    }

    /// Totals across the whole ledger.
    pub async fn totals(&self) -> Result<UsageTotals> {
        Ok(self.store.ledger_totals().await?)
    }

    /// Walk the ledger from the first entry and check every link.
    pub async fn verify_chain(&self) -> Result<ChainReport> {
        let mut prev: Option<LedgerEntry> = None;
        let mut checked = 0u64;

        loop {
            let after = prev.as_ref().map_or(EntryId(0), |e| e.id);
            let page = self.store.entries_after(after, VERIFY_PAGE).await?;
            if page.is_empty() {
                break;
            }

            for entry in page {
                if let Err(reason) = check_link(prev.as_ref(), &entry) {
                    warn!(id = entry.id.0, reason = %reason, "ledger chain broken");
                    return Ok(ChainReport {
                        entries_checked: checked,
                        head: prev.map(|e| e.entry_hash),
                        status: ChainStatus::Broken {
                            id: entry.id,
                            reason,
                        },
                    });
                }
                checked += 1;
                prev = Some(entry);
            }
        }

        let head = prev.map(|e| e.entry_hash);
        info!(entries = checked, head = ?head, "ledger chain verified");
        Ok(ChainReport {
            entries_checked: checked,
            head,
            status: ChainStatus::Intact,
        })
    }
}
