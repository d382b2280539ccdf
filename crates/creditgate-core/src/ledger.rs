//! Ledger entries: the immutable record of one billed invocation.
//!
//! Entries are hash-chained. Each entry commits to the hash of the entry
//! before it, so rewriting or removing a persisted row is detectable by
//! re-walking the chain.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::chain_hash;
use crate::error::CoreError;
use crate::request::ChargeRequest;
use crate::types::{ChainHash, Credits, EntryId, IdentityDigest, OperationTag, RequestId};

/// An entry that has not yet been given a position in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerDraft {
    /// Time of the charge (Unix ms).
    pub timestamp: i64,
    pub digest: IdentityDigest,
    pub operation: OperationTag,
    pub credits_charged: Credits,
    /// Fixed secondary fee recorded per invocation; never convertible to credits.
    pub usage_fee: Decimal,
    pub request_id: RequestId,
    pub metadata: Value,
}

impl LedgerDraft {
    /// Draft the entry for a charge request.
    pub fn for_charge(request: &ChargeRequest, usage_fee: Decimal, timestamp: i64) -> Self {
        Self {
            timestamp,
            digest: request.digest,
            operation: request.operation.clone(),
            credits_charged: request.cost(),
            usage_fee,
            request_id: request.request_id,
            metadata: request.metadata.clone(),
        }
    }

    /// Fix the draft at a ledger position and compute its chain hash.
    pub fn seal(
        self,
        id: EntryId,
        balance_after: Credits,
        prev_hash: ChainHash,
    ) -> Result<LedgerEntry, CoreError> {
        let mut entry = LedgerEntry {
            id,
            timestamp: self.timestamp,
            digest: self.digest,
            operation: self.operation,
            credits_charged: self.credits_charged,
            usage_fee: self.usage_fee,
            request_id: self.request_id,
            metadata: self.metadata,
            balance_after,
            prev_hash,
            entry_hash: ChainHash::GENESIS,
        };
        entry.entry_hash = chain_hash(&entry)?;
        Ok(entry)
    }
}

/// A persisted ledger entry. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub timestamp: i64,
    pub digest: IdentityDigest,
    pub operation: OperationTag,
    pub credits_charged: Credits,
    pub usage_fee: Decimal,
    pub request_id: RequestId,
    pub metadata: Value,
    /// Balance the identity was left with by this charge.
    pub balance_after: Credits,
    /// Hash of the previous entry, [`ChainHash::GENESIS`] for the first.
    pub prev_hash: ChainHash,
    /// Hash over this entry's canonical bytes.
    pub entry_hash: ChainHash,
}

impl LedgerEntry {
    /// Recompute the hash and compare with the stored one.
    pub fn verify_hash(&self) -> Result<bool, CoreError> {
        Ok(chain_hash(self)? == self.entry_hash)
    }

    /// True if `self` directly follows `prev` in the chain.
    pub fn follows(&self, prev: &LedgerEntry) -> bool {
        self.id == prev.id.next() && self.prev_hash == prev.entry_hash
    }
}
