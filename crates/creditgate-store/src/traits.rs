//! Store traits: the abstract interfaces for balances and the audit ledger.
//!
//! The gate is storage-agnostic. Implementations include SQLite (primary)
//! and in-memory (for tests). Both traits are implemented by the same
//! backend so that a debit and its ledger entry commit together.

use async_trait::async_trait;
use creditgate_core::{
    Account, Credits, Decimal, Denial, EntryId, IdentityDigest, LedgerDraft, LedgerEntry,
    RequestId,
};
use serde::Serialize;

use crate::error::{Result, StoreError};

/// What the store observed for one identity inside a settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    /// The identity's account, if the digest is known.
    pub account: Option<Account>,
    /// An existing ledger entry carrying the same request id, if any.
    pub prior: Option<LedgerEntry>,
}

/// The decision a settlement function hands back to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Change nothing and report this denial.
    Decline(Denial),
    /// Change nothing and report an already-recorded charge.
    Replay(LedgerEntry),
    /// Debit `draft.credits_charged` and append the drafted entry.
    Debit(LedgerDraft),
}

/// What a settlement actually did.
#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
    Declined(Denial),
    Replayed(LedgerEntry),
    Debited(LedgerEntry),
}

/// A decision function evaluated while the store holds the identity locked.
pub type SettleFn = Box<dyn FnOnce(&AccountSnapshot) -> Settlement + Send + 'static>;

/// Aggregate usage over a set of ledger entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub entries: u64,
    pub credits_charged: Credits,
    pub usage_fees: Decimal,
}

impl UsageTotals {
    /// Fold one entry into the totals.
    pub fn add(&mut self, entry: &LedgerEntry) {
        self.entries += 1;
        self.credits_charged = self.credits_charged.saturating_add(entry.credits_charged);
        self.usage_fees += entry.usage_fee;
    }
}

/// Durable per-identity balances.
///
/// # Design Notes
///
/// - **No plaintext**: identities are keyed by digest only.
/// - **Non-negative**: no operation can leave `credits_remaining` below zero.
/// - **Single decrement path**: balances only decrease through [`settle`],
///   which the consume gate alone calls.
///
/// [`settle`]: BalanceStore::settle
#[async_trait]
pub trait BalanceStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Provisioning & Administration
    // ─────────────────────────────────────────────────────────────────────────

    /// Provision a new, active identity.
    ///
    /// Fails with `AlreadyExists` if the digest is already present.
    async fn create_identity(
        &self,
        digest: &IdentityDigest,
        contact: &str,
        initial_credits: Credits,
    ) -> Result<Account>;

    /// Get the full account for a digest.
    async fn get_account(&self, digest: &IdentityDigest) -> Result<Option<Account>>;

    /// Get remaining credits, or `NotFound`.
    async fn get_balance(&self, digest: &IdentityDigest) -> Result<Credits> {
        self.get_account(digest)
            .await?
            .map(|account| account.credits_remaining)
            .ok_or(StoreError::NotFound(*digest))
    }

    /// Activate or deactivate an identity.
    async fn set_active(&self, digest: &IdentityDigest, active: bool) -> Result<Account>;

    /// Add credits by administrative issuance. `amount` must be positive.
    async fn issue_credits(&self, digest: &IdentityDigest, amount: Credits) -> Result<Account>;

    // ─────────────────────────────────────────────────────────────────────────
    // Atomic check-and-decrement
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one settlement atomically.
    ///
    /// Under a single lock or transaction the store loads the
    /// [`AccountSnapshot`] for `digest` and `request_id`, calls `decide`, and
    /// applies the returned [`Settlement`]. A `Debit` decrements the balance
    /// and appends the ledger entry together; if either fails, neither
    /// happens. No other caller can observe the balance between the read and
    /// the write.
    async fn settle(
        &self,
        digest: &IdentityDigest,
        request_id: &RequestId,
        decide: SettleFn,
    ) -> Result<SettleOutcome>;
}

/// The append-only audit ledger.
///
/// `append` is the only write. No implementation exposes update or delete.
#[async_trait]
pub trait AuditLedger: Send + Sync {
    /// Append an entry outside a debit, recording the identity's current
    /// balance as `balance_after`.
    ///
    /// No balance changes, so an appended entry has no matching debit and the
    /// identity no longer reconciles 1:1. Charges go through
    /// [`BalanceStore::settle`]; `append` is for importing or correcting
    /// records, and `Auditor::reconcile` will report the affected identity
    /// as unbalanced.
    ///
    /// Fails with `DuplicateRequest` if the request id is already recorded.
    async fn append(&self, draft: LedgerDraft) -> Result<LedgerEntry>;

    /// Find the entry carrying a request id.
    async fn find_by_request(&self, request_id: &RequestId) -> Result<Option<LedgerEntry>>;

    /// The most recent entries for an identity, newest first.
    async fn recent_entries(&self, digest: &IdentityDigest, limit: usize)
        -> Result<Vec<LedgerEntry>>;

    /// Usage totals for one identity.
    async fn usage_totals(&self, digest: &IdentityDigest) -> Result<UsageTotals>;

    /// Usage totals across the whole ledger.
    async fn ledger_totals(&self) -> Result<UsageTotals>;

    /// Entries with `id > after`, ascending, at most `limit`.
    async fn entries_after(&self, after: EntryId, limit: usize) -> Result<Vec<LedgerEntry>>;
}

/// Check a requested debit against the snapshot it was decided on.
///
/// Returns the balance the debit leaves. Backends call this before
/// mutating anything, so a faulty decision function cannot break the
/// store's invariants.
pub(crate) fn validate_debit(
    snapshot: &AccountSnapshot,
    digest: &IdentityDigest,
    request_id: &RequestId,
    draft: &LedgerDraft,
) -> Result<Credits> {
    if draft.digest != *digest || draft.request_id != *request_id {
        return Err(StoreError::InvalidSettlement(
            "draft does not match the settled identity or request".into(),
        ));
    }
    if snapshot.prior.is_some() {
        return Err(StoreError::DuplicateRequest(*request_id));
    }
    if draft.credits_charged == 0 {
        return Err(StoreError::InvalidSettlement("zero-credit debit".into()));
    }
    let account = snapshot
        .account
        .as_ref()
        .ok_or(StoreError::NotFound(*digest))?;
    if !account.active {
        return Err(StoreError::InvalidSettlement(format!(
            "identity {digest} is inactive"
        )));
    }
    account
        .credits_remaining
        .checked_sub(draft.credits_charged)
        .ok_or_else(|| {
            StoreError::InvalidSettlement(format!(
                "debit of {} exceeds balance {}",
                draft.credits_charged, account.credits_remaining
            ))
        })
}
