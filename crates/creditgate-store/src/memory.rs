//! In-memory implementation of the store traits.
//!
//! This is primarily for testing. It has the same semantics as SQLite but
//! keeps everything in memory with no persistence. Faults can be injected to
//! exercise fail-closed paths.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use creditgate_core::{
    now_millis, Account, ChainHash, Credits, EntryId, IdentityDigest, LedgerDraft, LedgerEntry,
    RequestId,
};

use crate::error::{Result, StoreError};
use crate::traits::{
    validate_debit, AccountSnapshot, AuditLedger, BalanceStore, SettleFn, SettleOutcome,
    Settlement, UsageTotals,
};

/// A failure the memory store can be told to simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Every operation fails as if the backend were unreachable.
    Unavailable,
    /// Ledger writes fail; a debit that needs one is aborted.
    LedgerWrite,
}

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; a
/// settlement holds the write lock for its whole read-decide-write cycle.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Accounts indexed by digest.
    accounts: HashMap<IdentityDigest, Account>,

    /// Ledger entries in id order; entry `n` lives at index `n - 1`.
    ledger: Vec<LedgerEntry>,

    /// Request id index into `ledger`.
    by_request: HashMap<RequestId, usize>,

    /// Active simulated faults.
    faults: HashSet<Fault>,
}

impl MemoryStoreInner {
    fn check_available(&self) -> Result<()> {
        if self.faults.contains(&Fault::Unavailable) {
            return Err(StoreError::Unavailable("injected fault".into()));
        }
        Ok(())
    }

    fn account_mut(&mut self, digest: &IdentityDigest) -> Result<&mut Account> {
        self.accounts
            .get_mut(digest)
            .ok_or(StoreError::NotFound(*digest))
    }

    fn prior(&self, request_id: &RequestId) -> Option<LedgerEntry> {
        self.by_request
            .get(request_id)
            .and_then(|&idx| self.ledger.get(idx))
            .cloned()
    }

    /// Seal a draft at the next ledger position without recording it.
    fn seal_next(&self, draft: LedgerDraft, balance_after: Credits) -> Result<LedgerEntry> {
        if self.faults.contains(&Fault::LedgerWrite) {
            return Err(StoreError::Unavailable("injected ledger write fault".into()));
        }
        let (id, prev_hash) = match self.ledger.last() {
            Some(last) => (last.id.next(), last.entry_hash),
            None => (EntryId(1), ChainHash::GENESIS),
        };
        Ok(draft.seal(id, balance_after, prev_hash)?)
    }

    fn record(&mut self, entry: LedgerEntry) {
        self.by_request.insert(entry.request_id, self.ledger.len());
        self.ledger.push(entry);
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    /// Start simulating a fault until [`clear_faults`](Self::clear_faults).
    pub fn inject_fault(&self, fault: Fault) -> Result<()> {
        self.write()?.faults.insert(fault);
        Ok(())
    }

    /// Stop simulating all faults.
    pub fn clear_faults(&self) -> Result<()> {
        self.write()?.faults.clear();
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BalanceStore for MemoryStore {
    async fn create_identity(
        &self,
        digest: &IdentityDigest,
        contact: &str,
        initial_credits: Credits,
    ) -> Result<Account> {
        let mut inner = self.write()?;
        inner.check_available()?;

        if inner.accounts.contains_key(digest) {
            return Err(StoreError::AlreadyExists(*digest));
        }

        let account = Account::new(*digest, contact.to_string(), initial_credits, now_millis());
        inner.accounts.insert(*digest, account.clone());
        Ok(account)
    }

    async fn get_account(&self, digest: &IdentityDigest) -> Result<Option<Account>> {
        let inner = self.read()?;
        inner.check_available()?;
        Ok(inner.accounts.get(digest).cloned())
    }

    async fn set_active(&self, digest: &IdentityDigest, active: bool) -> Result<Account> {
        let mut inner = self.write()?;
        inner.check_available()?;

        let account = inner.account_mut(digest)?;
        account.active = active;
        Ok(account.clone())
    }

    async fn issue_credits(&self, digest: &IdentityDigest, amount: Credits) -> Result<Account> {
        if amount == 0 {
            return Err(StoreError::InvalidSettlement("issuance must be positive".into()));
        }

        let mut inner = self.write()?;
        inner.check_available()?;

        let account = inner.account_mut(digest)?;
        let remaining = account
            .credits_remaining
            .checked_add(amount)
            .ok_or_else(|| StoreError::Overflow(format!("issuing {amount} to {digest}")))?;
        let issued = account
            .credits_issued
            .checked_add(amount)
            .ok_or_else(|| StoreError::Overflow(format!("issuing {amount} to {digest}")))?;
        account.credits_remaining = remaining;
        account.credits_issued = issued;
        Ok(account.clone())
    }

    async fn settle(
        &self,
        digest: &IdentityDigest,
        request_id: &RequestId,
        decide: SettleFn,
    ) -> Result<SettleOutcome> {
        let mut inner = self.write()?;
        inner.check_available()?;

        let snapshot = AccountSnapshot {
            account: inner.accounts.get(digest).cloned(),
            prior: inner.prior(request_id),
        };

        match decide(&snapshot) {
            Settlement::Decline(denial) => Ok(SettleOutcome::Declined(denial)),
            Settlement::Replay(entry) => Ok(SettleOutcome::Replayed(entry)),
            Settlement::Debit(draft) => {
                let balance_after = validate_debit(&snapshot, digest, request_id, &draft)?;

                // Seal first: if the ledger write fails nothing has changed yet.
                let entry = inner.seal_next(draft, balance_after)?;
                inner.account_mut(digest)?.credits_remaining = balance_after;
                inner.record(entry.clone());
                Ok(SettleOutcome::Debited(entry))
            }
        }
    }
}

#[async_trait]
impl AuditLedger for MemoryStore {
    async fn append(&self, draft: LedgerDraft) -> Result<LedgerEntry> {
        let mut inner = self.write()?;
        inner.check_available()?;

        if inner.by_request.contains_key(&draft.request_id) {
            return Err(StoreError::DuplicateRequest(draft.request_id));
        }
        let balance = inner
            .accounts
            .get(&draft.digest)
            .map(|a| a.credits_remaining)
            .ok_or(StoreError::NotFound(draft.digest))?;

        let entry = inner.seal_next(draft, balance)?;
        inner.record(entry.clone());
        Ok(entry)
    }

    async fn find_by_request(&self, request_id: &RequestId) -> Result<Option<LedgerEntry>> {
        let inner = self.read()?;
        inner.check_available()?;
        Ok(inner.prior(request_id))
    }

    async fn recent_entries(
        &self,
        digest: &IdentityDigest,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let inner = self.read()?;
        inner.check_available()?;
        Ok(inner
            .ledger
            .iter()
            .rev()
            .filter(|e| e.digest == *digest)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn usage_totals(&self, digest: &IdentityDigest) -> Result<UsageTotals> {
        let inner = self.read()?;
        inner.check_available()?;

        let mut totals = UsageTotals::default();
        for entry in inner.ledger.iter().filter(|e| e.digest == *digest) {
            totals.add(entry);
        }
        Ok(totals)
    }

    async fn ledger_totals(&self) -> Result<UsageTotals> {
        let inner = self.read()?;
        inner.check_available()?;

        let mut totals = UsageTotals::default();
        for entry in &inner.ledger {
            totals.add(entry);
        }
        Ok(totals)
    }

    async fn entries_after(&self, after: EntryId, limit: usize) -> Result<Vec<LedgerEntry>> {
        let inner = self.read()?;
        inner.check_available()?;
        Ok(inner
            .ledger
            .iter()
            .filter(|e| e.id > after)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use creditgate_core::{Decimal, Denial, OperationTag};

    fn digest(n: u8) -> IdentityDigest {
        IdentityDigest::from_bytes([n; 32])
    }

    fn draft(digest: IdentityDigest, request_id: RequestId, cost: Credits) -> LedgerDraft {
        LedgerDraft {
            timestamp: 1_000,
            digest,
            operation: OperationTag::new("cloud_ops").unwrap(),
            credits_charged: cost,
            usage_fee: Decimal::new(1, 3),
            request_id,
            metadata: serde_json::Value::Null,
        }
    }

    fn debit(cost: Credits, d: IdentityDigest, r: RequestId) -> SettleFn {
        Box::new(move |_| Settlement::Debit(draft(d, r, cost)))
    }

    #[tokio::test]
    async fn test_create_and_get_balance() {
        let store = MemoryStore::new();
        store.create_identity(&digest(1), "a@example.com", 25).await.unwrap();

        assert_eq!(store.get_balance(&digest(1)).await.unwrap(), 25);
        assert!(matches!(
            store.get_balance(&digest(2)).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let store = MemoryStore::new();
        store.create_identity(&digest(1), "a@example.com", 25).await.unwrap();
        let err = store.create_identity(&digest(1), "b@example.com", 99).await;
        assert!(matches!(err, Err(StoreError::AlreadyExists(_))));
        assert_eq!(store.get_balance(&digest(1)).await.unwrap(), 25);
    }

    #[tokio::test]
    async fn test_debit_appends_chained_entries() {
        let store = MemoryStore::new();
        let d = digest(1);
        store.create_identity(&d, "a@example.com", 25).await.unwrap();

        let r1 = RequestId::new_v4();
        let r2 = RequestId::new_v4();
        store.settle(&d, &r1, debit(10, d, r1)).await.unwrap();
        let outcome = store.settle(&d, &r2, debit(10, d, r2)).await.unwrap();

        let SettleOutcome::Debited(second) = outcome else {
            panic!("expected debit");
        };
        assert_eq!(second.id, EntryId(2));
        assert_eq!(second.balance_after, 5);

        let first = store.find_by_request(&r1).await.unwrap().unwrap();
        assert!(second.follows(&first));
        assert_eq!(store.get_balance(&d).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_decline_changes_nothing() {
        let store = MemoryStore::new();
        let d = digest(1);
        store.create_identity(&d, "a@example.com", 5).await.unwrap();

        let r = RequestId::new_v4();
        let outcome = store
            .settle(&d, &r, Box::new(|_| Settlement::Decline(Denial::InsufficientCredits)))
            .await
            .unwrap();
        assert_eq!(outcome, SettleOutcome::Declined(Denial::InsufficientCredits));
        assert_eq!(store.get_balance(&d).await.unwrap(), 5);
        assert_eq!(store.ledger_totals().await.unwrap().entries, 0);
    }

    #[tokio::test]
    async fn test_overdraw_rejected_by_store() {
        let store = MemoryStore::new();
        let d = digest(1);
        store.create_identity(&d, "a@example.com", 5).await.unwrap();

        let r = RequestId::new_v4();
        let err = store.settle(&d, &r, debit(10, d, r)).await;
        assert!(matches!(err, Err(StoreError::InvalidSettlement(_))));
        assert_eq!(store.get_balance(&d).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_ledger_write_fault_aborts_debit() {
        let store = MemoryStore::new();
        let d = digest(1);
        store.create_identity(&d, "a@example.com", 50).await.unwrap();
        store.inject_fault(Fault::LedgerWrite).unwrap();

        let r = RequestId::new_v4();
        assert!(store.settle(&d, &r, debit(10, d, r)).await.is_err());

        store.clear_faults().unwrap();
        assert_eq!(store.get_balance(&d).await.unwrap(), 50);
        assert!(store.find_by_request(&r).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_fault() {
        let store = MemoryStore::new();
        store.inject_fault(Fault::Unavailable).unwrap();
        assert!(matches!(
            store.get_account(&digest(1)).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_issue_credits() {
        let store = MemoryStore::new();
        let d = digest(1);
        store.create_identity(&d, "a@example.com", 5).await.unwrap();

        let account = store.issue_credits(&d, 100).await.unwrap();
        assert_eq!(account.credits_remaining, 105);
        assert_eq!(account.credits_issued, 100);
        assert_eq!(account.initial_credits, 5);

        assert!(store.issue_credits(&d, 0).await.is_err());
        assert!(matches!(
            store.issue_credits(&d, u64::MAX).await,
            Err(StoreError::Overflow(_))
        ));
    }

    #[tokio::test]
    async fn test_append_rejects_duplicate_request() {
        let store = MemoryStore::new();
        let d = digest(1);
        store.create_identity(&d, "a@example.com", 5).await.unwrap();

        let r = RequestId::new_v4();
        let entry = store.append(draft(d, r, 1)).await.unwrap();
        assert_eq!(entry.balance_after, 5);
        assert!(matches!(
            store.append(draft(d, r, 1)).await,
            Err(StoreError::DuplicateRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_recent_entries_newest_first() {
        let store = MemoryStore::new();
        let a = digest(1);
        let b = digest(2);
        store.create_identity(&a, "a@example.com", 100).await.unwrap();
        store.create_identity(&b, "b@example.com", 100).await.unwrap();

        for _ in 0..3 {
            let r = RequestId::new_v4();
            store.settle(&a, &r, debit(1, a, r)).await.unwrap();
            let r = RequestId::new_v4();
            store.settle(&b, &r, debit(2, b, r)).await.unwrap();
        }

        let recent = store.recent_entries(&a, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].id > recent[1].id);
        assert!(recent.iter().all(|e| e.digest == a));

        let totals = store.usage_totals(&b).await.unwrap();
        assert_eq!(totals.entries, 3);
        assert_eq!(totals.credits_charged, 6);
        assert_eq!(totals.usage_fees, Decimal::new(3, 3));
    }

    #[tokio::test]
    async fn test_poisoned_lock_surfaces_from_fault_hooks() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.inner.write().unwrap();
            panic!("poison the store lock");
        })
        .join();

        assert!(matches!(
            store.inject_fault(Fault::Unavailable),
            Err(StoreError::LockPoisoned(_))
        ));
        assert!(matches!(store.clear_faults(), Err(StoreError::LockPoisoned(_))));
        assert!(matches!(
            store.get_account(&digest(1)).await,
            Err(StoreError::LockPoisoned(_))
        ));
    }
}
