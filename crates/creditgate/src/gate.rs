//! The consume gate: the only path that decrements a balance.
//!
//! The gate hands the store a pure decision function and lets the store run
//! it inside its own lock or transaction. Whatever the store reports, the
//! caller gets back exactly one [`GateDecision`]. Store failures never
//! escape as errors; they become `BackendUnavailable` and nothing is charged.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use creditgate_core::{
    now_millis, ChargeReceipt, ChargeRequest, Credits, Decimal, Denial, GateDecision,
    IdentityDigest, LedgerDraft,
};
use creditgate_store::{
    AccountSnapshot, AuditLedger, BalanceStore, SettleFn, SettleOutcome, Settlement,
};

/// Decide what a charge should do given what the store observed.
///
/// Order matters: authorization comes first, so an inactive identity cannot
/// even replay; a replay comes before the balance check, so a replay never
/// fails for lack of credits. A request id only replays the exact charge it
/// paid for: same identity, operation and cost. Any other reuse is
/// `Unauthorized`.
pub fn decide(
    snapshot: &AccountSnapshot,
    digest: &IdentityDigest,
    cost: Credits,
    draft: LedgerDraft,
) -> Settlement {
    let account = match &snapshot.account {
        Some(account) if account.active => account,
        _ => return Settlement::Decline(Denial::Unauthorized),
    };

    if let Some(prior) = &snapshot.prior {
        if prior.digest == *digest
            && prior.operation == draft.operation
            && prior.credits_charged == cost
        {
            return Settlement::Replay(prior.clone());
        }
        // Request id already spent on another identity or another charge.
        return Settlement::Decline(Denial::Unauthorized);
    }

    if account.credits_remaining < cost {
        return Settlement::Decline(Denial::InsufficientCredits);
    }

    Settlement::Debit(draft)
}

/// Atomic check-and-decrement in front of a balance store and audit ledger.
pub struct ConsumeGate<S> {
    store: Arc<S>,
    usage_fee: Decimal,
}

impl<S> Clone for ConsumeGate<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            usage_fee: self.usage_fee,
        }
    }
}

impl<S: BalanceStore + AuditLedger> ConsumeGate<S> {
    /// Create a gate recording `usage_fee` on every ledger entry.
    pub fn new(store: Arc<S>, usage_fee: Decimal) -> Self {
        Self { store, usage_fee }
    }

    /// Get the store reference.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn usage_fee(&self) -> Decimal {
        self.usage_fee
    }

    /// Charge one invocation.
    ///
    /// Exactly one outcome per call. On `Success` the balance has been
    /// decremented by `request.cost()` and one ledger entry appended, or the
    /// request id had already been charged and the original result is
    /// returned with `replayed = true`. On `Denied` nothing changed.
    pub async fn consume(&self, request: &ChargeRequest) -> GateDecision {
        let digest = request.digest;
        let cost = request.cost();
        let draft = LedgerDraft::for_charge(request, self.usage_fee, now_millis());
        let decide_fn: SettleFn =
            Box::new(move |snapshot: &AccountSnapshot| decide(snapshot, &digest, cost, draft));

        match self
            .store
            .settle(&request.digest, &request.request_id, decide_fn)
            .await
        {
            Ok(SettleOutcome::Debited(entry)) => {
                info!(
                    digest = %digest,
                    request_id = %request.request_id,
                    operation = %request.operation,
                    cost,
                    remaining = entry.balance_after,
                    entry_id = entry.id.0,
                    "charged"
                );
                GateDecision::Success(ChargeReceipt {
                    remaining: entry.balance_after,
                    entry_id: entry.id,
                    replayed: false,
                })
            }
            Ok(SettleOutcome::Replayed(entry)) => {
                debug!(
                    digest = %digest,
                    request_id = %request.request_id,
                    entry_id = entry.id.0,
                    "replayed charge"
                );
                GateDecision::Success(ChargeReceipt {
                    remaining: entry.balance_after,
                    entry_id: entry.id,
                    replayed: true,
                })
            }
            Ok(SettleOutcome::Declined(reason)) => {
                warn!(
                    digest = %digest,
                    request_id = %request.request_id,
                    operation = %request.operation,
                    cost,
                    reason = %reason,
                    "charge denied"
                );
                GateDecision::Denied(reason)
            }
            Err(e) => {
                error!(
                    digest = %digest,
                    request_id = %request.request_id,
                    busy = e.is_busy(),
                    error = %e,
                    "store failed during charge"
                );
                GateDecision::Denied(Denial::BackendUnavailable)
            }
        }
    }
}
