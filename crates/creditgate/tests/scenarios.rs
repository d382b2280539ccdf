//! End-to-end gate scenarios against the in-memory and SQLite stores.

use std::sync::Arc;

use serde_json::{json, Value};

use creditgate::core::{ChargeRequest, Credential, OperationTag, RequestId};
use creditgate::router::{ComputeError, ComputeInputs};
use creditgate::store::{AuditLedger, BalanceStore, Fault, MemoryStore};
use creditgate::{
    ConsumeGate, Denial, GateDecision, GateResponse, InvocationOutcome, InvocationRequest,
    PriceList, Router,
};
use creditgate_testkit::{charge, fixture_fee, GateFixture};

#[tokio::test]
async fn drains_then_denies_insufficient() {
    let fixture = GateFixture::memory();
    let who = fixture.provision(25).await;

    assert_eq!(
        fixture.gate.consume(&charge(who.digest, 10)).await.remaining(),
        Some(15)
    );
    assert_eq!(
        fixture.gate.consume(&charge(who.digest, 10)).await.remaining(),
        Some(5)
    );
    assert_eq!(
        fixture.gate.consume(&charge(who.digest, 10)).await,
        GateDecision::Denied(Denial::InsufficientCredits)
    );

    assert_eq!(fixture.balance(&who.digest).await, 5);
    assert_eq!(fixture.ledger_len().await, 2);
}

#[tokio::test]
async fn drains_then_denies_insufficient_on_sqlite() {
    let fixture = GateFixture::sqlite();
    let who = fixture.provision(25).await;

    for expected in [Some(15), Some(5), None] {
        assert_eq!(
            fixture.gate.consume(&charge(who.digest, 10)).await.remaining(),
            expected
        );
    }
    assert_eq!(fixture.balance(&who.digest).await, 5);
    assert_eq!(fixture.ledger_len().await, 2);
}

#[tokio::test]
async fn unknown_identity_touches_nothing() {
    let fixture = GateFixture::sqlite();
    let known = fixture.provision(100).await;
    let stranger = Credential::new("sk-never-provisioned").digest();

    let decision = fixture.gate.consume(&charge(stranger, 1)).await;
    assert_eq!(decision, GateDecision::Denied(Denial::Unauthorized));

    assert!(fixture.store.get_account(&stranger).await.unwrap().is_none());
    assert_eq!(fixture.balance(&known.digest).await, 100);
    assert_eq!(fixture.ledger_len().await, 0);
}

#[tokio::test]
async fn deactivated_identity_is_unauthorized() {
    let fixture = GateFixture::memory();
    let who = fixture.provision(1_000).await;
    fixture.admin.deactivate(&who.digest).await.unwrap();

    assert_eq!(
        fixture.gate.consume(&charge(who.digest, 1)).await,
        GateDecision::Denied(Denial::Unauthorized)
    );
    assert_eq!(fixture.balance(&who.digest).await, 1_000);
    assert_eq!(fixture.ledger_len().await, 0);

    fixture.admin.reactivate(&who.digest).await.unwrap();
    assert!(fixture.gate.consume(&charge(who.digest, 1)).await.is_success());
}

#[tokio::test]
async fn replayed_request_is_not_charged_twice() {
    let fixture = GateFixture::sqlite();
    let who = fixture.provision(100).await;
    let request = charge(who.digest, 30);

    let GateDecision::Success(first) = fixture.gate.consume(&request).await else {
        panic!("first charge should succeed");
    };
    assert!(!first.replayed);

    let GateDecision::Success(again) = fixture.gate.consume(&request).await else {
        panic!("replay should succeed");
    };
    assert!(again.replayed);
    assert_eq!(again.remaining, 70);
    assert_eq!(again.entry_id, first.entry_id);

    assert_eq!(fixture.balance(&who.digest).await, 70);
    assert_eq!(fixture.ledger_len().await, 1);
}

/// Reusing a charged request id for a different cost or operation must not
/// replay the earlier receipt.
async fn reused_id_for_other_charge_is_refused<S>(fixture: GateFixture<S>)
where
    S: BalanceStore + AuditLedger + 'static,
{
    let who = fixture.provision(500).await;
    let paid = charge(who.digest, 10);
    assert!(fixture.gate.consume(&paid).await.is_success());

    let other_cost = ChargeRequest::new(
        who.digest,
        100,
        OperationTag::new("cloud_ops").unwrap(),
        paid.request_id,
    )
    .unwrap();
    let other_operation = ChargeRequest::new(
        who.digest,
        10,
        OperationTag::new("cyber_shield").unwrap(),
        paid.request_id,
    )
    .unwrap();

    for request in [&other_cost, &other_operation] {
        assert_eq!(
            fixture.gate.consume(request).await,
            GateDecision::Denied(Denial::Unauthorized)
        );
    }

    let GateDecision::Success(replay) = fixture.gate.consume(&paid).await else {
        panic!("identical resubmission should replay");
    };
    assert!(replay.replayed);
    assert_eq!(replay.remaining, 490);
    assert_eq!(fixture.balance(&who.digest).await, 490);
    assert_eq!(fixture.ledger_len().await, 1);
}

#[tokio::test]
async fn reused_id_for_other_charge_is_refused_in_memory() {
    reused_id_for_other_charge_is_refused(GateFixture::memory()).await;
}

#[tokio::test]
async fn reused_id_for_other_charge_is_refused_on_sqlite() {
    reused_id_for_other_charge_is_refused(GateFixture::sqlite()).await;
}

#[tokio::test]
async fn request_id_owned_by_another_identity_is_unauthorized() {
    let fixture = GateFixture::memory();
    let alice = fixture.provision(100).await;
    let mallory = fixture.provision(100).await;

    let request = charge(alice.digest, 10);
    assert!(fixture.gate.consume(&request).await.is_success());

    let hijack = ChargeRequest::new(
        mallory.digest,
        10,
        OperationTag::new("cloud_ops").unwrap(),
        request.request_id,
    )
    .unwrap();
    assert_eq!(
        fixture.gate.consume(&hijack).await,
        GateDecision::Denied(Denial::Unauthorized)
    );
    assert_eq!(fixture.balance(&mallory.digest).await, 100);
    assert_eq!(fixture.ledger_len().await, 1);
}

#[tokio::test]
async fn ledger_write_fault_aborts_the_debit() {
    let fixture = GateFixture::memory();
    let who = fixture.provision(50).await;

    fixture.store.inject_fault(Fault::LedgerWrite).unwrap();
    let request = charge(who.digest, 10);
    assert_eq!(
        fixture.gate.consume(&request).await,
        GateDecision::Denied(Denial::BackendUnavailable)
    );

    fixture.store.clear_faults().unwrap();
    assert_eq!(fixture.balance(&who.digest).await, 50);
    assert_eq!(fixture.ledger_len().await, 0);

    // The caller may retry with the same request id once the store recovers.
    assert_eq!(fixture.gate.consume(&request).await.remaining(), Some(40));
}

#[tokio::test]
async fn unreachable_store_denies_with_backend_unavailable() {
    let fixture = GateFixture::memory();
    let who = fixture.provision(50).await;

    fixture.store.inject_fault(Fault::Unavailable).unwrap();
    let decision = fixture.gate.consume(&charge(who.digest, 10)).await;
    assert_eq!(
        serde_json::to_value(GateResponse::from(&decision)).unwrap(),
        json!({"ok": false, "reason": "BACKEND_UNAVAILABLE"})
    );

    fixture.store.clear_faults().unwrap();
    assert_eq!(fixture.balance(&who.digest).await, 50);
}

#[tokio::test]
async fn reconciliation_balances_after_mixed_traffic() {
    let fixture = GateFixture::sqlite();
    let who = fixture.provision(25).await;

    fixture.gate.consume(&charge(who.digest, 10)).await;
    fixture.gate.consume(&charge(who.digest, 10)).await;
    fixture.gate.consume(&charge(who.digest, 10)).await; // denied
    fixture.admin.issue_credits(&who.digest, 100).await.unwrap();
    fixture.gate.consume(&charge(who.digest, 50)).await;

    let report = fixture.auditor.reconcile(&who.digest).await.unwrap();
    assert!(report.balanced);
    assert_eq!(report.charged, 70);
    assert_eq!(report.expected, 70);
    assert_eq!(report.entries, 3);
    assert_eq!(report.fees, fixture_fee() * creditgate::core::Decimal::from(3));
    assert_eq!(fixture.balance(&who.digest).await, 55);

    let recent = fixture.auditor.recent(&who.digest, Some(2)).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].credits_charged, 50);
    assert_eq!(recent[0].balance_after, 55);

    let chain = fixture.auditor.verify_chain().await.unwrap();
    assert!(chain.is_intact());
    assert_eq!(chain.entries_checked, 3);
}

#[tokio::test]
async fn router_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let gate = ConsumeGate::new(store.clone(), fixture_fee());
    let router = Router::new(
        gate,
        PriceList::default(),
        |op: &OperationTag, inputs: &ComputeInputs| -> Result<Value, ComputeError> {
            Ok(json!({ "operation": op.as_str(), "inputs": inputs.len() }))
        },
    );

    store
        .create_identity(&Credential::new("sk-enterprise").digest(), "ops@example.com", 120)
        .await
        .unwrap();

    let request_id = RequestId::new_v4();
    let first = router
        .invoke(
            InvocationRequest::new(Credential::new("sk-enterprise"), "risk_mechanics", request_id)
                .with_input("exposure", 0.25)
                .with_metadata(json!({"source": "universal_sse"})),
        )
        .await
        .unwrap();
    let InvocationOutcome::Completed { output, receipt } = &first.outcome else {
        panic!("expected completion");
    };
    assert_eq!(output["operation"], "risk_mechanics");
    assert_eq!(receipt.remaining, 20);

    // Same request id: replayed, not charged, computation runs again.
    let replay = router
        .invoke(InvocationRequest::new(
            Credential::new("sk-enterprise"),
            "risk_mechanics",
            request_id,
        ))
        .await
        .unwrap();
    let InvocationOutcome::Completed { receipt, .. } = &replay.outcome else {
        panic!("expected replay to complete");
    };
    assert!(receipt.replayed);

    let denied = router
        .invoke(InvocationRequest::new(
            Credential::new("sk-enterprise"),
            "venture_viability",
            RequestId::new_v4(),
        ))
        .await
        .unwrap();
    assert_eq!(denied.denial(), Some(Denial::InsufficientCredits));

    let entry = store.find_by_request(&request_id).await.unwrap().unwrap();
    assert_eq!(entry.metadata["source"], "universal_sse");
    assert_eq!(entry.credits_charged, 100);
}

#[tokio::test]
async fn router_replay_cannot_switch_to_a_pricier_operation() {
    let fixture = GateFixture::sqlite();
    let who = fixture.provision(10).await;
    let router = Router::new(
        fixture.gate.clone(),
        PriceList::default(),
        |op: &OperationTag, _: &ComputeInputs| -> Result<Value, ComputeError> {
            Ok(json!({ "op": op.as_str() }))
        },
    );
    let request_id = RequestId::new_v4();

    let paid = router
        .invoke(InvocationRequest::new(who.credential(), "cloud_ops", request_id))
        .await
        .unwrap();
    assert!(paid.denial().is_none());

    for operation in ["risk_mechanics", "venture_viability", "product_strategy"] {
        let invocation = router
            .invoke(InvocationRequest::new(who.credential(), operation, request_id))
            .await
            .unwrap();
        assert_eq!(invocation.denial(), Some(Denial::Unauthorized));
    }

    assert_eq!(fixture.balance(&who.digest).await, 0);
    assert_eq!(fixture.ledger_len().await, 1);
}
