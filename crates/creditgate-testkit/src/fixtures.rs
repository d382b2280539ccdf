//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a gate wired to a store, plus
//! helpers to provision identities and build charge requests.

use std::sync::Arc;

use rand::RngCore;

use creditgate::{Admin, Auditor, ConsumeGate};
use creditgate_core::{
    ChargeRequest, Credential, Credits, Decimal, IdentityDigest, OperationTag, RequestId,
};
use creditgate_store::{AuditLedger, BalanceStore, MemoryStore, SqliteStore};

/// Usage fee the fixtures record on every entry.
pub fn fixture_fee() -> Decimal {
    Decimal::new(1, 3)
}

/// A freshly generated random credential of the form `sk-<32 hex>`.
pub fn random_secret() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("sk-{}", hex::encode(bytes))
}

/// An identity created by a fixture.
///
/// Keeps the plaintext so tests can present the credential more than once.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub secret: String,
    pub digest: IdentityDigest,
}

impl Provisioned {
    pub fn credential(&self) -> Credential {
        Credential::new(self.secret.clone())
    }
}

/// A gate, admin and auditor sharing one store.
pub struct GateFixture<S> {
    pub store: Arc<S>,
    pub gate: ConsumeGate<S>,
    pub admin: Admin<S>,
    pub auditor: Auditor<S>,
}

impl GateFixture<MemoryStore> {
    /// In-memory store with fault injection.
    pub fn memory() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl GateFixture<SqliteStore> {
    /// In-memory SQLite database.
    pub fn sqlite() -> Self {
        Self::with_store(SqliteStore::open_memory().expect("open in-memory sqlite"))
    }
}

impl<S: BalanceStore + AuditLedger> GateFixture<S> {
    pub fn with_store(store: S) -> Self {
        let store = Arc::new(store);
        Self {
            gate: ConsumeGate::new(store.clone(), fixture_fee()),
            admin: Admin::new(store.clone()),
            auditor: Auditor::new(store.clone(), 50),
            store,
        }
    }

    /// Provision an identity with a random credential.
    pub async fn provision(&self, credits: Credits) -> Provisioned {
        let secret = random_secret();
        let account = self
            .admin
            .create_identity(Credential::new(secret.clone()), "fixture@example.com", credits)
            .await
            .expect("provision fixture identity");
        Provisioned {
            secret,
            digest: account.digest,
        }
    }

    pub async fn balance(&self, digest: &IdentityDigest) -> Credits {
        self.store.get_balance(digest).await.expect("read balance")
    }

    pub async fn ledger_len(&self) -> u64 {
        self.store
            .ledger_totals()
            .await
            .expect("read ledger totals")
            .entries
    }
}

/// A `cloud_ops` charge with a fresh request id.
pub fn charge(digest: IdentityDigest, cost: Credits) -> ChargeRequest {
    charge_for(digest, cost, "cloud_ops")
}

/// A charge for a named operation with a fresh request id.
pub fn charge_for(digest: IdentityDigest, cost: Credits, operation: &str) -> ChargeRequest {
    let operation = OperationTag::new(operation).expect("valid fixture operation");
    ChargeRequest::new(digest, cost, operation, RequestId::new_v4()).expect("valid fixture charge")
}
