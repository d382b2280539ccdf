//! Account: the balance record owned by one identity.

use serde::{Deserialize, Serialize};

use crate::types::{Credits, IdentityDigest};

/// The stored state of one billable identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// One-way digest of the identity's credential.
    pub digest: IdentityDigest,
    /// Contact reference supplied at provisioning (e.g. an email address).
    pub contact: String,
    /// Inactive identities can never consume credits.
    pub active: bool,
    /// Remaining prepaid credits.
    pub credits_remaining: Credits,
    /// Credits granted when the identity was provisioned.
    pub initial_credits: Credits,
    /// Credits added by administrative issuance since provisioning.
    pub credits_issued: Credits,
    /// Provisioning time (Unix ms).
    pub created_at: i64,
}

impl Account {
    /// A freshly provisioned, active account.
    pub fn new(digest: IdentityDigest, contact: String, initial_credits: Credits, now: i64) -> Self {
        Self {
            digest,
            contact,
            active: true,
            credits_remaining: initial_credits,
            initial_credits,
            credits_issued: 0,
            created_at: now,
        }
    }

    /// Total credits ever granted to this account.
    pub fn credits_granted(&self) -> Credits {
        self.initial_credits.saturating_add(self.credits_issued)
    }

    /// Credits consumed so far, as implied by the balance.
    ///
    /// Reconciliation compares this against the ledger's charged total.
    pub fn credits_consumed(&self) -> Credits {
        self.credits_granted().saturating_sub(self.credits_remaining)
    }
}
