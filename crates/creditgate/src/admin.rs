//! Administrative operations: provisioning, issuance and (de)activation.
//!
//! None of these go through the consume gate. They never decrement a
//! balance, and issuance is the only way credits come back.

use std::sync::Arc;

use tracing::info;

use creditgate_core::{Account, Credential, Credits, IdentityDigest};
use creditgate_store::BalanceStore;

use crate::error::Result;

/// Administrative front end over a balance store.
pub struct Admin<S> {
    store: Arc<S>,
}

impl<S: BalanceStore> Admin<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Provision an identity for a presented credential.
    ///
    /// Only the credential's digest is stored.
    pub async fn create_identity(
        &self,
        credential: Credential,
        contact: &str,
        initial_credits: Credits,
    ) -> Result<Account> {
        self.create_identity_for_digest(&credential.into_digest(), contact, initial_credits)
            .await
    }

    /// Provision an identity whose digest was computed elsewhere.
    pub async fn create_identity_for_digest(
        &self,
        digest: &IdentityDigest,
        contact: &str,
        initial_credits: Credits,
    ) -> Result<Account> {
        let account = self
            .store
            .create_identity(digest, contact, initial_credits)
            .await?;
        info!(digest = %digest, initial_credits, "identity provisioned");
        Ok(account)
    }

    /// Add credits to an identity.
    pub async fn issue_credits(&self, digest: &IdentityDigest, amount: Credits) -> Result<Account> {
        let account = self.store.issue_credits(digest, amount).await?;
        info!(
            digest = %digest,
            amount,
            remaining = account.credits_remaining,
            "credits issued"
        );
        Ok(account)
    }

    /// Stop an identity from consuming. Its balance is kept.
    pub async fn deactivate(&self, digest: &IdentityDigest) -> Result<Account> {
        let account = self.store.set_active(digest, false).await?;
        info!(digest = %digest, "identity deactivated");
        Ok(account)
    }

    pub async fn reactivate(&self, digest: &IdentityDigest) -> Result<Account> {
        let account = self.store.set_active(digest, true).await?;
        info!(digest = %digest, "identity reactivated");
        Ok(account)
    }

    /// Remaining credits; `NotFound` if the digest is unknown.
    pub async fn balance(&self, digest: &IdentityDigest) -> Result<Credits> {
        Ok(self.store.get_balance(digest).await?)
    }

    pub async fn account(&self, digest: &IdentityDigest) -> Result<Option<Account>> {
        Ok(self.store.get_account(digest).await?)
    }
}
