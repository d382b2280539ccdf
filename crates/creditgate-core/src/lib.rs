//! # creditgate core
//!
//! Pure primitives for the credit-metered execution gate: identity digests,
//! charge requests, gate decisions and hash-chained ledger entries.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`IdentityDigest`] - SHA-256 digest of a credential; the only stored form of an identity
//! - [`Credential`] - a presented secret with a redacted `Debug`
//! - [`ChargeRequest`] - a validated request to charge one invocation
//! - [`GateDecision`] / [`Denial`] - the closed set of gate outcomes
//! - [`LedgerEntry`] - immutable record of one billed invocation
//!
//! ## Canonicalization
//!
//! Ledger entries are encoded with deterministic CBOR and chained with
//! BLAKE3. See the [`canonical`] module.

pub mod account;
pub mod canonical;
pub mod credential;
pub mod decision;
pub mod error;
pub mod ledger;
pub mod request;
pub mod types;
pub mod wire;

pub use account::Account;
pub use canonical::{canonical_entry_bytes, chain_hash, CHAIN_DOMAIN};
pub use credential::{digest_secret, Credential};
pub use decision::{ChargeReceipt, Denial, GateDecision};
pub use error::CoreError;
pub use ledger::{LedgerDraft, LedgerEntry};
pub use request::ChargeRequest;
pub use types::{ChainHash, Credits, EntryId, IdentityDigest, OperationTag, RequestId};
pub use wire::{GateResponse, WireRequest};

// Re-exported so downstream crates agree on the decimal type.
pub use rust_decimal::Decimal;

/// Current time in milliseconds since the Unix epoch.
///
/// Falls back to 0 if the system clock is set before the epoch.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
