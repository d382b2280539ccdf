//! # creditgate store
//!
//! Storage abstraction for creditgate. Provides trait-based interfaces for
//! per-identity balances and the append-only audit ledger, with SQLite and
//! in-memory implementations.
//!
//! ## Overview
//!
//! The gate is storage-agnostic: it talks to a [`BalanceStore`] and an
//! [`AuditLedger`]. Both are implemented by the same backend so that a
//! debit and its ledger entry are committed in one transaction. The primary
//! implementation is [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`BalanceStore`] - balances, provisioning and the atomic [`settle`](BalanceStore::settle)
//! - [`AuditLedger`] - append and read the hash-chained ledger
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests, with fault injection
//! - [`Settlement`] / [`SettleOutcome`] - what a settlement was asked to do and what it did
//!
//! ## Usage
//!
//! ```rust,no_run
//! use creditgate_store::{BalanceStore, SqliteStore, DEFAULT_BUSY_TIMEOUT};
//! use creditgate_core::Credential;
//!
//! async fn example() {
//!     let store = SqliteStore::open("creditgate.db", DEFAULT_BUSY_TIMEOUT).unwrap();
//!
//!     let digest = Credential::new("sk-demo").digest();
//!     store.create_identity(&digest, "ops@example.com", 100).await.unwrap();
//!     assert_eq!(store.get_balance(&digest).await.unwrap(), 100);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic settlement**: read, decide and write happen under one lock or transaction
//! - **Non-negative balances**: enforced by validation and by a schema CHECK
//! - **Append-only ledger**: SQLite triggers abort any UPDATE or DELETE on ledger rows
//! - **Idempotent charges**: the request id is unique across the ledger

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::{Fault, MemoryStore};
pub use sqlite::{SqliteStore, DEFAULT_BUSY_TIMEOUT};
pub use traits::{
    AccountSnapshot, AuditLedger, BalanceStore, SettleFn, SettleOutcome, Settlement, UsageTotals,
};
