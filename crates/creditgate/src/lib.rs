//! # creditgate
//!
//! A credit-metered execution gate. Every billable invocation is charged
//! against a prepaid per-identity balance before any work runs, and every
//! charge is recorded in an append-only, hash-chained audit ledger.
//!
//! ## Overview
//!
//! - **Consume gate**: atomic check-and-decrement, the only path that lowers a balance
//! - **Audit ledger**: one entry per successful charge, committed with the debit
//! - **Router**: price lookup, credential digesting, gate, then dispatch
//! - **Admin / Auditor**: provisioning, issuance, reconciliation, chain verification
//!
//! ## Key Concepts
//!
//! - **Identity digest**: SHA-256 of the credential. The credential itself is never stored.
//! - **Denial**: `UNAUTHORIZED`, `INSUFFICIENT_CREDITS` or `BACKEND_UNAVAILABLE`. A denial changes nothing.
//! - **Request id**: idempotency key. Replaying a charged id returns the original result.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::{json, Value};
//! use creditgate::{Admin, ConsumeGate, GateConfig, InvocationRequest, Router};
//! use creditgate::core::{Credential, RequestId};
//! use creditgate::router::{ComputeError, ComputeInputs};
//! use creditgate::core::OperationTag;
//! use creditgate::store::SqliteStore;
//!
//! fn compute(_: &OperationTag, inputs: &ComputeInputs) -> Result<Value, ComputeError> {
//!     Ok(json!({ "n": inputs.len() }))
//! }
//!
//! async fn example() {
//!     let config = GateConfig::default();
//!     let store = Arc::new(
//!         SqliteStore::open(&config.store.path, config.store.busy_timeout()).unwrap(),
//!     );
//!
//!     Admin::new(store.clone())
//!         .create_identity(Credential::new("sk-demo"), "ops@example.com", 100)
//!         .await
//!         .unwrap();
//!
//!     let gate = ConsumeGate::new(store, config.usage_fee);
//!     let router = Router::new(gate, config.operations, compute);
//!
//!     let invocation = router
//!         .invoke(InvocationRequest::new(
//!             Credential::new("sk-demo"),
//!             "cloud_ops",
//!             RequestId::new_v4(),
//!         ))
//!         .await
//!         .unwrap();
//!     assert!(invocation.denial().is_none());
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `creditgate::core` - Core primitives (digests, requests, decisions, ledger entries)
//! - `creditgate::store` - Storage traits, SQLite and in-memory backends

pub mod admin;
pub mod audit;
pub mod config;
pub mod error;
pub mod gate;
pub mod router;

// Re-export component crates
pub use creditgate_core as core;
pub use creditgate_store as store;

// Re-export main types for convenience
pub use admin::Admin;
pub use audit::{Auditor, ChainBreak, ChainReport, ChainStatus, Reconciliation};
pub use config::{GateConfig, LedgerConfig, PriceList, StoreConfig};
pub use error::{GateError, Result, RouterError};
pub use gate::ConsumeGate;
pub use router::{
    Computation, Invocation, InvocationOutcome, InvocationRequest, InvocationState,
    InvocationTrace, Router,
};

pub use creditgate_core::{
    ChargeReceipt, ChargeRequest, Credential, Credits, Denial, GateDecision, GateResponse,
    IdentityDigest, LedgerEntry, RequestId,
};
