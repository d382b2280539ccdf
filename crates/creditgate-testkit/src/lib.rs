//! # creditgate testkit
//!
//! Testing utilities for creditgate.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a gate, admin and auditor wired to a memory or SQLite store
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use creditgate_testkit::generators::ContentionParams;
//!
//! proptest! {
//!     #[test]
//!     fn never_overdraws(params: ContentionParams) {
//!         prop_assert!(params.expected_remaining() <= params.balance);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use creditgate_testkit::fixtures::{charge, GateFixture};
//!
//! let fixture = GateFixture::memory();
//! let who = fixture.provision(25).await;
//! let decision = fixture.gate.consume(&charge(who.digest, 10)).await;
//! assert_eq!(decision.remaining(), Some(15));
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{charge, charge_for, fixture_fee, random_secret, GateFixture, Provisioned};
pub use generators::{charge_request, ContentionParams};
