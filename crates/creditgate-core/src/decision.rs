//! Gate decisions and denial reasons.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Credits, EntryId};

/// Why the gate refused to charge.
///
/// The set is closed: every denial carries exactly one of these stable codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Denial {
    /// Digest unknown, identity inactive, or request id owned by another identity.
    Unauthorized,
    /// Remaining credits are below the cost.
    InsufficientCredits,
    /// The store could not be reached or the transaction did not complete.
    BackendUnavailable,
}

impl Denial {
    /// The stable wire code.
    pub const fn code(&self) -> &'static str {
        match self {
            Denial::Unauthorized => "UNAUTHORIZED",
            Denial::InsufficientCredits => "INSUFFICIENT_CREDITS",
            Denial::BackendUnavailable => "BACKEND_UNAVAILABLE",
        }
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A charge that went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeReceipt {
    /// Balance left after this charge.
    pub remaining: Credits,
    /// The ledger entry recording the charge.
    pub entry_id: EntryId,
    /// True when the request id had already been charged and the original
    /// result is being returned unchanged.
    pub replayed: bool,
}

/// Result of one consume call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Success(ChargeReceipt),
    Denied(Denial),
}

impl GateDecision {
    /// True for `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, GateDecision::Success(_))
    }

    /// The denial reason, if any.
    pub fn denial(&self) -> Option<Denial> {
        match self {
            GateDecision::Denied(reason) => Some(*reason),
            GateDecision::Success(_) => None,
        }
    }

    /// Remaining balance after a successful charge.
    pub fn remaining(&self) -> Option<Credits> {
        match self {
            GateDecision::Success(receipt) => Some(receipt.remaining),
            GateDecision::Denied(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_codes_are_stable() {
        assert_eq!(Denial::Unauthorized.code(), "UNAUTHORIZED");
        assert_eq!(Denial::InsufficientCredits.code(), "INSUFFICIENT_CREDITS");
        assert_eq!(Denial::BackendUnavailable.code(), "BACKEND_UNAVAILABLE");
        assert_eq!(
            serde_json::to_string(&Denial::InsufficientCredits).unwrap(),
            "\"INSUFFICIENT_CREDITS\""
        );
    }
}
