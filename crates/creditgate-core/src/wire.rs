//! Transport-neutral request and response shapes.
//!
//! ```text
//! request:  { identity_digest, cost, operation, request_id, metadata }
//! success:  { "ok": true,  "remaining": 5 }
//! denial:   { "ok": false, "reason": "INSUFFICIENT_CREDITS" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decision::{Denial, GateDecision};
use crate::error::CoreError;
use crate::request::ChargeRequest;
use crate::types::{Credits, IdentityDigest, OperationTag, RequestId};

/// A gate request as it arrives over any transport, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    pub identity_digest: String,
    /// Signed so that negative costs are rejected by validation rather than
    /// by the deserializer with an opaque message.
    pub cost: i64,
    pub operation: String,
    pub request_id: String,
    #[serde(default)]
    pub metadata: Value,
}

impl TryFrom<WireRequest> for ChargeRequest {
    type Error = CoreError;

    fn try_from(wire: WireRequest) -> Result<Self, Self::Error> {
        let digest = IdentityDigest::from_hex(&wire.identity_digest)?;
        let cost = Credits::try_from(wire.cost).map_err(|_| CoreError::InvalidCost)?;
        let operation = OperationTag::new(wire.operation)?;
        let request_id = RequestId::parse(&wire.request_id)?;
        ChargeRequest::new(digest, cost, operation, request_id)?.with_metadata(wire.metadata)
    }
}

/// Fails with `InvalidCost` when the cost does not fit the signed wire field.
impl TryFrom<&ChargeRequest> for WireRequest {
    type Error = CoreError;

    fn try_from(request: &ChargeRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            identity_digest: request.digest.to_hex(),
            cost: i64::try_from(request.cost()).map_err(|_| CoreError::InvalidCost)?,
            operation: request.operation.to_string(),
            request_id: request.request_id.to_hyphenated(),
            metadata: request.metadata.clone(),
        })
    }
}

/// The gate's response on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<Credits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Denial>,
}

impl GateResponse {
    pub fn success(remaining: Credits) -> Self {
        Self {
            ok: true,
            remaining: Some(remaining),
            reason: None,
        }
    }

    pub fn denied(reason: Denial) -> Self {
        Self {
            ok: false,
            remaining: None,
            reason: Some(reason),
        }
    }
}

impl From<&GateDecision> for GateResponse {
    fn from(decision: &GateDecision) -> Self {
        match decision {
            GateDecision::Success(receipt) => Self::success(receipt.remaining),
            GateDecision::Denied(reason) => Self::denied(*reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire() -> WireRequest {
        WireRequest {
            identity_digest: "ab".repeat(32),
            cost: 10,
            operation: "cloud_ops".into(),
            request_id: "6f1c2a3e-8d4b-4c1a-9f0e-2b7d5e6a1c3f".into(),
            metadata: json!({"source": "universal_sse"}),
        }
    }

    #[test]
    fn test_valid_wire_request_converts() {
        let request = ChargeRequest::try_from(wire()).unwrap();
        assert_eq!(request.cost(), 10);
        assert_eq!(request.operation.as_str(), "cloud_ops");
        assert_eq!(request.metadata["source"], "universal_sse");
    }

    #[test]
    fn test_invalid_wire_requests_rejected() {
        let mut bad = wire();
        bad.cost = -100_000;
        assert!(matches!(ChargeRequest::try_from(bad), Err(CoreError::InvalidCost)));

        let mut bad = wire();
        bad.cost = 0;
        assert!(matches!(ChargeRequest::try_from(bad), Err(CoreError::InvalidCost)));

        let mut bad = wire();
        bad.identity_digest = "plaintext-key".into();
        assert!(matches!(ChargeRequest::try_from(bad), Err(CoreError::InvalidDigest(_))));

        let mut bad = wire();
        bad.request_id = "universal_gateway_req".into();
        assert!(matches!(ChargeRequest::try_from(bad), Err(CoreError::InvalidRequestId(_))));
    }

    #[test]
    fn test_outbound_cost_must_fit_wire_field() {
        let request = ChargeRequest::try_from(wire()).unwrap();
        let back = WireRequest::try_from(&request).unwrap();
        assert_eq!(back.cost, 10);

        let huge = ChargeRequest::new(
            request.digest,
            u64::MAX,
            request.operation.clone(),
            request.request_id,
        )
        .unwrap();
        assert!(matches!(WireRequest::try_from(&huge), Err(CoreError::InvalidCost)));

        let edge = ChargeRequest::new(
            request.digest,
            i64::MAX as u64,
            request.operation.clone(),
            request.request_id,
        )
        .unwrap();
        assert_eq!(WireRequest::try_from(&edge).unwrap().cost, i64::MAX);
    }

    #[test]
    fn test_response_shapes() {
        let ok = serde_json::to_value(GateResponse::success(5)).unwrap();
        assert_eq!(ok, json!({"ok": true, "remaining": 5}));

        let denied = serde_json::to_value(GateResponse::denied(Denial::BackendUnavailable)).unwrap();
        assert_eq!(denied, json!({"ok": false, "reason": "BACKEND_UNAVAILABLE"}));
    }
}
