//! Charge requests submitted to the consume gate.

use serde_json::Value;
use std::num::NonZeroU64;

use crate::error::CoreError;
use crate::types::{Credits, IdentityDigest, OperationTag, RequestId};

/// A validated request to charge one invocation.
///
/// The cost is non-zero by construction, so a zero or negative charge can
/// never reach the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    pub digest: IdentityDigest,
    pub cost: NonZeroU64,
    pub operation: OperationTag,
    pub request_id: RequestId,
    /// Opaque structured payload recorded verbatim in the ledger.
    pub metadata: Value,
}

impl ChargeRequest {
    /// Build a request with empty metadata.
    pub fn new(
        digest: IdentityDigest,
        cost: Credits,
        operation: OperationTag,
        request_id: RequestId,
    ) -> Result<Self, CoreError> {
        let cost = NonZeroU64::new(cost).ok_or(CoreError::InvalidCost)?;
        Ok(Self {
            digest,
            cost,
            operation,
            request_id,
            metadata: Value::Null,
        })
    }

    /// Attach metadata. Only JSON objects (or null) are accepted.
    pub fn with_metadata(mut self, metadata: Value) -> Result<Self, CoreError> {
        if !(metadata.is_object() || metadata.is_null()) {
            return Err(CoreError::InvalidMetadata);
        }
        self.metadata = metadata;
        Ok(self)
    }

    /// The cost in credits.
    pub fn cost(&self) -> Credits {
        self.cost.get()
    }
}
