//! The invocation router: price lookup, gate, then dispatch.
//!
//! The router holds no per-request state between calls. For each invocation
//! it validates the request, digests the credential, charges through the
//! [`ConsumeGate`] and only on success hands the inputs to the
//! [`Computation`]. Denials are returned verbatim and never retried.
//!
//! # State machine
//!
//! ```text
//! Received → Authorizing ─┬─→ Authorized → Executing → Completed
//!                         └─→ Denied(reason)
//! ```
//!
//! Every invocation records the states it passed through in an
//! [`InvocationTrace`].

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use creditgate_core::{
    ChargeReceipt, ChargeRequest, Credential, Denial, GateDecision, OperationTag, RequestId,
};
use creditgate_store::{AuditLedger, BalanceStore};

use crate::config::PriceList;
use crate::error::RouterError;
use crate::gate::ConsumeGate;

/// Named numeric inputs to a computation.
pub type ComputeInputs = BTreeMap<String, f64>;

/// A computation failed. Carries a message only; computations are pure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ComputeError(pub String);

impl ComputeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The deterministic work performed after a successful charge.
pub trait Computation: Send + Sync {
    fn compute(
        &self,
        operation: &OperationTag,
        inputs: &ComputeInputs,
    ) -> Result<Value, ComputeError>;
}

impl<F> Computation for F
where
    F: Fn(&OperationTag, &ComputeInputs) -> Result<Value, ComputeError> + Send + Sync,
{
    fn compute(
        &self,
        operation: &OperationTag,
        inputs: &ComputeInputs,
    ) -> Result<Value, ComputeError> {
        self(operation, inputs)
    }
}

/// Where an invocation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    Received,
    Authorizing,
    Authorized,
    Executing,
    Completed,
    Denied(Denial),
}

impl InvocationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvocationState::Completed | InvocationState::Denied(_))
    }

    /// True if `next` is a legal successor. There is no retry edge.
    pub fn can_advance_to(&self, next: &InvocationState) -> bool {
        use InvocationState::*;
        matches!(
            (self, next),
            (Received, Authorizing)
                | (Authorizing, Authorized)
                | (Authorizing, Denied(_))
                | (Authorized, Executing)
                | (Executing, Completed)
        )
    }
}

/// The ordered states one invocation passed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InvocationTrace(Vec<InvocationState>);

impl InvocationTrace {
    fn new() -> Self {
        Self(vec![InvocationState::Received])
    }

    /// Move to `next`, rejecting transitions the state machine lacks.
    pub fn advance(&mut self, next: InvocationState) -> Result<(), RouterError> {
        let current = self.current();
        if !current.can_advance_to(&next) {
            return Err(RouterError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        self.0.push(next);
        Ok(())
    }

    pub fn current(&self) -> InvocationState {
        self.0.last().copied().unwrap_or(InvocationState::Received)
    }

    pub fn states(&self) -> &[InvocationState] {
        &self.0
    }
}

/// One call to the router.
#[derive(Debug)]
pub struct InvocationRequest {
    pub credential: Credential,
    /// Operation name as supplied by the caller; resolved against the price list.
    pub operation: String,
    pub inputs: ComputeInputs,
    /// Idempotency key. Retrying with the same id never charges twice.
    pub request_id: RequestId,
    /// Free-form JSON object recorded on the ledger entry.
    pub metadata: Value,
}

impl InvocationRequest {
    pub fn new(
        credential: Credential,
        operation: impl Into<String>,
        request_id: RequestId,
    ) -> Self {
        Self {
            credential,
            operation: operation.into(),
            inputs: ComputeInputs::new(),
            request_id,
            metadata: Value::Null,
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: f64) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    /// Charged and computed.
    Completed { output: Value, receipt: ChargeReceipt },
    /// Refused by the gate; nothing was charged or computed.
    Denied(Denial),
}

/// The result of a finished invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub operation: OperationTag,
    pub outcome: InvocationOutcome,
    pub trace: InvocationTrace,
}

impl Invocation {
    pub fn denial(&self) -> Option<Denial> {
        match self.outcome {
            InvocationOutcome::Denied(reason) => Some(reason),
            InvocationOutcome::Completed { .. } => None,
        }
    }
}

/// Routes invocations through the gate to a computation.
pub struct Router<S, C> {
    gate: ConsumeGate<S>,
    prices: PriceList,
    computation: C,
}

impl<S, C> Router<S, C>
where
    S: BalanceStore + AuditLedger,
    C: Computation,
{
    pub fn new(gate: ConsumeGate<S>, prices: PriceList, computation: C) -> Self {
        Self {
            gate,
            prices,
            computation,
        }
    }

    pub fn gate(&self) -> &ConsumeGate<S> {
        &self.gate
    }

    pub fn prices(&self) -> &PriceList {
        &self.prices
    }

    /// Run one invocation.
    ///
    /// Malformed requests fail with an error before anything is charged.
    /// A gate denial is a successful return with a denied outcome.
    pub async fn invoke(&self, request: InvocationRequest) -> Result<Invocation, RouterError> {
        let InvocationRequest {
            credential,
            operation,
            inputs,
            request_id,
            metadata,
        } = request;

        let (operation, cost) = self
            .prices
            .lookup(&operation)
            .ok_or_else(|| RouterError::UnknownOperation(operation.clone()))?;
        validate_inputs(&inputs)?;
        if !(metadata.is_object() || metadata.is_null()) {
            return Err(RouterError::InvalidInput(
                "metadata must be a JSON object".into(),
            ));
        }

        let mut trace = InvocationTrace::new();
        trace.advance(InvocationState::Authorizing)?;

        if credential.is_empty() {
            return self.deny(operation, trace, Denial::Unauthorized);
        }
        let digest = credential.into_digest();

        let charge = ChargeRequest::new(digest, cost, operation.clone(), request_id)
            .and_then(|charge| charge.with_metadata(metadata))
            .map_err(|e| RouterError::InvalidInput(e.to_string()))?;

        let receipt = match self.gate.consume(&charge).await {
            GateDecision::Success(receipt) => receipt,
            GateDecision::Denied(reason) => return self.deny(operation, trace, reason),
        };
        trace.advance(InvocationState::Authorized)?;
        trace.advance(InvocationState::Executing)?;

        let output = self
            .computation
            .compute(&operation, &inputs)
            .map_err(|source| {
                error!(
                    digest = %digest,
                    request_id = %request_id,
                    operation = %operation,
                    error = %source,
                    "computation failed after charge"
                );
                RouterError::Computation {
                    operation: operation.clone(),
                    receipt,
                    source,
                }
            })?;
        trace.advance(InvocationState::Completed)?;

        debug!(
            digest = %digest,
            request_id = %request_id,
            operation = %operation,
            remaining = receipt.remaining,
            "invocation completed"
        );
        Ok(Invocation {
            operation,
            outcome: InvocationOutcome::Completed { output, receipt },
            trace,
        })
    }

    fn deny(
        &self,
        operation: OperationTag,
        mut trace: InvocationTrace,
        reason: Denial,
    ) -> Result<Invocation, RouterError> {
        trace.advance(InvocationState::Denied(reason))?;
        Ok(Invocation {
            operation,
            outcome: InvocationOutcome::Denied(reason),
            trace,
        })
    }
}

fn validate_inputs(inputs: &ComputeInputs) -> Result<(), RouterError> {
    for (name, value) in inputs {
        if name.is_empty() {
            return Err(RouterError::InvalidInput("input name is empty".into()));
        }
        if !value.is_finite() {
            return Err(RouterError::InvalidInput(format!(
                "input {name} is not a finite number"
            )));
        }
    }
    Ok(())
}
