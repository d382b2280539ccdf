//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Value};

use creditgate::PriceList;
use creditgate_core::{
    ChargeRequest, Credits, IdentityDigest, OperationTag, RequestId,
};

/// Generate a random IdentityDigest.
pub fn digest() -> impl Strategy<Value = IdentityDigest> {
    any::<[u8; 32]>().prop_map(IdentityDigest::from_bytes)
}

/// Generate a random RequestId.
pub fn request_id() -> impl Strategy<Value = RequestId> {
    any::<u128>().prop_map(|n| RequestId::from(uuid::Uuid::from_u128(n)))
}

/// Generate a plausible credential secret.
pub fn credential_secret() -> impl Strategy<Value = String> {
    "sk-[a-z0-9]{8,40}".prop_map(String::from)
}

/// Generate a starting balance, including zero.
pub fn balance() -> impl Strategy<Value = Credits> {
    0u64..=1_000
}

/// Generate a positive cost.
pub fn cost() -> impl Strategy<Value = Credits> {
    1u64..=100
}

/// Pick one of the default-priced operations.
pub fn priced_operation() -> impl Strategy<Value = (OperationTag, Credits)> {
    let priced: Vec<(OperationTag, Credits)> = PriceList::default()
        .iter()
        .map(|(tag, price)| (tag.clone(), price))
        .collect();
    proptest::sample::select(priced)
}

/// Generate a small flat metadata object.
pub fn metadata() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z_]{1,12}", "[ -~]{0,24}", 0..4).prop_map(|fields| {
        Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect::<Map<String, Value>>(),
        )
    })
}

/// Generate a well-formed charge request.
pub fn charge_request() -> impl Strategy<Value = ChargeRequest> {
    (digest(), priced_operation(), request_id(), metadata()).prop_map(
        |(digest, (operation, price), request_id, metadata)| {
            ChargeRequest::new(digest, price, operation, request_id)
                .and_then(|r| r.with_metadata(metadata))
                .expect("generated charge is well formed")
        },
    )
}

/// Parameters for a concurrent-consume run against one identity.
#[derive(Debug, Clone)]
pub struct ContentionParams {
    pub balance: Credits,
    pub cost: Credits,
    pub callers: usize,
}

impl ContentionParams {
    /// Number of calls that must succeed: `min(callers, floor(balance / cost))`.
    pub fn expected_successes(&self) -> usize {
        let affordable = self.balance / self.cost;
        usize::try_from(affordable).map_or(self.callers, |n| n.min(self.callers))
    }

    pub fn expected_remaining(&self) -> Credits {
        self.balance - self.cost * self.expected_successes() as Credits
    }
}

impl Arbitrary for ContentionParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (0u64..=200, 1u64..=25, 1usize..=40)
            .prop_map(|(balance, cost, callers)| ContentionParams {
                balance,
                cost,
                callers,
            })
            .boxed()
    }
}
