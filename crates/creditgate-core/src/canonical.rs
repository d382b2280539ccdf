//! Canonical CBOR encoding of ledger entries.
//!
//! The encoding follows RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (the usage fee is encoded as normalized decimal text, the
//!   metadata as compact JSON text with sorted keys)
//!
//! The same entry always produces identical bytes, and thus an identical
//! chain hash, regardless of which store persisted it.

use ciborium::value::Value;

use crate::error::CoreError;
use crate::ledger::LedgerEntry;
use crate::types::ChainHash;

/// Domain separator mixed into every chain hash.
pub const CHAIN_DOMAIN: &[u8] = b"creditgate-ledger-v1:";

/// Entry field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const ID: u64 = 0;
    pub const TIMESTAMP: u64 = 1;
    pub const DIGEST: u64 = 2;
    pub const OPERATION: u64 = 3;
    pub const CREDITS_CHARGED: u64 = 4;
    pub const USAGE_FEE: u64 = 5;
    pub const REQUEST_ID: u64 = 6;
    pub const METADATA: u64 = 7;
    pub const BALANCE_AFTER: u64 = 8;
    pub const PREV_HASH: u64 = 9;
}

/// Encode every field of an entry except its own hash.
pub fn canonical_entry_bytes(entry: &LedgerEntry) -> Result<Vec<u8>, CoreError> {
    let value = entry_to_cbor_value(entry);
    let mut buf = Vec::new();
    encode_value_to(&mut buf, &value)?;
    Ok(buf)
}

/// Compute `BLAKE3(domain || canonical(entry))`.
///
/// `prev_hash` is part of the canonical bytes, which is what links the chain.
pub fn chain_hash(entry: &LedgerEntry) -> Result<ChainHash, CoreError> {
    let bytes = canonical_entry_bytes(entry)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(CHAIN_DOMAIN);
    hasher.update(&bytes);
    Ok(ChainHash(*hasher.finalize().as_bytes()))
}

fn entry_to_cbor_value(entry: &LedgerEntry) -> Value {
    let entries = vec![
        (int(keys::ID), int(entry.id.0)),
        (int(keys::TIMESTAMP), Value::Integer(entry.timestamp.into())),
        (int(keys::DIGEST), Value::Bytes(entry.digest.0.to_vec())),
        (
            int(keys::OPERATION),
            Value::Text(entry.operation.as_str().to_string()),
        ),
        (int(keys::CREDITS_CHARGED), int(entry.credits_charged)),
        (
            int(keys::USAGE_FEE),
            Value::Text(entry.usage_fee.normalize().to_string()),
        ),
        (
            int(keys::REQUEST_ID),
            Value::Bytes(entry.request_id.0.as_bytes().to_vec()),
        ),
        // serde_json maps are BTreeMaps, so key order is already sorted.
        (int(keys::METADATA), Value::Text(entry.metadata.to_string())),
        (int(keys::BALANCE_AFTER), int(entry.balance_after)),
        (
            int(keys::PREV_HASH),
            Value::Bytes(entry.prev_hash.0.to_vec()),
        ),
    ];
    Value::Map(entries)
}

fn int(n: u64) -> Value {
    Value::Integer(n.into())
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<(), CoreError> {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Null => buf.push(0xf6),
        other => {
            return Err(CoreError::EncodingError(format!(
                "unsupported CBOR value in canonical encoding: {other:?}"
            )))
        }
    }
    Ok(())
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode a map canonically (major type 5), keys sorted by encoded bytes.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<(), CoreError> {
    let mut pairs: Vec<(Vec<u8>, &Value)> = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        pairs.push((key_buf, v));
    }

    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uint_sizes() {
        let mut buf = Vec::new();
        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        buf.clear();
        encode_uint(&mut buf, 0, 500);
        assert_eq!(buf, vec![0x19, 0x01, 0xf4]);

        buf.clear();
        encode_uint(&mut buf, 0, 1 << 40);
        assert_eq!(buf[0], 0x1b);
        assert_eq!(buf.len(), 9);
    }

    #[test]
    fn test_map_keys_sorted_regardless_of_input_order() {
        let a = Value::Map(vec![(int(1), int(10)), (int(0), int(20))]);
        let b = Value::Map(vec![(int(0), int(20)), (int(1), int(10))]);

        let mut buf_a = Vec::new();
        let mut buf_b = Vec::new();
        encode_value_to(&mut buf_a, &a).unwrap();
        encode_value_to(&mut buf_b, &b).unwrap();
        assert_eq!(buf_a, buf_b);
    }

    #[test]
    fn test_floats_rejected() {
        let mut buf = Vec::new();
        assert!(encode_value_to(&mut buf, &Value::Float(1.5)).is_err());
    }
}
