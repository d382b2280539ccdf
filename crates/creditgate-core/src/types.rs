//! Strong type definitions for creditgate.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A quantity of prepaid execution credits.
///
/// Unsigned so that a negative balance is unrepresentable.
pub type Credits = u64;

/// A 32-byte one-way digest of a credential.
///
/// This is the only form in which an identity is ever stored or compared.
/// Its text form is 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct IdentityDigest(pub [u8; 32]);

impl IdentityDigest {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-char hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        if s.len() != 64 {
            return Err(CoreError::InvalidDigest(format!(
                "expected 64 hex chars, got {}",
                s.len()
            )));
        }
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidDigest(e.to_string()))?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for IdentityDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityDigest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for IdentityDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl FromStr for IdentityDigest {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<IdentityDigest> for String {
    fn from(digest: IdentityDigest) -> Self {
        digest.to_hex()
    }
}

impl TryFrom<String> for IdentityDigest {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl AsRef<[u8]> for IdentityDigest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A globally unique request identifier supplied by the caller.
///
/// The gate uses it as the idempotency key for a charge.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub uuid::Uuid);

impl RequestId {
    /// Generate a fresh random request id.
    pub fn new_v4() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse from the hyphenated UUID form.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| CoreError::InvalidRequestId(e.to_string()))
    }

    /// The hyphenated lowercase form used for persistence.
    pub fn to_hyphenated(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0.hyphenated())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl From<uuid::Uuid> for RequestId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

/// Monotonic ledger entry identifier. The first entry is 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl EntryId {
    /// The id that follows this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The tag naming a billable operation, e.g. `cloud_ops`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OperationTag(String);

impl OperationTag {
    /// Maximum tag length in bytes.
    pub const MAX_LEN: usize = 64;

    /// Create a tag, rejecting empty, oversized or non-printable input.
    pub fn new(tag: impl Into<String>) -> Result<Self, CoreError> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(CoreError::InvalidOperation("operation tag is empty".into()));
        }
        if tag.len() > Self::MAX_LEN {
            return Err(CoreError::InvalidOperation(format!(
                "operation tag exceeds {} bytes",
                Self::MAX_LEN
            )));
        }
        if !tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(CoreError::InvalidOperation(format!(
                "operation tag {tag:?} contains unsupported characters"
            )));
        }
        Ok(Self(tag))
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OperationTag {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<OperationTag> for String {
    fn from(tag: OperationTag) -> Self {
        tag.0
    }
}

impl FromStr for OperationTag {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A 32-byte BLAKE3 hash linking ledger entries into a chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainHash(pub [u8; 32]);

impl ChainHash {
    /// The hash preceding the first ledger entry.
    pub const GENESIS: Self = Self([0u8; 32]);

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl TryFrom<&[u8]> for ChainHash {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_hex_roundtrip() {
        let digest = IdentityDigest::from_bytes([0x42; 32]);
        let hex = digest.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(IdentityDigest::from_hex(&hex).unwrap(), digest);
    }

    #[test]
    fn test_digest_rejects_wrong_length() {
        assert!(IdentityDigest::from_hex("abcd").is_err());
        assert!(IdentityDigest::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_digest_display_is_prefix() {
        let digest = IdentityDigest::from_bytes([0xab; 32]);
        assert_eq!(format!("{}", digest), "abababababababab");
    }

    #[test]
    fn test_digest_serde_as_hex() {
        let digest = IdentityDigest::from_bytes([0x01; 32]);
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let back: IdentityDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }

    #[test]
    fn test_operation_tag_validation() {
        assert!(OperationTag::new("cloud_ops").is_ok());
        assert!(OperationTag::new("").is_err());
        assert!(OperationTag::new("has space").is_err());
        assert!(OperationTag::new("x".repeat(65)).is_err());
    }

    #[test]
    fn test_request_id_parse() {
        let id = RequestId::new_v4();
        assert_eq!(RequestId::parse(&id.to_hyphenated()).unwrap(), id);
        assert!(RequestId::parse("thread_7").is_err());
    }
}
