//! Credentials and their one-way digests.
//!
//! A [`Credential`] is the secret a caller presents. It is digested with
//! SHA-256 at the trust boundary and then dropped; only the
//! [`IdentityDigest`] travels further.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::types::IdentityDigest;

/// A plaintext credential presented by a caller.
///
/// Not `Display`, `Serialize` or `Clone`; `Debug` is redacted. It must
/// never reach a log line or a persisted record.
pub struct Credential(String);

impl Credential {
    /// Wrap a presented credential.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// True if nothing was presented.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compute the deterministic one-way digest of this credential.
    ///
    /// The credential bytes are hashed exactly as presented, with no
    /// trimming or case folding.
    pub fn digest(&self) -> IdentityDigest {
        digest_secret(self.0.as_bytes())
    }

    /// Consume the credential, returning only its digest.
    pub fn into_digest(self) -> IdentityDigest {
        self.digest()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// SHA-256 over raw secret bytes.
pub fn digest_secret(secret: &[u8]) -> IdentityDigest {
    let hash = Sha256::digest(secret);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hash);
    IdentityDigest::from_bytes(out)
}
