//! Opaque bearer values for refresh tokens and reset codes
//!
//! Raw values come from the OS CSPRNG and are handed to the caller exactly once;
//! only their SHA-256 digest is ever persisted.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Entropy per opaque value, in bytes
pub const OPAQUE_TOKEN_BYTES: usize = 32;

/// A freshly generated bearer value together with its storage digest
#[derive(Clone, PartialEq, Eq)]
pub struct OpaqueToken {
    raw: String,
    digest: String,
}

impl OpaqueToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; OPAQUE_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let raw = hex::encode(bytes);
        let digest = digest(&raw);
        Self { raw, digest }
    }

    /// The bearer value returned to the client
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The one-way digest stored in the record
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn into_raw(self) -> String {
        self.raw
    }
}

impl std::fmt::Debug for OpaqueToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpaqueToken")
            .field("digest", &self.digest)
            .finish_non_exhaustive()
    }
}

/// Hash a presented bearer value for lookup
pub fn digest(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cheap shape check so obviously bogus input never reaches the store
pub fn is_well_formed(raw: &str) -> bool {
    raw.len() == OPAQUE_TOKEN_BYTES * 2 && raw.bytes().all(|b| b.is_ascii_hexdigit())
}
