//! Signing key material for access tokens
//!
//! Built once at startup and injected into the codec. Never mutated afterwards;
//! rotating keys means constructing a new codec.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use std::fmt;
use thiserror::Error;

/// Shortest HS256 secret accepted (256 bits)
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Signing secret must be at least {MIN_SECRET_LEN} bytes, got {0}")]
    SecretTooShort(usize),
}

/// HMAC key pair used by the access token codec
#[derive(Clone)]
pub struct SigningKeys {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    /// Build HS256 keys from a shared secret
    pub fn from_secret(secret: &[u8]) -> Result<Self, KeyError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(KeyError::SecretTooShort(secret.len()));
        }

        Ok(Self {
            algorithm: Algorithm::HS256,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn encoding(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
