//! Access token codec
//!
//! Encodes and verifies the short-lived, self-contained access tokens. Verification
//! never touches a store: once issued, a token stays valid until its `exp`.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::Identity;

use super::keys::SigningKeys;

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

/// Claims carried by an access token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Role names, in the order the directory returned them
    pub roles: Vec<String>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl AccessClaims {
    pub fn identity(&self) -> Identity {
        Identity {
            subject_id: self.sub,
            roles: self.roles.clone(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    fn check_preconditions(&self) -> Result<(), TokenError> {
        if self.sub.is_nil() {
            return Err(TokenError::Malformed("subject is empty".to_string()));
        }
        if self.exp <= self.iat {
            return Err(TokenError::Malformed(
                "expiry does not follow issue time".to_string(),
            ));
        }
        if self.roles.iter().any(|r| r.trim().is_empty()) {
            return Err(TokenError::Malformed("blank role name".to_string()));
        }
        Ok(())
    }
}

fn ceil_timestamp(at: DateTime<Utc>) -> i64 {
    if at.timestamp_subsec_nanos() > 0 {
        at.timestamp() + 1
    } else {
        at.timestamp()
    }
}

/// Stateless signer/verifier for access tokens
#[derive(Clone)]
pub struct AccessTokenCodec {
    keys: Arc<SigningKeys>,
    clock: Arc<dyn Clock>,
    validation: Validation,
}

impl AccessTokenCodec {
    pub fn new(keys: SigningKeys, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(keys.algorithm());
        // Expiry is checked against the injected clock, not jsonwebtoken's
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            keys: Arc::new(keys),
            clock,
            validation,
        }
    }

    /// Sign a fresh access token for `identity` valid for `ttl`
    ///
    /// Claims have whole-second granularity. `exp` is rounded up, so a token is
    /// never rejected before `now + ttl` and may outlive it by under a second.
    ///
    /// # Returns
    /// * `Ok((token, claims))` with the claims that were signed
    /// * `Err(TokenError::Malformed)` if the identity or ttl is unusable
    pub fn issue(
        &self,
        identity: &Identity,
        ttl: Duration,
    ) -> Result<(String, AccessClaims), TokenError> {
        if ttl <= Duration::zero() {
            return Err(TokenError::Malformed("ttl must be positive".to_string()));
        }

        let now = self.clock.now();
        let claims = AccessClaims {
            sub: identity.subject_id,
            roles: identity.roles.clone(),
            iat: now.timestamp(),
            exp: ceil_timestamp(now + ttl),
        };
        claims.check_preconditions()?;

        let token = encode(
            &Header::new(self.keys.algorithm()),
            &claims,
            self.keys.encoding(),
        )
        .map_err(|e| TokenError::Encoding(e.to_string()))?;

        Ok((token, claims))
    }

    /// Verify signature and expiry, returning the decoded claims
    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let now = self.clock.now().timestamp();

        let data = decode::<AccessClaims>(token, self.keys.decoding(), &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed(e.to_string()),
            })?;

        let claims = data.claims;
        claims.check_preconditions()?;

        if now >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}
