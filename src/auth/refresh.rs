//! Refresh token store
//!
//! Issues opaque refresh tokens and rotates them on every redemption. Each
//! redemption revokes the presented record and links it to its successor, so a
//! login session forms a chain with at most one active link. Presenting a link
//! that is already revoked is treated as theft and burns the rest of the chain.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::{ClientInfo, CredentialState, RefreshTokenRecord};
use crate::store::RefreshTokenRepository;

use super::error::AuthError;
use super::opaque::{self, OpaqueToken};

/// A newly persisted refresh token
///
/// `raw` is the bearer value; it exists only here and is never stored.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub raw: String,
    pub record: RefreshTokenRecord,
}

/// Result of a successful redemption
#[derive(Debug, Clone)]
pub struct Redemption {
    pub subject_id: Uuid,
    pub successor: IssuedRefreshToken,
}

#[derive(Clone)]
pub struct RefreshTokenStore {
    repo: Arc<dyn RefreshTokenRepository>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl RefreshTokenStore {
    pub fn new(repo: Arc<dyn RefreshTokenRepository>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { repo, clock, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn new_record(
        &self,
        subject_id: Uuid,
        client: &ClientInfo,
        token: &OpaqueToken,
        now: DateTime<Utc>,
    ) -> RefreshTokenRecord {
        RefreshTokenRecord {
            id: Uuid::new_v4(),
            token_hash: token.digest().to_string(),
            subject_id,
            client_addr: client.addr.clone(),
            user_agent: client.user_agent.clone(),
            created_at: now,
            expires_at: now + self.ttl,
            revoked: false,
            revoked_at: None,
            replaced_by: None,
        }
    }

    /// Start a new chain for `subject_id`
    pub async fn issue(
        &self,
        subject_id: Uuid,
        client: &ClientInfo,
    ) -> Result<IssuedRefreshToken, AuthError> {
        let token = OpaqueToken::generate();
        let record = self.new_record(subject_id, client, &token, self.clock.now());
        self.repo.insert(&record).await?;

        tracing::debug!(subject_id = %subject_id, record_id = %record.id, "Refresh token issued");

        Ok(IssuedRefreshToken {
            raw: token.into_raw(),
            record,
        })
    }

    /// Exchange a refresh token for its successor
    ///
    /// # Errors
    /// * `NotFound` - no record for this value
    /// * `ReplayDetected` - the record was already redeemed or revoked; the chain
    ///   from it onwards is revoked before returning
    /// * `Expired` - past `expires_at`
    /// * `Conflict` - a concurrent redemption of the same record won
    pub async fn redeem(&self, raw: &str, client: &ClientInfo) -> Result<Redemption, AuthError> {
        if !opaque::is_well_formed(raw) {
            return Err(AuthError::NotFound);
        }

        let now = self.clock.now();
        let record = self
            .repo
            .find_by_hash(&opaque::digest(raw))
            .await?
            .ok_or(AuthError::NotFound)?;

        match record.state(now) {
            CredentialState::Active => {}
            CredentialState::Expired => return Err(AuthError::Expired),
            CredentialState::Redeemed | CredentialState::Revoked | CredentialState::Consumed => {
                let chain_revoked = self.repo.revoke_chain(record.id, now).await?;
                tracing::warn!(
                    subject_id = %record.subject_id,
                    record_id = %record.id,
                    chain_revoked,
                    "Refresh token reuse detected, session chain revoked"
                );
                return Err(AuthError::ReplayDetected);
            }
        }

        let token = OpaqueToken::generate();
        let successor = self.new_record(record.subject_id, client, &token, now);

        if !self.repo.rotate(record.id, &successor, now).await? {
            tracing::info!(
                record_id = %record.id,
                "Concurrent refresh lost the rotation race"
            );
            return Err(AuthError::Conflict);
        }

        tracing::debug!(
            subject_id = %record.subject_id,
            parent_id = %record.id,
            record_id = %successor.id,
            "Refresh token rotated"
        );

        Ok(Redemption {
            subject_id: record.subject_id,
            successor: IssuedRefreshToken {
                raw: token.into_raw(),
                record: successor,
            },
        })
    }

    /// Revoke an active refresh token without a successor
    pub async fn revoke(&self, raw: &str) -> Result<(), AuthError> {
        if !opaque::is_well_formed(raw) {
            return Err(AuthError::NotFound);
        }

        let revoked = self
            .repo
            .revoke_active(&opaque::digest(raw), self.clock.now())
            .await?;

        if !revoked {
            return Err(AuthError::NotFound);
        }
        Ok(())
    }

    /// Revoke the given chain from `record_id` onwards
    pub async fn revoke_chain(&self, record_id: Uuid) -> Result<u64, AuthError> {
        Ok(self.repo.revoke_chain(record_id, self.clock.now()).await?)
    }

    /// Revoke every active refresh token of a subject
    pub async fn revoke_all(&self, subject_id: Uuid) -> Result<u64, AuthError> {
        Ok(self
            .repo
            .revoke_all_for_subject(subject_id, self.clock.now())
            .await?)
    }

    /// Delete expired records, and revoked ones older than one ttl
    pub async fn purge(&self) -> Result<u64, AuthError> {
        let now = self.clock.now();
        Ok(self.repo.purge(now, now - self.ttl).await?)
    }
}
