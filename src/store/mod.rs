//! Durable record store for refresh tokens and reset codes
//!
//! Every state transition is a conditional update keyed on the current state, so
//! concurrent writers (possibly in different processes) get at most one winner.
//! Implementations must not rely on in-process locking for that guarantee.

mod memory;
mod postgres;

pub use memory::{MemoryPasswordResetRepository, MemoryRefreshTokenRepository};
pub use postgres::{PgPasswordResetRepository, PgRefreshTokenRepository};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{PasswordResetRecord, RefreshTokenRecord};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Duplicate(e.to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError>;

    async fn find_by_hash(&self, token_hash: &str)
        -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Revoke `parent_id` and persist `successor` as one atomic unit
    ///
    /// The parent must still be active (not revoked, `expires_at > now`). Returns
    /// `false` without writing anything when it is not, i.e. another writer won.
    async fn rotate(
        &self,
        parent_id: Uuid,
        successor: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Revoke the active record with this digest; `false` if there was none
    async fn revoke_active(&self, token_hash: &str, now: DateTime<Utc>)
        -> Result<bool, StoreError>;

    /// Revoke `from_id` and every record reachable through `replaced_by`
    async fn revoke_chain(&self, from_id: Uuid, now: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn revoke_all_for_subject(
        &self,
        subject_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Delete records that expired before `expired_before` or were revoked
    /// before `revoked_before`
    async fn purge(
        &self,
        expired_before: DateTime<Utc>,
        revoked_before: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait PasswordResetRepository: Send + Sync {
    async fn insert(&self, record: &PasswordResetRecord) -> Result<(), StoreError>;

    async fn find_by_hash(&self, code_hash: &str)
        -> Result<Option<PasswordResetRecord>, StoreError>;

    /// Flip `consumed` false → true; `false` if it was already consumed or expired
    async fn mark_consumed(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Undo `mark_consumed` after the credential update behind it failed
    async fn release(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Mark every unconsumed code of a subject consumed; returns how many changed
    async fn consume_all_for_subject(
        &self,
        subject_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn purge(&self, expired_before: DateTime<Utc>) -> Result<u64, StoreError>;
}
