//! Credential records and request/response DTOs

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::directory::UserAccount;

/// Lifecycle state shared by refresh tokens and reset codes
///
/// `Active` is the only state from which a redeem or consume may proceed.
/// Terminal flags win over expiry, so a reused rotated token is reported as
/// `Redeemed` even after it has expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Active,
    /// Rotated; a successor record exists
    Redeemed,
    Revoked,
    Consumed,
    Expired,
}

/// Persisted refresh token (only the digest of the bearer value is stored)
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub token_hash: String,
    pub subject_id: Uuid,
    pub client_addr: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by: Option<Uuid>,
}

impl RefreshTokenRecord {
    pub fn state(&self, now: DateTime<Utc>) -> CredentialState {
        match (self.revoked, self.replaced_by) {
            (true, Some(_)) => CredentialState::Redeemed,
            (true, None) => CredentialState::Revoked,
            (false, _) if self.expires_at <= now => CredentialState::Expired,
            _ => CredentialState::Active,
        }
    }
}

/// Persisted password reset code
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct PasswordResetRecord {
    pub id: Uuid,
    pub code_hash: String,
    pub subject_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl PasswordResetRecord {
    pub fn state(&self, now: DateTime<Utc>) -> CredentialState {
        if self.consumed {
            CredentialState::Consumed
        } else if self.expires_at <= now {
            CredentialState::Expired
        } else {
            CredentialState::Active
        }
    }
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 128))]
    pub username: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(length(min = 1, max = 128))]
    pub username: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyChangePasswordRequest {
    #[validate(length(min = 1))]
    pub code: String,
    #[validate(length(min = 8, max = 256))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistrationRequest {
    #[validate(length(min = 3, max = 64))]
    pub username: String,
    #[validate(length(min = 8, max = 256))]
    pub password: String,
    #[validate(email)]
    pub email_address: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(length(max = 32))]
    pub phone_number: Option<String>,
}

/// Access + refresh token pair returned by login and refresh
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokensResponse {
    pub token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct SuccessResponse {
    pub success: bool,
}

/// User profile (sanitized for API)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email_address: String,
    pub first_name: String,
    pub last_name: String,
    pub roles: Vec<String>,
}

impl From<UserAccount> for UserResponse {
    fn from(account: UserAccount) -> Self {
        Self {
            id: account.id,
            username: account.username,
            email_address: account.email_address,
            first_name: account.first_name,
            last_name: account.last_name,
            roles: account.roles,
        }
    }
}
