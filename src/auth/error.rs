//! Credential lifecycle error taxonomy
//!
//! The core returns these kinds and never formats user-facing text; the HTTP
//! layer decides status codes and messages.

use thiserror::Error;

use crate::directory::DirectoryError;
use crate::store::StoreError;

use super::jwt::TokenError;
use super::password::PasswordError;

/// Errors produced by the credential lifecycle core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Malformed input: {0}")]
    Malformed(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Credential expired")]
    Expired,

    #[error("Credential not found")]
    NotFound,

    #[error("Refresh token reuse detected")]
    ReplayDetected,

    #[error("Credential already consumed")]
    AlreadyConsumed,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Concurrent update lost the race")]
    Conflict,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Malformed(_) => "MALFORMED",
            AuthError::InvalidSignature => "INVALID_SIGNATURE",
            AuthError::Expired => "EXPIRED",
            AuthError::NotFound => "NOT_FOUND",
            AuthError::ReplayDetected => "REPLAY_DETECTED",
            AuthError::AlreadyConsumed => "ALREADY_CONSUMED",
            AuthError::Unauthorized => "UNAUTHORIZED",
            AuthError::Conflict => "CONFLICT",
            AuthError::Validation(_) => "VALIDATION_ERROR",
            AuthError::Upstream(_) => "UPSTREAM_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Kinds that collapse to `Unauthorized` at the caller boundary
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::Unauthorized
                | AuthError::ReplayDetected
                | AuthError::InvalidSignature
                | AuthError::Expired
                | AuthError::Malformed(_)
        )
    }

    /// Failures caused by infrastructure rather than by the presented credential
    pub fn is_server_fault(&self) -> bool {
        matches!(self, AuthError::Upstream(_) | AuthError::Internal(_))
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Malformed(detail) => AuthError::Malformed(detail),
            TokenError::InvalidSignature => AuthError::InvalidSignature,
            TokenError::Expired => AuthError::Expired,
            TokenError::Encoding(detail) => AuthError::Internal(detail),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Upstream(e.to_string())
    }
}

impl From<DirectoryError> for AuthError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::UsernameTaken => {
                AuthError::Validation("username already registered".to_string())
            }
            other => AuthError::Upstream(other.to_string()),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(e: PasswordError) -> Self {
        AuthError::Internal(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(e: validator::ValidationErrors) -> Self {
        AuthError::Validation(e.to_string())
    }
}
