//! Data models for the credential server

pub mod auth;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use auth::{
    AuthTokensResponse, CredentialState, LoginRequest, PasswordResetRecord,
    PasswordResetRequest, RefreshTokenRecord, SuccessResponse, TokenRefreshRequest,
    UserRegistrationRequest, UserResponse, VerifyChangePasswordRequest,
};

/// Authenticated subject: user id plus ordered role names
///
/// Owned by the user directory; the core only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject_id: Uuid,
    pub roles: Vec<String>,
}

/// Where a request came from, recorded on refresh-token records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub addr: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(addr: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            addr: Some(addr.into()),
            user_agent: Some(user_agent.into()),
        }
    }
}
