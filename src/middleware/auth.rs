//! Authentication middleware
//!
//! Access token verification and caller extraction.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AccessClaims, AuthService};
use crate::error::ApiError;

/// Header older clients send the bare access token in
pub const LEGACY_TOKEN_HEADER: &str = "token";

/// Caller identified by a verified access token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub roles: Vec<String>,
    pub claims: AccessClaims,
}

async fn bearer_token<S>(parts: &mut Parts, state: &S) -> Option<String>
where
    S: Send + Sync,
{
    if let Ok(TypedHeader(Authorization(bearer))) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await
    {
        return Some(bearer.token().to_string());
    }

    parts
        .headers
        .get(LEGACY_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extractor for authenticated users
///
/// Reads the access token from `Authorization: Bearer` or the legacy `token`
/// header. Every failure (missing header, bad signature, expiry) is the same 401.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(user: AuthenticatedUser) -> impl IntoResponse {
///     format!("Hello, user {}", user.user_id)
/// }
/// ```
#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts, state)
            .await
            .ok_or_else(|| ApiError::invalid_credentials().into_response())?;

        let auth_service = Arc::<AuthService>::from_ref(state);

        let claims = auth_service.authenticate(&token).map_err(|e| {
            tracing::debug!(code = e.code(), "Access token rejected");
            ApiError::invalid_credentials().into_response()
        })?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            roles: claims.roles.clone(),
            claims,
        })
    }
}
