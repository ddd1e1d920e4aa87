//! Authentication HTTP handlers
//!
//! Endpoints for password login, session refresh and password reset.

use axum::{extract::State, Json};
use validator::Validate;

use crate::auth::AuthError;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AuthTokensResponse, ClientInfo, LoginRequest, PasswordResetRequest, SuccessResponse,
    TokenRefreshRequest, UserRegistrationRequest, VerifyChangePasswordRequest,
};
use crate::state::AppState;

/// POST /api/auth/login - Exchange credentials for a token pair
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthTokensResponse>> {
    req.validate()
        .map_err(|_| ApiError::invalid_credentials())?;

    let tokens = state
        .auth_service
        .login(&req.username, &req.password, &client)
        .await?;

    Ok(Json(tokens))
}

/// POST /api/auth/tokenRefresh - Rotate the refresh token
pub async fn token_refresh(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(req): Json<TokenRefreshRequest>,
) -> ApiResult<Json<AuthTokensResponse>> {
    let tokens = state
        .auth_service
        .refresh(&req.refresh_token, &client)
        .await?;

    Ok(Json(tokens))
}

/// POST /api/auth/logout - Revoke the presented refresh token
pub async fn logout(
    State(state): State<AppState>,
    Json(req): Json<TokenRefreshRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let success = state.auth_service.logout(&req.refresh_token).await?;

    Ok(Json(SuccessResponse { success }))
}

/// POST /api/auth/passwordResetRequest - Send a reset code if the user exists
///
/// The response is the same whether or not the username is known.
pub async fn password_reset_request(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    req.validate()?;

    let success = state
        .auth_service
        .request_password_reset(&req.username)
        .await?;

    Ok(Json(SuccessResponse { success }))
}

/// POST /api/auth/verifyAndChangePassword - Redeem a reset code
pub async fn verify_and_change_password(
    State(state): State<AppState>,
    Json(req): Json<VerifyChangePasswordRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    req.validate()?;

    let success = state
        .auth_service
        .verify_and_change_password(&req.code, &req.password)
        .await
        .map_err(|e| match e {
            AuthError::NotFound | AuthError::Expired | AuthError::AlreadyConsumed => {
                ApiError::BadRequest("Invalid or expired reset code".to_string())
            }
            other => other.into(),
        })?;

    Ok(Json(SuccessResponse { success }))
}

/// POST /api/auth/register - Create an account
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<UserRegistrationRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let success = state.auth_service.register(req).await?;

    Ok(Json(SuccessResponse { success }))
}
