//! User-related API handlers

use axum::{extract::State, Json};

use super::AuthenticatedUser;
use crate::auth::AuthError;
use crate::error::{ApiError, ApiResult};
use crate::models::UserResponse;
use crate::state::AppState;

/// GET /api/user - Profile of the caller
pub async fn get_current_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<UserResponse>> {
    let account = state
        .auth_service
        .current_user(&user.claims)
        .await
        .map_err(|e| match e {
            // Token outlived its account
            AuthError::NotFound => ApiError::invalid_credentials(),
            other => other.into(),
        })?;

    Ok(Json(account.into()))
}
