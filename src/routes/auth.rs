//! Authentication routes

use axum::{routing::post, Router};

use crate::handlers::auth;
use crate::state::AppState;

/// Create authentication routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/tokenRefresh", post(auth::token_refresh))
        .route("/api/auth/logout", post(auth::logout))
        .route(
            "/api/auth/passwordResetRequest",
            post(auth::password_reset_request),
        )
        .route(
            "/api/auth/verifyAndChangePassword",
            post(auth::verify_and_change_password),
        )
        .route("/api/auth/register", post(auth::register))
}
