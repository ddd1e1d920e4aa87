//! Route definitions for the credential server API

mod auth;
mod user;

pub use auth::auth_routes;
pub use user::user_routes;

use axum::{routing::get, Router};

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Full API router without transport layers (CORS, tower-http tracing)
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(auth_routes())
        .merge(user_routes())
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::request_tracing))
}
