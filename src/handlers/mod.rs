//! API handlers for the credential server

pub mod auth;
pub mod health;
pub mod user;

pub use auth::*;
pub use health::{health_check, HealthResponse};
pub use user::get_current_user;

// Re-export AuthenticatedUser from middleware for handler use
pub use crate::middleware::auth::AuthenticatedUser;
