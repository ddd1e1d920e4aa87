//! Middleware for the credential server API
//!
//! Request tracing plus the extractors for authenticated callers and client
//! metadata.

pub mod auth;
mod client;
mod tracing;

pub use auth::{AuthenticatedUser, LEGACY_TOKEN_HEADER};
pub use client::forwarded_client_ip;
pub use tracing::request_tracing;
