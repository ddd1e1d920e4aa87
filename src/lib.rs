//! Credential server library
//!
//! Password login with short-lived signed access tokens, rotating refresh tokens
//! with replay detection, and single-use password reset codes.

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod routes;
pub mod state;
pub mod store;
pub mod tasks;
