//! Configuration management for the credential server
//!
//! This module handles loading and validating configuration from environment variables,
//! with support for different environments (development, staging, production).

use chrono::Duration;
use std::env;
use thiserror::Error;

use crate::auth::{AuthSettings, MIN_SECRET_LEN};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Get the environment name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

const DEV_JWT_SECRET: &str = "development-secret-change-in-production-0000";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Current environment
    pub environment: Environment,

    /// Server port
    pub port: u16,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// CORS allowed origins
    pub cors_allowed_origins: Option<String>,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// HMAC secret for access token signing
    pub jwt_secret: String,

    /// Access token TTL in seconds (default: 900 = 15 minutes)
    pub jwt_access_token_ttl_seconds: i64,

    /// Refresh token TTL in days (default: 7)
    pub refresh_token_ttl_days: i64,

    /// Password reset code TTL in minutes (default: 15)
    pub password_reset_ttl_minutes: i64,

    pub bcrypt_cost: u32,

    /// Roles assigned at registration
    pub default_roles: Vec<String>,

    /// Where reset codes are POSTed; unset means log-only delivery
    pub reset_webhook_url: Option<String>,

    pub notify_timeout_seconds: u64,

    /// Period of the expired-record purge
    pub purge_interval_seconds: u64,
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .map(|s| Environment::from_str(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", 5u32);

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS").ok();

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) => secret,
            Err(_) if environment.is_production() => {
                return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()))
            }
            Err(_) => DEV_JWT_SECRET.to_string(),
        };
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::InvalidValue(format!(
                "JWT_SECRET must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }

        let jwt_access_token_ttl_seconds = parse_or("JWT_ACCESS_TOKEN_TTL_SECONDS", 900i64);
        let refresh_token_ttl_days = parse_or("REFRESH_TOKEN_TTL_DAYS", 7i64);
        let password_reset_ttl_minutes = parse_or("PASSWORD_RESET_TTL_MINUTES", 15i64);

        if jwt_access_token_ttl_seconds <= 0
            || refresh_token_ttl_days <= 0
            || password_reset_ttl_minutes <= 0
        {
            return Err(ConfigError::InvalidValue(
                "token lifetimes must be positive".to_string(),
            ));
        }

        let bcrypt_cost = parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST);
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::InvalidValue(format!(
                "BCRYPT_COST must be between 4 and 31, got {}",
                bcrypt_cost
            )));
        }

        let default_roles = parse_roles(
            &env::var("DEFAULT_ROLES").unwrap_or_else(|_| "user".to_string()),
        );

        let reset_webhook_url = env::var("RESET_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let notify_timeout_seconds = parse_or("NOTIFY_TIMEOUT_SECONDS", 5u64);
        let purge_interval_seconds = parse_or("PURGE_INTERVAL_SECONDS", 900u64).max(1);

        Ok(Config {
            database_url,
            environment,
            port,
            db_max_connections,
            cors_allowed_origins,
            log_level,
            jwt_secret,
            jwt_access_token_ttl_seconds,
            refresh_token_ttl_days,
            password_reset_ttl_minutes,
            bcrypt_cost,
            default_roles,
            reset_webhook_url,
            notify_timeout_seconds,
            purge_interval_seconds,
        })
    }

    /// Get database URL (useful for logging masked version)
    pub fn database_url_masked(&self) -> String {
        // Mask password in database URL for logging
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let prefix = &self.database_url[..colon_pos + 1];
                let suffix = &self.database_url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.database_url.clone()
    }

    /// The auth-core subset of the configuration
    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            access_token_ttl: Duration::seconds(self.jwt_access_token_ttl_seconds),
            refresh_token_ttl: Duration::days(self.refresh_token_ttl_days),
            password_reset_ttl: Duration::minutes(self.password_reset_ttl_minutes),
            bcrypt_cost: self.bcrypt_cost,
            default_roles: self.default_roles.clone(),
        }
    }
}

fn parse_roles(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}
