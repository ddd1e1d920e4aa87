//! User directory
//!
//! The source of truth for accounts, password hashes and roles. The credential
//! core reads accounts and asks the directory to change passwords; it never
//! touches the user table itself.

mod memory;
mod postgres;

pub use memory::MemoryUserDirectory;
pub use postgres::PgUserDirectory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::password;
use crate::models::Identity;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Username already registered")]
    UsernameTaken,

    #[error("User not found")]
    NotFound,

    #[error("Directory backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for DirectoryError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => DirectoryError::UsernameTaken,
            _ => DirectoryError::Backend(e.to_string()),
        }
    }
}

/// Stored user account
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub id: Uuid,
    pub username: String,
    pub email_address: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub password_hash: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn identity(&self) -> Identity {
        Identity {
            subject_id: self.id,
            roles: self.roles.clone(),
        }
    }
}

/// Fields for a new account; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email_address: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub password_hash: String,
    pub roles: Vec<String>,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserAccount>, DirectoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserAccount>, DirectoryError>;

    /// Compare a candidate password with a stored hash
    async fn verify_password(&self, hash: &str, candidate: &str) -> Result<bool, DirectoryError> {
        password::verify_password(candidate.to_string(), hash.to_string())
            .await
            .map_err(|e| DirectoryError::Backend(e.to_string()))
    }

    /// Replace the password hash; `NotFound` if the account is gone
    async fn update_password(&self, id: Uuid, new_hash: &str) -> Result<(), DirectoryError>;

    async fn create_user(&self, user: NewUser) -> Result<Uuid, DirectoryError>;
}
