//! Password hashing
//!
//! bcrypt is CPU bound, so both directions run on tokio's blocking pool.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Hashing task failed: {0}")]
    Join(String),
}

pub async fn hash_password(plain: String, cost: u32) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(plain, cost))
        .await
        .map_err(|e| PasswordError::Join(e.to_string()))?
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Compare a candidate against a stored bcrypt hash
///
/// An unparseable stored hash counts as a mismatch.
pub async fn verify_password(candidate: String, hash: String) -> Result<bool, PasswordError> {
    let outcome = tokio::task::spawn_blocking(move || bcrypt::verify(candidate, &hash))
        .await
        .map_err(|e| PasswordError::Join(e.to_string()))?;

    match outcome {
        Ok(matches) => Ok(matches),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash could not be parsed");
            Ok(false)
        }
    }
}
