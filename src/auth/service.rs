//! Authentication service
//!
//! Session orchestration for password-based login: composes the access token
//! codec, the refresh token store and the reset flow into the use cases the HTTP
//! layer calls.

use chrono::Duration;
use std::sync::Arc;
use validator::Validate;

use crate::clock::Clock;
use crate::directory::{NewUser, UserAccount, UserDirectory};
use crate::models::{AuthTokensResponse, ClientInfo, Identity, UserRegistrationRequest};
use crate::notify::NotificationSender;
use crate::store::{PasswordResetRepository, RefreshTokenRepository};

use super::error::AuthError;
use super::jwt::{AccessClaims, AccessTokenCodec};
use super::keys::SigningKeys;
use super::password;
use super::refresh::RefreshTokenStore;
use super::reset::PasswordResetFlow;

/// Lifetimes and policy knobs for the auth core
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub password_reset_ttl: Duration,
    pub bcrypt_cost: u32,
    /// Roles assigned to self-registered accounts
    pub default_roles: Vec<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::minutes(15),
            refresh_token_ttl: Duration::days(7),
            password_reset_ttl: Duration::minutes(15),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            default_roles: vec!["user".to_string()],
        }
    }
}

/// External collaborators the service is built from
#[derive(Clone)]
pub struct AuthBackends {
    pub refresh_tokens: Arc<dyn RefreshTokenRepository>,
    pub password_resets: Arc<dyn PasswordResetRepository>,
    pub directory: Arc<dyn UserDirectory>,
    pub notifier: Arc<dyn NotificationSender>,
    pub clock: Arc<dyn Clock>,
}

/// Rows removed by one garbage-collection pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub refresh_tokens: u64,
    pub password_resets: u64,
}

/// Authentication service
pub struct AuthService {
    codec: AccessTokenCodec,
    refresh_tokens: RefreshTokenStore,
    password_resets: PasswordResetFlow,
    directory: Arc<dyn UserDirectory>,
    settings: AuthSettings,
    /// Verified against for unknown usernames; built once in `new`
    dummy_hash: Option<String>,
}

impl AuthService {
    /// Build the service
    ///
    /// Computes one bcrypt hash at the configured cost, so the first login for
    /// an unknown username costs the same as every later one. Call it at
    /// startup, not per request.
    pub fn new(keys: SigningKeys, backends: AuthBackends, settings: AuthSettings) -> Self {
        let codec = AccessTokenCodec::new(keys, backends.clock.clone());
        let refresh_tokens = RefreshTokenStore::new(
            backends.refresh_tokens,
            backends.clock.clone(),
            settings.refresh_token_ttl,
        );
        let password_resets = PasswordResetFlow::new(
            backends.password_resets,
            backends.directory.clone(),
            backends.notifier,
            backends.clock,
            settings.password_reset_ttl,
            settings.bcrypt_cost,
        );

        let dummy_hash = match bcrypt::hash("timing-equalizer", settings.bcrypt_cost) {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::error!(error = %e, "Failed to prepare timing equalisation hash");
                None
            }
        };

        Self {
            codec,
            refresh_tokens,
            password_resets,
            directory: backends.directory,
            settings,
            dummy_hash,
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    fn tokens_response(
        &self,
        identity: &Identity,
        refresh_token: String,
        include_roles: bool,
    ) -> Result<AuthTokensResponse, AuthError> {
        let (token, _) = self.codec.issue(identity, self.settings.access_token_ttl)?;

        Ok(AuthTokensResponse {
            token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.settings.access_token_ttl.num_seconds(),
            roles: include_roles.then(|| identity.roles.clone()),
        })
    }

    /// Burn one bcrypt verification so unknown usernames cost the same as wrong passwords
    async fn equalize_timing(&self, candidate: &str) {
        if let Some(hash) = &self.dummy_hash {
            let _ = self.directory.verify_password(hash, candidate).await;
        }
    }

    /// Authenticate credentials and open a new session chain
    ///
    /// Unknown usernames and wrong passwords both yield `Unauthorized`.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<AuthTokensResponse, AuthError> {
        let account = match self.directory.find_by_username(username.trim()).await? {
            Some(account) => account,
            None => {
                self.equalize_timing(password).await;
                return Err(AuthError::Unauthorized);
            }
        };

        if !self
            .directory
            .verify_password(&account.password_hash, password)
            .await?
        {
            return Err(AuthError::Unauthorized);
        }

        let issued = self.refresh_tokens.issue(account.id, client).await?;
        let response = self.tokens_response(&account.identity(), issued.raw, true)?;

        tracing::info!(subject_id = %account.id, "User logged in");
        Ok(response)
    }

    /// Rotate a refresh token and mint a fresh access token
    ///
    /// Reuse of a burned token comes back as `ReplayDetected` so it can be
    /// audited; every other rejection is `Unauthorized`.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientInfo,
    ) -> Result<AuthTokensResponse, AuthError> {
        let redemption = self
            .refresh_tokens
            .redeem(refresh_token, client)
            .await
            .map_err(|e| match e {
                AuthError::NotFound | AuthError::Expired | AuthError::Conflict => {
                    AuthError::Unauthorized
                }
                other => other,
            })?;

        let account = match self.directory.find_by_id(redemption.subject_id).await? {
            Some(account) => account,
            None => {
                self.refresh_tokens
                    .revoke_chain(redemption.successor.record.id)
                    .await?;
                tracing::warn!(
                    subject_id = %redemption.subject_id,
                    "Refresh for a subject that no longer exists"
                );
                return Err(AuthError::Unauthorized);
            }
        };

        self.tokens_response(&account.identity(), redemption.successor.raw, false)
    }

    /// End a session; unknown or already revoked tokens count as logged out
    pub async fn logout(&self, refresh_token: &str) -> Result<bool, AuthError> {
        match self.refresh_tokens.revoke(refresh_token).await {
            Ok(()) => Ok(true),
            Err(AuthError::NotFound) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Always `true` unless storage is down, whether or not the user exists
    pub async fn request_password_reset(&self, username: &str) -> Result<bool, AuthError> {
        self.password_resets.request_reset(username.trim()).await?;
        Ok(true)
    }

    /// Consume a reset code, change the password and end all open sessions
    pub async fn verify_and_change_password(
        &self,
        code: &str,
        new_password: &str,
    ) -> Result<bool, AuthError> {
        let subject_id = self
            .password_resets
            .verify_and_consume(code.trim(), new_password)
            .await?;

        match self.refresh_tokens.revoke_all(subject_id).await {
            Ok(revoked) => {
                tracing::info!(subject_id = %subject_id, revoked, "Sessions revoked after password reset")
            }
            Err(e) => {
                tracing::warn!(subject_id = %subject_id, error = %e, "Failed to revoke sessions after password reset")
            }
        }

        Ok(true)
    }

    pub async fn register(&self, request: UserRegistrationRequest) -> Result<bool, AuthError> {
        request.validate()?;

        let password_hash =
            password::hash_password(request.password, self.settings.bcrypt_cost).await?;

        let subject_id = self
            .directory
            .create_user(NewUser {
                username: request.username.trim().to_string(),
                email_address: request.email_address.trim().to_lowercase(),
                first_name: request.first_name,
                last_name: request.last_name,
                phone_number: request.phone_number,
                password_hash,
                roles: self.settings.default_roles.clone(),
            })
            .await?;

        tracing::info!(subject_id = %subject_id, "User registered");
        Ok(true)
    }

    /// Verify an access token (stateless)
    pub fn authenticate(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
        Ok(self.codec.verify(access_token)?)
    }

    /// Profile of the subject behind verified claims
    pub async fn current_user(&self, claims: &AccessClaims) -> Result<UserAccount, AuthError> {
        self.directory
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::NotFound)
    }

    /// Drop expired and long-terminal records
    pub async fn purge_expired(&self) -> Result<PurgeReport, AuthError> {
        Ok(PurgeReport {
            refresh_tokens: self.refresh_tokens.purge().await?,
            password_resets: self.password_resets.purge().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::directory::MemoryUserDirectory;
    use crate::notify::LogNotificationSender;
    use crate::store::{MemoryPasswordResetRepository, MemoryRefreshTokenRepository};
    use chrono::Utc;

    fn service() -> AuthService {
        let backends = AuthBackends {
            refresh_tokens: Arc::new(MemoryRefreshTokenRepository::new()),
            password_resets: Arc::new(MemoryPasswordResetRepository::new()),
            directory: Arc::new(MemoryUserDirectory::new()),
            notifier: Arc::new(LogNotificationSender),
            clock: Arc::new(ManualClock::new(Utc::now())),
        };
        let settings = AuthSettings {
            bcrypt_cost: 4,
            ..AuthSettings::default()
        };
        AuthService::new(
            SigningKeys::from_secret(b"unit-test-secret-unit-test-secret").unwrap(),
            backends,
            settings,
        )
    }

    fn registration(username: &str, password: &str) -> UserRegistrationRequest {
        UserRegistrationRequest {
            username: username.to_string(),
            password: password.to_string(),
            email_address: format!("{}@example.com", username),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            phone_number: None,
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let service = service();
        assert!(service
            .register(registration("alice", "correct-pw"))
            .await
            .unwrap());

        let tokens = service
            .login("alice", "correct-pw", &ClientInfo::default())
            .await
            .unwrap();
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, 900);
        assert_eq!(tokens.roles, Some(vec!["user".to_string()]));

        let claims = service.authenticate(&tokens.token).unwrap();
        let user = service.current_user(&claims).await.unwrap();
        assert_eq!(user.username, "alice");
    }

    #[test]
    fn test_timing_hash_ready_before_first_login() {
        let service = service();
        let hash = service.dummy_hash.as_deref().unwrap();
        assert!(hash.starts_with("$2b$04$"));
    }

    #[tokio::test]
    async fn test_unknown_user_and_wrong_password_look_alike() {
        let service = service();
        service
            .register(registration("alice", "correct-pw"))
            .await
            .unwrap();

        let wrong_pw = service
            .login("alice", "wrong-pw", &ClientInfo::default())
            .await
            .unwrap_err();
        let no_user = service
            .login("mallory", "whatever", &ClientInfo::default())
            .await
            .unwrap_err();

        assert_eq!(wrong_pw, AuthError::Unauthorized);
        assert_eq!(no_user, wrong_pw);
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_and_duplicate() {
        let service = service();
        assert!(matches!(
            service.register(registration("al", "short")).await,
            Err(AuthError::Validation(_))
        ));

        service
            .register(registration("alice", "correct-pw"))
            .await
            .unwrap();
        assert!(matches!(
            service.register(registration("alice", "another-pw")).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let service = service();
        service
            .register(registration("alice", "correct-pw"))
            .await
            .unwrap();
        let tokens = service
            .login("alice", "correct-pw", &ClientInfo::default())
            .await
            .unwrap();

        assert!(service.logout(&tokens.refresh_token).await.unwrap());
        assert!(service.logout(&tokens.refresh_token).await.unwrap());
        assert!(service.logout("never-issued").await.unwrap());
    }
}
