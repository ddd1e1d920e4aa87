//! Password reset flow
//!
//! Single-use reset codes: `request_reset` mints one and hands it to the
//! notification sender in the background, `verify_and_consume` burns it and
//! changes the password. A code is only burned if the password change behind it
//! succeeded, and a successful change burns the subject's other codes too.

use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::directory::UserDirectory;
use crate::models::{CredentialState, PasswordResetRecord};
use crate::notify::{NotificationSender, ResetNotice};
use crate::store::PasswordResetRepository;

use super::error::AuthError;
use super::opaque::{self, OpaqueToken};
use super::password;

#[derive(Clone)]
pub struct PasswordResetFlow {
    repo: Arc<dyn PasswordResetRepository>,
    directory: Arc<dyn UserDirectory>,
    notifier: Arc<dyn NotificationSender>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    bcrypt_cost: u32,
}

impl PasswordResetFlow {
    pub fn new(
        repo: Arc<dyn PasswordResetRepository>,
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            repo,
            directory,
            notifier,
            clock,
            ttl,
            bcrypt_cost,
        }
    }

    /// Issue a reset code for `username` and dispatch it
    ///
    /// Unknown usernames succeed silently so callers cannot probe for accounts.
    /// Only storage or directory outages surface as errors.
    pub async fn request_reset(&self, username: &str) -> Result<(), AuthError> {
        let account = match self.directory.find_by_username(username).await? {
            Some(account) => account,
            None => {
                tracing::debug!("Password reset requested for unknown username");
                return Ok(());
            }
        };

        let now = self.clock.now();
        let code = OpaqueToken::generate();
        let record = PasswordResetRecord {
            id: Uuid::new_v4(),
            code_hash: code.digest().to_string(),
            subject_id: account.id,
            created_at: now,
            expires_at: now + self.ttl,
            consumed: false,
            consumed_at: None,
        };
        self.repo.insert(&record).await?;

        let notice = ResetNotice {
            subject_id: account.id,
            username: account.username,
            email_address: account.email_address,
            code: code.into_raw(),
            expires_at: record.expires_at,
        };

        // Delivery runs detached so the caller never waits on the sender
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send_reset_code(&notice).await {
                tracing::warn!(
                    subject_id = %notice.subject_id,
                    error = %e,
                    "Failed to deliver password reset code"
                );
            }
        });

        Ok(())
    }

    /// Consume `code` and set `new_password` for its owner
    ///
    /// Returns the subject whose password changed.
    ///
    /// # Errors
    /// * `NotFound` / `Expired` / `AlreadyConsumed` for unusable codes
    /// * `Upstream` if the directory update failed; the code stays usable
    pub async fn verify_and_consume(&self, code: &str, new_password: &str) -> Result<Uuid, AuthError> {
        if !opaque::is_well_formed(code) {
            return Err(AuthError::NotFound);
        }

        let now = self.clock.now();
        let record = self
            .repo
            .find_by_hash(&opaque::digest(code))
            .await?
            .ok_or(AuthError::NotFound)?;

        match record.state(now) {
            CredentialState::Active => {}
            CredentialState::Expired => return Err(AuthError::Expired),
            CredentialState::Consumed | CredentialState::Redeemed | CredentialState::Revoked => {
                return Err(AuthError::AlreadyConsumed)
            }
        }

        // Hash before claiming the code so the claimed window stays short
        let new_hash = password::hash_password(new_password.to_string(), self.bcrypt_cost).await?;

        if !self.repo.mark_consumed(record.id, now).await? {
            return Err(AuthError::AlreadyConsumed);
        }

        if let Err(e) = self.directory.update_password(record.subject_id, &new_hash).await {
            tracing::error!(
                subject_id = %record.subject_id,
                error = %e,
                "Password update failed, releasing reset code"
            );
            if let Err(release_err) = self.repo.release(record.id).await {
                tracing::error!(
                    record_id = %record.id,
                    error = %release_err,
                    "Failed to release reset code after password update failure"
                );
            }
            return Err(e.into());
        }

        match self.repo.consume_all_for_subject(record.subject_id, now).await {
            Ok(0) => {}
            Ok(siblings) => tracing::debug!(
                subject_id = %record.subject_id,
                siblings,
                "Outstanding reset codes invalidated"
            ),
            Err(e) => tracing::error!(
                subject_id = %record.subject_id,
                error = %e,
                "Failed to invalidate outstanding reset codes"
            ),
        }

        tracing::info!(subject_id = %record.subject_id, "Password changed via reset code");
        Ok(record.subject_id)
    }

    pub async fn purge(&self) -> Result<u64, AuthError> {
        Ok(self.repo.purge(self.clock.now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::directory::{MemoryUserDirectory, NewUser};
    use crate::notify::NotifyError;
    use crate::store::MemoryPasswordResetRepository;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingSender {
        notices: Mutex<Vec<ResetNotice>>,
    }

    impl CapturingSender {
        fn last_code(&self) -> Option<String> {
            self.notices.lock().unwrap().last().map(|n| n.code.clone())
        }

        /// Wait until `count` notices have been delivered in the background
        async fn delivered(&self, count: usize) -> Vec<ResetNotice> {
            for _ in 0..200 {
                let notices = self.notices.lock().unwrap().clone();
                if notices.len() >= count {
                    return notices;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
            self.notices.lock().unwrap().clone()
        }

        async fn delivered_code(&self) -> Option<String> {
            self.delivered(1).await.last().map(|n| n.code.clone())
        }
    }

    /// Sender that takes half a second per notice
    #[derive(Default)]
    struct SlowSender {
        inner: CapturingSender,
    }

    #[async_trait]
    impl NotificationSender for SlowSender {
        async fn send_reset_code(&self, notice: &ResetNotice) -> Result<(), NotifyError> {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            self.inner.send_reset_code(notice).await
        }
    }

    #[async_trait]
    impl NotificationSender for CapturingSender {
        async fn send_reset_code(&self, notice: &ResetNotice) -> Result<(), NotifyError> {
            self.notices.lock().unwrap().push(notice.clone());
            Ok(())
        }
    }

    struct Fixture {
        flow: PasswordResetFlow,
        directory: Arc<MemoryUserDirectory>,
        sender: Arc<CapturingSender>,
        clock: Arc<ManualClock>,
        user_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let directory = Arc::new(MemoryUserDirectory::new());
        let user_id = directory
            .create_user(NewUser {
                username: "bob".to_string(),
                email_address: "bob@example.com".to_string(),
                first_name: "Bob".to_string(),
                last_name: "Smith".to_string(),
                phone_number: None,
                password_hash: "unused".to_string(),
                roles: vec!["user".to_string()],
            })
            .await
            .unwrap();

        let sender = Arc::new(CapturingSender::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let flow = PasswordResetFlow::new(
            Arc::new(MemoryPasswordResetRepository::new()),
            directory.clone(),
            sender.clone(),
            clock.clone(),
            Duration::minutes(15),
            4,
        );

        Fixture {
            flow,
            directory,
            sender,
            clock,
            user_id,
        }
    }

    #[tokio::test]
    async fn test_code_consumed_once() {
        let f = fixture().await;
        f.flow.request_reset("bob").await.unwrap();
        let code = f.sender.delivered_code().await.unwrap();

        let subject = f.flow.verify_and_consume(&code, "new-password-1").await.unwrap();
        assert_eq!(subject, f.user_id);

        let account = f.directory.find_by_id(f.user_id).await.unwrap().unwrap();
        assert!(bcrypt::verify("new-password-1", &account.password_hash).unwrap());

        assert_eq!(
            f.flow.verify_and_consume(&code, "new-password-2").await,
            Err(AuthError::AlreadyConsumed)
        );
    }

    #[tokio::test]
    async fn test_unknown_username_is_silent() {
        let f = fixture().await;
        assert!(f.flow.request_reset("nobody").await.is_ok());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(f.sender.last_code().is_none());
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let f = fixture().await;
        f.flow.request_reset("bob").await.unwrap();
        let code = f.sender.delivered_code().await.unwrap();

        f.clock.advance(Duration::minutes(16));
        assert_eq!(
            f.flow.verify_and_consume(&code, "new-password-1").await,
            Err(AuthError::Expired)
        );
    }

    #[tokio::test]
    async fn test_unknown_code() {
        let f = fixture().await;
        let stray = OpaqueToken::generate();
        assert_eq!(
            f.flow.verify_and_consume(stray.raw(), "new-password-1").await,
            Err(AuthError::NotFound)
        );
        assert_eq!(
            f.flow.verify_and_consume("short", "new-password-1").await,
            Err(AuthError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_request_does_not_wait_for_delivery() {
        let f = fixture().await;
        let sender = Arc::new(SlowSender::default());
        let flow = PasswordResetFlow::new(
            Arc::new(MemoryPasswordResetRepository::new()),
            f.directory.clone(),
            sender.clone(),
            f.clock.clone(),
            Duration::minutes(15),
            4,
        );

        let started = std::time::Instant::now();
        flow.request_reset("bob").await.unwrap();
        assert!(started.elapsed() < std::time::Duration::from_millis(250));
        assert!(sender.inner.last_code().is_none());

        tokio::time::sleep(std::time::Duration::from_millis(700)).await;
        assert!(sender.inner.last_code().is_some());
    }

    #[tokio::test]
    async fn test_successful_reset_burns_sibling_codes() {
        let f = fixture().await;
        f.flow.request_reset("bob").await.unwrap();
        f.flow.request_reset("bob").await.unwrap();
        let notices = f.sender.delivered(2).await;
        assert_eq!(notices.len(), 2);
        let (first, second) = (notices[0].code.clone(), notices[1].code.clone());

        f.flow.verify_and_consume(&second, "new-password-1").await.unwrap();
        assert_eq!(
            f.flow.verify_and_consume(&first, "new-password-2").await,
            Err(AuthError::AlreadyConsumed)
        );
    }
}
