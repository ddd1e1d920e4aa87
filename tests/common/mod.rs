//! Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use authserver::auth::{AuthBackends, AuthService, AuthSettings, SigningKeys};
use authserver::clock::ManualClock;
use authserver::directory::{
    DirectoryError, MemoryUserDirectory, NewUser, UserAccount, UserDirectory,
};
use authserver::models::UserRegistrationRequest;
use authserver::notify::{NotificationSender, NotifyError, ResetNotice};
use authserver::store::{MemoryPasswordResetRepository, MemoryRefreshTokenRepository};

pub const TEST_SECRET: &[u8] = b"integration-test-secret-0123456789abcdef";

/// Captures every reset notice instead of delivering it
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<ResetNotice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<ResetNotice> {
        self.notices.lock().unwrap().clone()
    }

    /// Wait (up to a second) until `count` notices arrived from the background sender
    pub async fn delivered(&self, count: usize) -> Vec<ResetNotice> {
        for _ in 0..200 {
            let notices = self.notices();
            if notices.len() >= count {
                return notices;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.notices()
    }

    pub async fn last_code_for(&self, username: &str) -> Option<String> {
        for _ in 0..200 {
            let code = self
                .notices()
                .iter()
                .rev()
                .find(|n| n.username == username)
                .map(|n| n.code.clone());
            if code.is_some() {
                return code;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        None
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send_reset_code(&self, notice: &ResetNotice) -> Result<(), NotifyError> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

/// In-memory directory whose password updates can be made to fail
#[derive(Default)]
pub struct FlakyDirectory {
    inner: MemoryUserDirectory,
    fail_updates: AtomicBool,
}

impl FlakyDirectory {
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserDirectory for FlakyDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserAccount>, DirectoryError> {
        self.inner.find_by_username(username).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserAccount>, DirectoryError> {
        self.inner.find_by_id(id).await
    }

    async fn update_password(&self, id: Uuid, new_hash: &str) -> Result<(), DirectoryError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(DirectoryError::Backend("directory offline".to_string()));
        }
        self.inner.update_password(id, new_hash).await
    }

    async fn create_user(&self, user: NewUser) -> Result<Uuid, DirectoryError> {
        self.inner.create_user(user).await
    }
}

pub struct Harness {
    pub service: Arc<AuthService>,
    pub directory: Arc<FlakyDirectory>,
    pub refresh_tokens: Arc<MemoryRefreshTokenRepository>,
    pub password_resets: Arc<MemoryPasswordResetRepository>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        let directory = Arc::new(FlakyDirectory::default());
        let refresh_tokens = Arc::new(MemoryRefreshTokenRepository::new());
        let password_resets = Arc::new(MemoryPasswordResetRepository::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let backends = AuthBackends {
            refresh_tokens: refresh_tokens.clone(),
            password_resets: password_resets.clone(),
            directory: directory.clone(),
            notifier: notifier.clone(),
            clock: clock.clone(),
        };
        let settings = AuthSettings {
            bcrypt_cost: 4,
            ..AuthSettings::default()
        };
        let keys = SigningKeys::from_secret(TEST_SECRET).unwrap();

        Self {
            service: Arc::new(AuthService::new(keys, backends, settings)),
            directory,
            refresh_tokens,
            password_resets,
            notifier,
            clock,
        }
    }

    /// Register `username` and return its subject id
    pub async fn register(&self, username: &str, password: &str) -> Uuid {
        self.service
            .register(registration(username, password))
            .await
            .unwrap();
        self.directory
            .find_by_username(username)
            .await
            .unwrap()
            .unwrap()
            .id
    }
}

pub fn registration(username: &str, password: &str) -> UserRegistrationRequest {
    UserRegistrationRequest {
        username: username.to_string(),
        password: password.to_string(),
        email_address: format!("{}@example.com", username),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        phone_number: Some("+15550100".to_string()),
    }
}
