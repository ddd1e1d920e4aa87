//! Reset-code delivery
//!
//! Delivery is best effort: the reset flow logs failures and moves on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification transport error: {0}")]
    Transport(String),

    #[error("Notification endpoint returned {0}")]
    Rejected(u16),
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        NotifyError::Transport(e.to_string())
    }
}

/// Everything a sender needs to deliver one reset code
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetNotice {
    pub subject_id: Uuid,
    pub username: String,
    pub email_address: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_reset_code(&self, notice: &ResetNotice) -> Result<(), NotifyError>;
}

/// Writes notices to the log; the code itself only at `debug`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationSender;

#[async_trait]
impl NotificationSender for LogNotificationSender {
    async fn send_reset_code(&self, notice: &ResetNotice) -> Result<(), NotifyError> {
        tracing::info!(
            subject_id = %notice.subject_id,
            expires_at = %notice.expires_at,
            "Password reset code issued"
        );
        tracing::debug!(subject_id = %notice.subject_id, code = %notice.code, "Reset code");
        Ok(())
    }
}

/// POSTs each notice as JSON to an external mailer/SMS bridge
#[derive(Debug, Clone)]
pub struct WebhookNotificationSender {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotificationSender {
    pub fn new(url: String, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl NotificationSender for WebhookNotificationSender {
    async fn send_reset_code(&self, notice: &ResetNotice) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(notice).send().await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }

        tracing::debug!(subject_id = %notice.subject_id, "Reset notice delivered to webhook");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_wire_shape() {
        let notice = ResetNotice {
            subject_id: Uuid::nil(),
            username: "bob".to_string(),
            email_address: "bob@example.com".to_string(),
            code: "abc".to_string(),
            expires_at: Utc::now(),
        };
        let body = serde_json::to_value(&notice).unwrap();
        assert_eq!(body["username"], "bob");
        assert_eq!(body["emailAddress"], "bob@example.com");
        assert!(body.get("expiresAt").is_some());
    }

    #[tokio::test]
    async fn test_log_sender_never_fails() {
        let notice = ResetNotice {
            subject_id: Uuid::new_v4(),
            username: "bob".to_string(),
            email_address: "bob@example.com".to_string(),
            code: "abc".to_string(),
            expires_at: Utc::now(),
        };
        assert!(LogNotificationSender.send_reset_code(&notice).await.is_ok());
    }
}
