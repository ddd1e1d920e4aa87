//! Background maintenance tasks

use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthService;

/// Periodically delete expired and long-revoked credential records
pub async fn purge_loop(auth_service: Arc<AuthService>, interval: Duration) {
    tracing::info!(interval_secs = interval.as_secs(), "Starting credential purge loop");

    loop {
        tokio::time::sleep(interval).await;

        match auth_service.purge_expired().await {
            Ok(report) => {
                tracing::info!(
                    refresh_tokens = report.refresh_tokens,
                    password_resets = report.password_resets,
                    "Purged stale credential records"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Error purging credential records");
            }
        }
    }
}
