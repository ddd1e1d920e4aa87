//! Credential server
//!
//! Serves the password login, token refresh and password reset API over
//! Postgres-backed stores.

use axum::http::{HeaderValue, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use authserver::auth::{AuthBackends, AuthService, SigningKeys};
use authserver::clock::SystemClock;
use authserver::config::Config;
use authserver::directory::PgUserDirectory;
use authserver::notify::{LogNotificationSender, NotificationSender, WebhookNotificationSender};
use authserver::state::AppState;
use authserver::store::{PgPasswordResetRepository, PgRefreshTokenRepository};
use authserver::{db, routes, tasks};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting credential server");

    let db_pool = db::create_pool(&config).await?;
    db::run_migrations(&db_pool).await?;

    let keys = SigningKeys::from_secret(config.jwt_secret.as_bytes())?;

    let notifier: Arc<dyn NotificationSender> = match &config.reset_webhook_url {
        Some(url) => {
            tracing::info!("Reset codes will be delivered via webhook");
            Arc::new(WebhookNotificationSender::new(
                url.clone(),
                std::time::Duration::from_secs(config.notify_timeout_seconds),
            )?)
        }
        None => {
            tracing::warn!("RESET_WEBHOOK_URL not set, reset codes are only logged");
            Arc::new(LogNotificationSender)
        }
    };

    let backends = AuthBackends {
        refresh_tokens: Arc::new(PgRefreshTokenRepository::new(db_pool.clone())),
        password_resets: Arc::new(PgPasswordResetRepository::new(db_pool.clone())),
        directory: Arc::new(PgUserDirectory::new(db_pool.clone())),
        notifier,
        clock: Arc::new(SystemClock),
    };

    let auth_service = Arc::new(AuthService::new(keys, backends, config.auth_settings()));

    // Start purge loop in background
    let purge_service = auth_service.clone();
    let purge_interval = std::time::Duration::from_secs(config.purge_interval_seconds);
    tokio::spawn(async move {
        tasks::purge_loop(purge_service, purge_interval).await;
        tracing::error!("Purge loop exited unexpectedly");
    });

    let app_state = AppState::new(auth_service, Some(db_pool));

    let app = routes::app_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(configure_cors(config.cors_allowed_origins.as_deref()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Serve with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let allowed_origins_str = allowed_origins.unwrap_or_default();

    if allowed_origins_str.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins_str
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
