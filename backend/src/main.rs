//! Marketplace Auth Server
//!
//! Serves SIWE login, token refresh and logout for the marketplace backend.

use axum::http::{HeaderValue, Method};
use chrono::Duration;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use marketplace_auth::audit::PgAuditSink;
use marketplace_auth::auth::nonce::nonce_purge_loop;
use marketplace_auth::auth::{
    AccessTokenIssuer, AuthService, NonceIssuer, SessionManager, SiweVerifier,
};
use marketplace_auth::config::Config;
use marketplace_auth::events::{BroadcastNotifier, EventNotifier, WebhookNotifier};
use marketplace_auth::identity::PgIdentityLinker;
use marketplace_auth::state::AppState;
use marketplace_auth::store::PgCredentialStore;
use marketplace_auth::{db, middleware, routes};

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

    tracing::info!(environment = config.environment.as_str(), "Starting marketplace auth");

    let db_pool = db::create_pool(&config).await?;
    db::run_migrations(&db_pool).await?;

    let store = Arc::new(PgCredentialStore::new(db_pool.clone()));
    let audit = Arc::new(PgAuditSink::new(db_pool.clone()));

    let notifier: Arc<dyn EventNotifier> = match &config.login_event_webhook_url {
        Some(url) => {
            tracing::info!("Login events delivered to webhook");
            Arc::new(WebhookNotifier::new(url.clone(), config.webhook_secret.clone())?)
        }
        None => Arc::new(BroadcastNotifier::new(256)),
    };

    let tokens = AccessTokenIssuer::new(
        config.jwt_secret.as_bytes(),
        config.jwt_issuer.clone(),
        Duration::seconds(config.access_token_ttl_seconds),
    );

    let nonces = NonceIssuer::new(store.clone(), Duration::seconds(config.auth_nonce_ttl_seconds));
    let sessions = SessionManager::new(
        store.clone(),
        tokens,
        audit.clone(),
        notifier,
        Duration::hours(config.session_ttl_hours),
    );

    let auth_service = Arc::new(AuthService::new(
        nonces.clone(),
        SiweVerifier::new(store.clone()),
        Arc::new(PgIdentityLinker::new(db_pool.clone())),
        sessions,
        audit,
    ));

    // Start nonce purge in background
    let retention = Duration::hours(config.nonce_retention_hours);
    tokio::spawn(async move {
        nonce_purge_loop(nonces, retention, std::time::Duration::from_secs(3600)).await;
        tracing::error!("Nonce purge task exited unexpectedly");
    });

    let app_state = AppState::new(auth_service, Some(db_pool));

    let mut app = routes::app(app_state).layer(configure_cors(&config));
    if config.environment.is_production() {
        app = app.layer(axum::middleware::from_fn(middleware::hsts_header));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn configure_cors(config: &Config) -> CorsLayer {
    let Some(allowed_origins) = config.cors_allowed_origins.as_deref().filter(|s| !s.is_empty())
    else {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = allowed_origins
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
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
