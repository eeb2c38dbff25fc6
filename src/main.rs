//! session-doctor - inspect and reconcile a persisted Mojeeb session
//!
//! Loads the configuration, rehydrates whatever session is on disk, runs
//! the startup reconciliation against the live auth backend and reports
//! what it found. Useful for diagnosing "logged out after restart"
//! reports without attaching a debugger to the dashboard itself.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mojeeb_session::{
    config::Config,
    services::{GuardOutcome, HttpAuthClient, SessionManager, StartupGuard},
    storage::{create_store, TokenStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mojeeb_session=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting session doctor...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Storage: one plain store, with the encrypted token tier on top
    let plain = create_store(&config.storage)?;
    let tokens = Arc::new(TokenStore::with_secret(
        plain.clone(),
        config.storage.secret.as_deref(),
    ));
    tracing::info!(
        has_access_token = tokens.get_access_token().is_some(),
        has_refresh_token = tokens.get_refresh_token().is_some(),
        "Token store opened"
    );

    // Auth backend client
    let auth = Arc::new(HttpAuthClient::new(&config.auth)?);
    tracing::info!(base_url = %config.auth.base_url, "Auth client ready");

    // Rehydrate the persisted session
    let manager = Arc::new(SessionManager::new(auth, tokens, plain));
    let session = manager.rehydrate()?;
    match &session.user {
        Some(user) => tracing::info!(
            user_id = %user.id,
            email = %user.email,
            is_authenticated = session.is_authenticated,
            "Session rehydrated"
        ),
        None => tracing::info!("No persisted session found"),
    }

    // Run the startup reconciliation
    let guard = StartupGuard::new(manager.clone());
    match guard.initialize().await {
        GuardOutcome::Stable => {
            if manager.is_authenticated() {
                tracing::info!(
                    interval_seconds = config.refresh.interval().as_secs(),
                    "Session is healthy; a dashboard would start its refresh scheduler now"
                );
            } else {
                tracing::info!("No active session; nothing to reconcile");
            }
        }
        GuardOutcome::RedirectToLogin => {
            tracing::warn!(
                route = mojeeb_session::services::guard::LOGIN_ROUTE,
                "Session was unrecoverable and has been cleared; a dashboard would redirect"
            );
        }
    }

    Ok(())
}
