pub mod app_state;
pub mod clients;
pub mod config;
pub mod error;
pub mod http;
pub mod notify;
pub mod openapi;
pub mod persistence;
pub mod rate_limit;
pub mod services;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app_state::AppState;
use crate::clients::{HttpDnsClient, HttpOAuthClient};
use crate::notify::NotificationDispatcher;
use crate::rate_limit::{AttemptLimiterRef, NoopAttemptLimiter, SlidingWindowAttemptLimiter};

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .init();
}

fn build_limiter(attempts: &config::AttemptsConfig) -> AttemptLimiterRef {
    if attempts.limit == 0 {
        Arc::new(tokio::sync::Mutex::new(NoopAttemptLimiter))
    } else {
        Arc::new(tokio::sync::Mutex::new(SlidingWindowAttemptLimiter::new(
            attempts.limit,
            Duration::from_secs(attempts.window_secs),
        )))
    }
}

/// Boot the platform: config, database, collaborator clients, HTTP server.
pub async fn run() -> Result<()> {
    let app_config = config::load()?;

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| anyhow::anyhow!("failed to install metrics recorder: {err}"))?;

    let db = persistence::migrations::init_pool(&app_config.database.url).await?;
    let snapshot = persistence::migrations::run_migrations(&db).await?;
    info!(
        current_version = snapshot.latest_applied,
        target_version = snapshot.latest_available,
        "database schema is up to date"
    );

    let oauth = Arc::new(HttpOAuthClient::new(&app_config.oauth)?);
    let dns = Arc::new(HttpDnsClient::new(&app_config.dns)?);
    let dispatcher = NotificationDispatcher::new()?;

    let state = AppState {
        db,
        oauth,
        dns,
        dispatcher,
        ready_attempts: build_limiter(&app_config.attempts),
        termination_attempts: build_limiter(&app_config.attempts),
        platform_auth: app_config.platform_auth.clone(),
        notifications: app_config.notifications.clone(),
        metrics: metrics_handle,
    };

    let app = http::build_router(state);

    let addr: SocketAddr = format!("{}:{}", app_config.server.host, app_config.server.port)
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid listen address: {}", err))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "platform listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => stream.recv().await,
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
                None
            }
        };
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        },
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
}
