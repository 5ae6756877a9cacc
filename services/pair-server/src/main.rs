//! Pairgate
//!
//! Single-binary Rust service that:
//! 1. Waits for the messaging protocol bridge to come up
//! 2. Serves `GET /code?number=...` with a pairing code for that number
//! 3. Keeps each attempt running in the background until the account links
//! 4. Uploads the linked credentials and messages the session ID back

mod bridge;
mod config;
mod error;
mod metrics;
mod registry;
mod runner;
mod service;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use pairing::{CodeReply, INVALID_NUMBER, PhoneNumber, SERVICE_UNAVAILABLE};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uploader::HttpUploader;

use crate::bridge::{BridgeConnector, BridgeHandle};
use crate::config::Config;
use crate::registry::AttemptRegistry;
use crate::runner::{AttemptContext, AttemptSettings};
use crate::service::{ServiceAction, ServiceEvent, ServiceState, handle_event};

/// How long in-flight HTTP requests get to finish after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    ctx: AttemptContext,
    bridge: BridgeHandle,
    prometheus: PrometheusHandle,
    started_at: Instant,
    code_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CodeQuery {
    number: Option<String>,
}

/// Body of every pairing response; failures carry a placeholder string.
#[derive(Debug, Serialize)]
struct CodeResponse {
    code: String,
}

impl CodeResponse {
    fn new(code: impl Into<String>) -> Json<Self> {
        Json(Self { code: code.into() })
    }
}

/// Build the axum router with all routes and shared state.
///
/// `max_connections` caps concurrent HTTP requests; active attempts are
/// capped separately by the registry.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/", get(code_handler))
        .route("/code", get(code_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/attempts", get(attempts_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting pairgate");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // --- State: Initializing ---
    let mut state = ServiceState::Initializing;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        bridge_url = %config.bridge.url,
        upload_endpoint = %config.upload.endpoint,
        temp_dir = %config.pairing.temp_dir.display(),
        max_active_attempts = config.pairing.max_active_attempts,
        max_retries = ?config.pairing.max_retries,
        "configuration loaded"
    );

    // Transition: Initializing -> ConnectingBridge
    let (new_state, action) = handle_event(
        state,
        ServiceEvent::ConfigLoaded {
            listen_addr: config.server.listen_addr,
        },
    );
    state = new_state;
    info!(?action, "state: ConnectingBridge");

    match action {
        ServiceAction::ProbeBridge => {}
        _ => anyhow::bail!("unexpected action after ConfigLoaded: {action:?}"),
    };

    let client = reqwest::Client::new();

    let bridge_handle = loop {
        match bridge::probe(&client, &config.bridge.url).await {
            Ok(handle) => break handle,
            Err(crate::error::Error::BridgeUnreachable(msg)) => {
                let (new_state, action) =
                    handle_event(state, ServiceEvent::BridgeUnreachable(msg.clone()));
                state = new_state;

                match action {
                    ServiceAction::ScheduleRetry { delay } => {
                        warn!(
                            error = %msg,
                            retry_in_secs = delay.as_secs(),
                            "protocol bridge unreachable, retrying"
                        );
                        tokio::time::sleep(delay).await;

                        // RetryTimer transitions Error -> ConnectingBridge
                        let (new_state, _) = handle_event(state, ServiceEvent::RetryTimer);
                        state = new_state;
                    }
                    ServiceAction::Shutdown { exit_code } => {
                        error!(error = %msg, "protocol bridge unreachable after max retries");
                        std::process::exit(exit_code);
                    }
                    _ => anyhow::bail!("protocol bridge unreachable: {msg}"),
                }
            }
            Err(e) => {
                let (stopped, _) = handle_event(state, ServiceEvent::BridgeRejected(e.to_string()));
                if let ServiceState::Stopped {
                    reason: Some(reason),
                    ..
                } = &stopped
                {
                    error!(error = %reason, "protocol bridge refused to serve");
                }
                anyhow::bail!("{e}");
            }
        }
    };

    // Transition: ConnectingBridge -> Starting
    let (new_state, action) = handle_event(state, ServiceEvent::BridgeReady(bridge_handle.clone()));
    state = new_state;
    info!(?action, "state: Starting");

    let listen_addr = match action {
        ServiceAction::StartListener { addr } => addr,
        _ => anyhow::bail!("unexpected action after BridgeReady: {action:?}"),
    };

    let connector = BridgeConnector::new(
        client.clone(),
        &config.bridge.url,
        Duration::from_secs(config.bridge.timeout_secs),
        config.bridge.browsers.clone(),
    );
    let uploader = HttpUploader::new(
        client,
        config.upload.endpoint.clone(),
        config.upload.token.take(),
        Duration::from_secs(config.upload.timeout_secs),
    );

    let attempts = &config.pairing;
    let ctx = AttemptContext {
        connector: Arc::new(connector),
        uploader: Arc::new(uploader),
        registry: Arc::new(AttemptRegistry::new(attempts.max_active_attempts)),
        settings: Arc::new(AttemptSettings {
            temp_dir: attempts.temp_dir.clone(),
            session_marker: attempts.session_marker.clone(),
            url_prefix: config.upload.url_prefix.clone(),
            policy: attempts.policy(),
            close_delay: Duration::from_millis(attempts.close_delay_ms),
            export_read_attempts: attempts.export_read_attempts,
            export_poll: Duration::from_millis(attempts.export_poll_ms),
            branding: config.branding.clone(),
        }),
    };

    let app_state = AppState {
        ctx,
        bridge: bridge_handle,
        prometheus: prometheus_handle,
        started_at: Instant::now(),
        code_timeout: Duration::from_secs(config.server.code_timeout_secs),
    };

    let app = build_router(app_state, config.server.max_connections);

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    // Transition: Starting -> Running
    let (state, _action) = handle_event(state, ServiceEvent::ListenerReady);
    info!(addr = %listen_addr, "state: Running, accepting requests");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let (_state, _action) = handle_event(state, ServiceEvent::ShutdownSignal);

    // Signal the server to begin draining; background attempts are abandoned
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Pairing endpoint: starts an attempt for `number` and answers with its
/// pairing code once issued. The attempt keeps running after the response.
async fn code_handler(
    State(state): State<AppState>,
    Query(query): Query<CodeQuery>,
) -> Json<CodeResponse> {
    let number = match PhoneNumber::parse(query.number.as_deref().unwrap_or_default()) {
        Ok(number) => number,
        Err(e) => {
            warn!(error = %e, "rejected pairing request");
            return CodeResponse::new(INVALID_NUMBER);
        }
    };

    let attempt_id = runner::new_attempt_id();
    let rx = match runner::start_attempt(state.ctx.clone(), attempt_id.clone(), number).await {
        // The attempt outlives this request; its outcome is logged by the task
        Ok((rx, _handle)) => rx,
        Err(e) => {
            warn!(error = %e, "pairing attempt refused");
            return CodeResponse::new(SERVICE_UNAVAILABLE);
        }
    };

    match tokio::time::timeout(state.code_timeout, rx).await {
        Ok(Ok(CodeReply::Code(code))) => {
            info!(attempt_id, "pairing code returned");
            CodeResponse::new(code)
        }
        Ok(Ok(CodeReply::Unavailable)) | Ok(Err(_)) => CodeResponse::new(SERVICE_UNAVAILABLE),
        Err(_) => {
            warn!(
                attempt_id,
                timeout_secs = state.code_timeout.as_secs(),
                "no pairing code in time"
            );
            CodeResponse::new(SERVICE_UNAVAILABLE)
        }
    }
}

/// Health endpoint: bridge identity, uptime and attempt counters.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let attempts = state.ctx.registry.snapshot().await;
    let body = serde_json::json!({
        "status": "healthy",
        "bridge_url": state.bridge.url,
        "bridge_version": state.bridge.version,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "active_attempts": attempts["active"],
        "succeeded_total": attempts["succeeded_total"],
        "failed_total": attempts["failed_total"],
    });

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

async fn attempts_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.ctx.registry.snapshot().await)
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
