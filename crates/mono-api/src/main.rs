//! API 서버 바이너리.
//!
//! 설정을 읽어 로깅, 메트릭, 상태를 초기화하고 graceful shutdown을 지원하는
//! Axum 서버를 시작합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mono_api::{
    build_app, setup_metrics_recorder, AppState, RateLimitConfig, RateLimiterRegistry,
    TokenConfig, TokenService,
};
use mono_core::{init_logging, install_panic_hook, AppConfig, LogConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    init_logging(LogConfig::from(&config.logging)).context("failed to initialize logging")?;
    install_panic_hook();

    info!(
        name = %config.app.name,
        version = %config.app.version,
        mode = %config.app.mode,
        "Starting API server..."
    );
    info!(jwt = ?config.jwt, rate_limit = ?config.rate_limit, "Configuration loaded");

    if config.jwt.signing_key.is_empty() {
        warn!("jwt.signing_key is empty, token issuance will fail");
    }

    let metrics_handle =
        setup_metrics_recorder().context("failed to install Prometheus recorder")?;
    info!("Prometheus metrics recorder initialized");

    let tokens = Arc::new(TokenService::new(TokenConfig::from(&config.jwt)));
    let mut state = AppState::new(tokens).with_metrics(metrics_handle);

    let shutdown_token = CancellationToken::new();
    let mut sweeper = None;

    if config.rate_limit.enabled {
        let limiter = Arc::new(
            RateLimiterRegistry::new(RateLimitConfig::from(&config.rate_limit))
                .context("invalid rate limit configuration")?,
        );
        sweeper = Some(Arc::clone(&limiter).spawn_sweeper(
            Duration::from_secs(config.rate_limit.sweep_interval_secs),
            shutdown_token.clone(),
        ));
        state = state.with_limiter(limiter);
        info!(
            refill_rate = config.rate_limit.refill_rate,
            capacity = config.rate_limit.capacity,
            "Rate limiting enabled"
        );
    } else {
        info!("Rate limiting DISABLED");
    }

    let state = Arc::new(state);
    info!(version = %state.version, "Application state initialized");

    let app = build_app(state, &config);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "API server listening");
    info!("Metrics available at http://{}/metrics", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_token.clone()))
    .await
    .context("server error")?;

    info!("Server shutdown initiated, cleaning up...");
    shutdown_token.cancel();

    if let Some(handle) = sweeper {
        let timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
        if tokio::time::timeout(timeout, handle).await.is_err() {
            warn!("Cleanup timeout, forcing shutdown");
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM 시그널을 수신하면 종료 토큰을 취소합니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
        _ = shutdown_token.cancelled() => {}
    }

    shutdown_token.cancel();
    info!("Shutdown signal propagated to background tasks");
}
