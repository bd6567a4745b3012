//! 헬스 체크 및 메트릭 endpoint.
//!
//! 로드밸런서나 오케스트레이션 시스템에서 사용됩니다. 두 경로 모두 인증과
//! rate limit 대상에서 제외됩니다.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// 상세 헬스 체크 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 서비스 상태 ("healthy")
    pub status: String,
    /// API 버전
    pub version: String,
    /// 서버 업타임(초)
    pub uptime_secs: i64,
    /// 현재 시간 (RFC 3339)
    pub timestamp: String,
    /// rate limiter가 추적 중인 클라이언트 키 수
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_keys: Option<usize>,
}

/// Liveness 체크.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness 체크.
pub async fn health_ready(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        rate_limit_keys: state.limiter.as_ref().map(|l| l.tracked_keys()),
    })
}

/// Prometheus 텍스트 형식 메트릭.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// 헬스 체크 라우터.
pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(health_ready))
        .route("/metrics", get(metrics_handler))
}
