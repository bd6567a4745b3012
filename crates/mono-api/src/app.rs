//! 애플리케이션 조립.
//!
//! 라우트를 파이프라인의 최종 핸들러로 감싸고, 전송 계층 레이어(추적,
//! 타임아웃, CORS)를 적용합니다.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, Method, StatusCode},
    Router,
};
use mono_core::AppConfig;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{
    access_log, authenticate, rate_limit, recovery, request_id, AuthOptions, RateLimitOptions,
};
use crate::pipeline::{into_router, BoxHandler, Pipeline, RouterHandler};
use crate::routes::create_api_router;
use crate::state::AppState;

/// 파이프라인 옵션.
#[derive(Clone, Default)]
pub struct PipelineOptions {
    pub auth: AuthOptions,
    pub rate_limit: RateLimitOptions,
}

impl From<&AppConfig> for PipelineOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            auth: AuthOptions::from(&config.jwt),
            rate_limit: RateLimitOptions::from(&config.rate_limit),
        }
    }
}

/// 표준 순서의 미들웨어 파이프라인.
///
/// Recovery → RequestID → AccessLog → Authentication → RateLimit.
/// 상태에 rate limiter가 없으면 RateLimit 단계는 생략됩니다.
pub fn standard_pipeline(state: &AppState, options: PipelineOptions) -> Pipeline {
    let pipeline = Pipeline::new()
        .with(recovery())
        .with(request_id())
        .with(access_log())
        .with(authenticate(Arc::clone(&state.tokens), options.auth));

    match &state.limiter {
        Some(limiter) => pipeline.with(rate_limit(Arc::clone(limiter), options.rate_limit)),
        None => pipeline,
    }
}

/// 파이프라인으로 감싼 최종 핸들러.
pub fn build_handler(state: Arc<AppState>, options: PipelineOptions) -> BoxHandler {
    let pipeline = standard_pipeline(&state, options);
    let routes = create_api_router().with_state(state);
    pipeline.build(Arc::new(RouterHandler::new(routes)))
}

/// 전송 계층 레이어까지 적용한 전체 라우터.
pub fn build_app(state: Arc<AppState>, config: &AppConfig) -> Router {
    let handler = build_handler(state, PipelineOptions::from(config));
    let timeout = Duration::from_secs(config.server.request_timeout_secs);

    into_router(handler)
        .layer(TraceLayer::new_for_http())
        // 타임아웃 시 요청 future가 버려지며 컨텍스트 취소가 전파됨
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
        .layer(cors_layer())
}

/// CORS 레이어.
///
/// `CORS_ORIGINS` 환경변수가 있으면 해당 origin만 허용하고, 없으면 모든
/// origin을 허용합니다 (개발 모드).
fn cors_layer() -> CorsLayer {
    let origins: Vec<_> = std::env::var("CORS_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}
