//! 접근 로그 및 HTTP 메트릭 미들웨어.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::http::StatusCode;
use tracing::{info, warn};

use crate::metrics::{
    normalize_path, record_http_duration, record_http_request, record_http_response,
};
use crate::pipeline::{BoxHandler, Handler, Middleware, RequestContext};

struct AccessLog {
    next: BoxHandler,
}

#[async_trait]
impl Handler for AccessLog {
    async fn call(&self, ctx: &mut RequestContext) {
        if ctx.is_cancelled() {
            return;
        }

        let start = Instant::now();
        let method = ctx.method().to_string();
        let path = normalize_path(ctx.path());
        record_http_request(&method, &path);

        self.next.call(ctx).await;

        let elapsed = start.elapsed();
        if ctx.is_cancelled() {
            warn!(
                method = %method,
                path = %ctx.path(),
                latency_ms = elapsed.as_millis() as u64,
                stage = %ctx.stage(),
                "Request cancelled"
            );
            return;
        }

        let status = ctx.response().status().unwrap_or(StatusCode::OK).as_u16();
        record_http_response(&method, &path, status);
        record_http_duration(&method, &path, elapsed.as_secs_f64());

        let client = ctx
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "-".to_string());
        info!(
            method = %method,
            path = %ctx.path(),
            status,
            latency_ms = elapsed.as_millis() as u64,
            client = %client,
            stage = %ctx.stage(),
            "Request completed"
        );
    }
}

/// 요청마다 메서드, 경로, 상태, 지연 시간, 최종 단계를 기록하는 미들웨어.
///
/// 기록되는 메트릭:
/// - `http_requests_total`
/// - `http_responses_total`
/// - `http_request_duration_seconds`
pub fn access_log() -> Middleware {
    Arc::new(|next| Arc::new(AccessLog { next }) as BoxHandler)
}
