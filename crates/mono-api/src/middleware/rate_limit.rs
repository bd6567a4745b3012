//! Rate limiting 미들웨어.
//!
//! 클라이언트 키별 Token Bucket 판정은 [`RateLimiterRegistry`]가 수행합니다.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header::RETRY_AFTER, HeaderValue, StatusCode};
use mono_core::RateLimitSettings;
use tracing::{debug, error, warn};

use crate::limiter::{RateLimitError, RateLimiterRegistry};
use crate::metrics::record_rate_limit;
use crate::pipeline::{BoxHandler, Handler, Middleware, RequestContext, RequestStage};

/// 요청에서 클라이언트 키를 만드는 함수.
pub type ClientKeyFn = Arc<dyn Fn(&RequestContext) -> String + Send + Sync>;

/// 기본 클라이언트 키.
///
/// `X-Real-IP`, `X-Forwarded-For`의 첫 번째 항목, 연결 주소(포트 제외) 순으로
/// 사용합니다.
pub fn client_key(ctx: &RequestContext) -> String {
    let headers = ctx.headers();

    if let Some(real_ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return real_ip.to_string();
    }

    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }

    ctx.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limit 미들웨어 옵션.
#[derive(Clone)]
pub struct RateLimitOptions {
    /// rate limit을 건너뛰는 경로 접두사
    pub skip_paths: Vec<String>,
    /// 클라이언트 키 함수
    pub key_fn: ClientKeyFn,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            skip_paths: vec!["/health".to_string(), "/metrics".to_string()],
            key_fn: Arc::new(client_key),
        }
    }
}

impl RateLimitOptions {
    pub fn new(skip_paths: Vec<String>) -> Self {
        Self {
            skip_paths,
            ..Default::default()
        }
    }

    /// 클라이언트 키 함수를 교체합니다.
    pub fn with_key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&RequestContext) -> String + Send + Sync + 'static,
    {
        self.key_fn = Arc::new(key_fn);
        self
    }

    pub fn is_skipped(&self, path: &str) -> bool {
        self.skip_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl From<&RateLimitSettings> for RateLimitOptions {
    fn from(settings: &RateLimitSettings) -> Self {
        Self::new(settings.skip_paths.clone())
    }
}

struct RateLimit {
    limiter: Arc<RateLimiterRegistry>,
    options: RateLimitOptions,
    next: BoxHandler,
}

#[async_trait]
impl Handler for RateLimit {
    async fn call(&self, ctx: &mut RequestContext) {
        if ctx.is_cancelled() {
            return;
        }

        if self.options.is_skipped(ctx.path()) {
            self.next.call(ctx).await;
            return;
        }

        let key = (self.options.key_fn)(ctx);
        let result = self.limiter.check(&key);
        ctx.set_client_key(key);

        match result {
            Ok(()) => {
                record_rate_limit(true);
                ctx.set_stage(RequestStage::Admitted);
                self.next.call(ctx).await;
            }
            Err(RateLimitError::Exceeded { retry_after }) => {
                record_rate_limit(false);
                warn!(
                    client_key = ctx.client_key().unwrap_or("-"),
                    retry_after,
                    "Rate limit exceeded"
                );

                ctx.set_stage(RequestStage::Throttled);
                ctx.response_mut()
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(retry_after));
                if let Err(e) = ctx.write_error(
                    StatusCode::TOO_MANY_REQUESTS,
                    "RATE_LIMIT_EXCEEDED",
                    "요청 한도를 초과했습니다. 잠시 후 다시 시도하세요",
                ) {
                    debug!(error = %e, "Failed to write rate limit response");
                }
            }
            Err(e) => {
                error!(error = %e, "Rate limiter failure");
                if let Err(e) = ctx.write_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "내부 서버 오류가 발생했습니다",
                ) {
                    debug!(error = %e, "Failed to write rate limit response");
                }
            }
        }
    }
}

/// 클라이언트 키별로 요청 수를 제한하는 미들웨어.
///
/// 한도를 넘으면 429와 `Retry-After` 헤더를 작성하고 다음 단계를 호출하지 않습니다.
/// 건너뛰기 경로는 버킷을 만들지 않습니다.
pub fn rate_limit(limiter: Arc<RateLimiterRegistry>, options: RateLimitOptions) -> Middleware {
    Arc::new(move |next| {
        Arc::new(RateLimit {
            limiter: Arc::clone(&limiter),
            options: options.clone(),
            next,
        }) as BoxHandler
    })
}
