//! 요청 ID 미들웨어.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use tracing::{info_span, Instrument};

use crate::pipeline::{BoxHandler, Handler, Middleware, RequestContext, RequestStage};

/// 요청 ID 헤더.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// 32자리 16진수 요청 ID 생성.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

struct RequestIdLayer {
    next: BoxHandler,
}

#[async_trait]
impl Handler for RequestIdLayer {
    async fn call(&self, ctx: &mut RequestContext) {
        if ctx.is_cancelled() {
            return;
        }

        let request_id = ctx
            .headers()
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(generate_request_id);

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            ctx.response_mut().headers_mut().insert(X_REQUEST_ID, value);
        }
        ctx.set_request_id(request_id.clone());
        ctx.set_stage(RequestStage::Identified);

        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %ctx.method(),
            path = %ctx.path(),
        );
        self.next.call(ctx).instrument(span).await;
    }
}

/// 요청 ID를 할당하고 응답 헤더에 설정하는 미들웨어.
///
/// 들어온 `X-Request-ID`가 비어 있지 않으면 그대로 사용합니다. 이후 단계의
/// 로그는 모두 `request` span 안에서 기록됩니다.
pub fn request_id() -> Middleware {
    Arc::new(|next| Arc::new(RequestIdLayer { next }) as BoxHandler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{handler_fn, Pipeline};
    use axum::{body::Body, extract::Request};

    async fn run(request: Request) -> (Option<String>, axum::response::Response) {
        let handler = Pipeline::new()
            .with(request_id())
            .build(handler_fn(|_ctx| Box::pin(async {})));
        let mut ctx = RequestContext::from_request(request);
        handler.call(&mut ctx).await;
        assert_eq!(ctx.stage(), RequestStage::Identified);

        let id = ctx.request_id().map(str::to_string);
        (id, ctx.finish())
    }

    #[tokio::test]
    async fn test_generates_id() {
        let (id, response) = run(Request::new(Body::empty())).await;
        let id = id.unwrap();

        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(response.headers()[X_REQUEST_ID], id.as_str());
    }

    #[tokio::test]
    async fn test_reuses_incoming_id() {
        let request = Request::builder()
            .header("x-request-id", "client-supplied-42")
            .body(Body::empty())
            .unwrap();
        let (id, response) = run(request).await;

        assert_eq!(id.as_deref(), Some("client-supplied-42"));
        assert_eq!(response.headers()[X_REQUEST_ID], "client-supplied-42");
    }

    #[tokio::test]
    async fn test_empty_incoming_id_is_replaced() {
        let request = Request::builder()
            .header("x-request-id", "")
            .body(Body::empty())
            .unwrap();
        let (id, _) = run(request).await;

        assert_eq!(id.map(|id| id.len()), Some(32));
    }
}
