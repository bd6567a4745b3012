//! 파이프라인과 axum 사이의 어댑터.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::{debug, error};

use super::{BoxHandler, Handler, RequestContext, RequestId, RequestStage};
use crate::error::ApiErrorResponse;

/// 파이프라인을 axum `Router`로 노출합니다.
///
/// 모든 경로와 메서드가 파이프라인으로 전달됩니다. 요청 처리 방식은
/// [`dispatch`]를 참고하세요.
pub fn into_router(handler: BoxHandler) -> Router {
    Router::new().fallback(move |request: Request| {
        let handler = Arc::clone(&handler);
        async move { dispatch(handler, request).await }
    })
}

/// 요청 하나를 파이프라인에 통과시키고 최종 응답을 반환합니다.
///
/// 파이프라인은 별도 태스크에서 실행되고, 이 future는 그 결과를 기다립니다.
/// 전송 계층이 이 future를 버리면(연결 종료, `TimeoutLayer` 만료) drop guard가
/// 컨텍스트의 취소 토큰을 취소하며, 아직 실행 중인 파이프라인 태스크가 이를
/// 관찰하고 중단합니다.
pub async fn dispatch(handler: BoxHandler, request: Request) -> Response {
    let peer_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let mut ctx = RequestContext::new(request, peer_addr, cancel);
    let task = tokio::spawn(async move {
        handler.call(&mut ctx).await;
        ctx.finish()
    });

    let response = match task.await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Pipeline task failed");
            ApiErrorResponse::new("INTERNAL_ERROR", "내부 서버 오류가 발생했습니다")
                .into_tuple(StatusCode::INTERNAL_SERVER_ERROR)
                .into_response()
        }
    };

    guard.disarm();
    response
}

/// axum 라우터를 파이프라인의 최종 핸들러로 감쌉니다.
///
/// 검증된 claims와 요청 ID는 request extension으로 전달되어 추출기에서
/// 읽을 수 있습니다.
#[derive(Clone)]
pub struct RouterHandler {
    router: Router,
}

impl RouterHandler {
    pub fn new(router: Router) -> Self {
        Self { router }
    }
}

#[async_trait]
impl Handler for RouterHandler {
    async fn call(&self, ctx: &mut RequestContext) {
        if ctx.is_cancelled() {
            return;
        }

        let mut request = ctx.take_request();
        if let Some(claims) = ctx.claims() {
            request.extensions_mut().insert(claims.clone());
        }
        if let Some(request_id) = ctx.request_id() {
            request
                .extensions_mut()
                .insert(RequestId(request_id.to_string()));
        }

        let cancel = ctx.cancellation();
        let response = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Request cancelled before handler completed");
                return;
            }
            result = self.router.clone().oneshot(request) => match result {
                Ok(response) => response,
                Err(infallible) => match infallible {},
            },
        };

        ctx.set_stage(RequestStage::Handled);
        if let Err(e) = ctx.response_mut().write_response(response) {
            debug!(error = %e, "Handler response dropped");
        }
    }
}
