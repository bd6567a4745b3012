//! 패닉 복구 미들웨어.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use futures::FutureExt;
use mono_core::panic_message;
use tracing::{debug, error};

use crate::pipeline::{BoxHandler, Handler, Middleware, RequestContext, RequestStage};

struct Recovery {
    next: BoxHandler,
}

#[async_trait]
impl Handler for Recovery {
    async fn call(&self, ctx: &mut RequestContext) {
        let outcome = AssertUnwindSafe(self.next.call(ctx)).catch_unwind().await;
        let Err(payload) = outcome else {
            return;
        };

        // 스택 트레이스는 패닉 훅이 패닉 지점에서 이미 기록함
        error!(
            request_id = ctx.request_id().unwrap_or("-"),
            method = %ctx.method(),
            path = %ctx.path(),
            panic = %panic_message(payload.as_ref()),
            "Panic recovered"
        );

        ctx.set_stage(RequestStage::PanicRecovered);
        ctx.response_mut().discard();

        if ctx.is_cancelled() {
            return;
        }
        if let Err(e) = ctx.write_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "내부 서버 오류가 발생했습니다",
        ) {
            debug!(error = %e, "Failed to write recovery response");
        }
    }
}

/// 안쪽 단계에서 발생한 패닉을 잡아 500 응답으로 바꾸는 미들웨어.
///
/// 파이프라인의 가장 바깥에 둡니다.
pub fn recovery() -> Middleware {
    Arc::new(|next| Arc::new(Recovery { next }) as BoxHandler)
}
