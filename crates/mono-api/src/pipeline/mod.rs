//! 미들웨어 파이프라인.
//!
//! 미들웨어는 핸들러를 받아 같은 형태의 핸들러를 반환하는 함수입니다.
//! [`Pipeline`]은 미들웨어 목록을 오른쪽부터 감싸므로, 먼저 등록한
//! 미들웨어가 요청 시 가장 먼저, 응답 시 가장 나중에 실행됩니다.
//!
//! ```rust,ignore
//! let handler = Pipeline::new()
//!     .with(recovery())
//!     .with(request_id())
//!     .with(authenticate(tokens, auth_options))
//!     .with(rate_limit(limiter, rate_limit_options))
//!     .build(Arc::new(RouterHandler::new(routes)));
//! let app = into_router(handler);
//! ```

mod context;
mod response;
mod router;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

pub use context::{RequestContext, RequestId, RequestStage};
pub use response::{ResponseError, ResponseWriter};
pub use router::{dispatch, into_router, RouterHandler};

/// 요청 컨텍스트를 받아 응답을 작성하는 핸들러.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, ctx: &mut RequestContext);
}

/// 공유 가능한 핸들러.
pub type BoxHandler = Arc<dyn Handler>;

/// 핸들러 변환 함수.
pub type Middleware = Arc<dyn Fn(BoxHandler) -> BoxHandler + Send + Sync>;

/// 클로저 기반 핸들러.
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    async fn call(&self, ctx: &mut RequestContext) {
        (self.f)(ctx).await
    }
}

/// 클로저로 핸들러를 만듭니다.
///
/// ```rust,ignore
/// let terminal = handler_fn(|ctx| Box::pin(async move {
///     let _ = ctx.response_mut().write(StatusCode::OK, "ok");
/// }));
/// ```
pub fn handler_fn<F>(f: F) -> BoxHandler
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    Arc::new(FnHandler { f })
}

/// 순서가 있는 미들웨어 목록.
#[derive(Clone, Default)]
pub struct Pipeline {
    middlewares: Vec<Middleware>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// 미들웨어를 목록 끝(안쪽)에 추가합니다.
    pub fn with(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// 최종 핸들러를 미들웨어로 감싼 핸들러를 만듭니다.
    pub fn build(&self, terminal: BoxHandler) -> BoxHandler {
        self.middlewares
            .iter()
            .rev()
            .fold(terminal, |next, middleware| middleware(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::Request};
    use parking_lot::Mutex;

    struct Trace {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        next: BoxHandler,
    }

    #[async_trait]
    impl Handler for Trace {
        async fn call(&self, ctx: &mut RequestContext) {
            self.log.lock().push(format!("{}:before", self.name));
            self.next.call(ctx).await;
            self.log.lock().push(format!("{}:after", self.name));
        }
    }

    fn trace(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Middleware {
        let log = Arc::clone(log);
        Arc::new(move |next| {
            Arc::new(Trace {
                name,
                log: Arc::clone(&log),
                next,
            }) as BoxHandler
        })
    }

    #[tokio::test]
    async fn test_first_listed_runs_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let terminal_log = Arc::clone(&log);
        let terminal = handler_fn(move |_ctx| {
            let log = Arc::clone(&terminal_log);
            Box::pin(async move {
                log.lock().push("terminal".to_string());
            })
        });

        let handler = Pipeline::new()
            .with(trace("outer", &log))
            .with(trace("inner", &log))
            .build(terminal);

        let mut ctx = RequestContext::from_request(Request::new(Body::empty()));
        handler.call(&mut ctx).await;

        assert_eq!(
            *log.lock(),
            vec![
                "outer:before",
                "inner:before",
                "terminal",
                "inner:after",
                "outer:after"
            ]
        );
    }

    #[test]
    fn test_len() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new().with(trace("a", &log)).with(trace("b", &log));

        assert_eq!(pipeline.len(), 2);
        assert!(Pipeline::new().is_empty());
    }
}
