//! 토큰 인증 미들웨어.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use mono_core::JwtSettings;
use tracing::{debug, warn};

use crate::auth::{AuthRejection, Claims, TokenService};
use crate::metrics::record_auth_rejection;
use crate::pipeline::{BoxHandler, Handler, Middleware, RequestContext, RequestStage};

/// 인증 미들웨어 옵션.
#[derive(Debug, Clone, Default)]
pub struct AuthOptions {
    /// 인증을 건너뛰는 경로 접두사
    pub skip_paths: Vec<String>,
}

impl AuthOptions {
    pub fn new(skip_paths: Vec<String>) -> Self {
        Self { skip_paths }
    }

    /// 경로가 건너뛰기 목록의 접두사와 일치하는지 확인.
    pub fn is_skipped(&self, path: &str) -> bool {
        self.skip_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl From<&JwtSettings> for AuthOptions {
    fn from(settings: &JwtSettings) -> Self {
        Self::new(settings.skip_paths.clone())
    }
}

struct Authenticate {
    tokens: Arc<TokenService>,
    options: AuthOptions,
    next: BoxHandler,
}

impl Authenticate {
    fn authorize(&self, headers: &HeaderMap) -> Result<Claims, AuthRejection> {
        let header = headers
            .get(AUTHORIZATION)
            .ok_or(AuthRejection::MissingToken)?
            .to_str()
            .map_err(|_| AuthRejection::InvalidAuthHeader)?;

        let has_prefix = header
            .strip_prefix(self.tokens.header_prefix())
            .is_some_and(|rest| rest.starts_with(' '));
        if !has_prefix {
            return Err(AuthRejection::InvalidAuthHeader);
        }

        self.tokens.verify(header).map_err(AuthRejection::from)
    }
}

#[async_trait]
impl Handler for Authenticate {
    async fn call(&self, ctx: &mut RequestContext) {
        if ctx.is_cancelled() {
            return;
        }

        if self.options.is_skipped(ctx.path()) {
            self.next.call(ctx).await;
            return;
        }

        match self.authorize(ctx.headers()) {
            Ok(claims) => {
                debug!(user_id = claims.user_id, role = %claims.role, "Token verified");
                ctx.set_claims(claims);
                ctx.set_stage(RequestStage::Authenticated);
                self.next.call(ctx).await;
            }
            Err(rejection) => {
                record_auth_rejection(rejection.code());
                warn!(code = rejection.code(), path = %ctx.path(), "Authentication rejected");

                ctx.set_stage(RequestStage::Rejected);
                let message = rejection.to_string();
                if let Err(e) = ctx.write_error(rejection.status(), rejection.code(), &message) {
                    debug!(error = %e, "Failed to write authentication response");
                }
            }
        }
    }
}

/// `Authorization` 헤더의 토큰을 검증하는 미들웨어.
///
/// 검증에 실패하면 401을 작성하고 다음 단계를 호출하지 않습니다.
pub fn authenticate(tokens: Arc<TokenService>, options: AuthOptions) -> Middleware {
    Arc::new(move |next| {
        Arc::new(Authenticate {
            tokens: Arc::clone(&tokens),
            options: options.clone(),
            next,
        }) as BoxHandler
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, TokenConfig};
    use crate::pipeline::{handler_fn, Pipeline};
    use axum::{body::Body, extract::Request, http::StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const SECRET: &str = "test-secret-key-for-jwt-testing-minimum-32-chars";

    struct Fixture {
        tokens: Arc<TokenService>,
        handler: BoxHandler,
        reached: Arc<AtomicUsize>,
    }

    fn fixture(validity: Duration) -> Fixture {
        let tokens = Arc::new(TokenService::new(
            TokenConfig::new(SECRET).with_validity(validity),
        ));
        let reached = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reached);
        let terminal = handler_fn(move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        });

        let handler = Pipeline::new()
            .with(authenticate(
                Arc::clone(&tokens),
                AuthOptions::new(vec!["/api/v1/auth/login".to_string()]),
            ))
            .build(terminal);

        Fixture {
            tokens,
            handler,
            reached,
        }
    }

    async fn call(handler: &BoxHandler, path: &str, auth: Option<&str>) -> RequestContext {
        let mut builder = Request::builder().uri(path);
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        let mut ctx = RequestContext::from_request(builder.body(Body::empty()).unwrap());
        handler.call(&mut ctx).await;
        ctx
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let fx = fixture(Duration::from_secs(60));
        let ctx = call(&fx.handler, "/api/v1/users", None).await;

        assert_eq!(ctx.stage(), RequestStage::Rejected);
        assert_eq!(ctx.response().status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(fx.reached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_token_forwards_claims() {
        let fx = fixture(Duration::from_secs(60));
        let credential = fx.tokens.issue(7, "alice", Role::User).unwrap();
        let header = format!("Bearer {}", credential.token);

        let ctx = call(&fx.handler, "/api/v1/users", Some(&header)).await;

        assert_eq!(ctx.stage(), RequestStage::Authenticated);
        assert_eq!(ctx.claims().map(|c| c.user_id), Some(7));
        assert_eq!(fx.reached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrong_scheme_rejected() {
        let fx = fixture(Duration::from_secs(60));
        let credential = fx.tokens.issue(7, "alice", Role::User).unwrap();
        let header = format!("Basic {}", credential.token);

        let ctx = call(&fx.handler, "/api/v1/users", Some(&header)).await;
        assert_eq!(ctx.response().status(), Some(StatusCode::UNAUTHORIZED));

        let ctx = call(&fx.handler, "/api/v1/users", Some(&credential.token)).await;
        assert_eq!(ctx.stage(), RequestStage::Rejected);
        assert_eq!(fx.reached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let fx = fixture(Duration::ZERO);
        let credential = fx.tokens.issue(7, "alice", Role::User).unwrap();
        let header = format!("Bearer {}", credential.token);

        let ctx = call(&fx.handler, "/api/v1/users", Some(&header)).await;
        assert_eq!(ctx.stage(), RequestStage::Rejected);
        assert_eq!(fx.reached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_skip_path_bypasses_auth() {
        let fx = fixture(Duration::from_secs(60));
        let ctx = call(&fx.handler, "/api/v1/auth/login", None).await;

        assert!(ctx.claims().is_none());
        assert!(!ctx.response().is_written());
        assert_eq!(fx.reached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_skip_path_prefix_match() {
        let options = AuthOptions::from(&JwtSettings::default());
        assert!(options.is_skipped("/health"));
        assert!(options.is_skipped("/api/v1/auth/register"));
        assert!(!options.is_skipped("/api/v1/users"));
        assert!(!options.is_skipped("/api/v1/auth/me"));
    }
}
