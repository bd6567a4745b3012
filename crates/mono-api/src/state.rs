//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! Arc로 래핑되어 Axum의 State extractor로 주입됩니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::auth::{Argon2Hasher, PasswordHasher, TokenService};
use crate::limiter::RateLimiterRegistry;
use crate::service::UserService;
use crate::store::{InMemoryUserStore, UserStore};

/// 애플리케이션 공유 상태.
#[derive(Clone)]
pub struct AppState {
    /// 사용자 서비스 - 가입, 로그인, 계정 관리
    pub users: UserService,

    /// 토큰 서비스 - 생성 후 읽기 전용
    pub tokens: Arc<TokenService>,

    /// 클라이언트 키별 rate limiter (비활성화 시 None)
    pub limiter: Option<Arc<RateLimiterRegistry>>,

    /// `/metrics` 렌더링 핸들 (레코더 미설치 시 None)
    pub metrics: Option<PrometheusHandle>,

    /// 서버 시작 시간
    pub started_at: DateTime<Utc>,

    /// API 버전
    pub version: String,
}

impl AppState {
    /// 메모리 저장소와 Argon2 해셔로 상태를 생성합니다.
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self::with_components(
            Arc::new(InMemoryUserStore::new()),
            Arc::new(Argon2Hasher),
            tokens,
        )
    }

    /// 저장소와 해셔를 지정하여 상태를 생성합니다.
    pub fn with_components(
        store: Arc<dyn UserStore>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            users: UserService::new(store, hasher),
            tokens,
            limiter: None,
            metrics: None,
            started_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// rate limiter를 설정합니다.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiterRegistry>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// 메트릭 핸들을 설정합니다.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// 서버 업타임(초).
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
