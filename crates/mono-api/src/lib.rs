//! 토큰 인증과 클라이언트별 rate limiting을 갖춘 HTTP API 서버.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 토큰 발급/검증/갱신 (HMAC 서명)
//! - 클라이언트 키별 Token Bucket rate limiter
//! - 순서가 고정된 미들웨어 파이프라인과 요청 컨텍스트
//! - 사용자 가입/로그인/관리 REST API
//! - Prometheus 메트릭
//!
//! # 모듈 구성
//!
//! - [`auth`]: 토큰 서비스, 역할, 비밀번호 해싱, 추출기
//! - [`limiter`]: rate limiter 레지스트리
//! - [`pipeline`]: 핸들러/미들웨어 추상화, 요청 컨텍스트, axum 어댑터
//! - [`middleware`]: Recovery, RequestID, AccessLog, Authentication, RateLimit
//! - [`store`]: 사용자 저장소 계약과 메모리 구현
//! - [`service`]: 사용자 서비스
//! - [`routes`]: REST API 엔드포인트
//! - [`app`]: 파이프라인과 라우트 조립

pub mod app;
pub mod auth;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod middleware;
pub mod pipeline;
pub mod routes;
pub mod service;
pub mod state;
pub mod store;

pub use app::{build_app, build_handler, standard_pipeline, PipelineOptions};
pub use auth::{Claims, Credential, Role, TokenConfig, TokenError, TokenService};
pub use error::{ApiErrorResponse, ApiResult};
pub use limiter::{RateLimitConfig, RateLimitError, RateLimiterRegistry};
pub use metrics::setup_metrics_recorder;
pub use pipeline::{Handler, Middleware, Pipeline, RequestContext, RequestStage};
pub use state::AppState;
