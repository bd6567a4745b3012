//! API 라우트.
//!
//! # 라우트 구조
//!
//! - `/health`, `/health/ready` - 헬스 체크
//! - `/metrics` - Prometheus 메트릭
//! - `/api/v1/auth` - 가입, 로그인, 토큰 갱신
//! - `/api/v1/users` - 사용자 관리

pub mod auth;
pub mod health;
pub mod users;

pub use auth::{auth_router, LoginRequest, RegisterRequest, TokenResponse};
pub use health::{health_router, HealthResponse};
pub use users::{users_router, ChangeRoleRequest, UpdateUserRequest, UsersListResponse};

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// 전체 API 라우터 생성.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health_router())
        .nest("/api/v1/auth", auth_router())
        .nest("/api/v1/users", users_router())
}
