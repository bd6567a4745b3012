//! 사용자 저장소.
//!
//! 저장소 구현은 외부 협력자이며, 서비스는 [`UserStore`] 트레이트에만 의존합니다.
//! [`InMemoryUserStore`]는 바이너리와 테스트에서 사용하는 프로세스 내 구현입니다.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::Role;

pub use memory::InMemoryUserStore;

/// 사용자.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
    /// PHC 형식 비밀번호 해시 (응답에 포함되지 않음)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 생성할 사용자 정보. ID와 시각은 저장소가 채웁니다.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// 저장소 에러.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("이미 존재하는 사용자입니다: {0}")]
    AlreadyExists(String),
    #[error("사용자를 찾을 수 없습니다")]
    NotFound,
    #[error("저장소 오류: {0}")]
    Backend(String),
}

/// 저장소 결과 타입.
pub type StoreResult<T> = Result<T, StoreError>;

/// 사용자 저장소 계약.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// 사용자 생성. 이메일 또는 사용자 이름이 중복되면 `AlreadyExists`.
    async fn create(&self, user: NewUser) -> StoreResult<User>;

    async fn get_by_id(&self, id: u64) -> StoreResult<User>;

    async fn get_by_email(&self, email: &str) -> StoreResult<User>;

    /// 사용자 갱신. `updated_at`은 저장소가 설정합니다.
    async fn update(&self, user: User) -> StoreResult<User>;

    async fn delete(&self, id: u64) -> StoreResult<()>;

    /// ID 순 페이지 조회. 전체 사용자 수를 함께 반환합니다.
    async fn list(&self, page: u32, page_size: u32) -> StoreResult<(Vec<User>, u64)>;
}
