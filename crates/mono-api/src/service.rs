//! 사용자 서비스.
//!
//! 저장소와 비밀번호 해셔를 조합해 가입, 로그인, 계정 관리 규칙을 구현합니다.
//! 비밀번호 해싱은 CPU 비용이 크므로 블로킹 스레드풀에서 실행합니다.

use std::sync::Arc;

use axum::{http::StatusCode, Json};
use tracing::{error, info};

use crate::auth::{validate_password_strength, Claims, PasswordHasher, Permission, Role};
use crate::error::ApiErrorResponse;
use crate::store::{NewUser, StoreError, User, UserStore};

/// 기본 페이지 크기.
pub const DEFAULT_PAGE_SIZE: u32 = 10;
/// 최대 페이지 크기.
pub const MAX_PAGE_SIZE: u32 = 100;

/// 서비스 에러.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("이미 존재하는 사용자입니다")]
    UserExists,
    #[error("이메일 또는 비밀번호가 올바르지 않습니다")]
    InvalidCredentials,
    #[error("사용자를 찾을 수 없습니다")]
    NotFound,
    #[error("권한이 부족합니다")]
    Forbidden,
    #[error("{0}")]
    Validation(String),
    #[error("내부 오류: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::UserExists => StatusCode::CONFLICT,
            ServiceError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::Forbidden => StatusCode::FORBIDDEN,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::UserExists => "USER_EXISTS",
            ServiceError::InvalidCredentials => "INVALID_CREDENTIALS",
            ServiceError::NotFound => "NOT_FOUND",
            ServiceError::Forbidden => "INSUFFICIENT_PERMISSION",
            ServiceError::Validation(_) => "VALIDATION_ERROR",
            ServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 핸들러 에러 응답으로 변환합니다. 내부 오류의 상세 내용은 로그에만 남깁니다.
    pub fn into_api_error(self) -> (StatusCode, Json<ApiErrorResponse>) {
        let message = match &self {
            ServiceError::Internal(detail) => {
                error!(error = %detail, "User service failure");
                "내부 서버 오류가 발생했습니다".to_string()
            }
            other => other.to_string(),
        };
        ApiErrorResponse::new(self.code(), message).into_tuple(self.status())
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists(_) => ServiceError::UserExists,
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::Backend(e) => ServiceError::Internal(e),
        }
    }
}

/// 서비스 결과 타입.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// 가입 입력.
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// 계정 수정 입력. `None`인 필드는 유지됩니다.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// 페이지 파라미터 보정.
///
/// page < 1 → 1, page_size < 1 → 10, page_size > 100 → 100.
pub fn normalize_paging(page: Option<i64>, page_size: Option<i64>) -> (u32, u32) {
    let page = page.unwrap_or(1).clamp(1, i64::from(u32::MAX)) as u32;
    let page_size = match page_size.unwrap_or(0) {
        size if size < 1 => DEFAULT_PAGE_SIZE,
        size if size > i64::from(MAX_PAGE_SIZE) => MAX_PAGE_SIZE,
        size => size as u32,
    };
    (page, page_size)
}

/// 자기 계정이거나 사용자 관리 권한이 있는지 확인합니다.
pub fn ensure_can_manage(actor: &Claims, target_id: u64) -> ServiceResult<()> {
    let allowed = if actor.user_id == target_id {
        actor.has_permission(Permission::ManageOwnAccount)
    } else {
        actor.has_permission(Permission::ManageUsers)
    };

    if allowed {
        Ok(())
    } else {
        Err(ServiceError::Forbidden)
    }
}

/// 사용자 서비스.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHasher>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { store, hasher }
    }

    /// 일반 사용자로 가입합니다.
    pub async fn register(&self, input: Registration) -> ServiceResult<User> {
        self.register_with_role(input, Role::User).await
    }

    /// 지정한 역할로 가입합니다.
    pub async fn register_with_role(&self, input: Registration, role: Role) -> ServiceResult<User> {
        validate_password_strength(&input.password)
            .map_err(|msg| ServiceError::Validation(msg.to_string()))?;

        let password_hash = self.hash(input.password).await?;
        let user = self
            .store
            .create(NewUser {
                username: input.username,
                email: input.email,
                password_hash,
                role,
            })
            .await?;

        info!(user_id = user.id, role = %user.role, "User registered");
        Ok(user)
    }

    /// 이메일과 비밀번호로 사용자를 확인합니다.
    ///
    /// 존재하지 않는 이메일과 틀린 비밀번호는 구분하지 않습니다.
    pub async fn authenticate(&self, email: &str, password: &str) -> ServiceResult<User> {
        let user = match self.store.get_by_email(email).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(ServiceError::InvalidCredentials),
            Err(e) => return Err(e.into()),
        };

        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        let digest = user.password_hash.clone();
        let matched = tokio::task::spawn_blocking(move || hasher.verify(&password, &digest))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        if matched {
            Ok(user)
        } else {
            Err(ServiceError::InvalidCredentials)
        }
    }

    pub async fn get(&self, id: u64) -> ServiceResult<User> {
        Ok(self.store.get_by_id(id).await?)
    }

    /// 계정 수정. 새 비밀번호가 주어지면 다시 해싱합니다.
    pub async fn update(&self, actor: &Claims, id: u64, changes: UserUpdate) -> ServiceResult<User> {
        ensure_can_manage(actor, id)?;
        let mut user = self.store.get_by_id(id).await?;

        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(password) = changes.password {
            validate_password_strength(&password)
                .map_err(|msg| ServiceError::Validation(msg.to_string()))?;
            user.password_hash = self.hash(password).await?;
        }

        let updated = self.store.update(user).await?;
        info!(user_id = updated.id, actor_id = actor.user_id, "User updated");
        Ok(updated)
    }

    /// 역할 변경. 사용자 관리 권한이 필요합니다.
    pub async fn change_role(&self, actor: &Claims, id: u64, role: Role) -> ServiceResult<User> {
        if !actor.has_permission(Permission::ManageUsers) {
            return Err(ServiceError::Forbidden);
        }

        let mut user = self.store.get_by_id(id).await?;
        user.role = role;

        let updated = self.store.update(user).await?;
        info!(user_id = updated.id, role = %updated.role, actor_id = actor.user_id, "User role changed");
        Ok(updated)
    }

    pub async fn delete(&self, actor: &Claims, id: u64) -> ServiceResult<()> {
        ensure_can_manage(actor, id)?;
        self.store.delete(id).await?;
        info!(user_id = id, actor_id = actor.user_id, "User deleted");
        Ok(())
    }

    /// 페이지 조회. 파라미터는 [`normalize_paging`]으로 보정됩니다.
    pub async fn list(
        &self,
        page: Option<i64>,
        page_size: Option<i64>,
    ) -> ServiceResult<(Vec<User>, u64, u32, u32)> {
        let (page, page_size) = normalize_paging(page, page_size);
        let (users, total) = self.store.list(page, page_size).await?;
        Ok((users, total, page, page_size))
    }

    async fn hash(&self, password: String) -> ServiceResult<String> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
            .map_err(|e| ServiceError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{jwt::DEFAULT_VALIDITY, PasswordError};
    use crate::store::InMemoryUserStore;

    /// 테스트용 저비용 해셔.
    struct PlainHasher;

    impl PasswordHasher for PlainHasher {
        fn hash(&self, password: &str) -> Result<String, PasswordError> {
            Ok(format!("plain${}", password))
        }

        fn verify(&self, password: &str, hash: &str) -> bool {
            hash == format!("plain${}", password)
        }
    }

    fn service() -> UserService {
        UserService::new(Arc::new(InMemoryUserStore::new()), Arc::new(PlainHasher))
    }

    fn registration(name: &str) -> Registration {
        Registration {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            password: "password123".to_string(),
        }
    }

    fn claims_for(user: &User) -> Claims {
        Claims::new(user.id, user.username.clone(), user.role, 0, DEFAULT_VALIDITY)
    }

    #[test]
    fn test_normalize_paging() {
        assert_eq!(normalize_paging(None, None), (1, 10));
        assert_eq!(normalize_paging(Some(0), Some(0)), (1, 10));
        assert_eq!(normalize_paging(Some(-3), Some(-1)), (1, 10));
        assert_eq!(normalize_paging(Some(4), Some(25)), (4, 25));
        assert_eq!(normalize_paging(Some(2), Some(101)), (2, 100));
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let service = service();
        let user = service.register(registration("alice")).await.unwrap();
        assert_eq!(user.role, Role::User);
        assert_ne!(user.password_hash, "password123");

        let found = service
            .authenticate("alice@example.com", "password123")
            .await
            .unwrap();
        assert_eq!(found.id, user.id);

        assert_eq!(
            service.authenticate("alice@example.com", "wrong-pass1").await,
            Err(ServiceError::InvalidCredentials)
        );
        assert_eq!(
            service.authenticate("nobody@example.com", "password123").await,
            Err(ServiceError::InvalidCredentials)
        );
    }

    #[tokio::test]
    async fn test_register_duplicate_and_weak_password() {
        let service = service();
        service.register(registration("alice")).await.unwrap();

        assert_eq!(
            service.register(registration("alice")).await,
            Err(ServiceError::UserExists)
        );

        let mut weak = registration("bob");
        weak.password = "short".to_string();
        assert!(matches!(
            service.register(weak).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_requires_self_or_admin() {
        let service = service();
        let alice = service.register(registration("alice")).await.unwrap();
        let bob = service.register(registration("bob")).await.unwrap();
        let admin = service
            .register_with_role(registration("root"), Role::Admin)
            .await
            .unwrap();

        let rename = UserUpdate {
            username: Some("alice2".to_string()),
            ..Default::default()
        };
        assert_eq!(
            service.update(&claims_for(&bob), alice.id, rename.clone()).await,
            Err(ServiceError::Forbidden)
        );

        let renamed = service
            .update(&claims_for(&alice), alice.id, rename)
            .await
            .unwrap();
        assert_eq!(renamed.username, "alice2");

        let new_password = UserUpdate {
            password: Some("newpassword9".to_string()),
            ..Default::default()
        };
        service
            .update(&claims_for(&admin), alice.id, new_password)
            .await
            .unwrap();
        assert!(service
            .authenticate("alice@example.com", "newpassword9")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_change_role_requires_admin() {
        let service = service();
        let alice = service.register(registration("alice")).await.unwrap();
        let admin = service
            .register_with_role(registration("root"), Role::Admin)
            .await
            .unwrap();

        assert_eq!(
            service.change_role(&claims_for(&alice), alice.id, Role::Admin).await,
            Err(ServiceError::Forbidden)
        );

        let promoted = service
            .change_role(&claims_for(&admin), alice.id, Role::Admin)
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::Admin);
        assert_eq!(service.get(alice.id).await.unwrap().role, Role::Admin);

        assert_eq!(
            service.change_role(&claims_for(&admin), 999, Role::User).await,
            Err(ServiceError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_delete() {
        let service = service();
        let alice = service.register(registration("alice")).await.unwrap();
        let bob = service.register(registration("bob")).await.unwrap();

        assert_eq!(
            service.delete(&claims_for(&bob), alice.id).await,
            Err(ServiceError::Forbidden)
        );
        service.delete(&claims_for(&alice), alice.id).await.unwrap();
        assert_eq!(service.get(alice.id).await, Err(ServiceError::NotFound));
    }

    #[tokio::test]
    async fn test_list() {
        let service = service();
        for name in ["a1", "b2", "c3"] {
            service.register(registration(name)).await.unwrap();
        }

        let (users, total, page, size) = service.list(Some(1), Some(2)).await.unwrap();
        assert_eq!((users.len(), total, page, size), (2, 3, 1, 2));
    }

    #[test]
    fn test_internal_error_message_is_generic() {
        let (status, Json(body)) = ServiceError::Internal("db password=secret".to_string())
            .into_api_error();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.message.contains("secret"));
    }
}
