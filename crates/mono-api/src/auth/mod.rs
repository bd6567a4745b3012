//! 인증 및 권한 부여.
//!
//! # 구성 요소
//!
//! - [`TokenService`]: 토큰 발급, 검증, 갱신
//! - [`Claims`]: 토큰 페이로드
//! - [`Role`]: 사용자 역할 (Admin, User)
//! - [`CurrentUser`], [`AdminUser`]: 검증된 claims를 읽는 Axum 추출기
//! - [`PasswordHasher`]: 비밀번호 해싱 (Argon2id)

mod extract;
pub mod jwt;
mod password;
mod roles;

pub use extract::{require_role, AdminUser, AuthRejection, CurrentUser};
pub use jwt::{Claims, Credential, TokenConfig, TokenError, TokenService};
pub use password::{
    hash_password, validate_password_strength, verify_password, Argon2Hasher, PasswordError,
    PasswordHasher,
};
pub use roles::{Permission, Role};
