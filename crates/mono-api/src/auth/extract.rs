//! 인증 거부 사유와 Axum 추출기.
//!
//! 인증 미들웨어가 검증한 claims는 request extension으로 최종 핸들러에
//! 전달되며, 핸들러는 아래 추출기로 이를 읽습니다.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::{Claims, Role, TokenError};
use crate::error::ApiErrorResponse;

/// 인증/권한 거부 사유.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthRejection {
    #[error("인증 토큰이 필요합니다")]
    MissingToken,
    #[error("잘못된 Authorization 헤더 형식")]
    InvalidAuthHeader,
    #[error("토큰이 만료되었습니다")]
    TokenExpired,
    #[error("토큰이 아직 유효하지 않습니다")]
    TokenNotYetValid,
    #[error("유효하지 않은 토큰")]
    InvalidToken,
    #[error("권한이 부족합니다")]
    InsufficientPermission,
}

impl AuthRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthRejection::InsufficientPermission => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthRejection::MissingToken => "MISSING_TOKEN",
            AuthRejection::InvalidAuthHeader => "INVALID_AUTH_HEADER",
            AuthRejection::TokenExpired => "TOKEN_EXPIRED",
            AuthRejection::TokenNotYetValid => "TOKEN_NOT_YET_VALID",
            AuthRejection::InvalidToken => "INVALID_TOKEN",
            AuthRejection::InsufficientPermission => "INSUFFICIENT_PERMISSION",
        }
    }
}

impl From<TokenError> for AuthRejection {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthRejection::TokenExpired,
            TokenError::NotYetValid => AuthRejection::TokenNotYetValid,
            TokenError::Malformed | TokenError::InvalidSignature | TokenError::Signing(_) => {
                AuthRejection::InvalidToken
            }
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse::new(self.code(), self.to_string());
        (self.status(), Json(body)).into_response()
    }
}

/// 특정 역할 이상의 권한을 요구합니다.
pub fn require_role(required_role: Role, claims: &Claims) -> Result<(), AuthRejection> {
    if claims.has_role(required_role) {
        Ok(())
    } else {
        Err(AuthRejection::InsufficientPermission)
    }
}

/// 인증된 사용자 추출기.
///
/// ```rust,ignore
/// async fn me(CurrentUser(claims): CurrentUser) -> impl IntoResponse {
///     format!("Hello, {}!", claims.username)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Claims);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(CurrentUser)
            .ok_or(AuthRejection::MissingToken)
    }
}

/// Admin 권한을 요구하는 추출기.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Claims);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(claims) = CurrentUser::from_request_parts(parts, state).await?;
        require_role(Role::Admin, &claims)?;
        Ok(AdminUser(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::DEFAULT_VALIDITY;
    use axum::http::Request;

    fn claims(role: Role) -> Claims {
        Claims::new(1, "tester", role, 0, DEFAULT_VALIDITY)
    }

    #[test]
    fn test_require_role() {
        assert!(require_role(Role::Admin, &claims(Role::Admin)).is_ok());
        assert!(require_role(Role::User, &claims(Role::Admin)).is_ok());
        assert_eq!(
            require_role(Role::Admin, &claims(Role::User)),
            Err(AuthRejection::InsufficientPermission)
        );
    }

    #[test]
    fn test_token_error_mapping() {
        assert_eq!(AuthRejection::from(TokenError::Expired).code(), "TOKEN_EXPIRED");
        assert_eq!(
            AuthRejection::from(TokenError::NotYetValid).code(),
            "TOKEN_NOT_YET_VALID"
        );
        assert_eq!(AuthRejection::from(TokenError::Malformed).code(), "INVALID_TOKEN");
        assert_eq!(
            AuthRejection::from(TokenError::InvalidSignature).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthRejection::InsufficientPermission.status(),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn test_current_user_reads_extension() {
        let (mut parts, _) = Request::new(()).into_parts();
        assert!(matches!(
            CurrentUser::from_request_parts(&mut parts, &()).await,
            Err(AuthRejection::MissingToken)
        ));

        parts.extensions.insert(claims(Role::User));
        let CurrentUser(found) = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(found.username, "tester");

        assert!(matches!(
            AdminUser::from_request_parts(&mut parts, &()).await,
            Err(AuthRejection::InsufficientPermission)
        ));
    }
}
