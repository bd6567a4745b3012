//! 인증 endpoint.
//!
//! - `POST /api/v1/auth/register` - 가입
//! - `POST /api/v1/auth/login` - 로그인 (토큰 발급)
//! - `POST /api/v1/auth/refresh` - 토큰 갱신 (만료된 토큰 허용)
//! - `GET /api/v1/auth/me` - 현재 토큰의 claims

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use validator::Validate;

use crate::auth::{AuthRejection, Claims, Credential, CurrentUser, TokenError};
use crate::error::{ApiErrorResponse, ApiResult};
use crate::service::Registration;
use crate::state::AppState;
use crate::store::User;

/// 가입 요청.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// 로그인 요청.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// 가입 응답.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
}

/// 토큰 응답.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    /// 유효 시간 (초)
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

impl TokenResponse {
    fn new(credential: Credential, token_type: &str, user: Option<User>) -> Self {
        Self {
            expires_in: credential.expires_in(),
            token: credential.token,
            token_type: token_type.to_string(),
            user,
        }
    }
}

/// 요청 본문 검증 실패 응답.
pub(crate) fn validation_error(errors: validator::ValidationErrors) -> (StatusCode, Json<ApiErrorResponse>) {
    let details = serde_json::to_value(&errors).unwrap_or_default();
    ApiErrorResponse::with_details("VALIDATION_ERROR", "요청 값이 올바르지 않습니다", details)
        .into_tuple(StatusCode::BAD_REQUEST)
}

fn token_error(err: TokenError) -> (StatusCode, Json<ApiErrorResponse>) {
    match err {
        TokenError::Signing(detail) => {
            error!(error = %detail, "Token signing failed");
            ApiErrorResponse::new("INTERNAL_ERROR", "내부 서버 오류가 발생했습니다")
                .into_tuple(StatusCode::INTERNAL_SERVER_ERROR)
        }
        other => {
            let rejection = AuthRejection::from(other);
            ApiErrorResponse::new(rejection.code(), rejection.to_string())
                .into_tuple(rejection.status())
        }
    }
}

/// 가입.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    request.validate().map_err(validation_error)?;

    let user = state
        .users
        .register(Registration {
            username: request.username,
            email: request.email,
            password: request.password,
        })
        .await
        .map_err(|e| e.into_api_error())?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user })))
}

/// 로그인.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    request.validate().map_err(validation_error)?;

    let user = state
        .users
        .authenticate(&request.email, &request.password)
        .await
        .map_err(|e| e.into_api_error())?;

    let credential = state
        .tokens
        .issue(user.id, &user.username, user.role)
        .map_err(token_error)?;

    info!(user_id = user.id, "User logged in");
    Ok(Json(TokenResponse::new(
        credential,
        state.tokens.header_prefix(),
        Some(user),
    )))
}

/// 토큰 갱신.
///
/// 인증 미들웨어를 거치지 않으므로 헤더를 직접 읽습니다. 만료된 토큰도
/// 서명이 유효하면 새 토큰으로 교환됩니다.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<TokenResponse>> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiErrorResponse::new(
                AuthRejection::MissingToken.code(),
                AuthRejection::MissingToken.to_string(),
            )
            .into_tuple(StatusCode::UNAUTHORIZED)
        })?;

    let credential = state.tokens.refresh(header).map_err(token_error)?;

    info!(user_id = credential.claims.user_id, "Token refreshed");
    Ok(Json(TokenResponse::new(
        credential,
        state.tokens.header_prefix(),
        None,
    )))
}

/// 현재 토큰의 claims.
pub async fn me(CurrentUser(claims): CurrentUser) -> Json<Claims> {
    Json(claims)
}

/// 인증 라우터.
pub fn auth_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/me", get(me))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_validation() {
        let valid = RegisterRequest {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "password123".to_string(),
        };
        assert!(valid.validate().is_ok());

        let invalid = RegisterRequest {
            username: "al".to_string(),
            email: "not-an-email".to_string(),
            password: "short".to_string(),
        };
        let errors = invalid.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn test_token_error_mapping() {
        let (status, Json(body)) = token_error(TokenError::Expired);
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.code, "TOKEN_EXPIRED");

        let (status, Json(body)) = token_error(TokenError::Signing("no key".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.message.contains("no key"));
    }
}
