//! 사용자 관리 endpoint.
//!
//! 모든 경로는 인증이 필요합니다. 수정/삭제는 본인 또는 관리자만 가능하고,
//! 역할 변경(`PUT /api/v1/users/{id}/role`)은 관리자 전용입니다.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::auth::validation_error;
use crate::auth::{AdminUser, CurrentUser, Role};
use crate::error::ApiResult;
use crate::service::UserUpdate;
use crate::state::AppState;
use crate::store::User;

/// 목록 조회 쿼리.
#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// 목록 응답.
#[derive(Debug, Serialize)]
pub struct UsersListResponse {
    pub users: Vec<User>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

/// 사용자 수정 요청.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
}

/// 사용자 목록.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    CurrentUser(_claims): CurrentUser,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<UsersListResponse>> {
    let (users, total, page, size) = state
        .users
        .list(query.page, query.page_size)
        .await
        .map_err(|e| e.into_api_error())?;

    Ok(Json(UsersListResponse {
        users,
        total,
        page,
        size,
    }))
}

/// 사용자 상세.
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(_claims): CurrentUser,
    Path(id): Path<u64>,
) -> ApiResult<Json<User>> {
    let user = state.users.get(id).await.map_err(|e| e.into_api_error())?;
    Ok(Json(user))
}

/// 사용자 수정.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(claims): CurrentUser,
    Path(id): Path<u64>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    request.validate().map_err(validation_error)?;

    let changes = UserUpdate {
        username: request.username,
        email: request.email,
        password: request.password,
    };
    let user = state
        .users
        .update(&claims, id, changes)
        .await
        .map_err(|e| e.into_api_error())?;

    Ok(Json(user))
}

/// 역할 변경 요청.
#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

/// 역할 변경 (관리자 전용).
pub async fn change_role(
    State(state): State<Arc<AppState>>,
    AdminUser(claims): AdminUser,
    Path(id): Path<u64>,
    Json(request): Json<ChangeRoleRequest>,
) -> ApiResult<Json<User>> {
    let user = state
        .users
        .change_role(&claims, id, request.role)
        .await
        .map_err(|e| e.into_api_error())?;

    Ok(Json(user))
}

/// 사용자 삭제.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(claims): CurrentUser,
    Path(id): Path<u64>,
) -> ApiResult<StatusCode> {
    state
        .users
        .delete(&claims, id)
        .await
        .map_err(|e| e.into_api_error())?;

    Ok(StatusCode::NO_CONTENT)
}

/// 사용자 라우터.
pub fn users_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_users))
        .route("/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/{id}/role", put(change_role))
}
