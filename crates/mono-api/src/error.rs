//! 통합 API 에러 응답 타입.
//!
//! 파이프라인 미들웨어와 라우트 핸들러가 동일한 에러 형식을 사용합니다.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 통합 API 에러 응답.
///
/// ```json
/// {
///   "code": "RATE_LIMIT_EXCEEDED",
///   "message": "요청 한도를 초과했습니다",
///   "timestamp": 1738300800,
///   "request_id": "4f1c2a..."
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "MISSING_TOKEN", "NOT_FOUND")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 에러 상세 정보
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 에러 발생 타임스탬프 (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// 요청 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ApiErrorResponse {
    /// 기본 에러 생성 (타임스탬프 포함).
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
            request_id: None,
        }
    }

    /// 상세 정보 포함 에러 생성.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, message)
        }
    }

    /// 요청 ID를 추가합니다.
    #[must_use]
    pub fn with_request_id(mut self, request_id: Option<&str>) -> Self {
        self.request_id = request_id.map(str::to_string);
        self
    }

    /// 에러 코드 반환.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// 에러 메시지 반환.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 핸들러 반환용 (상태 코드, JSON) 튜플로 변환합니다.
    pub fn into_tuple(self, status: StatusCode) -> (StatusCode, Json<ApiErrorResponse>) {
        (status, Json(self))
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiErrorResponse {}

/// API 핸들러 Result 타입 별칭.
pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiErrorResponse>)>;
