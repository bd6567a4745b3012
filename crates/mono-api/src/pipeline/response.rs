//! 요청당 한 번만 쓸 수 있는 응답 버퍼.

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode},
    response::Response,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// 응답 쓰기 에러.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    #[error("응답이 이미 작성되었습니다")]
    AlreadyWritten,
    #[error("요청이 취소되었습니다")]
    Cancelled,
    #[error("응답 직렬화 실패: {0}")]
    Encode(String),
}

/// 응답 작성 권한.
///
/// 파이프라인이 반환될 때까지 전송 계층에는 아무것도 보내지 않습니다.
/// 보류 헤더는 최종 응답에 병합됩니다.
#[derive(Debug)]
pub struct ResponseWriter {
    headers: HeaderMap,
    response: Option<Response>,
    cancel: CancellationToken,
}

impl ResponseWriter {
    pub(crate) fn new(cancel: CancellationToken) -> Self {
        Self {
            headers: HeaderMap::new(),
            response: None,
            cancel,
        }
    }

    /// 최종 응답에 추가될 보류 헤더.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// 보류 헤더 조회.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 응답이 작성되었는지 확인.
    pub fn is_written(&self) -> bool {
        self.response.is_some()
    }

    /// 작성된 응답의 상태 코드.
    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(Response::status)
    }

    /// 상태 코드와 본문으로 응답을 작성합니다.
    pub fn write(&mut self, status: StatusCode, body: impl Into<Body>) -> Result<(), ResponseError> {
        let mut response = Response::new(body.into());
        *response.status_mut() = status;
        self.write_response(response)
    }

    /// JSON 본문으로 응답을 작성합니다.
    pub fn write_json<T: Serialize>(
        &mut self,
        status: StatusCode,
        value: &T,
    ) -> Result<(), ResponseError> {
        let bytes = serde_json::to_vec(value).map_err(|e| ResponseError::Encode(e.to_string()))?;
        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.write_response(response)
    }

    /// 완성된 응답을 그대로 작성합니다.
    pub fn write_response(&mut self, response: Response) -> Result<(), ResponseError> {
        if self.response.is_some() {
            return Err(ResponseError::AlreadyWritten);
        }
        if self.cancel.is_cancelled() {
            return Err(ResponseError::Cancelled);
        }
        self.response = Some(response);
        Ok(())
    }

    /// 아직 전송되지 않은 응답을 버립니다. 보류 헤더는 유지됩니다.
    pub(crate) fn discard(&mut self) -> Option<Response> {
        self.response.take()
    }

    /// 최종 응답을 만듭니다. 작성된 응답이 없으면 빈 `200 OK`입니다.
    pub fn finish(self) -> Response {
        let mut response = self
            .response
            .unwrap_or_else(|| Response::new(Body::empty()));
        response.headers_mut().extend(self.headers);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_write() {
        let mut writer = ResponseWriter::new(CancellationToken::new());
        assert!(!writer.is_written());

        writer.write(StatusCode::CREATED, "created").unwrap();
        assert_eq!(writer.status(), Some(StatusCode::CREATED));

        assert_eq!(
            writer.write(StatusCode::OK, "again"),
            Err(ResponseError::AlreadyWritten)
        );
        assert_eq!(writer.finish().status(), StatusCode::CREATED);
    }

    #[test]
    fn test_write_after_cancel_fails() {
        let cancel = CancellationToken::new();
        let mut writer = ResponseWriter::new(cancel.clone());
        cancel.cancel();

        assert_eq!(
            writer.write(StatusCode::OK, "late"),
            Err(ResponseError::Cancelled)
        );
        assert!(!writer.is_written());
    }

    #[test]
    fn test_empty_response_defaults_to_ok() {
        let mut writer = ResponseWriter::new(CancellationToken::new());
        writer
            .headers_mut()
            .insert("x-request-id", HeaderValue::from_static("abc"));

        let response = writer.finish();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "abc");
    }

    #[test]
    fn test_discard_then_rewrite_keeps_pending_headers() {
        let mut writer = ResponseWriter::new(CancellationToken::new());
        writer
            .headers_mut()
            .insert("x-request-id", HeaderValue::from_static("abc"));
        writer.write(StatusCode::OK, "partial").unwrap();

        assert!(writer.discard().is_some());
        writer
            .write_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({"code": "INTERNAL_ERROR"}),
            )
            .unwrap();

        let response = writer.finish();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()["x-request-id"], "abc");
    }
}
