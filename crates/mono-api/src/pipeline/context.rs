//! 요청 컨텍스트.
//!
//! 한 요청을 처리하는 태스크가 단독으로 소유하며, 미들웨어 사이에서
//! 요청 ID, 검증된 claims, 클라이언트 키를 이름 있는 필드로 전달합니다.

use std::fmt;
use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::Request,
    http::{Extensions, HeaderMap, Method, StatusCode, Uri, Version},
    response::Response,
};
use tokio_util::sync::CancellationToken;

use super::response::{ResponseError, ResponseWriter};
use crate::auth::Claims;
use crate::error::ApiErrorResponse;

/// 요청 처리 단계.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestStage {
    /// 수신됨
    #[default]
    Received,
    /// 요청 ID 할당됨
    Identified,
    /// 토큰 검증 통과
    Authenticated,
    /// rate limit 통과
    Admitted,
    /// 최종 핸들러 처리 완료
    Handled,
    /// 인증 거부 (401)
    Rejected,
    /// 요청 한도 초과 (429)
    Throttled,
    /// 패닉 복구 (500)
    PanicRecovered,
}

impl RequestStage {
    /// 로그용 이름.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStage::Received => "received",
            RequestStage::Identified => "identified",
            RequestStage::Authenticated => "authenticated",
            RequestStage::Admitted => "admitted",
            RequestStage::Handled => "handled",
            RequestStage::Rejected => "rejected",
            RequestStage::Throttled => "throttled",
            RequestStage::PanicRecovered => "panic_recovered",
        }
    }

    /// 단락(short-circuit)으로 끝난 단계인지 확인.
    pub fn is_short_circuit(&self) -> bool {
        matches!(
            self,
            RequestStage::Rejected | RequestStage::Throttled | RequestStage::PanicRecovered
        )
    }
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 최종 핸들러에 request extension으로 전달되는 요청 ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// 요청 컨텍스트.
pub struct RequestContext {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    extensions: Extensions,
    body: Option<Body>,
    peer_addr: Option<SocketAddr>,
    cancel: CancellationToken,
    response: ResponseWriter,
    request_id: Option<String>,
    claims: Option<Claims>,
    client_key: Option<String>,
    stage: RequestStage,
}

impl RequestContext {
    /// 요청과 전송 계층 정보로 컨텍스트 생성.
    pub fn new(request: Request, peer_addr: Option<SocketAddr>, cancel: CancellationToken) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            extensions: parts.extensions,
            body: Some(body),
            peer_addr,
            response: ResponseWriter::new(cancel.clone()),
            cancel,
            request_id: None,
            claims: None,
            client_key: None,
            stage: RequestStage::Received,
        }
    }

    /// 전송 계층 정보 없이 생성 (테스트용).
    pub fn from_request(request: Request) -> Self {
        Self::new(request, None, CancellationToken::new())
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 연결된 클라이언트 주소 (포트 포함).
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// 요청 본문을 가져갑니다. 두 번째 호출부터는 `None`.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// 컨텍스트에서 요청을 다시 조립합니다. 본문과 extension은 옮겨집니다.
    pub fn take_request(&mut self) -> Request {
        let mut request = Request::new(self.body.take().unwrap_or_else(Body::empty));
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers.clone();
        *request.extensions_mut() = std::mem::take(&mut self.extensions);
        request
    }

    /// 취소 신호 (연결 종료 또는 타임아웃).
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn set_request_id(&mut self, request_id: impl Into<String>) {
        self.request_id = Some(request_id.into());
    }

    /// 인증 미들웨어가 검증한 claims.
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    pub fn set_claims(&mut self, claims: Claims) {
        self.claims = Some(claims);
    }

    /// rate limit에 사용된 클라이언트 키.
    pub fn client_key(&self) -> Option<&str> {
        self.client_key.as_deref()
    }

    pub fn set_client_key(&mut self, key: impl Into<String>) {
        self.client_key = Some(key.into());
    }

    pub fn stage(&self) -> RequestStage {
        self.stage
    }

    pub fn set_stage(&mut self, stage: RequestStage) {
        self.stage = stage;
    }

    pub fn response(&self) -> &ResponseWriter {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseWriter {
        &mut self.response
    }

    /// 통합 에러 형식으로 응답을 작성합니다.
    pub fn write_error(
        &mut self,
        status: StatusCode,
        code: &str,
        message: &str,
    ) -> Result<(), ResponseError> {
        let body = ApiErrorResponse::new(code, message).with_request_id(self.request_id.as_deref());
        self.response.write_json(status, &body)
    }

    /// 최종 응답으로 변환합니다.
    pub fn finish(self) -> Response {
        self.response.finish()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("peer_addr", &self.peer_addr)
            .field("request_id", &self.request_id)
            .field("client_key", &self.client_key)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;

    fn request(uri: &str) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(AUTHORIZATION, "Bearer abc")
            .body(Body::from("payload"))
            .unwrap()
    }

    #[test]
    fn test_context_exposes_request_parts() {
        let ctx = RequestContext::from_request(request("/api/v1/users?page=2"));

        assert_eq!(ctx.method(), Method::POST);
        assert_eq!(ctx.path(), "/api/v1/users");
        assert_eq!(ctx.headers()[AUTHORIZATION], "Bearer abc");
        assert_eq!(ctx.stage(), RequestStage::Received);
        assert!(ctx.request_id().is_none());
        assert!(ctx.claims().is_none());
    }

    #[test]
    fn test_take_request_rebuilds_once() {
        let mut ctx = RequestContext::from_request(request("/x"));
        let rebuilt = ctx.take_request();

        assert_eq!(rebuilt.method(), Method::POST);
        assert_eq!(rebuilt.uri().path(), "/x");
        assert!(ctx.take_body().is_none());
        // 요청 정보는 로그용으로 남아 있음
        assert_eq!(ctx.path(), "/x");
    }

    #[test]
    fn test_write_error_includes_request_id() {
        let mut ctx = RequestContext::from_request(request("/x"));
        ctx.set_request_id("req-1");
        ctx.write_error(StatusCode::UNAUTHORIZED, "MISSING_TOKEN", "인증 토큰이 필요합니다")
            .unwrap();

        assert_eq!(ctx.response().status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(
            ctx.write_error(StatusCode::OK, "X", "y"),
            Err(ResponseError::AlreadyWritten)
        );
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(RequestStage::PanicRecovered.to_string(), "panic_recovered");
        assert!(RequestStage::Throttled.is_short_circuit());
        assert!(!RequestStage::Handled.is_short_circuit());
    }
}
