//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! HTTP 요청 메트릭과 인증/rate limit 메트릭을 수집하고 `/metrics`
//! 엔드포인트로 노출합니다.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Prometheus 메트릭 레코더를 설치하고 핸들을 반환합니다.
///
/// 레코더가 이미 설치되어 있으면 에러를 반환합니다.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )?
        .install_recorder()
}

// ============================================================================
// HTTP 메트릭
// ============================================================================

/// HTTP 요청 카운터 증가.
pub fn record_http_request(method: &str, path: &str) {
    counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string())
        .increment(1);
}

/// HTTP 응답 카운터 증가.
pub fn record_http_response(method: &str, path: &str, status: u16) {
    counter!(
        "http_responses_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// HTTP 요청 지속 시간 기록.
pub fn record_http_duration(method: &str, path: &str, duration_secs: f64) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_secs);
}

// ============================================================================
// 인증 / rate limit 메트릭
// ============================================================================

/// 인증 거부 카운터 증가.
pub fn record_auth_rejection(code: &'static str) {
    counter!("auth_rejections_total", "code" => code).increment(1);
}

/// rate limit 판정 카운터 증가.
pub fn record_rate_limit(allowed: bool) {
    let status = if allowed { "allowed" } else { "limited" };
    counter!("rate_limit_requests_total", "status" => status).increment(1);
}

/// 추적 중인 rate limit 키 수 설정.
pub fn record_rate_limit_keys(count: usize) {
    gauge!("rate_limit_tracked_keys").set(count as f64);
}

// ============================================================================
// 경로 정규화
// ============================================================================

/// 경로에서 동적 파라미터를 정규화합니다.
///
/// 예: `/api/v1/users/42` → `/api/v1/users/:id`
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            let is_uuid =
                segment.len() == 36 && segment.chars().filter(|c| *c == '-').count() == 4;
            let is_numeric = !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit());

            if is_uuid || is_numeric {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/users/12345"), "/api/v1/users/:id");
    }

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/users/123e4567-e89b-12d3-a456-426614174000";
        assert_eq!(normalize_path(path), "/api/v1/users/:id");
    }

    #[test]
    fn test_normalize_path_no_params() {
        assert_eq!(normalize_path("/api/v1/auth/login"), "/api/v1/auth/login");
        assert_eq!(normalize_path("/"), "/");
    }
}
