//! 서버 기반 계층의 에러 타입.

use thiserror::Error;

/// 핵심 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 로깅 초기화 에러
    #[error("로깅 초기화 에러: {0}")]
    Logging(String),
}

/// 기반 계층 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_conversion() {
        let err: CoreError = config::ConfigError::Message("boom".to_string()).into();
        assert!(matches!(err, CoreError::Config(ref msg) if msg.contains("boom")));
    }
}
