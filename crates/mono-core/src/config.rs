//! 설정 관리.
//!
//! 설정 파일(선택)과 `MONO__` 접두사 환경 변수를 계층적으로 병합하여
//! [`AppConfig`]를 구성합니다. 환경 변수가 파일보다 우선합니다.
//!
//! ```text
//! MONO__SERVER__PORT=9000
//! MONO__JWT__SIGNING_KEY=change-me
//! MONO__RATE_LIMIT__SKIP_PATHS=/health,/metrics
//! ```

use serde::Deserialize;
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::logging::LogFormat;

/// 환경 변수 접두사.
pub const ENV_PREFIX: &str = "MONO";

/// `CONFIG_PATH`가 없을 때 사용하는 설정 파일 경로 (확장자 제외).
pub const DEFAULT_CONFIG_PATH: &str = "config/app";

/// 애플리케이션 설정.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 애플리케이션 정보
    pub app: AppInfo,
    /// 서버 설정
    pub server: ServerConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
    /// 토큰 서명/검증 설정
    pub jwt: JwtSettings,
    /// Rate limiting 설정
    pub rate_limit: RateLimitSettings,
}

impl AppConfig {
    /// `CONFIG_PATH`(기본값 `config/app`)와 환경 변수에서 설정을 로드합니다.
    pub fn load() -> CoreResult<Self> {
        let path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// 지정한 경로의 설정 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load_from(path: &str) -> CoreResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("jwt.skip_paths")
                    .with_list_parse_key("rate_limit.skip_paths"),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 서버 기동 전에 설정 값의 유효성을 검사합니다.
    pub fn validate(&self) -> CoreResult<()> {
        if self.server.port == 0 {
            return Err(CoreError::Config("server.port must be non-zero".to_string()));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(CoreError::Config(
                "server.request_timeout_secs must be positive".to_string(),
            ));
        }
        self.rate_limit.validate()
    }
}

/// 애플리케이션 정보.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppInfo {
    /// 애플리케이션 이름
    pub name: String,
    /// 버전
    pub version: String,
    /// 실행 모드 (development / production / testing)
    pub mode: String,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            name: "mono-api".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: "development".to_string(),
        }
    }
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// 요청 전체 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// graceful shutdown 대기 시간 (초)
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// `host:port` 형식의 바인딩 주소.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨 필터
    pub level: String,
    /// 출력 형식
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// 토큰 서명 알고리즘.
///
/// HMAC 계열만 허용합니다. 설정 값은 대소문자를 구분하지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum SigningAlgorithm {
    /// HMAC-SHA256
    #[default]
    Hs256,
    /// HMAC-SHA384
    Hs384,
    /// HMAC-SHA512
    Hs512,
}

impl SigningAlgorithm {
    /// 토큰 헤더에 기록되는 알고리즘 이름.
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningAlgorithm::Hs256 => "HS256",
            SigningAlgorithm::Hs384 => "HS384",
            SigningAlgorithm::Hs512 => "HS512",
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SigningAlgorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "HS256" => Ok(Self::Hs256),
            "HS384" => Ok(Self::Hs384),
            "HS512" => Ok(Self::Hs512),
            other => Err(CoreError::Config(format!(
                "unsupported signing method: {other}"
            ))),
        }
    }
}

impl TryFrom<String> for SigningAlgorithm {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 토큰 설정.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct JwtSettings {
    /// 서명 키 (비어 있으면 토큰 발급이 실패합니다)
    pub signing_key: String,
    /// 서명 알고리즘
    pub signing_method: SigningAlgorithm,
    /// 토큰 유효 기간 (초)
    pub expiration_secs: u64,
    /// Authorization 헤더 접두사
    pub token_prefix: String,
    /// 인증을 건너뛰는 경로 접두사 목록
    pub skip_paths: Vec<String>,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            signing_key: String::new(),
            signing_method: SigningAlgorithm::Hs256,
            expiration_secs: 24 * 60 * 60,
            token_prefix: "Bearer".to_string(),
            skip_paths: vec![
                "/api/v1/auth/login".to_string(),
                "/api/v1/auth/register".to_string(),
                "/api/v1/auth/refresh".to_string(),
                "/health".to_string(),
                "/metrics".to_string(),
            ],
        }
    }
}

impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("signing_key", &"[REDACTED]")
            .field("signing_method", &self.signing_method)
            .field("expiration_secs", &self.expiration_secs)
            .field("token_prefix", &self.token_prefix)
            .field("skip_paths", &self.skip_paths)
            .finish()
    }
}

/// Rate limiting 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// 활성화 여부
    pub enabled: bool,
    /// 초당 리필 토큰 수
    pub refill_rate: f64,
    /// 버킷 용량 (버스트 상한)
    pub capacity: f64,
    /// 유휴 버킷 제거 기준 (초)
    pub idle_ttl_secs: u64,
    /// 유휴 버킷 정리 주기 (초)
    pub sweep_interval_secs: u64,
    /// rate limit을 건너뛰는 경로 접두사 목록
    pub skip_paths: Vec<String>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            refill_rate: 10.0,
            capacity: 20.0,
            idle_ttl_secs: 600,
            sweep_interval_secs: 60,
            skip_paths: vec!["/health".to_string(), "/metrics".to_string()],
        }
    }
}

impl RateLimitSettings {
    fn validate(&self) -> CoreResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if !(self.refill_rate.is_finite() && self.refill_rate > 0.0) {
            return Err(CoreError::Config(format!(
                "rate_limit.refill_rate must be positive, got {}",
                self.refill_rate
            )));
        }
        if !(self.capacity.is_finite() && self.capacity > 0.0) {
            return Err(CoreError::Config(format!(
                "rate_limit.capacity must be positive, got {}",
                self.capacity
            )));
        }
        if self.idle_ttl_secs == 0 || self.sweep_interval_secs == 0 {
            return Err(CoreError::Config(
                "rate_limit idle_ttl_secs and sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(source: &str) -> Result<AppConfig, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.jwt.signing_method, SigningAlgorithm::Hs256);
        assert_eq!(config.jwt.expiration_secs, 86_400);
        assert_eq!(config.jwt.token_prefix, "Bearer");
        assert!(config.rate_limit.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = from_toml(
            r#"
            [server]
            port = 9000

            [jwt]
            signing_key = "secret"
            signing_method = "hs512"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.jwt.signing_key, "secret");
        assert_eq!(config.jwt.signing_method, SigningAlgorithm::Hs512);
        assert_eq!(config.rate_limit.capacity, 20.0);
    }

    #[test]
    fn test_unsupported_signing_method_rejected() {
        let result = from_toml(
            r#"
            [jwt]
            signing_method = "RS256"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_rate_limit_rejected() {
        let mut config = AppConfig::default();
        config.rate_limit.refill_rate = 0.0;
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));

        config.rate_limit.refill_rate = 1.0;
        config.rate_limit.capacity = -1.0;
        assert!(config.validate().is_err());

        // 비활성화 시에는 파라미터를 검사하지 않음
        config.rate_limit.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_signing_key_redacted_in_debug() {
        let settings = JwtSettings {
            signing_key: "super-secret".to_string(),
            ..Default::default()
        };
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_algorithm_display_and_parse() {
        assert_eq!(SigningAlgorithm::Hs384.to_string(), "HS384");
        assert_eq!(
            "hs256".parse::<SigningAlgorithm>().unwrap(),
            SigningAlgorithm::Hs256
        );
        assert!("none".parse::<SigningAlgorithm>().is_err());
    }
}
