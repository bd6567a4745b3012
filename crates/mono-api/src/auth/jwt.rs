//! 토큰 발급, 검증, 갱신.
//!
//! 토큰은 `header.claims.signature` 형태의 compact 직렬화(JWT)이며,
//! 설정된 HMAC 알고리즘 하나만 허용합니다. 헤더에 다른 알고리즘이 선언된
//! 토큰은 서명 검사 전에 `InvalidSignature`로 거부됩니다.
//!
//! 만료/활성 시각 비교에는 유예(leeway)가 없습니다. `exp`와 같은 시각의
//! 토큰은 이미 만료된 것으로 봅니다.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey,
    Header, Validation,
};
use mono_core::{JwtSettings, SigningAlgorithm};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{Permission, Role};

/// 유효 기간이 설정되지 않았을 때의 기본값 (24시간).
pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

/// Authorization 헤더의 기본 접두사.
pub const DEFAULT_HEADER_PREFIX: &str = "Bearer";

/// 토큰 페이로드.
///
/// 사용자 식별 정보와 역할, 유효 구간을 포함합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// 사용자 ID
    pub user_id: u64,
    /// 사용자 이름
    pub username: String,
    /// 사용자 역할
    pub role: Role,
    /// Issued At (Unix timestamp, 초)
    pub iat: i64,
    /// Not Before (Unix timestamp, 초)
    pub nbf: i64,
    /// Expiration (Unix timestamp, 초)
    pub exp: i64,
}

impl Claims {
    /// `now` 기준으로 유효 구간을 계산한 Claims 생성.
    pub fn new(
        user_id: u64,
        username: impl Into<String>,
        role: Role,
        now: i64,
        validity: Duration,
    ) -> Self {
        let validity_secs = i64::try_from(validity.as_secs()).unwrap_or(i64::MAX);
        Self {
            user_id,
            username: username.into(),
            role,
            iat: now,
            nbf: now,
            exp: now.saturating_add(validity_secs),
        }
    }

    /// `now` 시점에 만료되었는지 확인.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }

    /// 특정 권한을 가지는지 확인.
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    /// 특정 역할 이상인지 확인.
    pub fn has_role(&self, required_role: Role) -> bool {
        self.role.level() >= required_role.level()
    }

    /// 유효 구간 검사. 활성 이전 여부를 만료보다 먼저 판단합니다.
    fn check_window(&self, now: i64) -> Result<(), TokenError> {
        if now < self.nbf {
            return Err(TokenError::NotYetValid);
        }
        if self.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}

/// 발급된 토큰과 그 Claims.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    /// 직렬화된 토큰 문자열
    pub token: String,
    /// 토큰에 서명된 Claims
    pub claims: Claims,
}

impl Credential {
    /// 발급 시점 기준 남은 유효 시간 (초).
    pub fn expires_in(&self) -> i64 {
        self.claims.exp - self.claims.iat
    }
}

/// 토큰 처리 에러.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("잘못된 토큰 형식")]
    Malformed,
    #[error("토큰 서명이 유효하지 않습니다")]
    InvalidSignature,
    #[error("토큰이 만료되었습니다")]
    Expired,
    #[error("토큰이 아직 유효하지 않습니다")]
    NotYetValid,
    #[error("토큰 서명 실패: {0}")]
    Signing(String),
}

impl TokenError {
    /// 응답 본문에 사용되는 에러 코드.
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::Malformed | TokenError::InvalidSignature => "INVALID_TOKEN",
            TokenError::Expired => "TOKEN_EXPIRED",
            TokenError::NotYetValid => "TOKEN_NOT_YET_VALID",
            TokenError::Signing(_) => "TOKEN_SIGNING_FAILED",
        }
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidKeyFormat => TokenError::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::ImmatureSignature => TokenError::NotYetValid,
        _ => TokenError::Malformed,
    }
}

fn jwt_algorithm(algorithm: SigningAlgorithm) -> Algorithm {
    match algorithm {
        SigningAlgorithm::Hs256 => Algorithm::HS256,
        SigningAlgorithm::Hs384 => Algorithm::HS384,
        SigningAlgorithm::Hs512 => Algorithm::HS512,
    }
}

fn now() -> i64 {
    Utc::now().timestamp()
}

/// 토큰 서명 설정.
///
/// 프로세스 수명 동안 변경되지 않습니다.
pub struct TokenConfig {
    /// 서명 비밀 키
    pub secret: SecretString,
    /// 서명 알고리즘
    pub algorithm: SigningAlgorithm,
    /// 토큰 유효 기간
    pub validity: Duration,
    /// Authorization 헤더 접두사
    pub header_prefix: String,
}

impl TokenConfig {
    /// 기본값(HS256, 24시간, "Bearer")으로 설정 생성.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::new(secret.into().into()),
            algorithm: SigningAlgorithm::default(),
            validity: DEFAULT_VALIDITY,
            header_prefix: DEFAULT_HEADER_PREFIX.to_string(),
        }
    }

    /// 서명 알고리즘을 설정합니다.
    pub fn with_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// 유효 기간을 설정합니다.
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// 헤더 접두사를 설정합니다.
    pub fn with_header_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.header_prefix = prefix.into();
        self
    }
}

impl From<&JwtSettings> for TokenConfig {
    fn from(settings: &JwtSettings) -> Self {
        Self::new(settings.signing_key.clone())
            .with_algorithm(settings.signing_method)
            .with_validity(Duration::from_secs(settings.expiration_secs))
            .with_header_prefix(settings.token_prefix.clone())
    }
}

/// 토큰 서비스.
///
/// 생성 후에는 읽기 전용이므로 잠금 없이 모든 요청 태스크에서 공유됩니다.
pub struct TokenService {
    algorithm: SigningAlgorithm,
    validity: Duration,
    header_prefix: String,
    keys: Option<(EncodingKey, DecodingKey)>,
    validation: Validation,
}

impl TokenService {
    /// 새 토큰 서비스 생성.
    ///
    /// 비밀 키가 비어 있어도 생성은 성공하지만, 발급은 `Signing` 에러로,
    /// 검증은 `InvalidSignature`로 실패합니다.
    pub fn new(config: TokenConfig) -> Self {
        let secret = config.secret.expose_secret();
        let keys = (!secret.is_empty()).then(|| {
            (
                EncodingKey::from_secret(secret.as_bytes()),
                DecodingKey::from_secret(secret.as_bytes()),
            )
        });

        let mut validation = Validation::new(jwt_algorithm(config.algorithm));
        // 시간 검사는 check_window에서 유예 없이 직접 수행
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let header_prefix = if config.header_prefix.is_empty() {
            DEFAULT_HEADER_PREFIX.to_string()
        } else {
            config.header_prefix
        };

        Self {
            algorithm: config.algorithm,
            validity: config.validity,
            header_prefix,
            keys,
            validation,
        }
    }

    /// 설정된 서명 알고리즘.
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// 토큰 유효 기간.
    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Authorization 헤더 접두사.
    pub fn header_prefix(&self) -> &str {
        &self.header_prefix
    }

    /// 토큰 발급.
    pub fn issue(&self, user_id: u64, username: &str, role: Role) -> Result<Credential, TokenError> {
        self.issue_at(user_id, username, role, now())
    }

    /// 지정한 시각을 기준으로 토큰 발급.
    pub fn issue_at(
        &self,
        user_id: u64,
        username: &str,
        role: Role,
        now: i64,
    ) -> Result<Credential, TokenError> {
        let claims = Claims::new(user_id, username, role, now, self.validity);
        let token = self.sign(&claims)?;
        Ok(Credential { token, claims })
    }

    /// Claims를 그대로 서명하여 토큰 문자열 생성.
    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let (encoding_key, _) = self
            .keys
            .as_ref()
            .ok_or_else(|| TokenError::Signing("서명 키가 설정되지 않았습니다".to_string()))?;

        encode(
            &Header::new(jwt_algorithm(self.algorithm)),
            claims,
            encoding_key,
        )
        .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// 토큰 검증.
    ///
    /// 헤더 접두사가 있으면 제거한 뒤 서명과 유효 구간을 검사합니다.
    pub fn verify(&self, raw: &str) -> Result<Claims, TokenError> {
        self.verify_at(raw, now())
    }

    /// 지정한 시각을 기준으로 토큰 검증.
    pub fn verify_at(&self, raw: &str, now: i64) -> Result<Claims, TokenError> {
        let claims = self.decode_verified(raw)?;
        claims.check_window(now)?;
        Ok(claims)
    }

    /// 토큰 갱신.
    ///
    /// 만료만이 유일한 실패 사유인 토큰은 갱신할 수 있습니다. 서명 불일치,
    /// 형식 오류, 활성 이전 토큰은 거부됩니다.
    pub fn refresh(&self, raw: &str) -> Result<Credential, TokenError> {
        self.refresh_at(raw, now())
    }

    /// 지정한 시각을 기준으로 토큰 갱신.
    pub fn refresh_at(&self, raw: &str, now: i64) -> Result<Credential, TokenError> {
        let claims = self.decode_verified(raw)?;
        match claims.check_window(now) {
            Ok(()) | Err(TokenError::Expired) => {}
            Err(e) => return Err(e),
        }
        self.issue_at(claims.user_id, &claims.username, claims.role, now)
    }

    /// `"<prefix> "`로 시작하면 접두사를 제거합니다.
    pub fn strip_prefix<'a>(&self, raw: &'a str) -> &'a str {
        raw.strip_prefix(self.header_prefix.as_str())
            .and_then(|rest| rest.strip_prefix(' '))
            .unwrap_or(raw)
    }

    fn decode_verified(&self, raw: &str) -> Result<Claims, TokenError> {
        let token = self.strip_prefix(raw);
        if token.is_empty() {
            return Err(TokenError::Malformed);
        }

        let header = decode_header(token).map_err(|_| self.classify_header(token))?;
        if header.alg != jwt_algorithm(self.algorithm) {
            return Err(TokenError::InvalidSignature);
        }

        let (_, decoding_key) = self.keys.as_ref().ok_or(TokenError::InvalidSignature)?;

        decode::<Claims>(token, decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(classify)
    }

    /// 라이브러리가 해석하지 못한 헤더 분류.
    ///
    /// `"alg": "none"`처럼 지원 목록 밖의 알고리즘을 선언한 헤더도 다른
    /// 알고리즘 선언이므로 `InvalidSignature`입니다.
    fn classify_header(&self, token: &str) -> TokenError {
        let declared = token
            .split('.')
            .next()
            .and_then(|segment| URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok())
            .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok())
            .and_then(|header| header.get("alg")?.as_str().map(str::to_string));

        match declared {
            Some(alg) if alg != self.algorithm.as_str() => TokenError::InvalidSignature,
            _ => TokenError::Malformed,
        }
    }
}
