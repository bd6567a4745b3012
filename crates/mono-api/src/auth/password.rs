//! 비밀번호 해싱 유틸리티.
//!
//! Argon2 기반 비밀번호 해싱 및 검증.

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Argon2,
};

/// 비밀번호 처리 에러.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("비밀번호 해싱 실패")]
    HashingFailed,
    #[error("비밀번호 검증 실패")]
    VerificationFailed,
    #[error("잘못된 해시 형식")]
    InvalidHashFormat,
}

/// 비밀번호 해싱.
///
/// Argon2id 알고리즘을 사용하며 솔트는 자동으로 생성됩니다.
/// 반환값은 솔트를 포함한 PHC 형식 문자열입니다.
///
/// ```rust,ignore
/// let hash = hash_password("my_secure_password").unwrap();
/// // "$argon2id$v=19$m=19456,t=2,p=1$..."
/// ```
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| PasswordError::HashingFailed)?;

    Ok(hash.to_string())
}

/// 저장된 해시와 입력된 비밀번호를 비교합니다.
pub fn verify_password(password: &str, hash: &str) -> Result<(), PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| PasswordError::VerificationFailed)
}

/// 비밀번호 강도 검증.
///
/// - 최소 8자 이상
/// - 최소 1개의 숫자 포함
/// - 최소 1개의 영문자 포함
pub fn validate_password_strength(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < 8 {
        return Err("비밀번호는 최소 8자 이상이어야 합니다");
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("비밀번호에 최소 1개의 숫자가 포함되어야 합니다");
    }

    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err("비밀번호에 최소 1개의 영문자가 포함되어야 합니다");
    }

    Ok(())
}

/// 사용자 서비스가 의존하는 비밀번호 해셔.
///
/// 테스트에서는 비용이 낮은 구현으로 교체할 수 있습니다.
pub trait PasswordHasher: Send + Sync + 'static {
    /// 평문 비밀번호를 해싱합니다.
    fn hash(&self, password: &str) -> Result<String, PasswordError>;

    /// 평문 비밀번호가 저장된 해시와 일치하는지 확인합니다.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Argon2id 해셔.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String, PasswordError> {
        hash_password(password)
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        verify_password(password, hash).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_password() {
        let password = "TestPassword123!";
        let hash = hash_password(password).unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(password, &hash).is_ok());
        assert!(verify_password("WrongPassword123!", &hash).is_err());
    }

    #[test]
    fn test_different_passwords_different_hashes() {
        let hash1 = hash_password("Password1").unwrap();
        let hash2 = hash_password("Password1").unwrap();

        // 솔트가 다르므로 해시도 다름
        assert_ne!(hash1, hash2);
        assert!(verify_password("Password1", &hash1).is_ok());
        assert!(verify_password("Password1", &hash2).is_ok());
    }

    #[test]
    fn test_invalid_hash_format() {
        let result = verify_password("password", "not-a-valid-hash");
        assert!(matches!(result, Err(PasswordError::InvalidHashFormat)));
    }

    #[test]
    fn test_password_strength_validation() {
        assert!(validate_password_strength("Password1").is_ok());
        assert!(validate_password_strength("abcd1234").is_ok());

        assert!(validate_password_strength("Pass1").is_err());
        assert!(validate_password_strength("Password").is_err());
        assert!(validate_password_strength("12345678").is_err());
        assert!(validate_password_strength("").is_err());
    }

    #[test]
    fn test_argon2_hasher_trait() {
        let hasher = Argon2Hasher;
        let hash = hasher.hash("한글패스워드123").unwrap();

        assert!(hasher.verify("한글패스워드123", &hash));
        assert!(!hasher.verify("다른패스워드123", &hash));
        assert!(!hasher.verify("anything", "garbage"));
    }
}
