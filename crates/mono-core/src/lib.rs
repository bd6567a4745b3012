//! # Mono Core
//!
//! API 서버 전반에서 공유되는 기반 구성 요소를 제공합니다:
//! - 설정 관리 (파일 + 환경 변수)
//! - 로깅 인프라 및 패닉 훅
//! - 핵심 에러 타입

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
pub use logging::*;
