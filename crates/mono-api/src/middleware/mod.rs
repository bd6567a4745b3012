//! 요청 처리 파이프라인에 적용되는 미들웨어.
//!
//! 표준 순서: Recovery → RequestID → AccessLog → Authentication → RateLimit.

mod access_log;
mod auth;
mod rate_limit;
mod recovery;
mod request_id;

pub use access_log::access_log;
pub use auth::{authenticate, AuthOptions};
pub use rate_limit::{client_key, rate_limit, ClientKeyFn, RateLimitOptions};
pub use recovery::recovery;
pub use request_id::{generate_request_id, request_id, X_REQUEST_ID};
