//! 클라이언트 키별 Token Bucket rate limiter.
//!
//! 버킷은 요청 시점에 지연 리필(lazy refill)되므로 키마다 타이머를 두지 않습니다.
//! 레지스트리는 샤딩된 `DashMap`에 버킷을 보관하고, 각 버킷은 자체 뮤텍스로
//! 리필-차감 과정을 원자적으로 수행합니다. 서로 다른 키의 버킷은 경합하지 않습니다.
//!
//! 유휴 버킷은 [`RateLimiterRegistry::spawn_sweeper`]가 주기적으로 정리합니다.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use mono_core::RateLimitSettings;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Rate limiter 에러.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RateLimitError {
    #[error("잘못된 rate limit 설정: {0}")]
    InvalidConfig(String),
    #[error("요청 한도를 초과했습니다 ({retry_after}초 후 재시도)")]
    Exceeded {
        /// 재시도까지 대기 시간 (초, 최소 1)
        retry_after: u64,
    },
}

/// Rate Limiter 설정.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// 버킷 용량 (순간 버스트 상한)
    pub capacity: f64,
    /// 초당 리필되는 토큰 수
    pub refill_rate: f64,
    /// 이 시간 동안 사용되지 않은 버킷은 정리 대상
    pub idle_ttl: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 20.0,
            refill_rate: 10.0,
            idle_ttl: Duration::from_secs(600),
        }
    }
}

impl RateLimitConfig {
    /// 새 설정 생성.
    pub fn new(refill_rate: f64, capacity: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            ..Default::default()
        }
    }

    /// 유휴 정리 기준 시간을 설정합니다.
    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    /// 용량과 리필 속도는 유한한 양수여야 합니다.
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if !(self.capacity.is_finite() && self.capacity > 0.0) {
            return Err(RateLimitError::InvalidConfig(format!(
                "capacity must be positive, got {}",
                self.capacity
            )));
        }
        if !(self.refill_rate.is_finite() && self.refill_rate > 0.0) {
            return Err(RateLimitError::InvalidConfig(format!(
                "refill_rate must be positive, got {}",
                self.refill_rate
            )));
        }
        Ok(())
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self::new(settings.refill_rate, settings.capacity)
            .with_idle_ttl(Duration::from_secs(settings.idle_ttl_secs))
    }
}

/// 토큰 1개로 인정하는 허용 오차.
///
/// `Duration`은 나노초 단위로 잘리므로 `1/refill_rate`초를 기다려도 리필량이
/// 1.0보다 아주 조금 작을 수 있습니다.
const TOKEN_SLACK: f64 = 1e-6;

/// Token Bucket.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    /// 현재 토큰 수
    tokens: f64,
    /// 마지막 리필 시간
    last_refill: Instant,
}

impl TokenBucket {
    /// 가득 찬 상태로 생성.
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.refill_rate).min(config.capacity);
        self.last_refill = now;
    }

    /// 토큰 소비 시도. 성공하면 `true`.
    fn try_acquire(&mut self, config: &RateLimitConfig, now: Instant) -> bool {
        self.refill(config, now);

        if self.tokens >= 1.0 - TOKEN_SLACK {
            self.tokens = (self.tokens - 1.0).max(0.0);
            true
        } else {
            false
        }
    }

    /// 다음 토큰까지 대기 시간 (초).
    fn time_until_next_token(&self, config: &RateLimitConfig) -> f64 {
        if self.tokens >= 1.0 - TOKEN_SLACK {
            0.0
        } else {
            (1.0 - self.tokens) / config.refill_rate
        }
    }

    fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_refill) >= ttl
    }
}

/// 클라이언트 키별 버킷 레지스트리.
///
/// 의존성 주입으로 공유되며(`Arc`), 호출자는 별도 동기화 없이 여러 태스크에서
/// 동시에 사용할 수 있습니다.
pub struct RateLimiterRegistry {
    config: RateLimitConfig,
    buckets: DashMap<String, Mutex<TokenBucket>>,
}

impl RateLimiterRegistry {
    /// 새 레지스트리 생성. 용량이나 리필 속도가 양수가 아니면 실패합니다.
    pub fn new(config: RateLimitConfig) -> Result<Self, RateLimitError> {
        config.validate()?;
        Ok(Self {
            config,
            buckets: DashMap::new(),
        })
    }

    /// 레지스트리 설정.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// 요청 허용 여부 확인.
    pub fn check(&self, key: &str) -> Result<(), RateLimitError> {
        self.check_at(key, Instant::now())
    }

    /// 지정한 시각을 기준으로 요청 허용 여부 확인.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<(), RateLimitError> {
        // 이미 존재하는 버킷은 샤드 읽기 잠금만으로 접근
        if let Some(bucket) = self.buckets.get(key) {
            return self.acquire(&mut bucket.lock(), now);
        }

        let bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(TokenBucket::new(self.config.capacity, now)));
        let result = self.acquire(&mut bucket.lock(), now);
        result
    }

    /// 요청 허용 여부만 반환합니다.
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).is_ok()
    }

    fn acquire(&self, bucket: &mut TokenBucket, now: Instant) -> Result<(), RateLimitError> {
        if bucket.try_acquire(&self.config, now) {
            Ok(())
        } else {
            let retry_after = bucket.time_until_next_token(&self.config).ceil().max(1.0) as u64;
            Err(RateLimitError::Exceeded { retry_after })
        }
    }

    /// 해당 키의 버킷이 존재하는지 확인.
    pub fn contains(&self, key: &str) -> bool {
        self.buckets.contains_key(key)
    }

    /// 현재 추적 중인 키 수 반환.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    /// 해당 키 버킷의 현재 토큰 수 (리필 전 값).
    pub fn tokens(&self, key: &str) -> Option<f64> {
        self.buckets.get(key).map(|bucket| bucket.lock().tokens)
    }

    /// 유휴 버킷 정리. 제거된 버킷 수를 반환합니다.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    /// 지정한 시각을 기준으로 유휴 버킷 정리.
    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let ttl = self.config.idle_ttl;
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| !bucket.get_mut().is_idle(now, ttl));
        before.saturating_sub(self.buckets.len())
    }

    /// 주기적으로 유휴 버킷을 정리하는 백그라운드 태스크를 시작합니다.
    ///
    /// `shutdown`이 취소되면 태스크가 종료됩니다.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let interval = interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs_f64(), "Rate limiter sweeper started");

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 첫 tick은 즉시 완료됨
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Rate limiter sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = self.evict_idle();
                        let remaining = self.tracked_keys();
                        crate::metrics::record_rate_limit_keys(remaining);
                        if evicted > 0 {
                            debug!(evicted, remaining, "Evicted idle rate limit buckets");
                        }
                    }
                }
            }
        })
    }
}
