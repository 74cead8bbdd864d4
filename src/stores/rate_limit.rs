//! TTL-window rate limiting on top of the cache tier's counters.
//!
//! Identity is a long-lived opaque client token, not an authenticated user:
//! quotas bound abuse per token, and a client that discards its token starts
//! fresh. That is the trust model, not a defect to patch here.
//!
//! The counting primitives (`daily`, `minute`, `hourly`, `cooldown`,
//! `duplicate`) return raw window counts and never block; the paired
//! `check_*` helpers compare against the configured quotas for callers that
//! use the standard thresholds.

use std::sync::Arc;

use chrono::{DateTime, Days, Utc};
use sha2::{Digest, Sha256};

use super::cache::CacheManager;
use crate::config::Config;

/// Outcome of comparing a window count against its quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Under or at the quota, with the current count.
    Allowed(i64),
    /// Over the quota, with the current count.
    Exceeded(i64),
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed(_))
    }

    pub fn count(&self) -> i64 {
        match self {
            RateLimitDecision::Allowed(count) | RateLimitDecision::Exceeded(count) => *count,
        }
    }
}

/// Fixed-window counters keyed by client token.
pub struct RateLimiter {
    cache: Arc<CacheManager>,
    daily_quota: i64,
    minute_quota: i64,
    hour_quota: i64,
    cooldown_secs: u64,
    dedup_window_secs: u64,
    dedup_threshold: i64,
}

impl RateLimiter {
    pub fn new(cache: Arc<CacheManager>, config: &Config) -> Self {
        Self {
            cache,
            daily_quota: config.daily_quota,
            minute_quota: config.minute_quota,
            hour_quota: config.hour_quota,
            cooldown_secs: config.cooldown_secs,
            dedup_window_secs: config.dedup_window_secs,
            dedup_threshold: config.dedup_threshold,
        }
    }

    /// Count for the token's current UTC calendar day. The window key
    /// carries the date and the counter expires at the next UTC midnight,
    /// however late in the day it was first touched.
    pub async fn daily(&self, token: &str, now: DateTime<Utc>) -> i64 {
        let key = format!("ratelimit:daily:{token}:{}", now.format("%Y-%m-%d"));
        let ttl = seconds_until_utc_midnight(now);
        self.cache.incr(&key, ttl as u64).await
    }

    /// Count for the token's current 60-second window.
    pub async fn minute(&self, token: &str) -> i64 {
        let key = format!("ratelimit:minute:{token}");
        self.cache.incr(&key, 60).await
    }

    /// Count for the token's current 3600-second window.
    pub async fn hourly(&self, token: &str) -> i64 {
        let key = format!("ratelimit:hour:{token}");
        self.cache.incr(&key, 3600).await
    }

    /// Count for the token's 1-per-N-seconds gate. Any count above 1 within
    /// the window is a violation.
    pub async fn cooldown(&self, token: &str) -> i64 {
        let key = format!("ratelimit:cooldown:{token}");
        self.cache.incr(&key, self.cooldown_secs).await
    }

    /// Count of submissions carrying this exact normalized content within
    /// the dedup window.
    pub async fn duplicate(&self, parts: &[&str]) -> i64 {
        let key = format!("ratelimit:dupe:{}", fingerprint(parts));
        self.cache.incr(&key, self.dedup_window_secs).await
    }

    pub async fn check_daily(&self, token: &str, now: DateTime<Utc>) -> RateLimitDecision {
        decide(self.daily(token, now).await, self.daily_quota)
    }

    pub async fn check_minute(&self, token: &str) -> RateLimitDecision {
        decide(self.minute(token).await, self.minute_quota)
    }

    pub async fn check_hourly(&self, token: &str) -> RateLimitDecision {
        decide(self.hourly(token).await, self.hour_quota)
    }

    pub async fn check_cooldown(&self, token: &str) -> RateLimitDecision {
        decide(self.cooldown(token).await, 1)
    }

    pub async fn check_duplicate(&self, parts: &[&str]) -> RateLimitDecision {
        decide(self.duplicate(parts).await, self.dedup_threshold)
    }
}

fn decide(count: i64, quota: i64) -> RateLimitDecision {
    if count > quota {
        RateLimitDecision::Exceeded(count)
    } else {
        RateLimitDecision::Allowed(count)
    }
}

/// Stable hash of normalized content fields: trimmed, lowercased, joined.
/// Cosmetic whitespace and casing changes map to the same fingerprint.
fn fingerprint(parts: &[&str]) -> String {
    let normalized = parts
        .iter()
        .map(|part| part.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join("\n");

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

fn seconds_until_utc_midnight(now: DateTime<Utc>) -> i64 {
    let next_midnight = (now.date_naive() + Days::new(1))
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc();
    (next_midnight - now).num_seconds().max(1)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn limiter() -> RateLimiter {
        let config = Config {
            daily_quota: 10,
            minute_quota: 2,
            dedup_threshold: 3,
            ..Config::default()
        };
        RateLimiter::new(Arc::new(CacheManager::new(Vec::new())), &config)
    }

    #[test]
    fn midnight_ttl_counts_down_to_day_boundary() {
        let now = Utc.with_ymd_and_hms(2026, 8, 6, 23, 59, 50).unwrap();
        assert_eq!(seconds_until_utc_midnight(now), 10);

        let midnight = Utc.with_ymd_and_hms(2026, 8, 7, 0, 0, 0).unwrap();
        assert_eq!(seconds_until_utc_midnight(midnight), 86_400);
    }

    #[tokio::test]
    async fn daily_quota_allows_ten_then_rejects_the_eleventh() {
        let limiter = limiter();
        let now = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();

        for expected in 1..=10 {
            let decision = limiter.check_daily("tok", now).await;
            assert_eq!(decision, RateLimitDecision::Allowed(expected));
        }

        assert_eq!(
            limiter.check_daily("tok", now).await,
            RateLimitDecision::Exceeded(11)
        );
    }

    #[tokio::test]
    async fn daily_count_restarts_at_one_after_utc_midnight() {
        let limiter = limiter();
        let before = Utc.with_ymd_and_hms(2026, 8, 6, 23, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 8, 7, 0, 0, 1).unwrap();

        assert_eq!(limiter.daily("tok", before).await, 1);
        assert_eq!(limiter.daily("tok", before).await, 2);
        assert_eq!(limiter.daily("tok", after).await, 1);
    }

    #[tokio::test]
    async fn daily_quotas_are_per_token() {
        let limiter = limiter();
        let now = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();

        assert_eq!(limiter.daily("a", now).await, 1);
        assert_eq!(limiter.daily("b", now).await, 1);
    }

    #[tokio::test]
    async fn cooldown_flags_a_second_call_inside_the_window() {
        let limiter = limiter();

        assert!(limiter.check_cooldown("tok").await.is_allowed());
        assert_eq!(
            limiter.check_cooldown("tok").await,
            RateLimitDecision::Exceeded(2)
        );
    }

    #[tokio::test]
    async fn minute_window_uses_configured_quota() {
        let limiter = limiter();

        assert!(limiter.check_minute("tok").await.is_allowed());
        assert!(limiter.check_minute("tok").await.is_allowed());
        assert!(!limiter.check_minute("tok").await.is_allowed());
    }

    #[tokio::test]
    async fn fourth_duplicate_submission_is_rejected() {
        let limiter = limiter();
        let content = ["My house note", "40.4168", "-3.7038"];

        for _ in 0..3 {
            assert!(limiter.check_duplicate(&content).await.is_allowed());
        }

        assert_eq!(
            limiter.check_duplicate(&content).await,
            RateLimitDecision::Exceeded(4)
        );
    }

    #[tokio::test]
    async fn duplicate_fingerprint_ignores_case_and_outer_whitespace() {
        let limiter = limiter();

        assert_eq!(limiter.duplicate(&["  Hello World "]).await, 1);
        assert_eq!(limiter.duplicate(&["hello world"]).await, 2);
        assert_eq!(limiter.duplicate(&["different note"]).await, 1);
    }

    #[tokio::test]
    async fn decision_exposes_the_raw_count() {
        let limiter = limiter();
        limiter.minute("tok").await;

        let decision = limiter.check_minute("tok").await;
        assert_eq!(decision.count(), 2);
    }
}
