use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Runtime configuration, loaded from `PLAZA_`-prefixed environment
/// variables. Every TTL, quota and capacity used by the cache and presence
/// tiers is tunable here; the defaults match production.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Comma- or space-separated Redis URLs. Empty means no backends are
    /// configured and the cache runs in pure in-memory fallback mode.
    #[serde(default)]
    pub redis_urls: String,
    /// TTL for viewport-bounded query results.
    #[serde(default = "default_viewport_ttl")]
    pub viewport_ttl_secs: u64,
    /// TTL for "top N" query results.
    #[serde(default = "default_top_n_ttl")]
    pub top_n_ttl_secs: u64,
    /// TTL for chat zone membership sets and user sessions.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    /// TTL for zone message logs, refreshed on every send.
    #[serde(default = "default_message_log_ttl")]
    pub message_log_ttl_secs: u64,
    /// Maximum retained messages per zone or private session log.
    #[serde(default = "default_message_log_capacity")]
    pub message_log_capacity: usize,
    /// Message text is trimmed to this many characters before storage.
    #[serde(default = "default_message_max_chars")]
    pub message_max_chars: usize,
    /// TTL for private chat rooms, sessions and their message logs.
    #[serde(default = "default_private_room_ttl")]
    pub private_room_ttl_secs: u64,
    /// Writes allowed per client token per UTC calendar day.
    #[serde(default = "default_daily_quota")]
    pub daily_quota: i64,
    /// Writes allowed per client token per 60-second window.
    #[serde(default = "default_minute_quota")]
    pub minute_quota: i64,
    /// Writes allowed per client token per 3600-second window.
    #[serde(default = "default_hour_quota")]
    pub hour_quota: i64,
    /// 1-per-N-seconds gate between consecutive writes from one token.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    /// Window within which identical submissions are counted as duplicates.
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,
    /// Identical submissions allowed per fingerprint within the window.
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: i64,
}

fn default_viewport_ttl() -> u64 {
    600
}

fn default_top_n_ttl() -> u64 {
    300
}

fn default_session_ttl() -> u64 {
    86_400
}

fn default_message_log_ttl() -> u64 {
    86_400
}

fn default_message_log_capacity() -> usize {
    100
}

fn default_message_max_chars() -> usize {
    200
}

fn default_private_room_ttl() -> u64 {
    3_600
}

fn default_daily_quota() -> i64 {
    10
}

fn default_minute_quota() -> i64 {
    20
}

fn default_hour_quota() -> i64 {
    200
}

fn default_cooldown() -> u64 {
    2
}

fn default_dedup_window() -> u64 {
    300
}

fn default_dedup_threshold() -> i64 {
    3
}

impl Config {
    /// Loads configuration from `PLAZA_`-prefixed environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(envy::prefixed("PLAZA_").from_env::<Config>()?)
    }

    /// The configured backend URLs, split on commas and whitespace.
    pub fn backend_urls(&self) -> Vec<String> {
        self.redis_urls
            .split([',', ' '])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        serde_json::from_str("{}").expect("all fields have defaults")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_urls_splits_on_commas_and_whitespace() {
        let config = Config {
            redis_urls: "redis://a:6379, redis://b:6379 redis://c:6379".to_string(),
            ..Config::default()
        };

        assert_eq!(
            config.backend_urls(),
            vec!["redis://a:6379", "redis://b:6379", "redis://c:6379"]
        );
    }

    #[test]
    fn empty_url_list_means_no_backends() {
        let config = Config::default();
        assert!(config.backend_urls().is_empty());
    }

    #[test]
    fn defaults_match_production_values() {
        let config = Config::default();

        assert_eq!(config.viewport_ttl_secs, 600);
        assert_eq!(config.session_ttl_secs, 86_400);
        assert_eq!(config.message_log_capacity, 100);
        assert_eq!(config.message_max_chars, 200);
        assert_eq!(config.private_room_ttl_secs, 3_600);
        assert_eq!(config.daily_quota, 10);
        assert_eq!(config.dedup_threshold, 3);
    }
}
