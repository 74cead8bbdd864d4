//! Cache, rate-limit and presence layer for the Plaza location chat service.
//!
//! Plaza renders user notes and chat zones on a shared map. The relational
//! store that backs notes is slow to query by viewport, so every read goes
//! through a multi-backend cache tier, and every write is gated by TTL-based
//! counters. Chat presence (who is in which grid-cell zone, plus 1:1 private
//! rooms) is ephemeral and lives entirely in the key-value tier.
//!
//! ## Components
//!
//! - [`CacheManager`] - fans reads/writes across a pool of redundant Redis
//!   backends with an in-process [`FallbackStore`] when none are reachable.
//! - [`RateLimiter`] - fixed-window counters (daily / hourly / per-minute),
//!   cooldown gates and duplicate-content suppression on top of the cache.
//! - [`PresenceDirectory`] - zone membership, ephemeral user sessions,
//!   bounded message logs and the private chat room state machine. Requires
//!   a live backend; presence never degrades to process-local state.
//!
//! ## Usage
//!
//! Construct everything once at startup and hand references to request
//! handlers - there are no hidden singletons:
//!
//! ```ignore
//! let config = Config::from_env()?;
//! let backends = connect_backends(&config).await;
//! let cache = Arc::new(CacheManager::new(backends.clone()));
//! let limiter = RateLimiter::new(cache.clone(), &config);
//! let presence = PresenceDirectory::new(backends, &config);
//! ```

mod config;
mod error;
pub mod keys;
mod models;
mod stores;
#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use error::PresenceError;
pub use models::{
    ChatMessagePage, JoinedZone, MemberInfo, Participant, PrivateMessage, PrivateRoom,
    PrivateSession, RoomStatus, UserProfile, UserSession, ZoneInfo, ZoneMessage,
};
pub use stores::{
    CacheManager, CacheStats, FallbackStore, KeyValueBackend, PresenceDirectory, RateLimitDecision,
    RateLimiter, RedisBackend, connect_backends,
};

#[cfg(test)]
pub use stores::MockKeyValueBackend;
