//! Ephemeral stores (Redis pool + in-process fallback).
//!
//! All data in this tier expires via TTL. Cached query results tolerate
//! backend loss by degrading to an in-process fallback; presence state does
//! not, because it must be shared across server instances.
//!
//! ## Stores
//!
//! - **backend** - one remote Redis instance behind the `KeyValueBackend` trait
//! - **fallback** - process-local map with per-key expiry, used when no backend is healthy
//! - **cache** - multi-backend fan-out reads/writes, read-through caching
//! - **rate_limit** - fixed-window counters, cooldowns, duplicate suppression
//! - **presence** - chat zones, user sessions, private rooms
//!
//! ## Key Patterns
//!
//! ```text
//! {category}:bounds:{s}:{n}:{w}:{e}:{limit}   → cached viewport rows (JSON)
//! {category}:top:{limit}                      → cached top-N rows (JSON)
//! ratelimit:daily:{token}:{YYYY-MM-DD}        → daily write counter
//! ratelimit:minute:{token}                    → 60s window counter
//! ratelimit:hour:{token}                      → 3600s window counter
//! ratelimit:cooldown:{token}                  → 1-per-N-seconds gate
//! ratelimit:dupe:{sha256}                     → duplicate-content counter
//! chat_zone:{zoneId}                          → SET of user ids
//! user_session:{userId}                       → UserSession JSON
//! chat_messages:{zoneId}                      → LIST of ZoneMessage JSON
//! private_chat_room:{roomId}                  → PrivateRoom JSON
//! private_chat_session:{sessionId}            → PrivateSession JSON
//! private_chat_messages:{sessionId}           → LIST of PrivateMessage JSON
//! ```

mod backend;
mod cache;
mod fallback;
mod presence;
mod rate_limit;

pub use backend::{KeyValueBackend, RedisBackend, connect_backends};
pub use cache::{CacheManager, CacheStats};
pub use fallback::FallbackStore;
pub use presence::PresenceDirectory;
pub use rate_limit::{RateLimitDecision, RateLimiter};

#[cfg(test)]
pub use backend::MockKeyValueBackend;
