use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display profile supplied by a client when joining a zone or room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub gender: String,
}

/// Ephemeral per-user session stored in the key-value tier.
///
/// Created on zone join with a fixed TTL, deleted on explicit leave. A
/// session and its zone membership entry expire independently; readers skip
/// members whose session is gone instead of repairing either record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    pub username: String,
    pub gender: String,
    pub zone_id: String,
    pub joined_at: DateTime<Utc>,
}

/// A zone member with their session profile resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberInfo {
    pub user_id: String,
    pub username: String,
    pub gender: String,
    pub joined_at: DateTime<Utc>,
}

/// Result of joining a zone: the (possibly newly assigned) user id and the
/// current resolved member list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinedZone {
    pub user_id: String,
    pub members: Vec<MemberInfo>,
}

/// A message in a zone chat log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneMessage {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub gender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub zone_id: String,
}

/// A message in a private chat session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub id: String,
    pub username: String,
    pub gender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
}

/// One page of zone messages, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessagePage {
    pub messages: Vec<ZoneMessage>,
    /// Total messages currently retained in the log.
    pub total: i64,
    pub has_more: bool,
}

/// A zone visible on the shared map: either a non-empty grid-cell chat zone
/// or a private room still waiting for its second participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneInfo {
    pub zone_id: String,
    pub lat: f64,
    pub lng: f64,
    pub user_count: u32,
}

/// Lifecycle of a private chat room and its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// One participant, discoverable on the map.
    Waiting,
    /// Two participants, no longer discoverable.
    Active,
    /// Terminal. Either participant leaving ends the room for both.
    Ended,
}

/// A 1:1 private chat room pinned to a map coordinate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateRoom {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub created_at: DateTime<Utc>,
    pub user_count: u32,
    pub status: RoomStatus,
}

/// A participant in a private chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub username: String,
    pub gender: String,
    pub joined_at: DateTime<Utc>,
}

/// The conversation state for a private room. Created together with the room
/// on create-and-join; transitions waiting -> active when the second
/// participant arrives, in lockstep with the room record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateSession {
    pub id: String,
    pub room_id: String,
    pub participants: Vec<Participant>,
    pub created_at: DateTime<Utc>,
    pub status: RoomStatus,
}
