//! Zone membership, ephemeral sessions and private chat rooms.
//!
//! Presence state is shared across every server instance, so this store has
//! no in-memory fallback: operations require a live backend and fail with
//! [`PresenceError::Unavailable`] otherwise. Clients poll across possibly
//! different instances; a process-local view would never line up.
//!
//! Membership sets, sessions and message logs carry independent TTLs. A join
//! refreshes the zone set and writes a fresh session; nothing else refreshes
//! the set, so long-silent members age out with it. Sessions and membership
//! may expire at different moments - readers skip members whose session is
//! gone and never repair either record.

use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::backend::KeyValueBackend;
use crate::config::Config;
use crate::error::PresenceError;
use crate::keys;
use crate::models::{
    ChatMessagePage, JoinedZone, MemberInfo, Participant, PrivateMessage, PrivateRoom,
    PrivateSession, RoomStatus, UserProfile, UserSession, ZoneInfo, ZoneMessage,
};

const ZONE_PREFIX: &str = "chat_zone:";
const MESSAGE_PREFIX: &str = "chat_messages:";
const SESSION_PREFIX: &str = "user_session:";
const ROOM_PREFIX: &str = "private_chat_room:";
const PRIVATE_SESSION_PREFIX: &str = "private_chat_session:";
const PRIVATE_MESSAGE_PREFIX: &str = "private_chat_messages:";

/// Synthetic member that keeps a waiting private room visible as a zone
/// until the second participant arrives. It has no session, so member
/// resolution drops it naturally.
const CREATOR_PLACEHOLDER: &str = "creator_placeholder";

/// Directory of chat zones, user sessions and private rooms.
pub struct PresenceDirectory {
    backends: Vec<Arc<dyn KeyValueBackend>>,
    session_ttl_secs: u64,
    message_log_ttl_secs: u64,
    message_log_capacity: usize,
    message_max_chars: usize,
    private_room_ttl_secs: u64,
}

impl PresenceDirectory {
    pub fn new(backends: Vec<Arc<dyn KeyValueBackend>>, config: &Config) -> Self {
        Self {
            backends,
            session_ttl_secs: config.session_ttl_secs,
            message_log_ttl_secs: config.message_log_ttl_secs,
            message_log_capacity: config.message_log_capacity,
            message_max_chars: config.message_max_chars,
            private_room_ttl_secs: config.private_room_ttl_secs,
        }
    }

    fn zone_key(zone_id: &str) -> String {
        format!("{ZONE_PREFIX}{zone_id}")
    }

    fn message_key(zone_id: &str) -> String {
        format!("{MESSAGE_PREFIX}{zone_id}")
    }

    fn session_key(user_id: &str) -> String {
        format!("{SESSION_PREFIX}{user_id}")
    }

    fn room_key(room_id: &str) -> String {
        format!("{ROOM_PREFIX}{room_id}")
    }

    fn private_session_key(session_id: &str) -> String {
        format!("{PRIVATE_SESSION_PREFIX}{session_id}")
    }

    fn private_message_key(session_id: &str) -> String {
        format!("{PRIVATE_MESSAGE_PREFIX}{session_id}")
    }

    /// The first healthy backend in configured order. Presence lives on one
    /// instance at a time; there is no cross-backend replication of it.
    async fn live_backend(&self) -> Result<&Arc<dyn KeyValueBackend>, PresenceError> {
        for backend in &self.backends {
            if backend.is_healthy().await {
                return Ok(backend);
            }
        }
        Err(PresenceError::Unavailable(anyhow!(
            "no live presence backend"
        )))
    }

    /// Adds the user to a zone and (re)writes their session. Both records
    /// get the full session TTL. Returns the assigned user id (generated
    /// when the caller has none yet) and the current resolved member list.
    pub async fn join(
        &self,
        zone_id: &str,
        user_id: Option<&str>,
        profile: &UserProfile,
    ) -> Result<JoinedZone, PresenceError> {
        let backend = self.live_backend().await?;

        let user_id = match user_id {
            Some(id) => id.to_string(),
            None => format!("user_{}", Uuid::new_v4().simple()),
        };

        let session = UserSession {
            username: profile.username.clone(),
            gender: profile.gender.clone(),
            zone_id: zone_id.to_string(),
            joined_at: Utc::now(),
        };
        backend
            .set(
                &Self::session_key(&user_id),
                &to_json(&session)?,
                self.session_ttl_secs,
            )
            .await?;

        let zone_key = Self::zone_key(zone_id);
        backend.sadd(&zone_key, &user_id).await?;
        backend.expire(&zone_key, self.session_ttl_secs).await?;

        let members = self.resolve_members(backend, zone_id).await?;

        tracing::info!(zone_id = %zone_id, user_id = %user_id, members = members.len(), "user joined zone");

        Ok(JoinedZone { user_id, members })
    }

    /// Removes the user from the zone and deletes their session. Leaving a
    /// zone the user is not in is not an error.
    pub async fn leave(&self, zone_id: &str, user_id: &str) -> Result<(), PresenceError> {
        let backend = self.live_backend().await?;

        backend.srem(&Self::zone_key(zone_id), user_id).await?;
        backend.del(&Self::session_key(user_id)).await?;

        tracing::info!(zone_id = %zone_id, user_id = %user_id, "user left zone");

        Ok(())
    }

    /// Appends a message to the zone log. Membership is checked fresh on
    /// every send; the log is trimmed to capacity and its TTL refreshed.
    pub async fn post_message(
        &self,
        zone_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<ZoneMessage, PresenceError> {
        let backend = self.live_backend().await?;

        if !backend
            .sismember(&Self::zone_key(zone_id), user_id)
            .await?
        {
            return Err(PresenceError::NotAMember);
        }

        let Some(json) = backend.get(&Self::session_key(user_id)).await? else {
            return Err(PresenceError::NotAMember);
        };
        let session: UserSession = from_json(&json)?;

        let message = ZoneMessage {
            id: message_id(),
            user_id: user_id.to_string(),
            username: session.username,
            gender: session.gender,
            text: trim_text(text, self.message_max_chars),
            timestamp: Utc::now(),
            zone_id: zone_id.to_string(),
        };

        let message_key = Self::message_key(zone_id);
        backend
            .lpush_capped(
                &message_key,
                &to_json(&message)?,
                self.message_log_capacity,
            )
            .await?;
        backend
            .expire(&message_key, self.message_log_ttl_secs)
            .await?;

        Ok(message)
    }

    /// Up to `limit` most recent zone messages in chronological order, with
    /// the total retained count and whether more exist beyond the page.
    pub async fn list_messages(
        &self,
        zone_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<ChatMessagePage, PresenceError> {
        let backend = self.live_backend().await?;

        if !backend
            .sismember(&Self::zone_key(zone_id), user_id)
            .await?
        {
            return Err(PresenceError::NotAMember);
        }

        let message_key = Self::message_key(zone_id);
        let raw = if limit == 0 {
            Vec::new()
        } else {
            backend.lrange(&message_key, limit).await?
        };

        let mut messages: Vec<ZoneMessage> = raw
            .iter()
            .filter_map(|json| serde_json::from_str(json).ok())
            .collect();
        messages.reverse();

        let total = backend.llen(&message_key).await?;

        Ok(ChatMessagePage {
            messages,
            total,
            has_more: total > limit as i64,
        })
    }

    /// The zone's members with their session profiles resolved. Members
    /// whose session expired separately are skipped, not repaired.
    pub async fn list_members(&self, zone_id: &str) -> Result<Vec<MemberInfo>, PresenceError> {
        let backend = self.live_backend().await?;
        self.resolve_members(backend, zone_id).await
    }

    /// Every zone visible on the shared map: non-empty grid-cell chat zones
    /// plus private rooms still waiting for a second participant, so other
    /// users can discover and join them.
    pub async fn list_active_zones(&self) -> Result<Vec<ZoneInfo>, PresenceError> {
        let backend = self.live_backend().await?;
        let mut zones = Vec::new();

        for key in backend.scan_keys(&format!("{ZONE_PREFIX}*")).await? {
            let Some(zone_id) = key.strip_prefix(ZONE_PREFIX) else {
                continue;
            };
            let members = backend.smembers(&key).await?;
            if members.is_empty() {
                continue;
            }
            // Room-visibility entries have non-coordinate ids; the rooms
            // themselves are appended below.
            let Some((lat, lng)) = keys::parse_zone_id(zone_id) else {
                continue;
            };
            zones.push(ZoneInfo {
                zone_id: zone_id.to_string(),
                lat,
                lng,
                user_count: members.len() as u32,
            });
        }

        for key in backend.scan_keys(&format!("{ROOM_PREFIX}*")).await? {
            let Some(json) = backend.get(&key).await? else {
                continue;
            };
            let Ok(room) = serde_json::from_str::<PrivateRoom>(&json) else {
                continue;
            };
            if room.status == RoomStatus::Waiting {
                zones.push(ZoneInfo {
                    zone_id: room.id.clone(),
                    lat: room.lat,
                    lng: room.lng,
                    user_count: room.user_count,
                });
            }
        }

        Ok(zones)
    }

    /// Creates a private room at a coordinate, waiting for participants.
    pub async fn create_room(&self, lat: f64, lng: f64) -> Result<PrivateRoom, PresenceError> {
        let backend = self.live_backend().await?;
        let room = new_room(lat, lng);

        backend
            .set(
                &Self::room_key(&room.id),
                &to_json(&room)?,
                self.private_room_ttl_secs,
            )
            .await?;

        tracing::info!(room_id = %room.id, "private room created");

        Ok(room)
    }

    /// Creates a private room together with its session, the creator as
    /// sole participant, and a placeholder zone entry so the room shows up
    /// on the map immediately.
    pub async fn create_and_join(
        &self,
        lat: f64,
        lng: f64,
        profile: &UserProfile,
    ) -> Result<(PrivateRoom, PrivateSession), PresenceError> {
        let backend = self.live_backend().await?;

        let room = new_room(lat, lng);
        let session = PrivateSession {
            id: format!("session_{}", Uuid::new_v4().simple()),
            room_id: room.id.clone(),
            participants: vec![participant(profile)],
            created_at: Utc::now(),
            status: RoomStatus::Waiting,
        };

        backend
            .set(
                &Self::room_key(&room.id),
                &to_json(&room)?,
                self.private_room_ttl_secs,
            )
            .await?;
        backend
            .set(
                &Self::private_session_key(&session.id),
                &to_json(&session)?,
                self.private_room_ttl_secs,
            )
            .await?;

        let zone_key = Self::zone_key(&room.id);
        backend.sadd(&zone_key, CREATOR_PLACEHOLDER).await?;
        backend.expire(&zone_key, self.private_room_ttl_secs).await?;

        tracing::info!(room_id = %room.id, session_id = %session.id, "private room created and joined");

        Ok((room, session))
    }

    /// Joins an existing waiting room as the second participant. Room and
    /// session flip to active in lockstep and the room disappears from
    /// public discovery.
    pub async fn join_room(
        &self,
        room_id: &str,
        profile: &UserProfile,
    ) -> Result<PrivateSession, PresenceError> {
        let backend = self.live_backend().await?;

        let Some(json) = backend.get(&Self::room_key(room_id)).await? else {
            return Err(PresenceError::RoomNotFound);
        };
        let mut room: PrivateRoom = from_json(&json)?;

        if room.status != RoomStatus::Waiting {
            return Err(PresenceError::RoomUnavailable);
        }

        let mut session = self
            .find_waiting_session(backend, room_id)
            .await?
            .ok_or(PresenceError::RoomUnavailable)?;

        session.participants.push(participant(profile));
        session.status = RoomStatus::Active;
        room.user_count = 2;
        room.status = RoomStatus::Active;

        backend
            .set(
                &Self::room_key(room_id),
                &to_json(&room)?,
                self.private_room_ttl_secs,
            )
            .await?;
        backend
            .set(
                &Self::private_session_key(&session.id),
                &to_json(&session)?,
                self.private_room_ttl_secs,
            )
            .await?;

        // The map marker disappears once the room is full.
        backend.del(&Self::zone_key(room_id)).await?;

        tracing::info!(room_id = %room_id, session_id = %session.id, "private chat active");

        Ok(session)
    }

    /// Appends a message to an active private session's log. Sends against
    /// a missing or non-active session report the session as ended.
    pub async fn post_private_message(
        &self,
        session_id: &str,
        profile: &UserProfile,
        text: &str,
    ) -> Result<PrivateMessage, PresenceError> {
        let backend = self.live_backend().await?;

        let Some(json) = backend
            .get(&Self::private_session_key(session_id))
            .await?
        else {
            return Err(PresenceError::SessionEnded);
        };
        let session: PrivateSession = from_json(&json)?;

        if session.status != RoomStatus::Active {
            return Err(PresenceError::SessionEnded);
        }

        let message = PrivateMessage {
            id: message_id(),
            username: profile.username.clone(),
            gender: profile.gender.clone(),
            text: trim_text(text, self.message_max_chars),
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
        };

        let message_key = Self::private_message_key(session_id);
        backend
            .lpush_capped(
                &message_key,
                &to_json(&message)?,
                self.message_log_capacity,
            )
            .await?;
        backend
            .expire(&message_key, self.private_room_ttl_secs)
            .await?;

        Ok(message)
    }

    /// The session's retained messages in chronological order. A waiting
    /// session polls successfully (empty list while solo); a missing or
    /// ended one reports ended so clients can close the conversation.
    pub async fn list_private_messages(
        &self,
        session_id: &str,
    ) -> Result<Vec<PrivateMessage>, PresenceError> {
        let backend = self.live_backend().await?;

        let Some(json) = backend
            .get(&Self::private_session_key(session_id))
            .await?
        else {
            return Err(PresenceError::SessionEnded);
        };
        let session: PrivateSession = from_json(&json)?;

        if session.status == RoomStatus::Ended {
            return Err(PresenceError::SessionEnded);
        }

        let raw = backend
            .lrange(
                &Self::private_message_key(session_id),
                self.message_log_capacity,
            )
            .await?;

        let mut messages: Vec<PrivateMessage> = raw
            .iter()
            .filter_map(|json| serde_json::from_str(json).ok())
            .collect();
        messages.reverse();

        Ok(messages)
    }

    /// Hard teardown: either participant leaving deletes the session, its
    /// message log, the room and any leftover map visibility entry. The
    /// conversation ends for both sides; it is terminal and not resumable.
    pub async fn leave_private(&self, session_id: &str) -> Result<(), PresenceError> {
        let backend = self.live_backend().await?;

        let Some(json) = backend
            .get(&Self::private_session_key(session_id))
            .await?
        else {
            return Err(PresenceError::SessionEnded);
        };
        let session: PrivateSession = from_json(&json)?;

        backend.del(&Self::private_session_key(session_id)).await?;
        backend.del(&Self::private_message_key(session_id)).await?;
        backend.del(&Self::room_key(&session.room_id)).await?;
        backend.del(&Self::zone_key(&session.room_id)).await?;

        tracing::info!(room_id = %session.room_id, session_id = %session_id, "private chat torn down");

        Ok(())
    }

    async fn resolve_members(
        &self,
        backend: &Arc<dyn KeyValueBackend>,
        zone_id: &str,
    ) -> Result<Vec<MemberInfo>, PresenceError> {
        let user_ids = backend.smembers(&Self::zone_key(zone_id)).await?;
        let mut members = Vec::with_capacity(user_ids.len());

        for user_id in user_ids {
            let Some(json) = backend.get(&Self::session_key(&user_id)).await? else {
                continue;
            };
            let Ok(session) = serde_json::from_str::<UserSession>(&json) else {
                continue;
            };
            members.push(MemberInfo {
                user_id,
                username: session.username,
                gender: session.gender,
                joined_at: session.joined_at,
            });
        }

        Ok(members)
    }

    async fn find_waiting_session(
        &self,
        backend: &Arc<dyn KeyValueBackend>,
        room_id: &str,
    ) -> Result<Option<PrivateSession>, PresenceError> {
        for key in backend
            .scan_keys(&format!("{PRIVATE_SESSION_PREFIX}*"))
            .await?
        {
            let Some(json) = backend.get(&key).await? else {
                continue;
            };
            let Ok(session) = serde_json::from_str::<PrivateSession>(&json) else {
                continue;
            };
            if session.room_id == room_id && session.status == RoomStatus::Waiting {
                return Ok(Some(session));
            }
        }
        Ok(None)
    }
}

fn new_room(lat: f64, lng: f64) -> PrivateRoom {
    PrivateRoom {
        id: format!("room_{}", Uuid::new_v4().simple()),
        lat,
        lng,
        created_at: Utc::now(),
        user_count: 1,
        status: RoomStatus::Waiting,
    }
}

fn participant(profile: &UserProfile) -> Participant {
    Participant {
        username: profile.username.clone(),
        gender: profile.gender.clone(),
        joined_at: Utc::now(),
    }
}

fn message_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

fn trim_text(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn to_json<T: Serialize>(value: &T) -> Result<String, PresenceError> {
    Ok(serde_json::to_string(value).map_err(anyhow::Error::from)?)
}

fn from_json<T: DeserializeOwned>(json: &str) -> Result<T, PresenceError> {
    Ok(serde_json::from_str(json).map_err(anyhow::Error::from)?)
}
