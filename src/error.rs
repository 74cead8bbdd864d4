use thiserror::Error;

/// Domain outcomes from [`PresenceDirectory`](crate::PresenceDirectory)
/// operations.
///
/// Presence has no in-memory fallback: state is shared across server
/// instances and a process-local view would be meaningless, so backend
/// outages surface as [`Unavailable`](PresenceError::Unavailable) instead of
/// degrading silently. The remaining variants are expected, display-worthy
/// rejections that callers branch on.
#[derive(Debug, Error)]
pub enum PresenceError {
    /// No live backend; the 503-equivalent hard failure.
    #[error("presence backend unavailable")]
    Unavailable(#[from] anyhow::Error),
    /// The user is not in the zone's member set, or their session expired.
    #[error("user is not a member of this zone")]
    NotAMember,
    /// The private chat session is missing or has been torn down.
    #[error("chat session has ended")]
    SessionEnded,
    /// The private chat room does not exist or its TTL elapsed.
    #[error("chat room not found")]
    RoomNotFound,
    /// The private chat room is not accepting a second participant.
    #[error("chat room is not available")]
    RoomUnavailable,
}

impl PresenceError {
    /// True for outcomes a client should render as normal application state
    /// rather than an infrastructure failure.
    pub fn is_domain_rejection(&self) -> bool {
        !matches!(self, PresenceError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_not_a_domain_rejection() {
        let err = PresenceError::Unavailable(anyhow::anyhow!("connection refused"));
        assert!(!err.is_domain_rejection());
    }

    #[test]
    fn membership_and_session_errors_are_domain_rejections() {
        assert!(PresenceError::NotAMember.is_domain_rejection());
        assert!(PresenceError::SessionEnded.is_domain_rejection());
        assert!(PresenceError::RoomNotFound.is_domain_rejection());
        assert!(PresenceError::RoomUnavailable.is_domain_rejection());
    }
}
