use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier assigned by the signaling server to each connection.
pub type PeerId = String;

/// Domain model đại diện một tin nhắn chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub from: PeerId,
    /// Equals the sender's own id when a sent message is echoed back locally.
    pub to: PeerId,
    pub timestamp: i64,
    /// True iff the message travelled over a direct data channel.
    pub is_p2p: bool,
}

impl ChatMessage {
    pub fn new(
        content: impl Into<String>,
        from: impl Into<PeerId>,
        to: impl Into<PeerId>,
        is_p2p: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            from: from.into(),
            to: to.into(),
            timestamp: Utc::now().timestamp(),
            is_p2p,
        }
    }
}

/// Người dùng trong roster do signaling server quản lý.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: PeerId,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_do_not_collide_under_rapid_creation() {
        let ids: std::collections::HashSet<String> = (0..1000)
            .map(|_| ChatMessage::new("hi", "a", "b", true).id)
            .collect();
        assert_eq!(ids.len(), 1000);
    }
}
