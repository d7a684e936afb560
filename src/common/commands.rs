use super::types::PeerId;

/// Lệnh UI gửi xuống tầng mạng.
#[derive(Debug, Clone)]
pub enum NetworkCommand {
    /// Announce ourselves to the relay under `username`.
    Join { username: String },
    /// Start negotiating a direct channel with `peer_id`.
    ConnectToPeer { peer_id: PeerId },
    /// Deliver `content` to `to`, directly when possible, otherwise via relay.
    SendMessage { to: PeerId, content: String },
    ClosePeer { peer_id: PeerId },
    /// Close every session and the signaling connection.
    Disconnect,
}
