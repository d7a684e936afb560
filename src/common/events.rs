use super::types::{ChatMessage, PeerId, User};
use crate::network::ConnectionState;

/// Sự kiện từ tầng mạng gửi lên UI.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    Connected { local_id: PeerId },
    UserList(Vec<User>),
    UserJoined(User),
    /// `username` falls back to the relay's last-known name, then to
    /// [`UNKNOWN_USER`](crate::network::UNKNOWN_USER).
    UserLeft(User),
    MessageReceived(ChatMessage),
    PeerStateChanged {
        peer_id: PeerId,
        state: ConnectionState,
    },
    /// The direct channel went away while the session stayed registered;
    /// sends are relayed until a new connection is requested.
    ChannelClosed { peer_id: PeerId },
    SendFailed { to: PeerId, reason: String },
    Disconnected,
}
