use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rtc::{ChannelState, PeerConnection};
use crate::common::PeerId;
use crate::signaling::IceCandidate;

/// Negotiation progress of one peer session.
///
/// Outbound: `Idle → Offering → AnsweringRemote → Connected`.
/// Inbound: `Idle → OfferedByRemote → Answered → Connected`.
/// `Closed` is reachable from every state and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    Offering,
    AnsweringRemote,
    OfferedByRemote,
    Answered,
    Connected,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, Offering) | (Idle, OfferedByRemote) => true,
            (Offering, AnsweringRemote) => true,
            (OfferedByRemote, Answered) => true,
            (AnsweringRemote, Connected) | (Answered, Connected) => true,
            // The channel may report open before the answer step is acknowledged locally.
            (Offering, Connected) | (OfferedByRemote, Connected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Offering => "offering",
            ConnectionState::AnsweringRemote => "answering-remote",
            ConnectionState::OfferedByRemote => "offered-by-remote",
            ConnectionState::Answered => "answered",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Offerer,
    Answerer,
}

/// Negotiation and transport state for one remote peer.
pub struct PeerSession {
    pub peer_id: PeerId,
    /// Distinguishes this session from earlier ones with the same peer.
    pub generation: Uuid,
    pub role: Role,
    pub state: ConnectionState,
    pub has_local_offer: bool,
    pub has_remote_offer: bool,
    pub channel_state: ChannelState,
    pub connection: Option<Arc<dyn PeerConnection>>,
    pub remote_description_set: bool,
    /// Our offer/answer has gone out; local candidates may follow it.
    pub local_description_sent: bool,
    /// Remote candidates waiting for the remote description.
    pub pending_remote_candidates: Vec<IceCandidate>,
    /// Local candidates waiting for our offer/answer to be sent.
    pub pending_local_candidates: Vec<IceCandidate>,
}

impl PeerSession {
    pub fn new(peer_id: impl Into<PeerId>, role: Role) -> Self {
        Self {
            peer_id: peer_id.into(),
            generation: Uuid::new_v4(),
            role,
            state: ConnectionState::Idle,
            has_local_offer: false,
            has_remote_offer: false,
            channel_state: ChannelState::Connecting,
            connection: None,
            remote_description_set: false,
            local_description_sent: false,
            pending_remote_candidates: Vec::new(),
            pending_local_candidates: Vec::new(),
        }
    }

    /// Moves to `next` if the state machine allows it; returns whether it moved.
    pub fn transition(&mut self, next: ConnectionState) -> bool {
        if self.state == next {
            return false;
        }
        if !self.state.can_transition_to(next) {
            log::warn!(
                "Ignoring invalid transition {} -> {} for {}",
                self.state,
                next,
                self.peer_id
            );
            return false;
        }
        log::debug!("Peer {}: {} -> {}", self.peer_id, self.state, next);
        self.state = next;
        true
    }
}

impl fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSession")
            .field("peer_id", &self.peer_id)
            .field("generation", &self.generation)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("channel_state", &self.channel_state)
            .field("has_connection", &self.connection.is_some())
            .field("remote_description_set", &self.remote_description_set)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn outbound_path_is_accepted() {
        let mut session = PeerSession::new("b", Role::Offerer);
        assert!(session.transition(Offering));
        assert!(session.transition(AnsweringRemote));
        assert!(session.transition(Connected));
        assert!(session.transition(Closed));
    }

    #[test]
    fn inbound_path_is_accepted() {
        let mut session = PeerSession::new("a", Role::Answerer);
        assert!(session.transition(OfferedByRemote));
        assert!(session.transition(Answered));
        assert!(session.transition(Connected));
    }

    #[test]
    fn closed_is_terminal() {
        let mut session = PeerSession::new("b", Role::Offerer);
        assert!(session.transition(Closed));
        assert!(!session.transition(Offering));
        assert!(!session.transition(Connected));
        assert_eq!(session.state, Closed);
    }

    #[test]
    fn paths_do_not_cross() {
        let mut session = PeerSession::new("b", Role::Offerer);
        session.transition(Offering);
        assert!(!session.transition(Answered));
        assert!(!session.transition(OfferedByRemote));
        assert_eq!(session.state, Offering);
    }

    #[test]
    fn every_state_can_close() {
        for state in [Idle, Offering, AnsweringRemote, OfferedByRemote, Answered, Connected] {
            assert!(state.can_transition_to(Closed), "{state} should close");
        }
    }
}
