use std::collections::HashMap;

use super::session::PeerSession;
use crate::common::PeerId;

/// Exclusive owner of the `peer id → session` mapping. Releasing the
/// underlying connection of a removed session is the caller's job.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    sessions: HashMap<PeerId, PeerSession>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// First writer wins: returns `false` and drops `session` if the peer is
    /// already registered.
    pub fn register(&mut self, peer_id: impl Into<PeerId>, session: PeerSession) -> bool {
        let peer_id = peer_id.into();
        if self.sessions.contains_key(&peer_id) {
            log::debug!("Session for {peer_id} already registered");
            return false;
        }
        self.sessions.insert(peer_id, session);
        true
    }

    pub fn get(&self, peer_id: &str) -> Option<&PeerSession> {
        self.sessions.get(peer_id)
    }

    pub fn get_mut(&mut self, peer_id: &str) -> Option<&mut PeerSession> {
        self.sessions.get_mut(peer_id)
    }

    pub fn remove(&mut self, peer_id: &str) -> Option<PeerSession> {
        self.sessions.remove(peer_id)
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.sessions.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::session::Role;

    #[test]
    fn first_writer_wins() {
        let mut registry = PeerRegistry::new();
        let s1 = PeerSession::new("p", Role::Offerer);
        let s2 = PeerSession::new("p", Role::Answerer);
        let first = s1.generation;

        assert!(registry.register("p", s1));
        assert!(!registry.register("p", s2));

        let kept = registry.get("p").unwrap();
        assert_eq!(kept.generation, first);
        assert_eq!(kept.role, Role::Offerer);
        assert_eq!(registry.peer_ids(), vec!["p".to_string()]);
    }

    #[test]
    fn remove_is_safe_when_absent() {
        let mut registry = PeerRegistry::new();
        assert!(registry.remove("ghost").is_none());

        registry.register("p", PeerSession::new("p", Role::Offerer));
        assert!(registry.remove("p").is_some());
        assert!(registry.get("p").is_none());
        assert!(registry.remove("p").is_none());
        assert!(registry.peer_ids().is_empty());
    }
}
