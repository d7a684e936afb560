//! Store-and-forward relay: roster bookkeeping plus addressed forwarding of
//! negotiation payloads and relayed chat messages.
//!
//! The hub is transport-agnostic. Each connection registers an outbox and the
//! hub pushes [`ServerMessage`]s into it; the WebSocket server and the
//! in-process loopback both drive the same hub.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use uuid::Uuid;

use super::protocol::{ClientMessage, ServerMessage};
use crate::common::{PeerId, User};

pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// A hub shared by every connection task of one server instance.
pub type SharedHub = Arc<Mutex<RelayHub>>;

/// Runs `f` with the hub locked, recovering the guard if a previous holder panicked.
pub fn with_hub<R>(hub: &Mutex<RelayHub>, f: impl FnOnce(&mut RelayHub) -> R) -> R {
    match hub.lock() {
        Ok(mut guard) => f(&mut guard),
        Err(poisoned) => f(&mut poisoned.into_inner()),
    }
}

#[derive(Default)]
pub struct RelayHub {
    outboxes: HashMap<PeerId, Outbox>,
    /// Joined users in join order.
    roster: Vec<User>,
}

impl RelayHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection and greets it with its assigned id.
    pub fn connect(&mut self, outbox: Outbox) -> PeerId {
        let id = Uuid::new_v4().to_string();
        if outbox
            .send(ServerMessage::Connected { id: id.clone() })
            .is_err()
        {
            log::debug!("Connection {id} closed before greeting");
        }
        self.outboxes.insert(id.clone(), outbox);
        log::info!("User connected: {id}");
        id
    }

    pub fn handle(&mut self, from: &str, message: ClientMessage) {
        if !self.outboxes.contains_key(from) {
            log::warn!("Dropping {message:?} from unknown connection {from}");
            return;
        }

        match message {
            ClientMessage::Join(username) => self.join(from, username),
            ClientMessage::Offer { target, offer } => self.forward(
                &target,
                ServerMessage::Offer {
                    offer,
                    from: from.to_string(),
                },
            ),
            ClientMessage::Answer { target, answer } => self.forward(
                &target,
                ServerMessage::Answer {
                    answer,
                    from: from.to_string(),
                },
            ),
            ClientMessage::IceCandidate { target, candidate } => self.forward(
                &target,
                ServerMessage::IceCandidate {
                    candidate,
                    from: from.to_string(),
                },
            ),
            ClientMessage::Message { target, message } => {
                let username = self.username_of(from);
                self.forward(
                    &target,
                    ServerMessage::Message {
                        message,
                        from: from.to_string(),
                        username,
                    },
                );
            }
        }
    }

    pub fn disconnect(&mut self, id: &str) {
        if self.outboxes.remove(id).is_none() {
            return;
        }
        let username = self.username_of(id);
        self.roster.retain(|user| user.id != id);

        self.broadcast_except(
            id,
            ServerMessage::UserLeft {
                id: id.to_string(),
                username: username.clone(),
            },
        );
        log::info!("{} left the chat", username.as_deref().unwrap_or(id));
    }

    /// Ordered `(id, username)` pairs of every joined user.
    pub fn roster(&self) -> Vec<(PeerId, String)> {
        self.roster
            .iter()
            .map(|user| (user.id.clone(), user.username.clone()))
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.outboxes.len()
    }

    fn join(&mut self, id: &str, username: String) {
        match self.roster.iter_mut().find(|user| user.id == id) {
            Some(user) => user.username = username.clone(),
            None => self.roster.push(User {
                id: id.to_string(),
                username: username.clone(),
            }),
        }

        self.broadcast_except(
            id,
            ServerMessage::UserJoined(User {
                id: id.to_string(),
                username: username.clone(),
            }),
        );

        let others = self
            .roster
            .iter()
            .filter(|user| user.id != id)
            .map(|user| (user.id.clone(), user.username.clone()))
            .collect();
        self.send_to(id, ServerMessage::UserList(others));
        log::info!("{username} joined the chat");
    }

    fn forward(&self, target: &str, message: ServerMessage) {
        if !self.outboxes.contains_key(target) {
            log::debug!("Target {target} is not connected; dropping {message:?}");
            return;
        }
        self.send_to(target, message);
    }

    fn send_to(&self, id: &str, message: ServerMessage) {
        if let Some(outbox) = self.outboxes.get(id) {
            if outbox.send(message).is_err() {
                log::debug!("Outbox for {id} is closed");
            }
        }
    }

    fn broadcast_except(&self, sender: &str, message: ServerMessage) {
        for (id, outbox) in &self.outboxes {
            if id != sender && outbox.send(message.clone()).is_err() {
                log::debug!("Outbox for {id} is closed");
            }
        }
    }

    fn username_of(&self, id: &str) -> Option<String> {
        self.roster
            .iter()
            .find(|user| user.id == id)
            .map(|user| user.username.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::protocol::SessionDescription;

    fn attach(hub: &mut RelayHub) -> (PeerId, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = hub.connect(tx);
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerMessage::Connected { id: id.clone() }
        );
        (id, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn join_broadcasts_to_others_and_returns_roster_to_joiner() {
        let mut hub = RelayHub::new();
        let (a, mut a_rx) = attach(&mut hub);
        let (b, mut b_rx) = attach(&mut hub);

        hub.handle(&a, ClientMessage::Join("alice".into()));
        assert_eq!(drain(&mut a_rx), vec![ServerMessage::UserList(vec![])]);
        drain(&mut b_rx);

        hub.handle(&b, ClientMessage::Join("bob".into()));
        assert_eq!(
            drain(&mut a_rx),
            vec![ServerMessage::UserJoined(User {
                id: b.clone(),
                username: "bob".into()
            })]
        );
        assert_eq!(
            drain(&mut b_rx),
            vec![ServerMessage::UserList(vec![(a.clone(), "alice".into())])]
        );
        assert_eq!(
            hub.roster(),
            vec![(a, "alice".to_string()), (b, "bob".to_string())]
        );
    }

    #[test]
    fn rejoin_keeps_roster_position() {
        let mut hub = RelayHub::new();
        let (a, _a_rx) = attach(&mut hub);
        let (b, _b_rx) = attach(&mut hub);
        hub.handle(&a, ClientMessage::Join("alice".into()));
        hub.handle(&b, ClientMessage::Join("bob".into()));
        hub.handle(&a, ClientMessage::Join("alicia".into()));

        assert_eq!(
            hub.roster(),
            vec![(a, "alicia".to_string()), (b, "bob".to_string())]
        );
    }

    #[test]
    fn forwarding_rewrites_sender() {
        let mut hub = RelayHub::new();
        let (a, _a_rx) = attach(&mut hub);
        let (b, mut b_rx) = attach(&mut hub);

        let offer = SessionDescription::offer("v=0");
        hub.handle(
            &a,
            ClientMessage::Offer {
                target: b.clone(),
                offer: offer.clone(),
            },
        );
        assert_eq!(
            drain(&mut b_rx),
            vec![ServerMessage::Offer {
                offer,
                from: a.clone()
            }]
        );
    }

    #[test]
    fn relayed_message_carries_username() {
        let mut hub = RelayHub::new();
        let (a, _a_rx) = attach(&mut hub);
        let (b, mut b_rx) = attach(&mut hub);
        hub.handle(&a, ClientMessage::Join("alice".into()));
        drain(&mut b_rx);

        hub.handle(
            &a,
            ClientMessage::Message {
                target: b.clone(),
                message: "hi".into(),
            },
        );
        assert_eq!(
            drain(&mut b_rx),
            vec![ServerMessage::Message {
                message: "hi".into(),
                from: a,
                username: Some("alice".into())
            }]
        );
    }

    #[test]
    fn unknown_target_is_dropped() {
        let mut hub = RelayHub::new();
        let (a, mut a_rx) = attach(&mut hub);
        hub.handle(
            &a,
            ClientMessage::Message {
                target: "nobody".into(),
                message: "hi".into(),
            },
        );
        assert!(drain(&mut a_rx).is_empty());
    }

    #[test]
    fn disconnect_broadcasts_last_known_username() {
        let mut hub = RelayHub::new();
        let (_a, mut a_rx) = attach(&mut hub);
        let (b, _b_rx) = attach(&mut hub);
        hub.handle(&b, ClientMessage::Join("bob".into()));
        drain(&mut a_rx);

        hub.disconnect(&b);
        hub.disconnect(&b);

        assert_eq!(
            drain(&mut a_rx),
            vec![ServerMessage::UserLeft {
                id: b,
                username: Some("bob".into())
            }]
        );
        assert!(hub.roster().is_empty());
        assert_eq!(hub.connection_count(), 1);
    }
}
