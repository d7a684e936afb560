//! Per-peer negotiation: offer/answer exchange, ICE candidate plumbing and
//! data-channel readiness.
//!
//! Every method runs on the client's event loop and never awaits platform
//! work. Description creation and application run in spawned tasks that
//! report back as [`EngineEvent`]s, so one slow peer does not stall the others.
//! Reports are tagged with the session generation; anything addressed to a
//! session that has since been closed or replaced is dropped and whatever
//! connection it carries is released.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::registry::PeerRegistry;
use super::rtc::{
    CHAT_CHANNEL_LABEL, ChannelState, ConnectionObserver, DataChannel, EngineEvent,
    PeerConnection, RtcBackend,
};
use super::session::{ConnectionState, PeerSession, Role};
use crate::common::{ChatMessage, NetworkEvent, PeerId};
use crate::config::IceServer;
use crate::error::Error;
use crate::signaling::{ClientMessage, IceCandidate, SessionDescription, SignalingHandle};

pub struct NegotiationEngine {
    local_id: PeerId,
    backend: Arc<dyn RtcBackend>,
    ice_servers: Arc<Vec<IceServer>>,
    signaling: SignalingHandle,
    registry: PeerRegistry,
    channels: HashMap<PeerId, Arc<dyn DataChannel>>,
    events: mpsc::UnboundedSender<EngineEvent>,
    notices: Vec<NetworkEvent>,
}

impl NegotiationEngine {
    /// Returns the engine and the receiver its platform reports arrive on.
    /// Every received event must be passed back to [`Self::handle_event`].
    pub fn new(
        signaling: SignalingHandle,
        backend: Arc<dyn RtcBackend>,
        ice_servers: Vec<IceServer>,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let engine = Self {
            local_id: signaling.local_id().to_string(),
            backend,
            ice_servers: Arc::new(ice_servers),
            signaling,
            registry: PeerRegistry::new(),
            channels: HashMap::new(),
            events,
            notices: Vec::new(),
        };
        (engine, events_rx)
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn session(&self, peer_id: &str) -> Option<&PeerSession> {
        self.registry.get(peer_id)
    }

    pub fn state(&self, peer_id: &str) -> Option<ConnectionState> {
        self.registry.get(peer_id).map(|session| session.state)
    }

    /// The chat channel currently mapped to `peer_id`, open or not.
    pub fn channel(&self, peer_id: &str) -> Option<Arc<dyn DataChannel>> {
        self.channels.get(peer_id).cloned()
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.registry.peer_ids()
    }

    /// Events produced since the last call, in order.
    pub fn take_notices(&mut self) -> Vec<NetworkEvent> {
        std::mem::take(&mut self.notices)
    }

    /// Starts an outbound session. No-op if a session for `peer_id` exists,
    /// unless its direct channel has closed; that session is replaced.
    pub fn initiate(&mut self, peer_id: &str) {
        if peer_id == self.local_id {
            log::warn!("Refusing to connect to ourselves");
            return;
        }
        if let Some(existing) = self.registry.get(peer_id) {
            if existing.channel_state != ChannelState::Closed {
                log::debug!("Session with {peer_id} already exists; ignoring connect");
                return;
            }
            log::info!("Channel with {peer_id} is closed; replacing session");
            self.close(peer_id);
        }

        let mut session = PeerSession::new(peer_id, Role::Offerer);
        session.has_local_offer = true;
        advance(&mut session, ConnectionState::Offering, &mut self.notices);
        let generation = session.generation;
        self.registry.register(peer_id, session);
        log::info!("Initiating connection to {peer_id}");

        let backend = self.backend.clone();
        let ice_servers = self.ice_servers.clone();
        let observer = self.observer(peer_id, generation);
        let events = self.events.clone();
        let peer_id = peer_id.to_string();
        tokio::spawn(async move {
            let connection = match backend.create_connection(&ice_servers, observer).await {
                Ok(connection) => connection,
                Err(err) => {
                    report_failure(&events, peer_id, generation, None, err);
                    return;
                }
            };
            match prepare_offer(connection.as_ref()).await {
                Ok((channel, offer)) => {
                    let _ = events.send(EngineEvent::LocalOfferReady {
                        peer_id,
                        generation,
                        connection,
                        channel,
                        offer,
                    });
                }
                Err(err) => report_failure(&events, peer_id, generation, Some(connection), err),
            }
        });
    }

    /// Answers an inbound offer.
    ///
    /// If we are offering to the same peer (glare), the lower id keeps its
    /// offer; the higher id abandons its own and answers.
    pub fn accept_offer(&mut self, from: &str, offer: SessionDescription) {
        if from == self.local_id {
            log::warn!("Ignoring offer from ourselves");
            return;
        }
        if let Some(existing) = self.registry.get(from) {
            if existing.state == ConnectionState::Offering {
                if self.local_id.as_str() < from {
                    log::info!("Offer collision with {from}; keeping our offer");
                    return;
                }
                log::info!("Offer collision with {from}; yielding to remote offer");
                self.close(from);
            } else if existing.channel_state == ChannelState::Closed {
                log::info!("{from} restarted negotiation; replacing closed session");
                self.close(from);
            } else {
                log::debug!(
                    "Session with {from} already {}; ignoring offer",
                    existing.state
                );
                return;
            }
        }

        let mut session = PeerSession::new(from, Role::Answerer);
        session.has_remote_offer = true;
        advance(&mut session, ConnectionState::OfferedByRemote, &mut self.notices);
        let generation = session.generation;
        self.registry.register(from, session);
        log::info!("Answering offer from {from}");

        let backend = self.backend.clone();
        let ice_servers = self.ice_servers.clone();
        let observer = self.observer(from, generation);
        let events = self.events.clone();
        let peer_id = from.to_string();
        tokio::spawn(async move {
            let connection = match backend.create_connection(&ice_servers, observer).await {
                Ok(connection) => connection,
                Err(err) => {
                    report_failure(&events, peer_id, generation, None, err);
                    return;
                }
            };
            match prepare_answer(connection.as_ref(), offer).await {
                Ok(answer) => {
                    let _ = events.send(EngineEvent::LocalAnswerReady {
                        peer_id,
                        generation,
                        connection,
                        answer,
                    });
                }
                Err(err) => report_failure(&events, peer_id, generation, Some(connection), err),
            }
        });
    }

    /// Applies the remote answer to an outbound session. No-op when the
    /// session is gone or not waiting for an answer.
    pub fn accept_answer(&mut self, from: &str, answer: SessionDescription) {
        let Some(session) = self.registry.get_mut(from) else {
            log::debug!("Answer from {from} without a session; peer probably left");
            return;
        };
        if session.state != ConnectionState::Offering {
            log::debug!("Unexpected answer from {from} in state {}", session.state);
            return;
        }
        let Some(connection) = session.connection.clone() else {
            log::warn!("Answer from {from} before our offer completed; ignoring");
            return;
        };
        advance(session, ConnectionState::AnsweringRemote, &mut self.notices);

        let generation = session.generation;
        let events = self.events.clone();
        let peer_id = from.to_string();
        tokio::spawn(async move {
            match connection.set_remote_description(answer).await {
                Ok(()) => {
                    let _ = events.send(EngineEvent::RemoteAnswerApplied {
                        peer_id,
                        generation,
                    });
                }
                Err(err) => report_failure(&events, peer_id, generation, None, err),
            }
        });
    }

    /// Applies a remote candidate, or queues it until the remote description
    /// has been applied.
    pub fn add_remote_candidate(&mut self, from: &str, candidate: IceCandidate) {
        let Some(session) = self.registry.get_mut(from) else {
            log::debug!("Candidate from {from} without a session; ignoring");
            return;
        };
        match (&session.connection, session.remote_description_set) {
            (Some(connection), true) => apply_candidates(from, connection.clone(), vec![candidate]),
            _ => session.pending_remote_candidates.push(candidate),
        }
    }

    pub fn handle_event(&mut self, event: EngineEvent) {
        let current = self
            .registry
            .get(event.peer_id())
            .map(|session| session.generation);
        if current != Some(event.generation()) {
            discard_stale(event);
            return;
        }

        match event {
            EngineEvent::LocalOfferReady {
                peer_id,
                connection,
                channel,
                offer,
                ..
            } => {
                self.channels.insert(peer_id.clone(), channel);
                if let Some(session) = self.registry.get_mut(&peer_id) {
                    session.connection = Some(connection);
                }
                if let Err(err) = self.signaling.send(ClientMessage::Offer {
                    target: peer_id.clone(),
                    offer,
                }) {
                    log::warn!("Failed to send offer to {peer_id}: {err}");
                    return;
                }
                self.description_sent(&peer_id);
            }
            EngineEvent::LocalAnswerReady {
                peer_id,
                connection,
                answer,
                ..
            } => {
                let Some(session) = self.registry.get_mut(&peer_id) else {
                    return;
                };
                session.connection = Some(connection.clone());
                session.remote_description_set = true;
                let queued = std::mem::take(&mut session.pending_remote_candidates);
                if !queued.is_empty() {
                    apply_candidates(&peer_id, connection, queued);
                }
                if let Err(err) = self.signaling.send(ClientMessage::Answer {
                    target: peer_id.clone(),
                    answer,
                }) {
                    log::warn!("Failed to send answer to {peer_id}: {err}");
                    return;
                }
                if let Some(session) = self.registry.get_mut(&peer_id) {
                    advance(session, ConnectionState::Answered, &mut self.notices);
                }
                self.description_sent(&peer_id);
            }
            EngineEvent::RemoteAnswerApplied { peer_id, .. } => {
                let Some(session) = self.registry.get_mut(&peer_id) else {
                    return;
                };
                session.remote_description_set = true;
                let queued = std::mem::take(&mut session.pending_remote_candidates);
                if let (Some(connection), false) = (session.connection.clone(), queued.is_empty())
                {
                    apply_candidates(&peer_id, connection, queued);
                }
            }
            EngineEvent::NegotiationFailed {
                peer_id,
                connection,
                reason,
                ..
            } => {
                log::warn!("Negotiation with {peer_id} failed: {reason}");
                if let Some(session) = self.registry.get_mut(&peer_id) {
                    if session.connection.is_none() {
                        session.connection = connection;
                    }
                }
            }
            EngineEvent::LocalCandidate {
                peer_id, candidate, ..
            } => {
                let Some(session) = self.registry.get_mut(&peer_id) else {
                    return;
                };
                if !session.local_description_sent {
                    session.pending_local_candidates.push(candidate);
                    return;
                }
                if let Err(err) = self.signaling.send(ClientMessage::IceCandidate {
                    target: peer_id.clone(),
                    candidate,
                }) {
                    log::warn!("Failed to send candidate to {peer_id}: {err}");
                }
            }
            EngineEvent::ChannelCreated {
                peer_id, channel, ..
            } => {
                if channel.label() != CHAT_CHANNEL_LABEL {
                    log::debug!("Ignoring channel '{}' from {peer_id}", channel.label());
                    return;
                }
                if let Some(session) = self.registry.get_mut(&peer_id) {
                    session.channel_state = channel.state();
                }
                log::debug!("Remote chat channel from {peer_id}");
                self.channels.insert(peer_id, channel);
            }
            EngineEvent::ChannelOpen { peer_id, .. } => {
                let Some(session) = self.registry.get_mut(&peer_id) else {
                    return;
                };
                session.channel_state = ChannelState::Open;
                log::info!("Direct channel with {peer_id} is open");
                advance(session, ConnectionState::Connected, &mut self.notices);
            }
            EngineEvent::ChannelMessage { peer_id, text, .. } => {
                let message = ChatMessage::new(text, peer_id, self.local_id.clone(), true);
                self.notices.push(NetworkEvent::MessageReceived(message));
            }
            EngineEvent::ChannelClosed { peer_id, .. } => {
                self.channels.remove(&peer_id);
                let Some(session) = self.registry.get_mut(&peer_id) else {
                    return;
                };
                if session.channel_state == ChannelState::Closed {
                    return;
                }
                session.channel_state = ChannelState::Closed;
                log::info!("Direct channel with {peer_id} closed");
                self.notices.push(NetworkEvent::ChannelClosed { peer_id });
            }
        }
    }

    /// Tears down the session with `peer_id` and releases its connection and
    /// channel. Idempotent.
    pub fn close(&mut self, peer_id: &str) {
        let channel = self.channels.remove(peer_id);
        let Some(mut session) = self.registry.remove(peer_id) else {
            release(None, channel);
            return;
        };
        advance(&mut session, ConnectionState::Closed, &mut self.notices);
        log::info!("Closed session with {peer_id}");
        release(session.connection.take(), channel);
    }

    /// Closes every session, then the signaling connection.
    pub fn close_all(&mut self) {
        for peer_id in self.registry.peer_ids() {
            self.close(&peer_id);
        }
        self.signaling.disconnect();
    }

    fn observer(&self, peer_id: &str, generation: Uuid) -> ConnectionObserver {
        ConnectionObserver::new(peer_id.to_string(), generation, self.events.clone())
    }

    /// Our description is out: local candidates may now follow it.
    fn description_sent(&mut self, peer_id: &str) {
        let Some(session) = self.registry.get_mut(peer_id) else {
            return;
        };
        session.local_description_sent = true;
        for candidate in std::mem::take(&mut session.pending_local_candidates) {
            if let Err(err) = self.signaling.send(ClientMessage::IceCandidate {
                target: peer_id.to_string(),
                candidate,
            }) {
                log::warn!("Failed to send candidate to {peer_id}: {err}");
                break;
            }
        }
    }
}

fn advance(session: &mut PeerSession, next: ConnectionState, notices: &mut Vec<NetworkEvent>) {
    if session.transition(next) {
        notices.push(NetworkEvent::PeerStateChanged {
            peer_id: session.peer_id.clone(),
            state: next,
        });
    }
}

async fn prepare_offer(
    connection: &dyn PeerConnection,
) -> crate::Result<(Arc<dyn DataChannel>, SessionDescription)> {
    let channel = connection.create_data_channel(CHAT_CHANNEL_LABEL).await?;
    let offer = connection.create_offer().await?;
    connection.set_local_description(offer.clone()).await?;
    Ok((channel, offer))
}

async fn prepare_answer(
    connection: &dyn PeerConnection,
    offer: SessionDescription,
) -> crate::Result<SessionDescription> {
    connection.set_remote_description(offer).await?;
    let answer = connection.create_answer().await?;
    connection.set_local_description(answer.clone()).await?;
    Ok(answer)
}

fn report_failure(
    events: &mpsc::UnboundedSender<EngineEvent>,
    peer_id: PeerId,
    generation: Uuid,
    connection: Option<Arc<dyn PeerConnection>>,
    err: Error,
) {
    let failure = EngineEvent::NegotiationFailed {
        peer_id,
        generation,
        connection,
        reason: err.to_string(),
    };
    if let Err(mpsc::error::SendError(EngineEvent::NegotiationFailed { connection, .. })) =
        events.send(failure)
    {
        release(connection, None);
    }
}

/// Applies candidates in order on a background task.
fn apply_candidates(peer_id: &str, connection: Arc<dyn PeerConnection>, candidates: Vec<IceCandidate>) {
    let peer_id = peer_id.to_string();
    tokio::spawn(async move {
        for candidate in candidates {
            if let Err(err) = connection.add_ice_candidate(candidate).await {
                log::warn!("Failed to add candidate from {peer_id}: {err}");
            }
        }
    });
}

fn discard_stale(event: EngineEvent) {
    log::debug!("Dropping stale report for {}", event.peer_id());
    match event {
        EngineEvent::LocalOfferReady {
            connection,
            channel,
            ..
        } => release(Some(connection), Some(channel)),
        EngineEvent::LocalAnswerReady { connection, .. } => release(Some(connection), None),
        EngineEvent::NegotiationFailed { connection, .. } => release(connection, None),
        EngineEvent::ChannelCreated { channel, .. } => release(None, Some(channel)),
        _ => {}
    }
}

fn release(connection: Option<Arc<dyn PeerConnection>>, channel: Option<Arc<dyn DataChannel>>) {
    if connection.is_none() && channel.is_none() {
        return;
    }
    tokio::spawn(async move {
        if let Some(channel) = channel {
            if let Err(err) = channel.close().await {
                log::debug!("Closing channel failed: {err}");
            }
        }
        if let Some(connection) = connection {
            if let Err(err) = connection.close().await {
                log::debug!("Closing connection failed: {err}");
            }
        }
    });
}
