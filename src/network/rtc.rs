//! Seam between the negotiation engine and the platform peer-connection
//! primitive. [`super::webrtc_backend`] drives real WebRTC, while
//! [`super::loopback`] simulates it in-process.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::common::PeerId;
use crate::config::IceServer;
use crate::error::Result;
use crate::signaling::{IceCandidate, SessionDescription};

pub const CHAT_CHANNEL_LABEL: &str = "chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[async_trait]
pub trait RtcBackend: Send + Sync {
    /// Creates a transport-level connection whose callbacks report into `observer`.
    async fn create_connection(
        &self,
        ice_servers: &[IceServer],
        observer: ConnectionObserver,
    ) -> Result<Arc<dyn PeerConnection>>;
}

#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Opens a locally initiated channel; it only becomes usable once it reports open.
    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>>;
    async fn create_offer(&self) -> Result<SessionDescription>;
    async fn create_answer(&self) -> Result<SessionDescription>;
    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> String;
    fn state(&self) -> ChannelState;
    /// Best-effort write; fails when the channel is not open.
    async fn send_text(&self, text: &str) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// Everything that flows back into the engine's event loop: platform callbacks
/// and completions of negotiation steps that ran off-loop.
pub enum EngineEvent {
    LocalOfferReady {
        peer_id: PeerId,
        generation: Uuid,
        connection: Arc<dyn PeerConnection>,
        channel: Arc<dyn DataChannel>,
        offer: SessionDescription,
    },
    LocalAnswerReady {
        peer_id: PeerId,
        generation: Uuid,
        connection: Arc<dyn PeerConnection>,
        answer: SessionDescription,
    },
    RemoteAnswerApplied {
        peer_id: PeerId,
        generation: Uuid,
    },
    NegotiationFailed {
        peer_id: PeerId,
        generation: Uuid,
        connection: Option<Arc<dyn PeerConnection>>,
        reason: String,
    },
    LocalCandidate {
        peer_id: PeerId,
        generation: Uuid,
        candidate: IceCandidate,
    },
    ChannelCreated {
        peer_id: PeerId,
        generation: Uuid,
        channel: Arc<dyn DataChannel>,
    },
    ChannelOpen {
        peer_id: PeerId,
        generation: Uuid,
    },
    ChannelMessage {
        peer_id: PeerId,
        generation: Uuid,
        text: String,
    },
    ChannelClosed {
        peer_id: PeerId,
        generation: Uuid,
    },
}

impl EngineEvent {
    pub fn peer_id(&self) -> &str {
        match self {
            EngineEvent::LocalOfferReady { peer_id, .. }
            | EngineEvent::LocalAnswerReady { peer_id, .. }
            | EngineEvent::RemoteAnswerApplied { peer_id, .. }
            | EngineEvent::NegotiationFailed { peer_id, .. }
            | EngineEvent::LocalCandidate { peer_id, .. }
            | EngineEvent::ChannelCreated { peer_id, .. }
            | EngineEvent::ChannelOpen { peer_id, .. }
            | EngineEvent::ChannelMessage { peer_id, .. }
            | EngineEvent::ChannelClosed { peer_id, .. } => peer_id,
        }
    }

    pub fn generation(&self) -> Uuid {
        match self {
            EngineEvent::LocalOfferReady { generation, .. }
            | EngineEvent::LocalAnswerReady { generation, .. }
            | EngineEvent::RemoteAnswerApplied { generation, .. }
            | EngineEvent::NegotiationFailed { generation, .. }
            | EngineEvent::LocalCandidate { generation, .. }
            | EngineEvent::ChannelCreated { generation, .. }
            | EngineEvent::ChannelOpen { generation, .. }
            | EngineEvent::ChannelMessage { generation, .. }
            | EngineEvent::ChannelClosed { generation, .. } => *generation,
        }
    }
}

/// Sink handed to a backend for one session. Reports never block; once the
/// engine's loop is gone they are dropped.
#[derive(Clone)]
pub struct ConnectionObserver {
    peer_id: PeerId,
    generation: Uuid,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl ConnectionObserver {
    pub fn new(
        peer_id: PeerId,
        generation: Uuid,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        Self {
            peer_id,
            generation,
            events,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn local_candidate(&self, candidate: IceCandidate) {
        self.emit(EngineEvent::LocalCandidate {
            peer_id: self.peer_id.clone(),
            generation: self.generation,
            candidate,
        });
    }

    pub fn channel_created(&self, channel: Arc<dyn DataChannel>) {
        self.emit(EngineEvent::ChannelCreated {
            peer_id: self.peer_id.clone(),
            generation: self.generation,
            channel,
        });
    }

    pub fn channel_open(&self) {
        self.emit(EngineEvent::ChannelOpen {
            peer_id: self.peer_id.clone(),
            generation: self.generation,
        });
    }

    pub fn channel_message(&self, text: String) {
        self.emit(EngineEvent::ChannelMessage {
            peer_id: self.peer_id.clone(),
            generation: self.generation,
            text,
        });
    }

    pub fn channel_closed(&self) {
        self.emit(EngineEvent::ChannelClosed {
            peer_id: self.peer_id.clone(),
            generation: self.generation,
        });
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            log::debug!("Engine loop gone; dropping report for {}", self.peer_id);
        }
    }
}
