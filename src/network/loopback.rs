//! In-process stand-in for the WebRTC stack.
//!
//! Descriptions and candidates are synthetic strings naming the connection
//! that produced them: `loopback-offer <id>`, `loopback-answer <id>` and
//! `candidate:<id> ...`. Two connections link once each has applied the
//! other's description and at least one of its candidates. At that point every
//! channel the offerer created is mirrored on the answerer and both ends open.
//! Connections created by one backend only see each other, so clients that
//! should talk must share a backend (it is cheap to clone).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;

use super::rtc::{ChannelState, ConnectionObserver, DataChannel, PeerConnection, RtcBackend};
use crate::config::IceServer;
use crate::error::{Error, Result};
use crate::signaling::{IceCandidate, SdpKind, SessionDescription};

#[derive(Clone, Default)]
pub struct LoopbackBackend {
    network: Arc<Mutex<Network>>,
}

#[derive(Default)]
struct Network {
    next_id: u64,
    connections: HashMap<u64, Endpoint>,
    fail_offers: bool,
    fail_answers: bool,
}

struct Endpoint {
    observer: ConnectionObserver,
    local_description: Option<SessionDescription>,
    remote: Option<u64>,
    remote_description_set: bool,
    remote_candidate_seen: bool,
    /// Channels created locally, mirrored to the remote side on link.
    channels: Vec<Arc<LoopbackChannel>>,
    /// Every channel this end holds, local or mirrored.
    attached: Vec<Arc<LoopbackChannel>>,
    linked: bool,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `create_offer` fail.
    pub fn fail_offers(&self, fail: bool) {
        self.lock().fail_offers = fail;
    }

    /// Makes every subsequent `create_answer` fail.
    pub fn fail_answers(&self, fail: bool) {
        self.lock().fail_answers = fail;
    }

    /// Connections created and not yet closed.
    pub fn open_connections(&self) -> usize {
        self.lock().connections.len()
    }

    fn lock(&self) -> MutexGuard<'_, Network> {
        self.network.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RtcBackend for LoopbackBackend {
    async fn create_connection(
        &self,
        _ice_servers: &[IceServer],
        observer: ConnectionObserver,
    ) -> Result<Arc<dyn PeerConnection>> {
        let mut network = self.lock();
        network.next_id += 1;
        let id = network.next_id;
        log::debug!("Loopback connection {id} for {}", observer.peer_id());
        network.connections.insert(
            id,
            Endpoint {
                observer,
                local_description: None,
                remote: None,
                remote_description_set: false,
                remote_candidate_seen: false,
                channels: Vec::new(),
                attached: Vec::new(),
                linked: false,
            },
        );
        Ok(Arc::new(LoopbackConnection {
            id,
            network: self.network.clone(),
        }))
    }
}

struct LoopbackConnection {
    id: u64,
    network: Arc<Mutex<Network>>,
}

impl LoopbackConnection {
    fn lock(&self) -> MutexGuard<'_, Network> {
        self.network.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PeerConnection for LoopbackConnection {
    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        let mut network = self.lock();
        let endpoint = endpoint_mut(&mut network, self.id)?;
        let channel = LoopbackChannel::new(label, endpoint.observer.clone());
        endpoint.channels.push(channel.clone());
        endpoint.attached.push(channel.clone());
        Ok(channel)
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let network = self.lock();
        if network.fail_offers {
            return Err(Error::Negotiation("injected offer failure".into()));
        }
        Ok(SessionDescription::offer(format!("loopback-offer {}", self.id)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let mut network = self.lock();
        if network.fail_answers {
            return Err(Error::Negotiation("injected answer failure".into()));
        }
        if !endpoint_mut(&mut network, self.id)?.remote_description_set {
            return Err(Error::Negotiation("answer requires a remote offer".into()));
        }
        Ok(SessionDescription::answer(format!("loopback-answer {}", self.id)))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let mut network = self.lock();
        let endpoint = endpoint_mut(&mut network, self.id)?;
        endpoint.local_description = Some(description);
        // Gathering starts once the local description is in place.
        endpoint.observer.local_candidate(IceCandidate {
            candidate: format!("candidate:{} 1 udp 2122260223 127.0.0.1 9 typ host", self.id),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        });
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let expected = match description.kind {
            SdpKind::Offer => "loopback-offer",
            SdpKind::Answer => "loopback-answer",
            other => {
                return Err(Error::Negotiation(format!(
                    "unsupported description type {other:?}"
                )));
            }
        };
        let remote = parse_tagged(&description.sdp, expected)
            .ok_or_else(|| Error::Negotiation(format!("malformed sdp '{}'", description.sdp)))?;

        let mut network = self.lock();
        let endpoint = endpoint_mut(&mut network, self.id)?;
        endpoint.remote = Some(remote);
        endpoint.remote_description_set = true;
        try_link(&mut network, self.id);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let from = candidate
            .candidate
            .strip_prefix("candidate:")
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|id| id.parse::<u64>().ok())
            .ok_or_else(|| {
                Error::Negotiation(format!("malformed candidate '{}'", candidate.candidate))
            })?;

        let mut network = self.lock();
        let endpoint = endpoint_mut(&mut network, self.id)?;
        if !endpoint.remote_description_set {
            return Err(Error::Negotiation(
                "candidate added before remote description".into(),
            ));
        }
        if endpoint.remote == Some(from) {
            endpoint.remote_candidate_seen = true;
            try_link(&mut network, self.id);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let endpoint = self.lock().connections.remove(&self.id);
        if let Some(endpoint) = endpoint {
            for channel in endpoint.attached {
                channel.shutdown();
            }
        }
        Ok(())
    }
}

fn endpoint_mut(network: &mut Network, id: u64) -> Result<&mut Endpoint> {
    network
        .connections
        .get_mut(&id)
        .ok_or_else(|| Error::Negotiation(format!("loopback connection {id} is closed")))
}

fn parse_tagged(sdp: &str, tag: &str) -> Option<u64> {
    sdp.strip_prefix(tag)?.trim().parse().ok()
}

fn ready(endpoint: &Endpoint) -> bool {
    endpoint.remote_description_set && endpoint.remote_candidate_seen && !endpoint.linked
}

fn try_link(network: &mut Network, id: u64) {
    let Some(remote) = network.connections.get(&id).and_then(|e| e.remote) else {
        return;
    };
    let both_ready = match (network.connections.get(&id), network.connections.get(&remote)) {
        (Some(a), Some(b)) => ready(a) && ready(b) && b.remote == Some(id),
        _ => false,
    };
    if !both_ready {
        return;
    }

    let (Some(mut a), Some(mut b)) = (
        network.connections.remove(&id),
        network.connections.remove(&remote),
    ) else {
        return;
    };
    a.linked = true;
    b.linked = true;
    log::debug!("Loopback connections {id} and {remote} linked");

    let mut opened = Vec::new();
    mirror(&a, &mut b, &mut opened);
    mirror(&b, &mut a, &mut opened);

    network.connections.insert(id, a);
    network.connections.insert(remote, b);

    for channel in opened {
        channel.open();
    }
}

/// Creates the far end of every channel `from` created and announces it on `to`.
fn mirror(from: &Endpoint, to: &mut Endpoint, opened: &mut Vec<Arc<LoopbackChannel>>) {
    for local in &from.channels {
        let remote = LoopbackChannel::new(&local.label, to.observer.clone());
        LoopbackChannel::pair(local, &remote);
        to.attached.push(remote.clone());
        to.observer.channel_created(remote.clone());
        opened.push(local.clone());
        opened.push(remote);
    }
}

pub struct LoopbackChannel {
    label: String,
    observer: ConnectionObserver,
    state: Mutex<ChannelState>,
    peer: Mutex<Weak<LoopbackChannel>>,
}

impl LoopbackChannel {
    fn new(label: &str, observer: ConnectionObserver) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            observer,
            state: Mutex::new(ChannelState::Connecting),
            peer: Mutex::new(Weak::new()),
        })
    }

    fn pair(a: &Arc<Self>, b: &Arc<Self>) {
        *lock(&a.peer) = Arc::downgrade(b);
        *lock(&b.peer) = Arc::downgrade(a);
    }

    fn open(&self) {
        let mut state = lock(&self.state);
        if *state == ChannelState::Connecting {
            *state = ChannelState::Open;
            drop(state);
            self.observer.channel_open();
        }
    }

    /// Closes this end and reports it; returns whether it was still live.
    fn shutdown(&self) -> bool {
        let mut state = lock(&self.state);
        if *state == ChannelState::Closed {
            return false;
        }
        *state = ChannelState::Closed;
        drop(state);
        self.observer.channel_closed();
        if let Some(peer) = lock(&self.peer).upgrade() {
            peer.shutdown();
        }
        true
    }
}

#[async_trait]
impl DataChannel for LoopbackChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn state(&self) -> ChannelState {
        *lock(&self.state)
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        if self.state() != ChannelState::Open {
            return Err(Error::ChannelNotOpen(self.label.clone()));
        }
        let peer = lock(&self.peer).upgrade();
        match peer {
            Some(peer) if peer.state() == ChannelState::Open => {
                peer.observer.channel_message(text.to_string());
                Ok(())
            }
            _ => Err(Error::ChannelNotOpen(self.label.clone())),
        }
    }

    async fn close(&self) -> Result<()> {
        self.shutdown();
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
