use std::sync::Arc;

use async_trait::async_trait;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use super::rtc::{ChannelState, ConnectionObserver, DataChannel, PeerConnection, RtcBackend};
use crate::config::IceServer;
use crate::error::{Error, Result};
use crate::signaling::{IceCandidate, SdpKind, SessionDescription};

/// Native WebRTC stack. Channels are reliable and ordered.
pub struct WebRtcBackend {
    api: API,
}

impl WebRtcBackend {
    pub fn new() -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();
        Ok(Self { api })
    }
}

#[async_trait]
impl RtcBackend for WebRtcBackend {
    async fn create_connection(
        &self,
        ice_servers: &[IceServer],
        observer: ConnectionObserver,
    ) -> Result<Arc<dyn PeerConnection>> {
        let config = RTCConfiguration {
            ice_servers: ice_servers.iter().map(to_rtc_ice_server).collect(),
            ..Default::default()
        };
        let connection = Arc::new(self.api.new_peer_connection(config).await?);

        let candidates = observer.clone();
        connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let observer = candidates.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => observer.local_candidate(from_rtc_candidate(init)),
                    Err(err) => log::warn!("Failed to encode local candidate: {err}"),
                }
            })
        }));

        let remote_channels = observer.clone();
        connection.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let observer = remote_channels.clone();
            Box::pin(async move {
                log::debug!("Remote channel '{}' from {}", dc.label(), observer.peer_id());
                let channel = WebRtcChannel::attach(dc, observer.clone());
                observer.channel_created(channel);
            })
        }));

        let peer_id = observer.peer_id().to_string();
        connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                log::debug!("Peer connection with {peer_id} is {state}");
                Box::pin(async {})
            },
        ));

        Ok(Arc::new(WebRtcConnection {
            connection,
            observer,
        }))
    }
}

struct WebRtcConnection {
    connection: Arc<RTCPeerConnection>,
    observer: ConnectionObserver,
}

#[async_trait]
impl PeerConnection for WebRtcConnection {
    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        let dc = self.connection.create_data_channel(label, Some(init)).await?;
        Ok(WebRtcChannel::attach(dc, self.observer.clone()))
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.connection.create_offer(None).await?;
        from_rtc_description(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.connection.create_answer(None).await?;
        from_rtc_description(answer)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.connection.set_local_description(description).await?;
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.connection.set_remote_description(description).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.connection.close().await?;
        Ok(())
    }
}

struct WebRtcChannel {
    dc: Arc<RTCDataChannel>,
}

impl WebRtcChannel {
    /// Wraps `dc` and routes its open/message/close callbacks to `observer`.
    fn attach(dc: Arc<RTCDataChannel>, observer: ConnectionObserver) -> Arc<Self> {
        let on_open = observer.clone();
        dc.on_open(Box::new(move || {
            let observer = on_open.clone();
            Box::pin(async move { observer.channel_open() })
        }));

        let on_message = observer.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let observer = on_message.clone();
            Box::pin(async move {
                match String::from_utf8(msg.data.to_vec()) {
                    Ok(text) => observer.channel_message(text),
                    Err(_) => log::warn!("Dropping non-UTF-8 message from {}", observer.peer_id()),
                }
            })
        }));

        dc.on_close(Box::new(move || {
            let observer = observer.clone();
            Box::pin(async move { observer.channel_closed() })
        }));

        Arc::new(Self { dc })
    }
}

#[async_trait]
impl DataChannel for WebRtcChannel {
    fn label(&self) -> String {
        self.dc.label().to_string()
    }

    fn state(&self) -> ChannelState {
        match self.dc.ready_state() {
            RTCDataChannelState::Open => ChannelState::Open,
            RTCDataChannelState::Closing => ChannelState::Closing,
            RTCDataChannelState::Closed => ChannelState::Closed,
            _ => ChannelState::Connecting,
        }
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        if self.state() != ChannelState::Open {
            return Err(Error::ChannelNotOpen(self.label()));
        }
        self.dc.send_text(text.to_string()).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.dc.close().await?;
        Ok(())
    }
}

fn to_rtc_ice_server(server: &IceServer) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
        ..Default::default()
    }
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription> {
    let rtc = match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp)?,
        SdpKind::Pranswer => RTCSessionDescription::pranswer(description.sdp)?,
        SdpKind::Rollback => {
            return Err(Error::Negotiation("rollback descriptions are not supported".into()));
        }
    };
    Ok(rtc)
}

fn from_rtc_description(description: RTCSessionDescription) -> Result<SessionDescription> {
    let kind = match description.sdp_type {
        RTCSdpType::Offer => SdpKind::Offer,
        RTCSdpType::Answer => SdpKind::Answer,
        RTCSdpType::Pranswer => SdpKind::Pranswer,
        RTCSdpType::Rollback => SdpKind::Rollback,
        RTCSdpType::Unspecified => {
            return Err(Error::Negotiation("description without a type".into()));
        }
    };
    Ok(SessionDescription {
        kind,
        sdp: description.sdp,
    })
}

fn from_rtc_candidate(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_credentials_carry_over() {
        let server = IceServer {
            urls: vec!["turn:turn.example.org:3478".into()],
            username: Some("u".into()),
            credential: Some("p".into()),
        };
        let rtc = to_rtc_ice_server(&server);
        assert_eq!(rtc.urls, server.urls);
        assert_eq!(rtc.username, "u");
        assert_eq!(rtc.credential, "p");
    }

    #[test]
    fn rollback_is_rejected() {
        let rollback = SessionDescription {
            kind: SdpKind::Rollback,
            sdp: String::new(),
        };
        assert!(to_rtc_description(rollback).is_err());
    }

    #[tokio::test]
    async fn offer_carries_the_chat_channel() {
        let backend = WebRtcBackend::new().unwrap();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let observer = ConnectionObserver::new("peer".into(), uuid::Uuid::new_v4(), tx);
        let connection = backend.create_connection(&[], observer).await.unwrap();

        let channel = connection
            .create_data_channel(super::super::rtc::CHAT_CHANNEL_LABEL)
            .await
            .unwrap();
        assert_eq!(channel.state(), ChannelState::Connecting);

        let offer = connection.create_offer().await.unwrap();
        assert_eq!(offer.kind, SdpKind::Offer);
        assert!(offer.sdp.contains("webrtc-datachannel"));
        connection.close().await.unwrap();
    }
}
