mod client;
mod engine;
pub mod loopback;
mod registry;
mod roster;
mod router;
pub mod rtc;
mod session;
mod webrtc_backend;

pub use client::P2PClient;
pub use engine::NegotiationEngine;
pub use loopback::LoopbackBackend;
pub use registry::PeerRegistry;
pub use roster::{Roster, UNKNOWN_USER};
pub use router::{DeliveryRouter, Route};
pub use rtc::{ChannelState, DataChannel, EngineEvent, PeerConnection, RtcBackend};
pub use session::{ConnectionState, PeerSession, Role};
pub use webrtc_backend::WebRtcBackend;
