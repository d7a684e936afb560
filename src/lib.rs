//! Peer-to-peer chat core: per-peer WebRTC negotiation, direct/relay message
//! delivery and the signaling protocol shared with the relay server.

pub mod common;
pub mod config;
pub mod error;
pub mod network;
pub mod signaling;

pub use common::{ChatMessage, NetworkCommand, NetworkEvent, PeerId, User};
pub use error::{Error, Result};
pub use network::P2PClient;
