pub mod client;
pub mod loopback;
pub mod protocol;
pub mod relay;

pub use client::{Outbound, SignalingEvents, SignalingHandle, connect};
pub use loopback::LoopbackRelay;
pub use protocol::{ClientMessage, IceCandidate, SdpKind, ServerMessage, SessionDescription};
pub use relay::{RelayHub, SharedHub, with_hub};
