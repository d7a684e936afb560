//! In-process signaling: clients attach to a shared [`RelayHub`] through
//! channels instead of a WebSocket. Used for local demos and tests.

use tokio::sync::mpsc;

use super::client::{Outbound, SignalingEvents, SignalingHandle};
use super::relay::{SharedHub, with_hub};

#[derive(Clone, Default)]
pub struct LoopbackRelay {
    hub: SharedHub,
}

impl LoopbackRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new client. Must be called from within a tokio runtime.
    pub fn connect(&self) -> (SignalingHandle, SignalingEvents) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();

        let id = with_hub(&self.hub, |hub| hub.connect(inbound_tx));

        let hub = self.hub.clone();
        let conn_id = id.clone();
        tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                match outbound {
                    Outbound::Message(message) => with_hub(&hub, |hub| hub.handle(&conn_id, message)),
                    Outbound::Close => break,
                }
            }
            with_hub(&hub, |hub| hub.disconnect(&conn_id));
        });

        (SignalingHandle::new(id, outbound_tx), inbound_rx)
    }

    pub fn roster(&self) -> Vec<(String, String)> {
        with_hub(&self.hub, |hub| hub.roster())
    }
}
