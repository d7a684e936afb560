use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::protocol::{ClientMessage, ServerMessage};
use crate::common::PeerId;
use crate::error::{Error, Result};

/// Outbound traffic accepted by a signaling writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ClientMessage),
    Close,
}

/// Inbound signaling events; the channel closing means the connection is gone.
pub type SignalingEvents = mpsc::UnboundedReceiver<ServerMessage>;

/// Sending half of a signaling connection plus the id the relay assigned us.
#[derive(Debug, Clone)]
pub struct SignalingHandle {
    local_id: PeerId,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SignalingHandle {
    pub fn new(local_id: PeerId, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { local_id, outbound }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn send(&self, message: ClientMessage) -> Result<()> {
        self.outbound
            .send(Outbound::Message(message))
            .map_err(|_| Error::SignalingClosed)
    }

    pub fn disconnect(&self) {
        if self.outbound.send(Outbound::Close).is_err() {
            log::debug!("Signaling connection already closed");
        }
    }
}

/// Opens the WebSocket to the relay and waits for the `connected` greeting.
pub async fn connect(url: &str) -> Result<(SignalingHandle, SignalingEvents)> {
    let url = Url::parse(url)?;
    log::info!("Connecting to signaling server {url}");
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    let (mut ws_write, mut ws_read) = ws_stream.split();

    let local_id = loop {
        let frame = ws_read
            .next()
            .await
            .ok_or_else(|| Error::Handshake("connection closed before greeting".into()))??;
        match frame {
            Message::Text(text) => match serde_json::from_str::<ServerMessage>(&text)? {
                ServerMessage::Connected { id } => break id,
                other => {
                    return Err(Error::Handshake(format!(
                        "expected connected greeting, got {other:?}"
                    )));
                }
            },
            Message::Close(_) => {
                return Err(Error::Handshake("connection closed before greeting".into()));
            }
            _ => continue,
        }
    };
    log::info!("Signaling connected, local id {local_id}");

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<ServerMessage>();

    tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            match outbound {
                Outbound::Message(message) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(err) => {
                            log::warn!("Failed to serialize signaling message: {err}");
                            continue;
                        }
                    };
                    if let Err(err) = ws_write.send(Message::Text(text)).await {
                        log::warn!("Signaling write failed: {err}");
                        break;
                    }
                }
                Outbound::Close => {
                    if let Err(err) = ws_write.close().await {
                        log::debug!("Signaling close failed: {err}");
                    }
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(frame) = ws_read.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(err) => {
                    log::warn!("Signaling read failed: {err}");
                    break;
                }
            };
            match serde_json::from_str::<ServerMessage>(&text) {
                Ok(message) => {
                    if inbound_tx.send(message).is_err() {
                        break;
                    }
                }
                Err(err) => log::warn!("Ignoring unparseable signaling frame: {err}"),
            }
        }
        log::info!("Signaling connection closed");
    });

    Ok((SignalingHandle::new(local_id, outbound_tx), inbound_rx))
}
