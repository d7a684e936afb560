use std::sync::Arc;

use tokio::sync::mpsc;

use super::engine::NegotiationEngine;
use super::roster::{Roster, UNKNOWN_USER};
use super::router::{DeliveryRouter, Route};
use super::rtc::{EngineEvent, RtcBackend};
use crate::common::{ChatMessage, NetworkCommand, NetworkEvent, User};
use crate::config::{ClientConfig, IceServer};
use crate::error::Result;
use crate::signaling::{self, ClientMessage, ServerMessage, SignalingEvents, SignalingHandle};

/// Owns the negotiation engine, the roster mirror and the router, and serves
/// UI commands, signaling traffic and platform reports from a single task.
pub struct P2PClient {
    signaling: SignalingHandle,
    signaling_events: SignalingEvents,
    engine: NegotiationEngine,
    engine_events: mpsc::UnboundedReceiver<EngineEvent>,
    router: DeliveryRouter,
    roster: Roster,
    event_sender: mpsc::Sender<NetworkEvent>,
    command_receiver: mpsc::Receiver<NetworkCommand>,
}

impl P2PClient {
    /// Connects to the relay named in `config`.
    pub async fn connect(
        config: &ClientConfig,
        backend: Arc<dyn RtcBackend>,
        event_sender: mpsc::Sender<NetworkEvent>,
        command_receiver: mpsc::Receiver<NetworkCommand>,
    ) -> Result<Self> {
        let (handle, events) = signaling::connect(&config.signaling_url).await?;
        Ok(Self::with_signaling(
            handle,
            events,
            backend,
            config.ice_servers.clone(),
            event_sender,
            command_receiver,
        ))
    }

    /// Builds a client on an already established signaling connection.
    pub fn with_signaling(
        signaling: SignalingHandle,
        signaling_events: SignalingEvents,
        backend: Arc<dyn RtcBackend>,
        ice_servers: Vec<IceServer>,
        event_sender: mpsc::Sender<NetworkEvent>,
        command_receiver: mpsc::Receiver<NetworkCommand>,
    ) -> Self {
        let (engine, engine_events) =
            NegotiationEngine::new(signaling.clone(), backend, ice_servers);
        Self {
            roster: Roster::new(signaling.local_id()),
            router: DeliveryRouter::new(signaling.clone()),
            signaling,
            signaling_events,
            engine,
            engine_events,
            event_sender,
            command_receiver,
        }
    }

    pub fn local_id(&self) -> &str {
        self.signaling.local_id()
    }

    pub async fn run(mut self) -> Result<()> {
        log::info!("Network event loop started, local id {}", self.local_id());
        self.notify(NetworkEvent::Connected {
            local_id: self.local_id().to_string(),
        })
        .await;

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(NetworkCommand::Disconnect) | None => {
                            log::info!("Disconnecting");
                            self.engine.close_all();
                            break;
                        }
                        Some(command) => self.handle_command(command).await,
                    }
                }
                message = self.signaling_events.recv() => {
                    match message {
                        Some(message) => self.handle_signaling(message).await,
                        None => {
                            log::warn!("Lost connection to signaling server");
                            self.engine.close_all();
                            break;
                        }
                    }
                }
                Some(event) = self.engine_events.recv() => {
                    self.engine.handle_event(event);
                }
            }
            self.flush_notices().await;
        }

        self.flush_notices().await;
        self.roster.clear();
        self.notify(NetworkEvent::Disconnected).await;
        Ok(())
    }

    async fn handle_command(&mut self, command: NetworkCommand) {
        match command {
            NetworkCommand::Join { username } => {
                if let Err(err) = self.signaling.send(ClientMessage::Join(username)) {
                    log::warn!("Failed to join: {err}");
                }
            }
            NetworkCommand::ConnectToPeer { peer_id } => self.engine.initiate(&peer_id),
            NetworkCommand::SendMessage { to, content } => {
                let channel = self.engine.channel(&to);
                match self.router.send(channel.as_ref(), &to, &content).await {
                    Ok(route) => {
                        let echo = ChatMessage::new(
                            content,
                            self.local_id().to_string(),
                            to,
                            route == Route::Direct,
                        );
                        self.notify(NetworkEvent::MessageReceived(echo)).await;
                    }
                    Err(err) => {
                        log::warn!("Send to {to} failed: {err}");
                        self.notify(NetworkEvent::SendFailed {
                            to,
                            reason: err.to_string(),
                        })
                        .await;
                    }
                }
            }
            NetworkCommand::ClosePeer { peer_id } => self.engine.close(&peer_id),
            NetworkCommand::Disconnect => {}
        }
    }

    async fn handle_signaling(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Connected { id } => {
                log::debug!("Ignoring repeated greeting ({id})");
            }
            ServerMessage::UserList(entries) => {
                let users = self.roster.replace(entries);
                log::info!("Roster received with {} users", users.len());
                self.notify(NetworkEvent::UserList(users)).await;
            }
            ServerMessage::UserJoined(user) => {
                if self.roster.upsert(user.clone()) {
                    log::info!("{} joined", user.username);
                    self.notify(NetworkEvent::UserJoined(user)).await;
                }
            }
            ServerMessage::UserLeft { id, username } => {
                if id == self.local_id() {
                    return;
                }
                self.engine.close(&id);
                self.flush_notices().await;
                let user = self.roster.remove(&id).unwrap_or_else(|| User {
                    id: id.clone(),
                    username: username.unwrap_or_else(|| UNKNOWN_USER.to_string()),
                });
                log::info!("{} left", user.username);
                self.notify(NetworkEvent::UserLeft(user)).await;
            }
            ServerMessage::Offer { offer, from } => self.engine.accept_offer(&from, offer),
            ServerMessage::Answer { answer, from } => self.engine.accept_answer(&from, answer),
            ServerMessage::IceCandidate { candidate, from } => {
                self.engine.add_remote_candidate(&from, candidate)
            }
            ServerMessage::Message {
                message,
                from,
                username,
            } => {
                if let Some(username) = username {
                    if self.roster.get(&from).is_none() {
                        log::debug!("Relayed message from {username} ({from}) not in roster");
                    }
                }
                let message = ChatMessage::new(message, from, self.local_id().to_string(), false);
                self.notify(NetworkEvent::MessageReceived(message)).await;
            }
        }
    }

    async fn flush_notices(&mut self) {
        for event in self.engine.take_notices() {
            self.notify(event).await;
        }
    }

    async fn notify(&self, event: NetworkEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("Failed to notify UI: {err}");
        }
    }
}
