use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rtc_p2p_chat::network::{ConnectionState, Roster};
use rtc_p2p_chat::{ChatMessage, NetworkEvent, PeerId};

/// Giữ tối đa bấy nhiêu event để không chiếm quá nhiều bộ nhớ
const MAX_ACTIVITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    /// Join sent, waiting for the roster.
    Joining,
    Chat,
}

/// Một dòng trong activity panel.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: ActivityKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Joined,
    Left,
    PeerState,
    Error,
}

/// Trạng thái cục bộ của UI.
pub struct AppState {
    pub screen: Screen,
    pub server_url: String,
    pub local_id: Option<PeerId>,
    pub username: String,
    pub username_input: String,
    pub roster: Roster,
    pub peer_states: HashMap<PeerId, ConnectionState>,
    pub selected: Option<PeerId>,
    pub messages: Vec<ChatMessage>,
    pub input_text: String,
    pub status: String,
    pub activity: Vec<ActivityEvent>,
}

impl AppState {
    pub fn new(server_url: String, username: Option<String>) -> Self {
        Self {
            screen: Screen::Login,
            server_url,
            local_id: None,
            username: String::new(),
            username_input: username.unwrap_or_default(),
            roster: Roster::default(),
            peer_states: HashMap::new(),
            selected: None,
            messages: Vec::new(),
            input_text: String::new(),
            status: String::new(),
            activity: Vec::new(),
        }
    }

    pub fn begin_join(&mut self, username: String) {
        self.username = username;
        self.screen = Screen::Joining;
        self.status = "Connecting...".into();
    }

    pub fn apply(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Connected { local_id } => {
                self.roster = Roster::new(local_id.clone());
                self.local_id = Some(local_id);
            }
            NetworkEvent::UserList(users) => {
                let entries = users.into_iter().map(|u| (u.id, u.username)).collect();
                self.roster.replace(entries);
                self.screen = Screen::Chat;
                self.status = "Select a user to chat with".into();
            }
            NetworkEvent::UserJoined(user) => {
                let line = format!("{} joined", user.username);
                if self.roster.upsert(user) {
                    self.log(ActivityKind::Joined, line);
                }
            }
            NetworkEvent::UserLeft(user) => {
                self.roster.remove(&user.id);
                self.peer_states.remove(&user.id);
                if self.selected.as_deref() == Some(user.id.as_str()) {
                    self.selected = None;
                    self.status = "Select a user to chat with".into();
                }
                self.log(ActivityKind::Left, format!("{} left", user.username));
            }
            NetworkEvent::MessageReceived(message) => self.messages.push(message),
            NetworkEvent::PeerStateChanged { peer_id, state } => {
                let name = self.roster.display_name(&peer_id).to_string();
                if self.selected.as_deref() == Some(peer_id.as_str()) {
                    self.status = status_line(&name, state);
                }
                self.log(ActivityKind::PeerState, format!("{name}: {state}"));
                if state == ConnectionState::Closed {
                    self.peer_states.remove(&peer_id);
                } else {
                    self.peer_states.insert(peer_id, state);
                }
            }
            NetworkEvent::ChannelClosed { peer_id } => {
                let name = self.roster.display_name(&peer_id).to_string();
                self.peer_states.remove(&peer_id);
                if self.selected.as_deref() == Some(peer_id.as_str()) {
                    self.status = status_line(&name, ConnectionState::Closed);
                }
                self.log(ActivityKind::PeerState, format!("{name}: direct channel closed"));
            }
            NetworkEvent::SendFailed { to, reason } => {
                let name = self.roster.display_name(&to).to_string();
                self.log(ActivityKind::Error, format!("Send to {name} failed: {reason}"));
            }
            NetworkEvent::Disconnected => self.reset(),
        }
    }

    /// Marks `peer_id` as the chat target. Returns whether a connection
    /// should be requested: true whenever there is no live session with it,
    /// even if it was already selected.
    pub fn select(&mut self, peer_id: &str) -> bool {
        let idle = !self.peer_states.contains_key(peer_id);
        if self.selected.as_deref() == Some(peer_id) && !idle {
            return false;
        }
        self.selected = Some(peer_id.to_string());
        let name = self.roster.display_name(peer_id).to_string();
        self.status = match self.peer_states.get(peer_id) {
            Some(state) => status_line(&name, *state),
            None => format!("Connecting to {name}..."),
        };
        idle
    }

    /// Sender label for a message: "You", the roster name or the placeholder.
    pub fn sender_label(&self, message: &ChatMessage) -> String {
        if self.local_id.as_deref() == Some(message.from.as_str()) {
            "You".to_string()
        } else {
            self.roster.display_name(&message.from).to_string()
        }
    }

    fn reset(&mut self) {
        let had_session = self.screen != Screen::Login;
        self.screen = Screen::Login;
        self.local_id = None;
        self.roster.clear();
        self.peer_states.clear();
        self.selected = None;
        self.messages.clear();
        self.input_text.clear();
        self.status = if had_session {
            "Disconnected".into()
        } else {
            String::new()
        };
    }

    fn log(&mut self, kind: ActivityKind, message: String) {
        self.activity.push(ActivityEvent {
            timestamp: Utc::now(),
            kind,
            message,
        });
        if self.activity.len() > MAX_ACTIVITY {
            self.activity.remove(0);
        }
    }
}

fn status_line(name: &str, state: ConnectionState) -> String {
    match state {
        ConnectionState::Connected => format!("Connected to {name} (P2P)"),
        ConnectionState::Closed => format!("{name}: direct channel closed, using server"),
        _ => format!("Connecting to {name}..."),
    }
}
