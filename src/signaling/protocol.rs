//! JSON envelopes exchanged with the relay over WebSocket text frames.
//!
//! Every frame is `{"event": <name>, "data": <payload>}`. Negotiation payloads
//! use the browser `RTCSessionDescriptionInit` / `RTCIceCandidateInit` shapes so
//! browser and native clients can talk through the same relay.

use serde::{Deserialize, Serialize};

use crate::common::{PeerId, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Client → server events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "join")]
    Join(String),
    #[serde(rename = "offer")]
    Offer {
        target: PeerId,
        offer: SessionDescription,
    },
    #[serde(rename = "answer")]
    Answer {
        target: PeerId,
        answer: SessionDescription,
    },
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        target: PeerId,
        candidate: IceCandidate,
    },
    #[serde(rename = "message")]
    Message { target: PeerId, message: String },
}

/// Server → client events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// First frame on every connection; carries the id other peers address us by.
    #[serde(rename = "connected")]
    Connected { id: PeerId },
    /// Ordered `[id, username]` pairs, sent to the joiner only.
    #[serde(rename = "userList")]
    UserList(Vec<(PeerId, String)>),
    #[serde(rename = "userJoined")]
    UserJoined(User),
    #[serde(rename = "userLeft")]
    UserLeft {
        id: PeerId,
        #[serde(default)]
        username: Option<String>,
    },
    #[serde(rename = "offer")]
    Offer {
        offer: SessionDescription,
        from: PeerId,
    },
    #[serde(rename = "answer")]
    Answer {
        answer: SessionDescription,
        from: PeerId,
    },
    #[serde(rename = "ice-candidate")]
    IceCandidate { candidate: IceCandidate, from: PeerId },
    #[serde(rename = "message")]
    Message {
        message: String,
        from: PeerId,
        #[serde(default)]
        username: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_list_is_an_array_of_pairs() {
        let msg = ServerMessage::UserList(vec![("a1".into(), "alice".into())]);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "event": "userList", "data": [["a1", "alice"]] })
        );
    }

    #[test]
    fn join_payload_is_a_bare_username() {
        let msg: ClientMessage =
            serde_json::from_value(json!({ "event": "join", "data": "bob" })).unwrap();
        assert_eq!(msg, ClientMessage::Join("bob".into()));
    }

    #[test]
    fn browser_candidate_shape_is_accepted() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "event": "ice-candidate",
            "data": {
                "target": "b2",
                "candidate": {
                    "candidate": "candidate:1 1 udp 2122260223 10.0.0.2 54400 typ host",
                    "sdpMid": "0",
                    "sdpMLineIndex": 0,
                    "usernameFragment": "abcd"
                }
            }
        }))
        .unwrap();

        match msg {
            ClientMessage::IceCandidate { target, candidate } => {
                assert_eq!(target, "b2");
                assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
                assert_eq!(candidate.sdp_mline_index, Some(0));
                assert_eq!(candidate.username_fragment.as_deref(), Some("abcd"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn description_uses_type_field() {
        let value = serde_json::to_value(SessionDescription::answer("v=0")).unwrap();
        assert_eq!(value, json!({ "type": "answer", "sdp": "v=0" }));
    }

    #[test]
    fn relayed_message_without_username_parses() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "event": "message",
            "data": { "message": "hi", "from": "a1" }
        }))
        .unwrap();
        assert_eq!(
            msg,
            ServerMessage::Message {
                message: "hi".into(),
                from: "a1".into(),
                username: None
            }
        );
    }
}
