use std::sync::Arc;
use std::time::Duration;

use rtc_p2p_chat::network::{ConnectionState, LoopbackBackend};
use rtc_p2p_chat::signaling::{LoopbackRelay, ServerMessage};
use rtc_p2p_chat::{ChatMessage, NetworkCommand, NetworkEvent, P2PClient, User};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct TestClient {
    id: String,
    commands: mpsc::Sender<NetworkCommand>,
    events: mpsc::Receiver<NetworkEvent>,
}

impl TestClient {
    async fn spawn(relay: &LoopbackRelay, backend: &LoopbackBackend) -> Self {
        init_logger();
        let (handle, inbound) = relay.connect();
        let id = handle.local_id().to_string();
        let (cmd_tx, cmd_rx) = mpsc::channel(100);
        let (event_tx, event_rx) = mpsc::channel(100);
        let client = P2PClient::with_signaling(
            handle,
            inbound,
            Arc::new(backend.clone()),
            Vec::new(),
            event_tx,
            cmd_rx,
        );
        tokio::spawn(client.run());

        let mut client = Self {
            id,
            commands: cmd_tx,
            events: event_rx,
        };
        let local_id = client
            .wait_for(|e| match e {
                NetworkEvent::Connected { local_id } => Some(local_id.clone()),
                _ => None,
            })
            .await;
        assert_eq!(local_id, client.id);
        client
    }

    async fn command(&self, command: NetworkCommand) {
        self.commands.send(command).await.unwrap();
    }

    async fn join(&mut self, username: &str) -> Vec<User> {
        self.command(NetworkCommand::Join {
            username: username.into(),
        })
        .await;
        self.wait_for(|e| match e {
            NetworkEvent::UserList(users) => Some(users.clone()),
            _ => None,
        })
        .await
    }

    async fn send_to(&self, to: &str, content: &str) {
        self.command(NetworkCommand::SendMessage {
            to: to.into(),
            content: content.into(),
        })
        .await;
    }

    async fn wait_for<T>(&mut self, mut pick: impl FnMut(&NetworkEvent) -> Option<T>) -> T {
        timeout(WAIT, async {
            loop {
                let event = self.events.recv().await.expect("client loop ended");
                if let Some(found) = pick(&event) {
                    return found;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    async fn wait_state(&mut self, peer: &str, state: ConnectionState) {
        self.wait_for(|e| match e {
            NetworkEvent::PeerStateChanged { peer_id, state: s } if peer_id == peer && *s == state => {
                Some(())
            }
            _ => None,
        })
        .await
    }

    async fn next_message(&mut self) -> ChatMessage {
        self.wait_for(|e| match e {
            NetworkEvent::MessageReceived(message) => Some(message.clone()),
            _ => None,
        })
        .await
    }
}

async fn joined_pair(backend: &LoopbackBackend) -> (LoopbackRelay, TestClient, TestClient) {
    let relay = LoopbackRelay::new();
    let mut alice = TestClient::spawn(&relay, backend).await;
    let mut bob = TestClient::spawn(&relay, backend).await;
    alice.join("alice").await;
    bob.join("bob").await;
    (relay, alice, bob)
}

async fn connect(alice: &mut TestClient, bob: &mut TestClient) {
    alice
        .command(NetworkCommand::ConnectToPeer {
            peer_id: bob.id.clone(),
        })
        .await;
    alice.wait_state(&bob.id, ConnectionState::Connected).await;
    bob.wait_state(&alice.id, ConnectionState::Connected).await;
}

#[tokio::test]
async fn joiners_see_each_other_but_never_themselves() {
    let backend = LoopbackBackend::new();
    let relay = LoopbackRelay::new();
    let mut alice = TestClient::spawn(&relay, &backend).await;
    let mut bob = TestClient::spawn(&relay, &backend).await;

    assert!(alice.join("alice").await.is_empty());
    let roster = bob.join("bob").await;
    assert_eq!(
        roster,
        vec![User {
            id: alice.id.clone(),
            username: "alice".into()
        }]
    );

    let joined = alice
        .wait_for(|e| match e {
            NetworkEvent::UserJoined(user) => Some(user.clone()),
            _ => None,
        })
        .await;
    assert_eq!(
        joined,
        User {
            id: bob.id.clone(),
            username: "bob".into()
        }
    );
    assert_eq!(relay.roster().len(), 2);
}

#[tokio::test]
async fn offer_reaches_target_tagged_with_sender() {
    let backend = LoopbackBackend::new();
    let relay = LoopbackRelay::new();
    let alice = TestClient::spawn(&relay, &backend).await;
    let (bob, mut bob_inbound) = relay.connect();

    alice
        .command(NetworkCommand::ConnectToPeer {
            peer_id: bob.local_id().to_string(),
        })
        .await;

    let from = timeout(WAIT, async {
        loop {
            match bob_inbound.recv().await {
                Some(ServerMessage::Offer { from, .. }) => return from,
                Some(_) => continue,
                None => panic!("relay closed"),
            }
        }
    })
    .await
    .expect("no offer relayed");
    assert_eq!(from, alice.id);
}

#[tokio::test]
async fn both_sides_reach_connected_and_chat_directly() {
    let backend = LoopbackBackend::new();
    let (_relay, mut alice, mut bob) = joined_pair(&backend).await;
    connect(&mut alice, &mut bob).await;

    alice.send_to(&bob.id, "hi").await;
    let echo = alice.next_message().await;
    assert!(echo.is_p2p);
    assert_eq!(echo.from, alice.id);
    assert_eq!(echo.to, bob.id);

    let received = bob.next_message().await;
    assert_eq!(received.content, "hi");
    assert_eq!(received.from, alice.id);
    assert!(received.is_p2p);

    bob.send_to(&alice.id, "hello back").await;
    let reply = alice.next_message().await;
    assert_eq!(reply.content, "hello back");
    assert!(reply.is_p2p);
}

#[tokio::test]
async fn without_a_channel_messages_are_relayed() {
    let backend = LoopbackBackend::new();
    let (_relay, mut alice, mut bob) = joined_pair(&backend).await;

    alice.send_to(&bob.id, "via server").await;
    let echo = alice.next_message().await;
    assert!(!echo.is_p2p);

    let received = bob.next_message().await;
    assert_eq!(received.content, "via server");
    assert_eq!(received.from, alice.id);
    assert_eq!(received.to, bob.id);
    assert!(!received.is_p2p);
}

#[tokio::test]
async fn closed_peer_falls_back_to_relay() {
    let backend = LoopbackBackend::new();
    let (_relay, mut alice, mut bob) = joined_pair(&backend).await;
    connect(&mut alice, &mut bob).await;

    alice
        .command(NetworkCommand::ClosePeer {
            peer_id: bob.id.clone(),
        })
        .await;
    alice.wait_state(&bob.id, ConnectionState::Closed).await;

    alice.send_to(&bob.id, "after close").await;
    assert!(!alice.next_message().await.is_p2p);
    let received = bob.next_message().await;
    assert_eq!(received.content, "after close");
    assert!(!received.is_p2p);
}

#[tokio::test]
async fn reconnects_after_the_other_side_closed_the_channel() {
    let backend = LoopbackBackend::new();
    let (_relay, mut alice, mut bob) = joined_pair(&backend).await;
    connect(&mut alice, &mut bob).await;

    alice
        .command(NetworkCommand::ClosePeer {
            peer_id: bob.id.clone(),
        })
        .await;
    alice.wait_state(&bob.id, ConnectionState::Closed).await;
    let alice_id = alice.id.clone();
    bob.wait_for(|e| match e {
        NetworkEvent::ChannelClosed { peer_id } if *peer_id == alice_id => Some(()),
        _ => None,
    })
    .await;

    bob.command(NetworkCommand::ConnectToPeer {
        peer_id: alice.id.clone(),
    })
    .await;
    bob.wait_state(&alice.id, ConnectionState::Connected).await;
    alice.wait_state(&bob.id, ConnectionState::Connected).await;

    bob.send_to(&alice.id, "back again").await;
    assert!(bob.next_message().await.is_p2p);
    let received = alice.next_message().await;
    assert_eq!(received.content, "back again");
    assert!(received.is_p2p);
}

#[tokio::test]
async fn simultaneous_connects_converge() {
    let backend = LoopbackBackend::new();
    let (_relay, mut alice, mut bob) = joined_pair(&backend).await;

    alice
        .command(NetworkCommand::ConnectToPeer {
            peer_id: bob.id.clone(),
        })
        .await;
    bob.command(NetworkCommand::ConnectToPeer {
        peer_id: alice.id.clone(),
    })
    .await;

    alice.wait_state(&bob.id, ConnectionState::Connected).await;
    bob.wait_state(&alice.id, ConnectionState::Connected).await;

    alice.send_to(&bob.id, "no glare").await;
    assert!(alice.next_message().await.is_p2p);
    assert!(bob.next_message().await.is_p2p);
}

#[tokio::test]
async fn peer_leaving_mid_negotiation_closes_the_session() {
    let alice_backend = LoopbackBackend::new();
    let bob_backend = LoopbackBackend::new();
    bob_backend.fail_answers(true);

    let relay = LoopbackRelay::new();
    let mut alice = TestClient::spawn(&relay, &alice_backend).await;
    let mut bob = TestClient::spawn(&relay, &bob_backend).await;
    alice.join("alice").await;
    bob.join("bob").await;

    alice
        .command(NetworkCommand::ConnectToPeer {
            peer_id: bob.id.clone(),
        })
        .await;
    alice.wait_state(&bob.id, ConnectionState::Offering).await;
    bob.wait_state(&alice.id, ConnectionState::OfferedByRemote).await;

    bob.command(NetworkCommand::Disconnect).await;
    bob.wait_for(|e| matches!(e, NetworkEvent::Disconnected).then_some(()))
        .await;

    alice.wait_state(&bob.id, ConnectionState::Closed).await;
    let left = alice
        .wait_for(|e| match e {
            NetworkEvent::UserLeft(user) => Some(user.clone()),
            _ => None,
        })
        .await;
    assert_eq!(left.id, bob.id);
    assert_eq!(left.username, "bob");

    timeout(WAIT, async {
        while alice_backend.open_connections() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection to departed peer was not released");
}
