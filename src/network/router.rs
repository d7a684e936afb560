use std::sync::Arc;

use super::rtc::{ChannelState, DataChannel};
use crate::error::Result;
use crate::signaling::{ClientMessage, SignalingHandle};

/// Path a message took out of this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct,
    Relayed,
}

/// Picks the direct channel when it is open and falls back to the relay.
#[derive(Debug, Clone)]
pub struct DeliveryRouter {
    signaling: SignalingHandle,
}

impl DeliveryRouter {
    pub fn new(signaling: SignalingHandle) -> Self {
        Self { signaling }
    }

    /// No queueing and no retry: a write error on the direct path is returned
    /// as-is rather than retried over the relay.
    pub async fn send(
        &self,
        channel: Option<&Arc<dyn DataChannel>>,
        to: &str,
        content: &str,
    ) -> Result<Route> {
        if let Some(channel) = channel.filter(|c| c.state() == ChannelState::Open) {
            channel.send_text(content).await?;
            log::debug!("Sent {} bytes to {to} directly", content.len());
            return Ok(Route::Direct);
        }

        self.signaling.send(ClientMessage::Message {
            target: to.to_string(),
            message: content.to_string(),
        })?;
        log::debug!("Relayed {} bytes to {to}", content.len());
        Ok(Route::Relayed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::error::Error;
    use crate::signaling::Outbound;

    struct RecordingChannel {
        state: ChannelState,
        written: Mutex<Vec<String>>,
    }

    impl RecordingChannel {
        fn new(state: ChannelState) -> Arc<Self> {
            Arc::new(Self {
                state,
                written: Mutex::new(Vec::new()),
            })
        }

        fn written(&self) -> Vec<String> {
            self.written.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DataChannel for RecordingChannel {
        fn label(&self) -> String {
            "chat".into()
        }

        fn state(&self) -> ChannelState {
            self.state
        }

        async fn send_text(&self, text: &str) -> Result<()> {
            if self.state != ChannelState::Open {
                return Err(Error::ChannelNotOpen("chat".into()));
            }
            self.written.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn router() -> (DeliveryRouter, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (DeliveryRouter::new(SignalingHandle::new("me".into(), tx)), rx)
    }

    #[tokio::test]
    async fn open_channel_takes_direct_path() {
        let (router, mut relay) = router();
        let recording = RecordingChannel::new(ChannelState::Open);
        let channel: Arc<dyn DataChannel> = recording.clone();

        let route = router.send(Some(&channel), "p", "hi").await.unwrap();

        assert_eq!(route, Route::Direct);
        assert_eq!(recording.written(), vec!["hi".to_string()]);
        assert!(relay.try_recv().is_err());
    }

    #[tokio::test]
    async fn missing_channel_relays_exactly_once() {
        let (router, mut relay) = router();

        let route = router.send(None, "p", "hi").await.unwrap();

        assert_eq!(route, Route::Relayed);
        assert_eq!(
            relay.try_recv().unwrap(),
            Outbound::Message(ClientMessage::Message {
                target: "p".into(),
                message: "hi".into()
            })
        );
        assert!(relay.try_recv().is_err());
    }

    #[tokio::test]
    async fn channel_not_yet_open_relays_without_writing() {
        let (router, mut relay) = router();
        let recording = RecordingChannel::new(ChannelState::Connecting);
        let channel: Arc<dyn DataChannel> = recording.clone();

        let route = router.send(Some(&channel), "p", "hi").await.unwrap();

        assert_eq!(route, Route::Relayed);
        assert!(recording.written().is_empty());
        assert!(relay.try_recv().is_ok());
    }

    #[tokio::test]
    async fn relay_failure_is_reported() {
        let (router, relay) = router();
        drop(relay);
        assert!(matches!(
            router.send(None, "p", "hi").await,
            Err(Error::SignalingClosed)
        ));
    }
}
