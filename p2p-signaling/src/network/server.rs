use std::error::Error;
use std::future::IntoFuture;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use rtc_p2p_chat::signaling::{ClientMessage, ServerMessage, SharedHub, with_hub};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{Duration, interval};
use tower_http::services::ServeDir;

use crate::config::ServerConfig;

/// HTTP listener serving the browser client and the `/ws` signaling endpoint.
pub struct SignalingServer {
    config: ServerConfig,
    hub: SharedHub,
}

impl SignalingServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            hub: SharedHub::default(),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .fallback_service(ServeDir::new(&self.config.static_dir))
            .layer(self.config.cors_layer())
            .with_state(self.hub.clone())
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error>> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.port)).await?;
        log::info!(
            "Signaling server running on port {}, serving {}",
            self.config.port,
            self.config.static_dir
        );
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> Result<(), Box<dyn Error>> {
        let app = self.router();
        let mut stats_interval = interval(Duration::from_secs(30));
        let server = axum::serve(listener, app).into_future();
        tokio::pin!(server);

        loop {
            tokio::select! {
                result = &mut server => {
                    result?;
                    return Ok(());
                }
                _ = stats_interval.tick() => {
                    log::info!("Statistics: {} open connections", self.connection_count());
                }
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        with_hub(&self.hub, |hub| hub.connection_count())
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<SharedHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: SharedHub) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let id = with_hub(&hub, |hub| hub.connect(tx));

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(err) => {
                    log::warn!("Failed to serialize {message:?}: {err}");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = ws_rx.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                log::debug!("WebSocket error on {id}: {err}");
                break;
            }
        };
        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(message) => with_hub(&hub, |hub| hub.handle(&id, message)),
            Err(err) => log::warn!("Ignoring malformed frame from {id}: {err}"),
        }
    }

    with_hub(&hub, |hub| hub.disconnect(&id));
    writer.abort();
}
