mod ui;

use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use rtc_p2p_chat::config::{ClientConfig, DEFAULT_CONFIG_PATH, load_config, save_config};
use rtc_p2p_chat::network::{RtcBackend, WebRtcBackend};
use rtc_p2p_chat::{NetworkCommand, NetworkEvent, P2PClient};
use tokio::sync::mpsc;
use ui::ChatApp;

#[derive(Parser, Debug)]
#[command(name = "p2p-client", about = "Desktop WebRTC chat client")]
struct Cli {
    /// Path to the JSON client configuration
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Signaling server WebSocket URL (overrides config and SIGNALING_URL)
    #[arg(long)]
    server: Option<String>,

    /// Username to pre-fill on the login screen
    #[arg(long)]
    username: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    // Khởi tạo Logger để debug
    env_logger::init();

    let cli = Cli::parse();
    let mut config = load_config(&cli.config).with_env_overrides();
    if let Some(server) = cli.server {
        config.signaling_url = server;
    }
    if cli.username.is_some() {
        config.username = cli.username;
    }

    let backend: Arc<dyn RtcBackend> = Arc::new(WebRtcBackend::new()?);

    // 1. Tạo các kênh giao tiếp (Channels)
    // UI -> Network
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // Network -> UI
    let (event_tx, event_rx) = mpsc::channel(100);

    // 2. Khởi chạy Network Thread (Chạy ngầm)
    let network_config = config.clone();
    tokio::spawn(run_network(
        cli.config,
        network_config,
        backend,
        event_tx,
        cmd_rx,
    ));

    // 3. Khởi chạy UI (Chạy trên Main Thread)
    let options = eframe::NativeOptions::default();
    let mut event_rx = Some(event_rx);
    let server_url = config.signaling_url.clone();
    let username = config.username.clone();

    eframe::run_native(
        "Rust P2P Chat",
        options,
        Box::new(move |cc| {
            let event_receiver = event_rx
                .take()
                .expect("ChatApp should only be initialized once");

            log::info!("Client started against {server_url}");

            Ok(Box::new(ChatApp::new(
                cc,
                cmd_tx.clone(),
                event_receiver,
                server_url.clone(),
                username.clone(),
            )))
        }),
    )?;

    Ok(())
}

/// Opens a signaling connection on every `Join` and forwards UI commands to
/// the resulting client until it ends, so Disconnect → Join starts afresh.
async fn run_network(
    config_path: String,
    mut config: ClientConfig,
    backend: Arc<dyn RtcBackend>,
    events: mpsc::Sender<NetworkEvent>,
    mut commands: mpsc::Receiver<NetworkCommand>,
) {
    while let Some(command) = commands.recv().await {
        let NetworkCommand::Join { username } = &command else {
            log::debug!("Not connected; dropping {command:?}");
            continue;
        };
        remember_username(&config_path, &mut config, username);

        let (client_tx, client_rx) = mpsc::channel(100);
        let client =
            match P2PClient::connect(&config, backend.clone(), events.clone(), client_rx).await {
                Ok(client) => client,
                Err(err) => {
                    log::error!("Cannot reach {}: {err}", config.signaling_url);
                    if events.send(NetworkEvent::Disconnected).await.is_err() {
                        return;
                    }
                    continue;
                }
            };
        let mut task = tokio::spawn(client.run());
        if client_tx.send(command).await.is_err() {
            continue;
        }

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        if let Err(err) = client_tx.send(NetworkCommand::Disconnect).await {
                            log::debug!("Network client already gone: {err}");
                        }
                        match task.await {
                            Ok(Ok(())) => log::info!("Network client stopped"),
                            Ok(Err(err)) => log::error!("Network client terminated: {err}"),
                            Err(err) => log::error!("Network client panicked: {err}"),
                        }
                        return;
                    };
                    if client_tx.send(command).await.is_err() {
                        break;
                    }
                }
                result = &mut task => {
                    match result {
                        Ok(Ok(())) => log::info!("Network client stopped"),
                        Ok(Err(err)) => log::error!("Network client terminated: {err}"),
                        Err(err) => log::error!("Network client panicked: {err}"),
                    }
                    break;
                }
            }
        }
    }
}

/// Pre-fills the login screen next time.
fn remember_username(path: &str, config: &mut ClientConfig, username: &str) {
    if config.username.as_deref() == Some(username) {
        return;
    }
    config.username = Some(username.to_string());
    // Overrides from the CLI and environment stay out of the file.
    let mut stored = load_config(path);
    stored.username = config.username.clone();
    if let Err(err) = save_config(path, &stored) {
        log::warn!("Failed to save config to {path}: {err}");
    }
}
