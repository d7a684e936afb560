mod config;
mod network;

use clap::Parser;
use config::{DEFAULT_PORT, DEFAULT_STATIC_DIR, ServerConfig};
use dotenvy::dotenv;
use network::server::SignalingServer;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "p2p-signaling", about = "WebSocket signaling relay for P2P chat")]
struct Cli {
    /// Port for HTTP and the /ws endpoint
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory of static browser client assets
    #[arg(long, default_value = DEFAULT_STATIC_DIR)]
    static_dir: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let config = ServerConfig {
        port: cli.port,
        static_dir: cli.static_dir,
        ..ServerConfig::default()
    };

    log::info!("Starting signaling server...");
    let server = SignalingServer::new(config);

    tokio::select! {
        result = server.run() => {
            if let Err(err) = result {
                log::error!("Signaling server error: {}", err);
            }
        }
        _ = signal::ctrl_c() => {
            log::info!("Received shutdown signal, stopping signaling server...");
        }
    }

    log::info!("Final statistics: {} open connections", server.connection_count());

    Ok(())
}
