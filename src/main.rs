//! Chat Server - Entry Point
//!
//! Starts the listener and broadcast dispatcher, then reads console
//! commands from stdin. `SHUTDOWN` stops the server; any other line is
//! broadcast as a server message.

use std::env;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use broadcast_chat::message::{self, BroadcastMessage};
use broadcast_chat::{Broadcaster, ChatServer, ServerConfig, ShutdownHandle};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=broadcast_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("broadcast_chat=info")),
        )
        .init();

    // Port from command line or default
    let config = ServerConfig::from_args(env::args().skip(1))?;

    let server = ChatServer::from_config(&config).await?;
    info!("Chat server listening on {}", server.local_addr()?);

    tokio::spawn(console(server.broadcaster(), server.shutdown_handle()));

    server.run().await?;
    Ok(())
}

/// Server console: stdin lines become server broadcasts until `SHUTDOWN`
async fn console(broadcaster: Broadcaster, shutdown: ShutdownHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) if message::is_control(&line, message::SHUTDOWN) => {
                shutdown.shutdown().await;
                return;
            }
            Ok(Some(text)) => {
                if broadcaster.send(BroadcastMessage::Console { text }).await.is_err() {
                    error!("Broadcast queue closed, console stopping");
                    return;
                }
            }
            Ok(None) => {
                info!("Console input closed");
                return;
            }
            Err(e) => {
                error!("Console read failed: {}", e);
                return;
            }
        }
    }
}
