//! Media-control node host stand-in.
//!
//! Boots the WebSocket listener the way the full node would: load and
//! validate configuration, initialize tracing, register handlers, open
//! through a guard, and close cleanly on ctrl-c. The node's other services
//! (HTTP APIs, registration) are out of scope here.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ws_listener::config::{load_config, NodeConfig};
use ws_listener::observability::logging;
use ws_listener::{Listener, ListenerConfig, ListenerGuard, Message};

#[derive(Parser)]
#[command(name = "ws-listener")]
#[command(about = "Standalone WebSocket listener node", long_about = None)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured listen port.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => NodeConfig::default(),
    };
    if let Some(port) = cli.port {
        config.listener.port = port;
    }

    logging::init(&config.observability.log_filter);
    tracing::info!("ws-listener node starting");

    let mut listener_config = ListenerConfig::default();
    listener_config
        .set_handshake_timeout(Duration::from_secs(config.listener.handshake_timeout_secs));
    listener_config.set_close_timeout(Duration::from_secs(config.listener.close_timeout_secs));
    if config.listener.secure {
        // validation guarantees both paths when secure is set
        let cert_path = PathBuf::from(config.listener.cert_path.clone().unwrap_or_default());
        let key_path = PathBuf::from(config.listener.key_path.clone().unwrap_or_default());
        listener_config.set_tls_context_callback(move |context| {
            if let Err(e) = context.load_pem_files(&cert_path, &key_path) {
                tracing::error!("loading TLS identity failed: {e}");
            }
        });
    }

    let mut listener = Listener::new(config.listener.secure, config.listener.port, listener_config);

    // greet each accepted connection from the main task; the open handler
    // runs in worker context and must not block on the send itself
    let (greet_tx, mut greet_rx) = tokio::sync::mpsc::unbounded_channel();
    listener.set_open_handler(move |path, id| {
        tracing::info!(path, "client connected");
        let _ = greet_tx.send(id.clone());
    })?;
    listener.set_close_handler(|path, _id| {
        tracing::info!(path, "client disconnected");
    })?;

    let guard = ListenerGuard::open(listener).await?;
    tracing::info!(port = guard.port(), "ready for connections");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            greeted = greet_rx.recv() => {
                if let Some(id) = greeted {
                    if let Err(e) = guard.send(&id, Message::from("welcome")).await {
                        tracing::warn!("greeting failed: {e}");
                    }
                }
            }
        }
    }

    tracing::info!("closing connections");
    guard.close().await?;
    tracing::info!("node stopped");
    Ok(())
}
