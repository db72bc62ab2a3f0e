//! memsync Daemon (memsyncd)
//!
//! Hosts one replica of the store, accepts peer links, dials configured
//! peers and serves the operator command protocol.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (commands on 7380, peers on 7381, WebSocket peers on 7382)
//! memsyncd
//!
//! # Join an existing replica set
//! memsyncd --peer 10.0.0.2:7381 --peer ws://10.0.0.3:7382
//!
//! # Expose Prometheus metrics
//! memsyncd --metrics-port 9380
//!
//! # With configuration file
//! memsyncd --config /etc/memsync/memsync.toml
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use memsync_core::create_store;
use memsync_transport::{
    Metrics, MetricsServer, PeerServer, SessionRegistry, TcpServer, WebSocketServer,
};

use config::Config;

/// memsync Daemon - replicated in-memory key-value store
#[derive(Parser, Debug)]
#[command(name = "memsyncd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "MEMSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(long, env = "MEMSYNC_BIND")]
    bind: Option<String>,

    /// Operator command port
    #[arg(long, env = "MEMSYNC_CLIENT_PORT")]
    client_port: Option<u16>,

    /// Peer sync port
    #[arg(long, env = "MEMSYNC_PEER_PORT")]
    peer_port: Option<u16>,

    /// WebSocket peer sync port (0 disables)
    #[arg(long, env = "MEMSYNC_WS_PORT")]
    ws_port: Option<u16>,

    /// Prometheus metrics port (0 disables)
    #[arg(long, env = "MEMSYNC_METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Peer to dial, added to those in the config file (repeatable)
    #[arg(long = "peer", env = "MEMSYNC_PEERS", value_delimiter = ',')]
    peers: Vec<String>,

    /// Anti-entropy interval in milliseconds
    #[arg(long, env = "MEMSYNC_SYNC_INTERVAL_MS")]
    sync_interval_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "MEMSYNC_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    /// Build the effective configuration: file first, then flags
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(port) = self.client_port {
            config.client_port = port;
        }
        if let Some(port) = self.peer_port {
            config.peer_port = port;
        }
        if let Some(port) = self.ws_port {
            config.ws_port = port;
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(ms) = self.sync_interval_ms {
            config.sync_interval_ms = ms;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        config.peers.extend(self.peers);

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;

    // Initialize logging; RUST_LOG takes precedence over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner();

    let store = Arc::new(create_store());
    let sessions = Arc::new(SessionRegistry::new());
    let session_config = config.session_config();

    info!(
        replica = %store.replica_id(),
        client_port = config.client_port,
        peer_port = config.peer_port,
        ws_port = config.ws_port,
        peers = config.peers.len(),
        bind = %config.bind,
        "Starting memsync daemon"
    );

    let mut handles = Vec::new();

    let client_addr = config.listen_addr(config.client_port)?;
    let command_server = TcpServer::new(store.clone(), sessions.clone());
    handles.push(tokio::spawn(async move {
        if let Err(e) = command_server.run(client_addr).await {
            error!(error = %e, "Command server error");
        }
    }));

    let peer_addr = config.listen_addr(config.peer_port)?;
    let peer_server = PeerServer::new(store.clone(), sessions.clone(), session_config.clone());
    handles.push(tokio::spawn(async move {
        if let Err(e) = peer_server.run(peer_addr).await {
            error!(error = %e, "Peer server error");
        }
    }));

    if config.ws_port != 0 {
        let ws_addr = config.listen_addr(config.ws_port)?;
        let ws_server =
            WebSocketServer::new(store.clone(), sessions.clone(), session_config.clone());
        handles.push(tokio::spawn(async move {
            if let Err(e) = ws_server.run(ws_addr).await {
                error!(error = %e, "WebSocket server error");
            }
        }));
    }

    if config.metrics_port != 0 {
        let metrics_addr = config.listen_addr(config.metrics_port)?;
        let metrics = Arc::new(
            Metrics::new(store.clone(), sessions.clone())
                .context("Failed to register metrics")?,
        );
        let metrics_server = MetricsServer::new(metrics, metrics_addr);
        handles.push(tokio::spawn(async move {
            if let Err(e) = metrics_server.run().await {
                error!(error = %e, "Metrics server error");
            }
        }));
    }

    // Dial configured peers
    for peer in config.peer_addrs()? {
        info!(peer = %peer, "Connecting to peer");
        let handle = peer.connect(&store, session_config.clone())?;
        sessions.adopt(handle);
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    sessions.close_all();
    let drained = tokio::time::timeout(session_config.handshake_timeout, async {
        // Adopted sessions drop out of the registry as their tasks end
        while !sessions.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    if drained.is_err() {
        warn!(open = sessions.len(), "Sessions still open at shutdown");
    }

    for handle in handles {
        handle.abort();
    }

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  ┌┬┐┌─┐┌┬┐┌─┐┬ ┬┌┐┌┌─┐
  │││├┤ │││└─┐└┬┘││││
  ┴ ┴└─┘┴ ┴└─┘ ┴ ┘└┘└─┘
  Replicated in-memory key-value store
  Version {}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
