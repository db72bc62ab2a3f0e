//! Daemon configuration
//!
//! Settings come from an optional TOML file; command line flags and their
//! environment variables are layered on top by `main`.

use anyhow::{bail, Context, Result};
use memsync_core::Store;
use memsync_transport::{
    ConnectPeer, RetryPolicy, SessionConfig, SyncSessionHandle, TcpConnector, WsConnector,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Bind address for every listener
    pub bind: String,

    /// Operator command port
    pub client_port: u16,

    /// Peer sync port (length-prefixed frames over TCP)
    pub peer_port: u16,

    /// Peer sync over WebSocket (0 disables)
    pub ws_port: u16,

    /// Prometheus endpoint (0 disables)
    pub metrics_port: u16,

    /// Peers to dial: `tcp://host:port`, `host:port` or `ws://host:port`
    pub peers: Vec<String>,

    pub sync_interval_ms: u64,
    pub round_timeout_ms: u64,
    pub handshake_timeout_ms: u64,

    /// Every n-th sync tick sends the full state (0 disables)
    pub full_sync_every: u64,

    pub retry: RetryConfig,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Reconnect backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            client_port: 7380,
            peer_port: 7381,
            ws_port: 7382,
            metrics_port: 0,
            peers: Vec::new(),
            sync_interval_ms: 1_000,
            round_timeout_ms: 5_000,
            handshake_timeout_ms: 5_000,
            full_sync_every: 30,
            retry: RetryConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

impl Config {
    /// Read a TOML file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        Ok(config)
    }

    /// Check settings that would otherwise fail at runtime
    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_ms == 0 {
            bail!("sync_interval_ms must be positive");
        }
        if self.round_timeout_ms == 0 || self.handshake_timeout_ms == 0 {
            bail!("timeouts must be positive");
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            bail!("retry.initial_delay_ms exceeds retry.max_delay_ms");
        }

        let mut ports = vec![self.client_port, self.peer_port];
        ports.extend([self.ws_port, self.metrics_port].into_iter().filter(|p| *p != 0));
        let count = ports.len();
        ports.sort_unstable();
        ports.dedup();
        if ports.len() != count {
            bail!("listener ports must be distinct");
        }

        self.peer_addrs()?;
        self.listen_addr(self.client_port)?;
        Ok(())
    }

    pub fn listen_addr(&self, port: u16) -> Result<SocketAddr> {
        format!("{}:{}", self.bind, port)
            .parse()
            .with_context(|| format!("Invalid bind address {}", self.bind))
    }

    pub fn peer_addrs(&self) -> Result<Vec<PeerAddr>> {
        self.peers.iter().map(|peer| PeerAddr::parse(peer)).collect()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            sync_interval: Duration::from_millis(self.sync_interval_ms),
            round_timeout: Duration::from_millis(self.round_timeout_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            full_sync_every: self.full_sync_every,
            retry: RetryPolicy::exponential()
                .with_max_retries(self.retry.max_retries)
                .with_initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
                .with_max_delay(Duration::from_millis(self.retry.max_delay_ms)),
        }
    }
}

/// A configured peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    /// `host:port` of a peer port
    Tcp(String),
    /// Full `ws://` or `wss://` URL
    WebSocket(String),
}

impl PeerAddr {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.starts_with("ws://") || text.starts_with("wss://") {
            return Ok(PeerAddr::WebSocket(text.to_string()));
        }

        let addr = text.strip_prefix("tcp://").unwrap_or(text);
        match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(PeerAddr::Tcp(addr.to_string()))
            }
            _ => bail!("Invalid peer address '{}': expected host:port, tcp://host:port or ws://host:port", text),
        }
    }

    /// Start a sync session dialing this peer
    pub fn connect(&self, store: &Arc<Store>, config: SessionConfig) -> Result<SyncSessionHandle> {
        let handle = match self {
            PeerAddr::Tcp(addr) => store.connect_peer(TcpConnector::new(addr.clone())?, config),
            PeerAddr::WebSocket(url) => store.connect_peer(WsConnector::new(url.clone())?, config),
        };
        Ok(handle)
    }
}

impl std::fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerAddr::Tcp(addr) => write!(f, "tcp://{}", addr),
            PeerAddr::WebSocket(url) => write!(f, "{}", url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.session_config().retry.max_retries, 5);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            peer_port = 9001
            peers = ["10.0.0.2:7381", "ws://10.0.0.3:7382"]

            [retry]
            max_retries = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.peer_port, 9001);
        assert_eq!(config.client_port, 7380);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.max_delay_ms, 30_000);
        assert_eq!(
            config.peer_addrs().unwrap(),
            vec![
                PeerAddr::Tcp("10.0.0.2:7381".into()),
                PeerAddr::WebSocket("ws://10.0.0.3:7382".into()),
            ]
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sync_interval_ms = 250\nlog_level = \"debug\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.sync_interval_ms, 250);
        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.session_config().sync_interval,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::from_toml("client_prot = 1").is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn test_validation() {
        let clash = Config {
            ws_port: 7380,
            ..Config::default()
        };
        assert!(clash.validate().is_err());

        let bad_peer = Config {
            peers: vec!["nowhere".into()],
            ..Config::default()
        };
        assert!(bad_peer.validate().is_err());

        let bad_retry = Config {
            retry: RetryConfig {
                max_retries: 1,
                initial_delay_ms: 10_000,
                max_delay_ms: 100,
            },
            ..Config::default()
        };
        assert!(bad_retry.validate().is_err());
    }

    #[test]
    fn test_peer_addr_forms() {
        assert_eq!(
            PeerAddr::parse("tcp://node-b:7381").unwrap(),
            PeerAddr::Tcp("node-b:7381".into())
        );
        assert_eq!(PeerAddr::parse("node-b:7381").unwrap().to_string(), "tcp://node-b:7381");
        assert!(PeerAddr::parse("node-b").is_err());
        assert!(PeerAddr::parse("tcp://node-b:port").is_err());
        assert!(PeerAddr::parse(":7381").is_err());
    }
}
