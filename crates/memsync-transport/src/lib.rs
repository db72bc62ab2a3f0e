//! memsync Transport Layer
//!
//! Keeps replicas converged over the network:
//! - Links: in-memory, TCP and WebSocket frame transports
//! - Sessions: the per-peer sync state machine with reconnect backoff
//! - Command server: the operator text protocol over TCP
//! - Metrics: Prometheus metrics (optional feature)

pub mod error;
pub mod handler;
pub mod link;
pub mod memory;
#[cfg(feature = "metrics")]
pub mod metrics;
#[cfg(feature = "tcp")]
pub mod peer;
pub mod retry;
pub mod session;
#[cfg(feature = "tcp")]
pub mod tcp;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use error::{SessionError, TransportError, TransportResult};
pub use handler::CommandHandler;
pub use link::{Accepted, BoxTransport, Connector, Transport};
pub use memory::{ChannelTransport, MemoryConnector, MemoryListener};
#[cfg(feature = "metrics")]
pub use metrics::{Metrics, MetricsServer};
#[cfg(feature = "tcp")]
pub use peer::{PeerServer, TcpConnector, TcpTransport};
pub use retry::RetryPolicy;
pub use session::{
    ConnectPeer, SessionConfig, SessionMonitor, SessionRegistry, SessionState, SessionSummary,
    StatsSnapshot, SyncSession, SyncSessionHandle,
};
#[cfg(feature = "tcp")]
pub use tcp::TcpServer;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketServer, WsConnector, WsTransport};
