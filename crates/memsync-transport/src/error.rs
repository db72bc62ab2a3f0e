//! Transport and session error types

use memsync_protocol::ProtocolError;
use thiserror::Error;

/// Failure of a single link
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[cfg(feature = "websocket")]
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Connection closed by peer")]
    Closed,

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Unexpected {0} frame")]
    UnexpectedFrame(&'static str),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Terminal outcome of a sync session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Peer {peer} unreachable after {attempts} attempts: {last_error}")]
    PeerUnreachable {
        peer: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Session task aborted: {0}")]
    Aborted(String),
}

pub type TransportResult<T> = Result<T, TransportError>;
