//! TCP peer links
//!
//! Frames travel length-prefixed over a plain TCP stream.

use crate::error::{TransportError, TransportResult};
use crate::link::{Accepted, BoxTransport, Connector, Transport};
use crate::session::{SessionConfig, SessionRegistry, SyncSession};
use async_trait::async_trait;
use bytes::BytesMut;
use memsync_core::Store;
use memsync_protocol::{Frame, FrameCodec};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Frame link over a TCP stream
pub struct TcpTransport {
    stream: TcpStream,
    codec: FrameCodec,
    write_buf: BytesMut,
    label: String,
}

impl TcpTransport {
    pub fn new(stream: TcpStream, label: impl Into<String>) -> Self {
        Self {
            stream,
            codec: FrameCodec::new(),
            write_buf: BytesMut::with_capacity(4096),
            label: label.into(),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, frame: &Frame) -> TransportResult<()> {
        self.write_buf.clear();
        self.codec.encode_into(frame, &mut self.write_buf)?;
        self.stream.write_all(&self.write_buf).await?;
        debug!(peer = %self.label, frame = frame.name(), bytes = self.write_buf.len(), "Sent frame");
        Ok(())
    }

    async fn recv(&mut self) -> TransportResult<Option<Frame>> {
        loop {
            if let Some(frame) = self.codec.decode()? {
                return Ok(Some(frame));
            }

            let n = self.stream.read_buf(self.codec.buffer_mut()).await?;
            if n == 0 {
                if self.codec.buffered() == 0 {
                    return Ok(None);
                }
                // EOF in the middle of a frame
                return Err(TransportError::Closed);
            }
        }
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

/// Dials a peer's TCP sync port
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    /// `addr` is `host:port`, optionally prefixed with `tcp://`
    pub fn new(addr: impl Into<String>) -> TransportResult<Self> {
        let addr = addr.into();
        let addr = addr.strip_prefix("tcp://").unwrap_or(&addr).to_string();
        if addr.is_empty() || !addr.contains(':') {
            return Err(TransportError::InvalidAddress(addr));
        }
        Ok(Self { addr })
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> TransportResult<BoxTransport> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(TcpTransport::new(stream, self.describe())))
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

/// Accepts peer links on the TCP sync port
pub struct PeerServer {
    store: Arc<Store>,
    registry: Arc<SessionRegistry>,
    config: SessionConfig,
}

impl PeerServer {
    pub fn new(store: Arc<Store>, registry: Arc<SessionRegistry>, config: SessionConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Bind `addr` and serve until the task is dropped
    pub async fn run(&self, addr: SocketAddr) -> TransportResult<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %addr, "memsync peer server listening");
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> TransportResult<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %peer_addr, error = %e, "Could not disable Nagle");
                    }
                    info!(peer = %peer_addr, "Peer connected");

                    let link = TcpTransport::new(stream, format!("tcp://{}", peer_addr));
                    let handle = SyncSession::spawn(
                        self.store.clone(),
                        Accepted::new(link),
                        self.config.clone(),
                    );
                    self.registry.adopt(handle);
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept peer connection");
                }
            }
        }
    }
}
