//! WebSocket peer links
//!
//! Each binary message carries one frame body. This is the link used by
//! browser-hosted replicas.

use crate::error::{TransportError, TransportResult};
use crate::link::{Accepted, BoxTransport, Connector, Transport};
use crate::session::{SessionConfig, SessionRegistry, SyncSession};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use memsync_core::Store;
use memsync_protocol::Frame;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, connect_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info};

/// Frame link over a WebSocket
pub struct WsTransport<S> {
    stream: WebSocketStream<S>,
    label: String,
}

impl<S> WsTransport<S> {
    pub fn new(stream: WebSocketStream<S>, label: impl Into<String>) -> Self {
        Self {
            stream,
            label: label.into(),
        }
    }
}

#[async_trait]
impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frame: &Frame) -> TransportResult<()> {
        let body = frame.to_bytes()?;
        debug!(peer = %self.label, frame = frame.name(), bytes = body.len(), "Sent frame");
        self.stream.send(Message::Binary(body)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> TransportResult<Option<Frame>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(Frame::from_slice(&data)?)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(Message::Text(_))) => return Err(TransportError::UnexpectedFrame("text")),
                // Pings are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

/// Dials a peer's WebSocket sync endpoint
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> TransportResult<Self> {
        let url = url.into();
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(TransportError::InvalidAddress(url));
        }
        Ok(Self { url })
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> TransportResult<BoxTransport> {
        let (stream, _) = connect_async(self.url.as_str()).await?;
        Ok(Box::new(WsTransport::new(stream, self.url.clone())))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Accepts peer links over WebSocket
pub struct WebSocketServer {
    store: Arc<Store>,
    registry: Arc<SessionRegistry>,
    config: SessionConfig,
}

impl WebSocketServer {
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
        info!(addr = %addr, "memsync WebSocket server listening");
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> TransportResult<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let store = self.store.clone();
                    let registry = self.registry.clone();
                    let config = self.config.clone();

                    // The upgrade handshake must not stall the accept loop
                    tokio::spawn(async move {
                        if let Err(e) =
                            Self::handle_connection(stream, peer_addr, store, registry, config).await
                        {
                            error!(peer = %peer_addr, error = %e, "WebSocket upgrade failed");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        peer_addr: SocketAddr,
        store: Arc<Store>,
        registry: Arc<SessionRegistry>,
        config: SessionConfig,
    ) -> TransportResult<()> {
        let ws_stream = accept_async(stream).await?;
        info!(peer = %peer_addr, "WebSocket peer connected");

        let link = WsTransport::new(ws_stream, format!("ws://{}", peer_addr));
        let handle = SyncSession::spawn(store, Accepted::new(link), config);
        registry.adopt(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memsync_core::ReplicaId;

    #[test]
    fn test_connector_requires_ws_scheme() {
        assert!(WsConnector::new("ws://127.0.0.1:7401").is_ok());
        assert!(WsConnector::new("http://127.0.0.1:7401").is_err());
    }

    #[tokio::test]
    async fn test_frames_cross_websocket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            let mut link = WsTransport::new(ws, "server");
            let frame = link.recv().await.unwrap().unwrap();
            link.send(&frame).await.unwrap();
        });

        let connector = WsConnector::new(format!("ws://{}", addr)).unwrap();
        let mut link = connector.connect().await.unwrap();
        let hello = Frame::hello(ReplicaId::from_u128(9));
        link.send(&hello).await.unwrap();
        assert_eq!(link.recv().await.unwrap(), Some(hello));

        server.await.unwrap();
    }
}
