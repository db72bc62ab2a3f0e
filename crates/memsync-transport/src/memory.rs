//! In-process links over tokio channels

use crate::error::{TransportError, TransportResult};
use crate::link::{BoxTransport, Connector, Transport};
use async_trait::async_trait;
use memsync_protocol::Frame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Frames buffered per direction before `send` waits
const CHANNEL_CAPACITY: usize = 64;

/// One end of an in-memory link
pub struct ChannelTransport {
    tx: mpsc::Sender<Frame>,
    rx: mpsc::Receiver<Frame>,
    label: String,
}

impl ChannelTransport {
    /// Two connected ends; dropping one closes the other
    pub fn pair(label: impl Into<String>) -> (Self, Self) {
        let label = label.into();
        let (a_tx, b_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (b_tx, a_rx) = mpsc::channel(CHANNEL_CAPACITY);

        (
            Self {
                tx: a_tx,
                rx: a_rx,
                label: format!("{}#dialer", label),
            },
            Self {
                tx: b_tx,
                rx: b_rx,
                label: format!("{}#listener", label),
            },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, frame: &Frame) -> TransportResult<()> {
        self.tx
            .send(frame.clone())
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> TransportResult<Option<Frame>> {
        Ok(self.rx.recv().await)
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

/// Accepting side of an in-memory endpoint
pub struct MemoryListener {
    incoming: mpsc::Receiver<ChannelTransport>,
}

impl MemoryListener {
    /// Create an endpoint and a connector that dials it
    pub fn bind(name: impl Into<String>) -> (Self, MemoryConnector) {
        let (tx, incoming) = mpsc::channel(CHANNEL_CAPACITY);
        let connector = MemoryConnector {
            name: name.into(),
            listener: tx,
            dials: Arc::new(AtomicU64::new(0)),
        };
        (Self { incoming }, connector)
    }

    /// Wait for the next inbound link; `None` once every connector is gone
    pub async fn accept(&mut self) -> Option<ChannelTransport> {
        self.incoming.recv().await
    }
}

/// Dials a [`MemoryListener`]
#[derive(Clone)]
pub struct MemoryConnector {
    name: String,
    listener: mpsc::Sender<ChannelTransport>,
    dials: Arc<AtomicU64>,
}

impl MemoryConnector {
    /// Number of connection attempts so far, failed ones included
    pub fn dials(&self) -> u64 {
        self.dials.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> TransportResult<BoxTransport> {
        let n = self.dials.fetch_add(1, Ordering::Relaxed);
        let (local, remote) = ChannelTransport::pair(format!("mem://{}/{}", self.name, n));

        self.listener.send(remote).await.map_err(|_| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("memory endpoint {} is gone", self.name),
            ))
        })?;

        Ok(Box::new(local))
    }

    fn describe(&self) -> String {
        format!("mem://{}", self.name)
    }
}
