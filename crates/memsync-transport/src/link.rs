//! Link abstractions shared by every transport

use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use memsync_protocol::Frame;
use parking_lot::Mutex;

/// A bidirectional frame link to one peer
///
/// `recv` must be cancellation safe: sessions poll it inside `select!`
/// alongside timers and the store's change feed.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: &Frame) -> TransportResult<()>;

    /// Next frame, or `None` once the peer closed the link
    async fn recv(&mut self) -> TransportResult<Option<Frame>>;

    /// Human-readable description of the remote end
    fn label(&self) -> String;
}

pub type BoxTransport = Box<dyn Transport>;

/// Something that can (re)establish a link to a peer
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> TransportResult<BoxTransport>;

    fn describe(&self) -> String;

    /// Whether a failed link can be replaced by dialing again
    fn redialable(&self) -> bool {
        true
    }
}

/// Connector wrapping a link that a listener already accepted
///
/// It hands out its link once; an accepted session cannot redial.
pub struct Accepted {
    link: Mutex<Option<BoxTransport>>,
    label: String,
}

impl Accepted {
    pub fn new(link: impl Transport + 'static) -> Self {
        let label = link.label();
        Self {
            link: Mutex::new(Some(Box::new(link))),
            label,
        }
    }
}

#[async_trait]
impl Connector for Accepted {
    async fn connect(&self) -> TransportResult<BoxTransport> {
        self.link.lock().take().ok_or(TransportError::Closed)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }

    fn redialable(&self) -> bool {
        false
    }
}
