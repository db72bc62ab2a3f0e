//! Prometheus metrics for memsync
//!
//! Gauges are refreshed from the store and the session registry on every
//! scrape, so nothing on the write path touches the registry.

use crate::error::{TransportError, TransportResult};
use crate::session::{SessionRegistry, SessionState};
use memsync_core::Store;
use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{error, info};

const SESSION_STATES: [(SessionState, &str); 5] = [
    (SessionState::Idle, "idle"),
    (SessionState::Connecting, "connecting"),
    (SessionState::Syncing, "syncing"),
    (SessionState::Failed, "failed"),
    (SessionState::Closed, "closed"),
];

/// memsync metrics collector
pub struct Metrics {
    registry: Registry,
    store: Arc<Store>,
    sessions: Arc<SessionRegistry>,

    // Store metrics
    pub live_entries: IntGauge,
    pub tombstones: IntGauge,
    pub payload_bytes: IntGauge,
    pub clock: IntGauge,
    pub known_peers: IntGauge,

    // Session metrics
    pub sessions_by_state: IntGaugeVec,
    pub rounds: IntGauge,
    pub retries: IntGauge,
    pub entries_sent: IntGauge,
    pub entries_applied: IntGauge,
    pub entries_rejected: IntGauge,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntGauge> {
    let gauge = IntGauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl Metrics {
    /// Create a collector bound to one replica
    pub fn new(store: Arc<Store>, sessions: Arc<SessionRegistry>) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let sessions_by_state = IntGaugeVec::new(
            Opts::new("memsync_sessions", "Sync sessions by state"),
            &["state"],
        )?;
        registry.register(Box::new(sessions_by_state.clone()))?;

        Ok(Self {
            live_entries: gauge(&registry, "memsync_live_entries", "Keys holding a live value")?,
            tombstones: gauge(&registry, "memsync_tombstones", "Keys holding a tombstone")?,
            payload_bytes: gauge(&registry, "memsync_payload_bytes", "Bytes held in live payloads")?,
            clock: gauge(&registry, "memsync_clock", "Current version clock counter")?,
            known_peers: gauge(&registry, "memsync_known_peers", "Peers with a stored cursor")?,
            rounds: gauge(&registry, "memsync_sync_rounds", "Delta rounds sent by current sessions")?,
            retries: gauge(&registry, "memsync_session_retries", "Reconnect attempts by current sessions")?,
            entries_sent: gauge(&registry, "memsync_entries_sent", "Delta entries sent")?,
            entries_applied: gauge(&registry, "memsync_entries_applied", "Remote entries applied")?,
            entries_rejected: gauge(&registry, "memsync_entries_rejected", "Remote entries rejected as malformed")?,
            sessions_by_state,
            registry,
            store,
            sessions,
        })
    }

    /// Pull current values from the store and sessions
    pub fn refresh(&self) {
        let stats = self.store.stats();
        self.live_entries.set(stats.live_entries as i64);
        self.tombstones.set(stats.tombstones as i64);
        self.payload_bytes.set(stats.payload_bytes as i64);
        self.clock.set(stats.clock as i64);
        self.known_peers.set(stats.known_peers as i64);

        for (state, label) in SESSION_STATES {
            self.sessions_by_state
                .with_label_values(&[label])
                .set(self.sessions.count_in(state) as i64);
        }

        let totals = self.sessions.total_stats();
        self.rounds.set(totals.rounds as i64);
        self.retries.set(totals.retries as i64);
        self.entries_sent.set(totals.entries_sent as i64);
        self.entries_applied.set(totals.entries_applied as i64);
        self.entries_rejected.set(totals.entries_rejected as i64);
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> TransportResult<String> {
        self.refresh();

        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| TransportError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// HTTP server for metrics endpoint
pub struct MetricsServer {
    metrics: Arc<Metrics>,
    addr: SocketAddr,
}

impl MetricsServer {
    pub fn new(metrics: Arc<Metrics>, addr: SocketAddr) -> Self {
        Self { metrics, addr }
    }

    /// Run the metrics HTTP server
    pub async fn run(&self) -> TransportResult<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "Metrics server listening on http://{}/metrics", self.addr);

        loop {
            match listener.accept().await {
                Ok((mut stream, _)) => {
                    let metrics = self.metrics.clone();

                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let n = match stream.read(&mut buf).await {
                            Ok(n) if n > 0 => n,
                            _ => return,
                        };
                        let request = String::from_utf8_lossy(&buf[..n]);
                        let response = respond(&metrics, &request);
                        let _ = stream.write_all(response.as_bytes()).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept metrics connection");
                }
            }
        }
    }
}

/// Minimal HTTP routing for `/metrics` and `/health`
fn respond(metrics: &Metrics, request: &str) -> String {
    if request.starts_with("GET /metrics") || request.starts_with("GET / ") {
        match metrics.export() {
            Ok(body) => format!(
                "HTTP/1.1 200 OK\r\n\
                 Content-Type: text/plain; version=0.0.4; charset=utf-8\r\n\
                 Content-Length: {}\r\n\
                 \r\n\
                 {}",
                body.len(),
                body
            ),
            Err(e) => {
                error!(error = %e, "Failed to export metrics");
                "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n".to_string()
            }
        }
    } else if request.starts_with("GET /health") {
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK".to_string()
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_export_reflects_store() {
        let store = Arc::new(Store::new());
        store.insert("a", "12345").await.unwrap();
        store.insert("b", "x").await.unwrap();
        store.delete("b").await.unwrap();

        let metrics = Metrics::new(store, Arc::new(SessionRegistry::new())).unwrap();
        let text = metrics.export().unwrap();

        assert!(text.contains("memsync_live_entries 1"));
        assert!(text.contains("memsync_tombstones 1"));
        assert!(text.contains("memsync_clock 3"));
        assert!(text.contains("memsync_sessions{state=\"idle\"} 0"));
    }

    #[test]
    fn test_routing() {
        let metrics = Metrics::new(Arc::new(Store::new()), Arc::new(SessionRegistry::new())).unwrap();
        assert!(respond(&metrics, "GET /health HTTP/1.1\r\n").ends_with("OK"));
        assert!(respond(&metrics, "GET /metrics HTTP/1.1\r\n").starts_with("HTTP/1.1 200"));
        assert!(respond(&metrics, "POST /x HTTP/1.1\r\n").starts_with("HTTP/1.1 404"));
    }
}
