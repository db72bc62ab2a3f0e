//! Sync sessions - keep one peer converged with the local store
//!
//! A session owns one link at a time. It says `Hello`, then exchanges
//! `Delta`/`Ack` rounds until either side says `Bye` or the link fails.
//! Failed links are redialed with exponential backoff.
//!
//! ```text
//! Idle -> Connecting -> Syncing -> Idle      clean round
//!                    \-> Failed  -> Connecting (retry) ... -> Failed (gave up)
//! any state -> Closed                         close() or peer Bye
//! ```

use crate::error::{SessionError, TransportError, TransportResult};
use crate::link::{Connector, Transport};
use crate::retry::RetryPolicy;
use dashmap::DashMap;
use memsync_core::{ChangeOrigin, Delta, KeyPath, PeerExchange, ReplicaId, Store};
use memsync_protocol::{Frame, PROTOCOL_VERSION};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Period of the anti-entropy timer
    pub sync_interval: Duration,
    /// How long an outgoing delta may wait for its ack
    pub round_timeout: Duration,
    /// Bound on dialing plus the `Hello` exchange
    pub handshake_timeout: Duration,
    /// Every n-th timer tick sends the full state (0 disables)
    pub full_sync_every: u64,
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(1),
            round_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            full_sync_every: 30,
            retry: RetryPolicy::default(),
        }
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Syncing,
    Failed,
    Closed,
}

/// Counters kept by a running session
#[derive(Debug, Default)]
pub struct SessionStats {
    connects: AtomicU64,
    retries: AtomicU64,
    rounds: AtomicU64,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    entries_sent: AtomicU64,
    entries_applied: AtomicU64,
    entries_superseded: AtomicU64,
    entries_rejected: AtomicU64,
}

impl SessionStats {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            connects: load(&self.connects),
            retries: load(&self.retries),
            rounds: load(&self.rounds),
            frames_sent: load(&self.frames_sent),
            frames_received: load(&self.frames_received),
            entries_sent: load(&self.entries_sent),
            entries_applied: load(&self.entries_applied),
            entries_superseded: load(&self.entries_superseded),
            entries_rejected: load(&self.entries_rejected),
        }
    }
}

/// Point-in-time copy of [`SessionStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub connects: u64,
    pub retries: u64,
    pub rounds: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub entries_sent: u64,
    pub entries_applied: u64,
    pub entries_superseded: u64,
    pub entries_rejected: u64,
}

enum Control {
    SyncNow,
    SyncScope(KeyPath),
    Close,
}

/// State shared between a session task and its handles
struct Shared {
    label: String,
    state: watch::Sender<SessionState>,
    peer: Mutex<Option<ReplicaId>>,
    last_error: Mutex<Option<String>>,
    stats: SessionStats,
}

/// Cheap, clonable view of a running session
#[derive(Clone)]
pub struct SessionMonitor {
    shared: Arc<Shared>,
    control: mpsc::Sender<Control>,
}

impl SessionMonitor {
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Replica ID of the peer, once a handshake succeeded
    pub fn peer_id(&self) -> Option<ReplicaId> {
        *self.shared.peer.lock()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Ask for a sync round as soon as possible
    ///
    /// Returns false if the session has already ended.
    pub fn sync_now(&self) -> bool {
        match self.control.try_send(Control::SyncNow) {
            Ok(()) => true,
            // A queued request already covers this one
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Exchange everything under `scope` with the peer, in both directions
    ///
    /// Returns false if the request could not be queued. Requests arriving
    /// while the session is reconnecting are dropped.
    pub fn sync_scope(&self, scope: KeyPath) -> bool {
        self.control.try_send(Control::SyncScope(scope)).is_ok()
    }

    /// Request an orderly shutdown without waiting for it
    pub fn request_close(&self) {
        let _ = self.control.try_send(Control::Close);
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Wait until the session reaches `target`
    pub async fn wait_for_state(&self, target: SessionState) {
        let mut rx = self.subscribe_state();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|state| *state == target).await;
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            label: self.label().to_string(),
            peer: self.peer_id(),
            state: self.state(),
            last_error: self.last_error(),
            stats: self.stats(),
        }
    }
}

/// Serializable description of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub label: String,
    pub peer: Option<ReplicaId>,
    pub state: SessionState,
    pub last_error: Option<String>,
    pub stats: StatsSnapshot,
}

/// Owning handle of a spawned session
pub struct SyncSessionHandle {
    monitor: SessionMonitor,
    task: JoinHandle<Result<(), SessionError>>,
}

impl SyncSessionHandle {
    pub fn monitor(&self) -> SessionMonitor {
        self.monitor.clone()
    }

    /// Close the session, sending `Bye` if a link is up
    pub async fn close(self) -> Result<(), SessionError> {
        let _ = self.monitor.control.send(Control::Close).await;
        self.join().await
    }

    /// Wait for the session to end on its own
    pub async fn join(self) -> Result<(), SessionError> {
        self.task
            .await
            .map_err(|e| SessionError::Aborted(e.to_string()))?
    }
}

impl std::ops::Deref for SyncSessionHandle {
    type Target = SessionMonitor;

    fn deref(&self) -> &SessionMonitor {
        &self.monitor
    }
}

/// Why a link stopped
enum LinkEnd {
    /// `Bye` sent or received; the session is over
    Closed,
}

/// A sync session task
pub struct SyncSession {
    store: Arc<Store>,
    connector: Arc<dyn Connector>,
    config: SessionConfig,
    shared: Arc<Shared>,
    control: mpsc::Receiver<Control>,
    exchange: Option<PeerExchange>,
    ticks: u64,
}

impl SyncSession {
    /// Start a session on the current tokio runtime
    pub fn spawn(
        store: Arc<Store>,
        connector: impl Connector + 'static,
        config: SessionConfig,
    ) -> SyncSessionHandle {
        Self::spawn_shared(store, Arc::new(connector), config)
    }

    pub fn spawn_shared(
        store: Arc<Store>,
        connector: Arc<dyn Connector>,
        config: SessionConfig,
    ) -> SyncSessionHandle {
        let (state, _) = watch::channel(SessionState::Idle);
        let (control_tx, control_rx) = mpsc::channel(16);

        let shared = Arc::new(Shared {
            label: connector.describe(),
            state,
            peer: Mutex::new(None),
            last_error: Mutex::new(None),
            stats: SessionStats::default(),
        });

        let session = SyncSession {
            store,
            connector,
            config,
            shared: shared.clone(),
            control: control_rx,
            exchange: None,
            ticks: 0,
        };

        let task = tokio::spawn(session.run());

        SyncSessionHandle {
            monitor: SessionMonitor {
                shared,
                control: control_tx,
            },
            task,
        }
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.shared.state.send_replace(next);
        if previous != next {
            debug!(peer = %self.shared.label, from = ?previous, state = ?next, "Session state changed");
        }
    }

    async fn run(mut self) -> Result<(), SessionError> {
        let mut retries = 0u32;

        loop {
            self.set_state(SessionState::Connecting);

            let mut established = false;
            let error = match self.connect_and_sync(&mut established).await {
                Ok(LinkEnd::Closed) => {
                    info!(peer = %self.shared.label, "Session closed");
                    self.set_state(SessionState::Closed);
                    return Ok(());
                }
                Err(e) => e,
            };

            if established {
                retries = 0;
            }

            let last_error = error.to_string();
            *self.shared.last_error.lock() = Some(last_error.clone());
            self.set_state(SessionState::Failed);

            if !self.connector.redialable() || !self.config.retry.allows(retries) {
                error!(
                    peer = %self.shared.label,
                    attempts = retries + 1,
                    error = %last_error,
                    "Peer unreachable, giving up"
                );
                return Err(SessionError::PeerUnreachable {
                    peer: self.shared.label.clone(),
                    attempts: retries + 1,
                    last_error,
                });
            }

            let delay = self.config.retry.delay_for(retries);
            retries += 1;
            SessionStats::bump(&self.shared.stats.retries, 1);
            warn!(
                peer = %self.shared.label,
                error = %last_error,
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                "Link failed, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                control = self.control.recv() => match control {
                    Some(Control::SyncNow | Control::SyncScope(_)) => {}
                    Some(Control::Close) | None => {
                        info!(peer = %self.shared.label, "Session closed while waiting to retry");
                        self.set_state(SessionState::Closed);
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn connect_and_sync(&mut self, established: &mut bool) -> TransportResult<LinkEnd> {
        let mut link = tokio::time::timeout(self.config.handshake_timeout, self.connector.connect())
            .await
            .map_err(|_| TransportError::Timeout("connect"))??;

        let peer = match self.handshake(link.as_mut()).await? {
            Some(peer) => peer,
            None => return Ok(LinkEnd::Closed),
        };
        *established = true;
        *self.shared.peer.lock() = Some(peer);
        SessionStats::bump(&self.shared.stats.connects, 1);
        info!(peer = %self.shared.label, replica = %peer, link = %link.label(), "Peer link established");

        self.exchange = Some(match self.exchange.take() {
            Some(exchange) if exchange.peer() == peer => exchange,
            Some(previous) => {
                PeerExchange::new(self.store.clone(), peer).with_pending(previous.into_pending())
            }
            None => PeerExchange::new(self.store.clone(), peer),
        });

        self.set_state(SessionState::Idle);
        self.drive(link.as_mut(), peer).await
    }

    /// Exchange `Hello` frames; `None` means the session was closed meanwhile
    async fn handshake(&mut self, link: &mut dyn Transport) -> TransportResult<Option<ReplicaId>> {
        self.send(link, &Frame::hello(self.store.replica_id())).await?;

        let deadline = Instant::now() + self.config.handshake_timeout;
        let reply = loop {
            tokio::select! {
                reply = link.recv() => break reply?,
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(TransportError::Timeout("hello"));
                }
                control = self.control.recv() => match control {
                    Some(Control::SyncNow | Control::SyncScope(_)) => continue,
                    Some(Control::Close) | None => {
                        let _ = self.send(link, &Frame::Bye).await;
                        return Ok(None);
                    }
                },
            }
        };
        SessionStats::bump(&self.shared.stats.frames_received, 1);

        match reply {
            Some(Frame::Hello {
                replica_id,
                protocol,
            }) => {
                if protocol != PROTOCOL_VERSION {
                    let _ = self.send(link, &Frame::Bye).await;
                    return Err(TransportError::Handshake(format!(
                        "protocol version {} not supported (expected {})",
                        protocol, PROTOCOL_VERSION
                    )));
                }
                if replica_id == self.store.replica_id() {
                    let _ = self.send(link, &Frame::Bye).await;
                    return Err(TransportError::Handshake("connected to self".into()));
                }
                Ok(Some(replica_id))
            }
            Some(Frame::Bye) => {
                info!(peer = %self.shared.label, "Peer said bye during handshake");
                Ok(None)
            }
            Some(other) => Err(TransportError::UnexpectedFrame(other.name())),
            None => Err(TransportError::Closed),
        }
    }

    async fn drive(&mut self, link: &mut dyn Transport, peer: ReplicaId) -> TransportResult<LinkEnd> {
        let mut changes = self.store.subscribe();
        let mut ticker = tokio::time::interval(self.config.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        // Link establishment starts a round
        let mut round_wanted = true;
        let mut full_wanted = false;
        let mut awaiting: Option<(u64, Instant)> = None;
        let mut scopes: VecDeque<KeyPath> = VecDeque::new();

        loop {
            if awaiting.is_none() {
                if let Some(scope) = scopes.pop_front() {
                    awaiting = self.start_scoped_round(link, &scope).await?;
                } else if round_wanted {
                    round_wanted = false;
                    awaiting = self.start_round(link, std::mem::take(&mut full_wanted)).await?;
                }
            }

            let ack_deadline = awaiting
                .map(|(_, deadline)| deadline)
                .unwrap_or_else(|| Instant::now() + self.config.round_timeout);

            tokio::select! {
                frame = link.recv() => {
                    let frame = frame?.ok_or(TransportError::Closed)?;
                    SessionStats::bump(&self.shared.stats.frames_received, 1);

                    match frame {
                        Frame::Delta { seq, delta } => {
                            self.receive_batch(link, seq, &delta, false).await?;
                            if awaiting.is_none() {
                                self.set_state(SessionState::Idle);
                            }
                            round_wanted = true;
                        }
                        Frame::Scoped { seq, delta } => {
                            self.receive_batch(link, seq, &delta, true).await?;
                            if awaiting.is_none() {
                                self.set_state(SessionState::Idle);
                            }
                        }
                        Frame::Pull { scope } => match KeyPath::parse(&scope) {
                            Ok(scope) => {
                                debug!(peer = %self.shared.label, scope = %scope, "Peer pulled a scope");
                                scopes.push_back(scope);
                            }
                            Err(e) => warn!(peer = %self.shared.label, error = %e, "Ignoring pull with a bad scope"),
                        },
                        Frame::Ack { seq, applied, superseded, rejected } => {
                            match awaiting {
                                Some((expected, _)) if expected == seq => {
                                    if let Some(exchange) = self.exchange.as_mut() {
                                        exchange.acknowledge(seq);
                                    }
                                    awaiting = None;
                                    debug!(peer = %self.shared.label, seq, applied, superseded, rejected, "Round acknowledged");
                                    self.set_state(SessionState::Idle);
                                }
                                _ => warn!(peer = %self.shared.label, seq, "Ignoring unexpected ack"),
                            }
                        }
                        Frame::Ping => self.send(link, &Frame::Pong).await?,
                        Frame::Pong => {}
                        Frame::Bye => {
                            info!(peer = %self.shared.label, "Peer said bye");
                            return Ok(LinkEnd::Closed);
                        }
                        Frame::Hello { .. } => {
                            warn!(peer = %self.shared.label, "Ignoring repeated hello");
                        }
                    }
                }

                change = changes.recv() => match change {
                    // Writes merged from this peer's own deltas are already covered
                    Ok(change) if change.origin == ChangeOrigin::Peer(peer) => {}
                    Ok(_) => round_wanted = true,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!(peer = %self.shared.label, missed, "Change feed lagged");
                        round_wanted = true;
                    }
                    Err(broadcast::error::RecvError::Closed) => {}
                },

                _ = ticker.tick() => {
                    self.ticks += 1;
                    let every = self.config.full_sync_every;
                    if every > 0 && self.ticks % every == 0 {
                        full_wanted = true;
                    }
                    round_wanted = true;
                }

                control = self.control.recv() => match control {
                    Some(Control::SyncNow) => round_wanted = true,
                    Some(Control::SyncScope(scope)) => {
                        self.send(link, &Frame::Pull { scope: scope.to_bytes() }).await?;
                        scopes.push_back(scope);
                    }
                    Some(Control::Close) | None => {
                        let _ = self.send(link, &Frame::Bye).await;
                        self.linger(link).await;
                        return Ok(LinkEnd::Closed);
                    }
                },

                _ = tokio::time::sleep_until(ack_deadline), if awaiting.is_some() => {
                    return Err(TransportError::Timeout("ack"));
                }
            }
        }
    }

    /// Send the next outgoing delta, returning what to wait for
    ///
    /// With nothing to send, a `Ping` keeps the link checked instead.
    async fn start_round(
        &mut self,
        link: &mut dyn Transport,
        full: bool,
    ) -> TransportResult<Option<(u64, Instant)>> {
        let exchange = match self.exchange.as_mut() {
            Some(exchange) => exchange,
            None => return Ok(None),
        };

        let (seq, delta) = exchange.compute_outgoing_delta(full);
        if delta.is_empty() {
            exchange.acknowledge(seq);
            self.send(link, &Frame::Ping).await?;
            return Ok(None);
        }

        self.set_state(SessionState::Syncing);
        let entries = delta.len() as u64;
        SessionStats::bump(&self.shared.stats.rounds, 1);
        SessionStats::bump(&self.shared.stats.entries_sent, entries);
        debug!(peer = %self.shared.label, seq, entries, full, "Sending delta");

        self.send(link, &Frame::Delta { seq, delta }).await?;
        Ok(Some((seq, Instant::now() + self.config.round_timeout)))
    }

    /// Send everything under `scope`; an empty batch needs no round trip
    async fn start_scoped_round(
        &mut self,
        link: &mut dyn Transport,
        scope: &KeyPath,
    ) -> TransportResult<Option<(u64, Instant)>> {
        let exchange = match self.exchange.as_mut() {
            Some(exchange) => exchange,
            None => return Ok(None),
        };

        let (seq, delta) = exchange.compute_scoped_delta(scope);
        if delta.is_empty() {
            exchange.acknowledge(seq);
            return Ok(None);
        }

        self.set_state(SessionState::Syncing);
        let entries = delta.len() as u64;
        SessionStats::bump(&self.shared.stats.rounds, 1);
        SessionStats::bump(&self.shared.stats.entries_sent, entries);
        debug!(peer = %self.shared.label, seq, entries, scope = %scope, "Sending scoped delta");

        self.send(link, &Frame::Scoped { seq, delta }).await?;
        Ok(Some((seq, Instant::now() + self.config.round_timeout)))
    }

    /// Merge a batch from the peer and acknowledge it
    ///
    /// Scoped batches leave the peer's cursor alone.
    async fn receive_batch(
        &mut self,
        link: &mut dyn Transport,
        seq: u64,
        delta: &Delta,
        scoped: bool,
    ) -> TransportResult<()> {
        self.set_state(SessionState::Syncing);
        let report = match self.exchange.as_mut() {
            Some(exchange) if scoped => exchange.apply_partial_delta(delta),
            Some(exchange) => exchange.apply_incoming_delta(delta),
            None => return Err(TransportError::UnexpectedFrame("delta")),
        };

        let stats = &self.shared.stats;
        SessionStats::bump(&stats.entries_applied, report.applied as u64);
        SessionStats::bump(&stats.entries_superseded, report.superseded as u64);
        SessionStats::bump(&stats.entries_rejected, report.rejected.len() as u64);
        if !report.is_clean() {
            warn!(peer = %self.shared.label, seq, rejected = report.rejected.len(), "Peer sent malformed entries");
        }

        self.send(link, &Frame::ack(seq, &report)).await
    }

    /// After our `Bye`, drain the link until the peer drops it
    ///
    /// Keeps our end open so frames the peer sent before seeing `Bye` do
    /// not fail on its side.
    async fn linger(&self, link: &mut dyn Transport) {
        let drain = async {
            while let Ok(Some(frame)) = link.recv().await {
                if frame == Frame::Bye {
                    break;
                }
            }
        };
        let _ = tokio::time::timeout(self.config.handshake_timeout, drain).await;
    }

    async fn send(&self, link: &mut dyn Transport, frame: &Frame) -> TransportResult<()> {
        link.send(frame).await?;
        SessionStats::bump(&self.shared.stats.frames_sent, 1);
        Ok(())
    }
}

/// Start sync sessions straight from a shared store
pub trait ConnectPeer {
    fn connect_peer<C: Connector + 'static>(
        &self,
        connector: C,
        config: SessionConfig,
    ) -> SyncSessionHandle;
}

impl ConnectPeer for Arc<Store> {
    fn connect_peer<C: Connector + 'static>(
        &self,
        connector: C,
        config: SessionConfig,
    ) -> SyncSessionHandle {
        SyncSession::spawn(self.clone(), connector, config)
    }
}

/// Sessions known to a node, dialed and accepted alike
///
/// Adopted sessions leave the registry as soon as their task ends.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<u64, SessionMonitor>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, monitor: SessionMonitor) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions.insert(id, monitor);
        id
    }

    /// Register a session until it ends, then log its outcome and drop it
    pub fn adopt(&self, handle: SyncSessionHandle) -> u64 {
        let id = self.register(handle.monitor());
        let label = handle.label().to_string();
        let sessions = self.sessions.clone();

        tokio::spawn(async move {
            match handle.join().await {
                Ok(()) => debug!(session = id, peer = %label, "Session ended"),
                Err(e) => warn!(session = id, peer = %label, error = %e, "Session ended with error"),
            }
            sessions.remove(&id);
        });

        id
    }

    pub fn remove(&self, id: u64) -> Option<SessionMonitor> {
        self.sessions.remove(&id).map(|(_, monitor)| monitor)
    }

    /// Trigger a round on every live session, returning how many accepted
    pub fn sync_all(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().sync_now())
            .count()
    }

    /// Queue a scoped round on every live session, returning how many accepted
    pub fn sync_scope_all(&self, scope: &KeyPath) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().sync_scope(scope.clone()))
            .count()
    }

    pub fn close_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().request_close();
        }
    }

    /// Summaries ordered by registration
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<(u64, SessionSummary)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().summary()))
            .collect();
        sessions.sort_by_key(|(id, _)| *id);
        sessions.into_iter().map(|(_, summary)| summary).collect()
    }

    /// Count of sessions per state
    pub fn count_in(&self, state: SessionState) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().state() == state)
            .count()
    }

    /// Sum of the counters of every registered session
    pub fn total_stats(&self) -> StatsSnapshot {
        self.sessions
            .iter()
            .map(|entry| entry.value().stats())
            .fold(StatsSnapshot::default(), |mut acc, s| {
                acc.connects += s.connects;
                acc.retries += s.retries;
                acc.rounds += s.rounds;
                acc.frames_sent += s.frames_sent;
                acc.frames_received += s.frames_received;
                acc.entries_sent += s.entries_sent;
                acc.entries_applied += s.entries_applied;
                acc.entries_superseded += s.entries_superseded;
                acc.entries_rejected += s.entries_rejected;
                acc
            })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
