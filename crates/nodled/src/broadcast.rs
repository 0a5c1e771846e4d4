//! Outbound channels and chat fan-out.
//!
//! Every session owns one writer task that drains a bounded queue of lines
//! into its socket. Everything the server says to that client, prompts and
//! relayed chat alike, goes through the queue, so lines are written whole
//! and in the order they were queued.
//!
//! ```text
//!  broadcast(line)
//!        │ snapshot under read lock
//!        ▼
//! ┌──────────────┐ try_send ┌───────────┐  FramedWrite  ┌────────┐
//! │ Broadcaster  │─────────▶│ Outbound  │──(writer task)▶│ socket │
//! │ ChannelId →  │          │ mpsc queue│               └────────┘
//! │   Outbound   │─────────▶│    ...    │
//! └──────────────┘          └───────────┘
//! ```
//!
//! `broadcast` never waits on a recipient. A closed queue (gone peer) is
//! skipped for that line; the owning session notices its own disconnect
//! through its read loop and unregisters. A full queue (peer not reading)
//! gets the recipient evicted: it is removed from the live set and its
//! writer stops, which also ends the owning session. A registered client
//! therefore never misses a line.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::SinkExt;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default number of lines queued per client before broadcasts skip it.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

// ============================================================================
// Outbound channel
// ============================================================================

/// Identifier of a registered outbound channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

/// The client's writer has stopped; nothing more can be sent.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("outbound channel closed")]
pub struct OutboundClosed;

/// Why a non-blocking delivery did not happen.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The client is not keeping up and its queue is full
    #[error("outbound queue full")]
    Full,

    /// The client's writer has stopped
    #[error("outbound channel closed")]
    Closed,
}

/// Handle through which lines are sent to one client.
///
/// Cheap to clone. The writer task stops once every clone is dropped,
/// after writing whatever is still queued, or immediately on eviction.
#[derive(Debug, Clone)]
pub struct Outbound {
    sender: mpsc::Sender<String>,
    evicted: CancellationToken,
}

impl Outbound {
    /// Wraps the sending half of a line queue.
    pub fn new(sender: mpsc::Sender<String>) -> Self {
        Self {
            sender,
            evicted: CancellationToken::new(),
        }
    }

    /// Queues a line, waiting for room if the queue is full.
    ///
    /// Used for the session's own protocol replies, where waiting on a
    /// slow client only delays that client.
    pub async fn send(&self, line: impl Into<String>) -> Result<(), OutboundClosed> {
        self.sender
            .send(line.into())
            .await
            .map_err(|_| OutboundClosed)
    }

    /// Queues a line without waiting.
    pub fn try_deliver(&self, line: impl Into<String>) -> Result<(), DeliveryError> {
        self.sender.try_send(line.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Whether the writer has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Cuts the client off: the writer drops queued lines and stops, and
    /// the owning session's read loop ends.
    pub fn evict(&self) {
        self.evicted.cancel();
    }

    /// Whether the client has been evicted.
    pub fn is_evicted(&self) -> bool {
        self.evicted.is_cancelled()
    }

    /// Completes once the client has been evicted.
    pub async fn evicted(&self) {
        self.evicted.cancelled().await
    }
}

/// Spawns the writer task for one client and returns its outbound handle.
///
/// The task writes each queued line followed by `\n`. It ends when every
/// `Outbound` clone is dropped (shutting the writer down after the queue
/// drains), when a write fails, or when the client is evicted (dropping
/// the writer even if a write is stuck).
pub fn spawn_writer<W>(writer: W, capacity: usize) -> (Outbound, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(capacity.max(1));
    let outbound = Outbound::new(tx);
    let evicted = outbound.evicted.clone();

    let handle = tokio::spawn(async move {
        let mut sink = FramedWrite::new(writer, LinesCodec::new());

        tokio::select! {
            _ = evicted.cancelled() => {
                debug!("Outbound channel evicted, stopping writer");
            }
            _ = drain(&mut rx, &mut sink) => {}
        }
    });

    (outbound, handle)
}

async fn drain<W>(rx: &mut mpsc::Receiver<String>, sink: &mut FramedWrite<W, LinesCodec>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        if let Err(e) = sink.send(line).await {
            debug!(error = %e, "Outbound write failed, stopping writer");
            return;
        }
    }

    if let Err(e) = SinkExt::<String>::close(sink).await {
        debug!(error = %e, "Failed to shut down outbound writer");
    }
}

// ============================================================================
// Broadcaster
// ============================================================================

/// Outcome of one `broadcast` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients the line was queued for
    pub delivered: usize,
    /// Recipients evicted because their queue was full
    pub evicted: usize,
    /// Recipients skipped because their writer had stopped
    pub closed: usize,
}

impl BroadcastReport {
    /// Recipients that did not get the line.
    pub fn skipped(&self) -> usize {
        self.evicted + self.closed
    }
}

#[derive(Default)]
struct BroadcasterInner {
    /// Live channels; ids increase monotonically so iteration follows
    /// registration order
    channels: RwLock<BTreeMap<ChannelId, Outbound>>,

    /// Next id to hand out
    next_id: AtomicU64,
}

/// Set of authenticated clients' outbound channels.
///
/// Cheap to clone; all clones share the same set.
#[derive(Clone, Default)]
pub struct Broadcaster {
    inner: Arc<BroadcasterInner>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a channel to the live set and returns its id.
    pub async fn register(&self, outbound: Outbound) -> ChannelId {
        let id = ChannelId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.channels.write().await.insert(id, outbound);
        debug!(channel = %id, "Registered outbound channel");
        id
    }

    /// Removes a channel. Returns whether it was registered.
    pub async fn unregister(&self, id: ChannelId) -> bool {
        let removed = self.inner.channels.write().await.remove(&id).is_some();
        if removed {
            debug!(channel = %id, "Unregistered outbound channel");
        }
        removed
    }

    /// Queues `line` for every registered channel.
    ///
    /// Recipients are the channels registered when the call takes its
    /// snapshot. A recipient whose writer has stopped is skipped; one whose
    /// queue is full is evicted and unregistered. The others still get the
    /// line. Never fails.
    pub async fn broadcast(&self, line: &str) -> BroadcastReport {
        let recipients: Vec<(ChannelId, Outbound)> = {
            let channels = self.inner.channels.read().await;
            channels
                .iter()
                .map(|(id, outbound)| (*id, outbound.clone()))
                .collect()
        };

        let mut report = BroadcastReport::default();
        let mut evicted = Vec::new();

        for (id, outbound) in recipients {
            match outbound.try_deliver(line) {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Full) => {
                    warn!(channel = %id, "Recipient queue full, evicting");
                    outbound.evict();
                    evicted.push(id);
                }
                Err(DeliveryError::Closed) => {
                    debug!(channel = %id, "Recipient gone, skipping line");
                    report.closed += 1;
                }
            }
        }

        if !evicted.is_empty() {
            let mut channels = self.inner.channels.write().await;
            for id in &evicted {
                channels.remove(id);
            }
            report.evicted = evicted.len();
        }

        report
    }

    /// Number of registered channels.
    pub async fn len(&self) -> usize {
        self.inner.channels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.channels.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn channel(capacity: usize) -> (Outbound, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Outbound::new(tx), rx)
    }

    #[tokio::test]
    async fn test_fan_out_to_all() {
        let broadcaster = Broadcaster::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (outbound, rx) = channel(8);
            broadcaster.register(outbound).await;
            receivers.push(rx);
        }

        let report = broadcaster.broadcast("MESSAGE bob: hi").await;
        assert_eq!(report.delivered, 3);
        assert_eq!(report.skipped(), 0);

        for rx in &mut receivers {
            assert_eq!(rx.try_recv().unwrap(), "MESSAGE bob: hi");
        }
    }

    #[tokio::test]
    async fn test_closed_recipient_skipped() {
        let broadcaster = Broadcaster::new();

        let (first, mut first_rx) = channel(8);
        let (gone, gone_rx) = channel(8);
        let (last, mut last_rx) = channel(8);
        broadcaster.register(first).await;
        broadcaster.register(gone).await;
        broadcaster.register(last).await;
        drop(gone_rx);

        let report = broadcaster.broadcast("line").await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.closed, 1);

        assert_eq!(first_rx.try_recv().unwrap(), "line");
        assert_eq!(last_rx.try_recv().unwrap(), "line");
    }

    #[tokio::test]
    async fn test_full_recipient_evicted_not_blocking() {
        let broadcaster = Broadcaster::new();

        let (slow, mut slow_rx) = channel(1);
        let (fast, mut fast_rx) = channel(8);
        broadcaster.register(slow.clone()).await;
        broadcaster.register(fast).await;

        broadcaster.broadcast("one").await;
        let report = broadcaster.broadcast("two").await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.evicted, 1);

        // The slow client is no longer registered, so it is not owed "two"
        assert!(slow.is_evicted());
        assert_eq!(broadcaster.len().await, 1);

        let report = broadcaster.broadcast("three").await;
        assert_eq!(report, BroadcastReport { delivered: 1, evicted: 0, closed: 0 });

        assert_eq!(slow_rx.try_recv().unwrap(), "one");
        assert!(slow_rx.try_recv().is_err());
        for expected in ["one", "two", "three"] {
            assert_eq!(fast_rx.try_recv().unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let broadcaster = Broadcaster::new();
        let (outbound, mut rx) = channel(8);
        let id = broadcaster.register(outbound).await;
        assert_eq!(broadcaster.len().await, 1);

        assert!(broadcaster.unregister(id).await);
        assert!(!broadcaster.unregister(id).await);
        assert!(broadcaster.is_empty().await);

        let report = broadcaster.broadcast("nobody hears this").await;
        assert_eq!(report, BroadcastReport::default());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ids_follow_registration_order() {
        let broadcaster = Broadcaster::new();
        let (a, _a_rx) = channel(1);
        let (b, _b_rx) = channel(1);
        let first = broadcaster.register(a).await;
        let second = broadcaster.register(b).await;
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_sequential_broadcasts_keep_order() {
        let broadcaster = Broadcaster::new();
        let (outbound, mut rx) = channel(16);
        broadcaster.register(outbound).await;

        for i in 0..5 {
            broadcaster.broadcast(&format!("line {i}")).await;
        }
        for i in 0..5 {
            assert_eq!(rx.try_recv().unwrap(), format!("line {i}"));
        }
    }

    #[tokio::test]
    async fn test_writer_task_writes_lines() {
        let (client, server) = tokio::io::duplex(1024);
        let (outbound, handle) = spawn_writer(server, 4);

        outbound.send("SUBMITNAME").await.unwrap();
        outbound.try_deliver("MESSAGE a: b").unwrap();
        drop(outbound);
        handle.await.unwrap();

        let mut lines = BufReader::new(client).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("SUBMITNAME"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("MESSAGE a: b"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_evicted_writer_stops_while_peer_stalled() {
        // Tiny pipe the peer never reads, so writes block
        let (client, server) = tokio::io::duplex(8);
        let (outbound, handle) = spawn_writer(server, 4);

        for _ in 0..4 {
            outbound.send("MESSAGE bob: a line longer than the pipe").await.unwrap();
        }
        assert!(!handle.is_finished());

        outbound.evict();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("writer did not stop after eviction")
            .unwrap();

        assert!(outbound.is_closed());
        drop(client);
    }

    #[tokio::test]
    async fn test_writer_stops_when_peer_gone() {
        let (client, server) = tokio::io::duplex(64);
        let (outbound, handle) = spawn_writer(server, 4);
        drop(client);

        // The first write fails and the task exits, closing the queue
        let _ = outbound.send("hello").await;
        handle.await.unwrap();
        assert!(outbound.is_closed());
        assert_eq!(outbound.send("again").await, Err(OutboundClosed));
    }
}
