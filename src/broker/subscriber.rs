//! Subscriber handle and drain task
//!
//! Each subscriber owns exactly one outbound connection and one dedicated
//! drain task. The task writes the pcap global header, then transmits its
//! queue in FIFO order until the queue is closed by the broker or a write
//! fails. Failures are isolated: the task asks the broker to remove it and
//! releases the connection; nothing propagates to other subscribers.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::packet::{LinkType, Packet};
use crate::wire::PcapWriter;

use super::config::BrokerConfig;
use super::stats::BrokerStats;

/// Write half of a subscriber connection, type-erased so tests can swap in
/// in-memory streams
type BoxedConn = Box<dyn AsyncWrite + Send + Unpin>;

/// A new subscriber, as handed to the broker by the listener.
///
/// Identified by a connection-derived string (the remote address in the
/// server path). Dropping an unregistered handle drops the connection.
pub struct SubscriberHandle {
    id: String,
    conn: BoxedConn,
}

impl SubscriberHandle {
    /// Bind an ID to an outbound connection
    pub fn new(id: impl Into<String>, conn: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            id: id.into(),
            conn: Box::new(conn),
        }
    }

    /// Subscriber ID
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(super) fn into_parts(self) -> (String, BoxedConn) {
        (self.id, self.conn)
    }
}

impl std::fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Registry-side state for one subscriber, owned by the control loop.
///
/// Dropping the entry closes the packet queue and fires the close signal in
/// one step; that drop is the subscriber's single close point, so closing
/// can never happen twice.
pub(super) struct SubscriberEntry {
    pub(super) queue: mpsc::Sender<Packet>,
    _close: oneshot::Sender<()>,
}

/// Drain-task lifecycle, logged on each transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriberState {
    /// Header not yet written
    Starting,
    /// Draining the queue
    Active,
    /// Stopped accepting packets, releasing the connection
    Closing,
    /// Connection released (terminal)
    Closed,
}

impl std::fmt::Display for SubscriberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SubscriberState::Starting => "starting",
            SubscriberState::Active => "active",
            SubscriberState::Closing => "closing",
            SubscriberState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why the drain loop stopped
enum StopReason {
    /// Queue closed by the broker (eviction or shutdown)
    QueueClosed,
    /// Write to the connection failed
    WriteError,
    /// Write exceeded the per-write bound
    WriteTimeout,
}

/// One subscriber's dedicated drain task
pub(super) struct DrainTask {
    id: String,
    state: SubscriberState,
    writer: PcapWriter<BoxedConn>,
    queue: mpsc::Receiver<Packet>,
    closed: oneshot::Receiver<()>,
    link_type: LinkType,
    config: BrokerConfig,
    remove_tx: mpsc::Sender<String>,
    stats: Arc<BrokerStats>,
}

impl DrainTask {
    /// Wire up a handle to its queue and close signal.
    ///
    /// Returns the registry entry for the control loop and the task to
    /// spawn. The entry must be inserted before the task runs far enough to
    /// request its own removal, which holds because the control loop inserts
    /// before spawning.
    pub(super) fn prepare(
        handle: SubscriberHandle,
        link_type: LinkType,
        config: &BrokerConfig,
        remove_tx: mpsc::Sender<String>,
        stats: Arc<BrokerStats>,
    ) -> (SubscriberEntry, DrainTask) {
        let (queue_tx, queue_rx) = mpsc::channel(config.subscriber_queue_capacity);
        let (close_tx, close_rx) = oneshot::channel();
        let (id, conn) = handle.into_parts();

        let entry = SubscriberEntry {
            queue: queue_tx,
            _close: close_tx,
        };
        let task = DrainTask {
            id,
            state: SubscriberState::Starting,
            writer: PcapWriter::new(conn),
            queue: queue_rx,
            closed: close_rx,
            link_type,
            config: config.clone(),
            remove_tx,
            stats,
        };
        (entry, task)
    }

    /// Run to completion. Never returns an error: every failure mode ends in
    /// removal plus connection release.
    pub(super) async fn run(mut self) {
        if let Err(reason) = self.write_header().await {
            // Never activated: report and bail without draining
            self.request_removal().await;
            self.release(reason).await;
            return;
        }

        self.set_state(SubscriberState::Active);
        let reason = self.drain().await;

        if matches!(reason, StopReason::WriteError | StopReason::WriteTimeout) {
            self.request_removal().await;
        }
        self.release(reason).await;
    }

    async fn write_header(&mut self) -> Result<(), StopReason> {
        let write = self
            .writer
            .write_file_header(self.config.snaplen, self.link_type);

        match timeout(self.config.write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::warn!(subscriber = %self.id, error = %e, "Failed to write pcap header");
                Err(StopReason::WriteError)
            }
            Err(_) => {
                tracing::warn!(subscriber = %self.id, "Timed out writing pcap header");
                Err(StopReason::WriteTimeout)
            }
        }
    }

    async fn drain(&mut self) -> StopReason {
        loop {
            // Biased toward the close signal: once the broker closes this
            // subscriber, any packets still buffered in the queue are
            // discarded rather than flushed.
            tokio::select! {
                biased;

                _ = &mut self.closed => return StopReason::QueueClosed,

                maybe = self.queue.recv() => {
                    let Some(packet) = maybe else {
                        return StopReason::QueueClosed;
                    };
                    if let Err(reason) = self.write_packet(&packet).await {
                        return reason;
                    }
                }
            }
        }
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<(), StopReason> {
        match timeout(self.config.write_timeout, self.writer.write_packet(packet)).await {
            Ok(Ok(())) => {
                self.stats.packets_written.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .bytes_written
                    .fetch_add(packet.captured_len() as u64, Ordering::Relaxed);
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::warn!(subscriber = %self.id, error = %e, "Failed to write packet");
                Err(StopReason::WriteError)
            }
            Err(_) => {
                tracing::warn!(subscriber = %self.id, "Write timed out");
                Err(StopReason::WriteTimeout)
            }
        }
    }

    /// Ask the broker to remove us. A closed remove channel means the broker
    /// is already shutting everything down, which covers the removal anyway.
    async fn request_removal(&mut self) {
        let _ = self.remove_tx.send(self.id.clone()).await;
    }

    /// Release the underlying connection. Best-effort: shutdown errors on an
    /// already-dead connection are ignored, so release never faults.
    async fn release(&mut self, reason: StopReason) {
        self.set_state(SubscriberState::Closing);

        let reason = match reason {
            StopReason::QueueClosed => "queue closed",
            StopReason::WriteError => "write error",
            StopReason::WriteTimeout => "write timeout",
        };
        tracing::debug!(subscriber = %self.id, reason, "Releasing connection");

        let _ = self.writer.get_mut().shutdown().await;
        self.set_state(SubscriberState::Closed);
    }

    fn set_state(&mut self, next: SubscriberState) {
        tracing::trace!(
            subscriber = %self.id,
            from = %self.state,
            to = %next,
            "Subscriber state change"
        );
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::io::AsyncReadExt;

    use crate::wire::PcapReader;

    use super::*;

    fn spawn_task(
        conn: impl AsyncWrite + Send + Unpin + 'static,
        config: BrokerConfig,
    ) -> (
        SubscriberEntry,
        mpsc::Receiver<String>,
        Arc<BrokerStats>,
        tokio::task::JoinHandle<()>,
    ) {
        let (remove_tx, remove_rx) = mpsc::channel(1);
        let stats = Arc::new(BrokerStats::new());
        let handle = SubscriberHandle::new("peer:1", conn);
        let (entry, task) = DrainTask::prepare(
            handle,
            LinkType::ETHERNET,
            &config,
            remove_tx,
            Arc::clone(&stats),
        );
        let join = tokio::spawn(task.run());
        (entry, remove_rx, stats, join)
    }

    #[tokio::test]
    async fn test_writes_header_then_packets_in_order() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (entry, _remove_rx, stats, join) = spawn_task(server, BrokerConfig::default());

        for payload in [&b"first"[..], &b"second"[..], &b"third"[..]] {
            let packet = Packet::full(std::time::UNIX_EPOCH, Bytes::copy_from_slice(payload));
            entry.queue.send(packet).await.unwrap();
        }
        drop(entry); // close the queue; remaining buffered packets may be discarded

        join.await.unwrap();

        let mut reader = PcapReader::new(client).await.unwrap();
        assert_eq!(reader.link_type(), LinkType::ETHERNET);

        // FIFO prefix: every packet that was written came out in order
        let mut received = Vec::new();
        while let Some(packet) = reader.read_packet().await.unwrap() {
            received.push(packet.data);
        }
        let expected = [&b"first"[..], &b"second"[..], &b"third"[..]];
        assert!(received.len() <= 3);
        for (got, want) in received.iter().zip(expected.iter()) {
            assert_eq!(got.as_ref(), *want);
        }
        assert_eq!(stats.snapshot().packets_written, received.len() as u64);
    }

    #[tokio::test]
    async fn test_write_failure_requests_removal() {
        let (client, server) = tokio::io::duplex(64);
        drop(client); // connection already gone: header write fails

        let (_entry, mut remove_rx, _stats, join) = spawn_task(server, BrokerConfig::default());

        assert_eq!(remove_rx.recv().await.unwrap(), "peer:1");
        join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_timeout_requests_removal() {
        // Tiny duplex buffer that nobody reads: the second write blocks
        let (client, server) = tokio::io::duplex(32);
        let config = BrokerConfig::default().write_timeout(Duration::from_millis(50));
        let (entry, mut remove_rx, _stats, join) = spawn_task(server, config);

        let packet = Packet::full(std::time::UNIX_EPOCH, Bytes::from(vec![0u8; 256]));
        entry.queue.send(packet).await.unwrap();

        assert_eq!(remove_rx.recv().await.unwrap(), "peer:1");
        join.await.unwrap();
        drop(client);
    }

    #[tokio::test]
    async fn test_close_signal_discards_buffered_packets() {
        // Tiny connection buffer so the task blocks mid-write on the first
        // packet. Queue up more packets behind it, close the subscriber,
        // then let the blocked write finish: the task must observe the close
        // signal and exit without flushing the rest of the queue.
        let (mut client, server) = tokio::io::duplex(16);
        let config = BrokerConfig::default().subscriber_queue_capacity(8);
        let (entry, _remove_rx, stats, join) = spawn_task(server, config);

        let mut header = [0u8; crate::wire::FILE_HEADER_LEN];
        client.read_exact(&mut header).await.unwrap();

        let payload = vec![0u8; 100];
        for _ in 0..3 {
            let packet = Packet::full(std::time::UNIX_EPOCH, Bytes::from(payload.clone()));
            entry.queue.send(packet).await.unwrap();
        }
        // First record byte proves the task is mid-write before we close
        let mut first = [0u8; 1];
        client.read_exact(&mut first).await.unwrap();
        drop(entry);

        // Unblock the rest of the record (16-byte header + 100-byte payload)
        let mut record = [0u8; crate::wire::RECORD_HEADER_LEN + 100 - 1];
        client.read_exact(&mut record).await.unwrap();

        join.await.unwrap();

        // Connection was released with the remaining two packets discarded
        assert_eq!(client.read(&mut [0u8; 64]).await.unwrap(), 0);
        assert_eq!(stats.snapshot().packets_written, 1);
    }
}
