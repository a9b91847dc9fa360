//! The broadcast broker control loop
//!
//! One task owns the subscriber registry outright; every other component
//! talks to it through channels. Because the loop is the registry's sole
//! reader and writer, no lock exists anywhere in the broadcast path.
//!
//! ```text
//!  PacketSender ──ingest──►┌──────────────┐
//!  BrokerHandle ──add─────►│ control loop │──queue──► drain task ──► TCP
//!  BrokerHandle ──remove──►│  (registry)  │──queue──► drain task ──► TCP
//!  drain tasks ───remove──►└──────────────┘
//! ```
//!
//! A broadcast step attempts a bounded-time enqueue to every registered
//! subscriber in turn. A subscriber whose queue stays full for the whole
//! bound is evicted in that same step. Worst case, a broadcast to M
//! uniformly stalled subscribers takes M x client_timeout; that serial
//! bound is the accepted trade-off for strictly fair, lock-free fan-out.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::Error;
use crate::packet::{LinkType, Packet};

use super::config::BrokerConfig;
use super::stats::BrokerStats;
use super::subscriber::{DrainTask, SubscriberEntry, SubscriberHandle};

/// Control-side handle to a running broker.
///
/// Cloneable; held by the listener and anything else that manages
/// subscribers. All methods queue a request to the control loop and return
/// without waiting for it to be applied.
#[derive(Clone)]
pub struct BrokerHandle {
    add_tx: mpsc::Sender<SubscriberHandle>,
    remove_tx: mpsc::Sender<String>,
}

impl BrokerHandle {
    /// Register a new subscriber.
    ///
    /// Returns [`Error::BrokerClosed`] once the control loop has shut down;
    /// the handle (and its connection) is dropped in that case.
    pub async fn add_subscriber(&self, subscriber: SubscriberHandle) -> Result<(), Error> {
        self.add_tx
            .send(subscriber)
            .await
            .map_err(|_| Error::BrokerClosed)
    }

    /// Unregister a subscriber by ID.
    ///
    /// Idempotent: unknown IDs and repeat calls are no-ops, and a request
    /// arriving after shutdown is silently dropped.
    pub async fn remove_subscriber(&self, id: &str) {
        let _ = self.remove_tx.send(id.to_owned()).await;
    }
}

/// Ingestion side of a running broker, held by the packet source.
///
/// The queue is bounded: `send` waits when the control loop falls behind,
/// which is what keeps the source from running unboundedly ahead. Dropping
/// every `PacketSender` closes ingestion and shuts the broker down.
pub struct PacketSender {
    ingest_tx: mpsc::Sender<Packet>,
}

impl PacketSender {
    /// Push one packet into the ingestion queue.
    pub async fn send(&self, packet: Packet) -> Result<(), Error> {
        self.ingest_tx
            .send(packet)
            .await
            .map_err(|_| Error::BrokerClosed)
    }
}

/// The broadcast broker: registry owner and fan-out engine
pub struct Broker {
    config: BrokerConfig,
    link_type: LinkType,
    subscribers: HashMap<String, SubscriberEntry>,
    add_rx: mpsc::Receiver<SubscriberHandle>,
    remove_rx: mpsc::Receiver<String>,
    ingest_rx: mpsc::Receiver<Packet>,
    /// Clone handed to each drain task so it can report its own failure
    remove_tx: mpsc::Sender<String>,
    stats: Arc<BrokerStats>,
}

impl Broker {
    /// Build a broker for a packet stream of the given link type.
    ///
    /// Returns the broker itself (drive it with [`Broker::run`]), the
    /// control handle, and the ingestion sender.
    pub fn new(config: BrokerConfig, link_type: LinkType) -> (Broker, BrokerHandle, PacketSender) {
        // Capacity 1 on the control channels: enough to decouple callers
        // from the loop without reordering their requests.
        let (add_tx, add_rx) = mpsc::channel(1);
        let (remove_tx, remove_rx) = mpsc::channel(1);
        let (ingest_tx, ingest_rx) = mpsc::channel(config.ingest_capacity);

        let broker = Broker {
            config,
            link_type,
            subscribers: HashMap::new(),
            add_rx,
            remove_rx,
            ingest_rx,
            remove_tx: remove_tx.clone(),
            stats: Arc::new(BrokerStats::new()),
        };
        let handle = BrokerHandle { add_tx, remove_tx };
        let sender = PacketSender { ingest_tx };

        (broker, handle, sender)
    }

    /// Shared counters for this broker
    pub fn stats(&self) -> Arc<BrokerStats> {
        Arc::clone(&self.stats)
    }

    /// Run the control loop until ingestion closes or `shutdown` resolves.
    ///
    /// Each iteration services exactly one event: add, remove, ingest, or
    /// shutdown. On exit every subscriber's queue is closed and the
    /// registry is empty.
    pub async fn run(mut self, shutdown: impl std::future::Future<Output = ()>) {
        tracing::debug!(link_type = %self.link_type, "Broker started");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Broker shutting down");
                    break;
                }

                Some(subscriber) = self.add_rx.recv() => {
                    self.register(subscriber);
                }

                Some(id) = self.remove_rx.recv() => {
                    self.unregister(&id, false);
                }

                maybe = self.ingest_rx.recv() => {
                    match maybe {
                        Some(packet) => self.broadcast(packet).await,
                        None => {
                            tracing::info!("Ingestion closed, stopping broker");
                            break;
                        }
                    }
                }
            }
        }

        self.close_all();
    }

    /// Insert into the registry and start the drain task.
    ///
    /// A duplicate live ID (possible only if a peer address is reused while
    /// its old entry lingers) evicts the old subscriber first, keeping IDs
    /// unique among live subscribers.
    fn register(&mut self, subscriber: SubscriberHandle) {
        let id = subscriber.id().to_owned();
        if self.subscribers.contains_key(&id) {
            tracing::warn!(subscriber = %id, "Duplicate subscriber ID, replacing");
            self.unregister(&id, false);
        }

        let (entry, task) = DrainTask::prepare(
            subscriber,
            self.link_type,
            &self.config,
            self.remove_tx.clone(),
            Arc::clone(&self.stats),
        );
        self.subscribers.insert(id.clone(), entry);
        tokio::spawn(task.run());

        self.stats.subscribers_added.fetch_add(1, Ordering::Relaxed);
        self.stats
            .active_subscribers
            .fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            subscriber = %id,
            total = self.subscribers.len(),
            "Subscriber added"
        );
    }

    /// Drop a subscriber's entry, closing its queue in the same step.
    fn unregister(&mut self, id: &str, evicted: bool) {
        if self.subscribers.remove(id).is_none() {
            tracing::debug!(subscriber = %id, "Remove request for unknown subscriber");
            return;
        }

        self.stats
            .subscribers_removed
            .fetch_add(1, Ordering::Relaxed);
        self.stats
            .active_subscribers
            .fetch_sub(1, Ordering::Relaxed);
        if evicted {
            self.stats
                .subscribers_evicted
                .fetch_add(1, Ordering::Relaxed);
        }
        tracing::info!(
            subscriber = %id,
            evicted,
            total = self.subscribers.len(),
            "Subscriber removed"
        );
    }

    /// One broadcast step: bounded-time enqueue to every subscriber.
    ///
    /// Iteration order is the map's, unspecified but fixed for the step.
    /// Stalled subscribers are collected and evicted before the step ends
    /// (removal-safe: the map is never mutated mid-iteration).
    async fn broadcast(&mut self, packet: Packet) {
        self.stats.packets_ingested.fetch_add(1, Ordering::Relaxed);

        let mut stalled: Vec<String> = Vec::new();
        for (id, entry) in &self.subscribers {
            match timeout(self.config.client_timeout, entry.queue.send(packet.clone())).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    // Queue already closed: the drain task exited on its own
                    // and its removal request is still in flight.
                    tracing::debug!(subscriber = %id, "Queue closed during broadcast");
                    stalled.push(id.clone());
                }
                Err(_) => {
                    tracing::warn!(
                        subscriber = %id,
                        timeout_ms = self.config.client_timeout.as_millis() as u64,
                        "Subscriber stalled, evicting"
                    );
                    stalled.push(id.clone());
                }
            }
        }

        for id in stalled {
            self.unregister(&id, true);
        }
    }

    /// Close every subscriber and clear the registry.
    fn close_all(&mut self) {
        let total = self.subscribers.len();
        tracing::debug!(total, "Closing all subscribers");

        for (id, entry) in self.subscribers.drain() {
            drop(entry);
            self.stats
                .subscribers_removed
                .fetch_add(1, Ordering::Relaxed);
            self.stats
                .active_subscribers
                .fetch_sub(1, Ordering::Relaxed);
            tracing::debug!(subscriber = %id, "Subscriber closed");
        }
    }
}
