//! # Waypoint Bus
//!
//! The publish/subscribe seam between the topology protocol and whatever
//! message broker a deployment actually runs. The protocol only ever needs
//! two verbs - publish a payload to a named channel, subscribe to a named
//! channel - so that is the whole [`BusClient`] trait; delivery guarantees,
//! persistence, and partitioning belong to the broker behind it.
//!
//! [`InMemoryBus`] is the broker for monolith mode and tests: per-channel
//! Tokio broadcast fan-out inside the process. A fleet deployment implements
//! [`BusClient`] against its real broker out of tree.
//!
//! The topology protocol is deliberately tolerant of a lossy bus (deltas are
//! repaired by snapshot anti-entropy), and this surface reflects that: a
//! lagged subscriber logs and skips ahead rather than failing.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Buffered messages per channel before slow subscribers start lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Errors surfaced by a bus client.
///
/// Publish failures are expected to be logged and absorbed by callers: the
/// protocol survives a dead bus by serving last-known-good state.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The named channel can no longer deliver messages
    #[error("Bus channel '{0}' is closed")]
    ChannelClosed(String),
    /// The underlying broker rejected a publish
    #[error("Publish to '{0}' failed: {1}")]
    Publish(String, String),
    /// The underlying broker rejected a subscription
    #[error("Subscribe to '{0}' failed: {1}")]
    Subscribe(String, String),
}

// ============================================================================
// Client Trait
// ============================================================================

/// A publish/subscribe broker connection.
///
/// Implementations must be safe to share behind an `Arc` across every task
/// in the process; the topology listeners, the registration emitter, and
/// the snapshot authority all hold the same client.
#[async_trait]
pub trait BusClient: Send + Sync {
    /// Publishes a payload to a channel. Fire-and-forget: delivery is
    /// whatever the broker guarantees, and the caller does not wait for
    /// acknowledgement from subscribers.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Opens a subscription to a channel. Messages published after this
    /// call are delivered; history is not replayed.
    async fn subscribe(&self, channel: &str) -> Result<BusSubscription, BusError>;
}

/// A live subscription to one channel.
pub struct BusSubscription {
    channel: String,
    receiver: broadcast::Receiver<Vec<u8>>,
}

impl BusSubscription {
    /// Receives the next payload, or `None` once the channel is closed.
    ///
    /// A lagged receiver (the consumer fell behind the channel buffer) logs
    /// a warning and continues with the next available message; the skipped
    /// deltas will be repaired by the next snapshot.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "⚠️ Subscriber on '{}' lagged, {} messages skipped",
                        self.channel, skipped
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The channel this subscription listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl std::fmt::Debug for BusSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusSubscription")
            .field("channel", &self.channel)
            .finish()
    }
}

// ============================================================================
// In-Memory Bus
// ============================================================================

/// In-process broadcast bus for monolith deployments and tests.
///
/// Each channel is a Tokio broadcast ring buffer: every subscriber sees
/// every message published after it subscribed, and a publish with no
/// subscribers is a silent no-op, exactly like a real broker with no
/// consumer groups attached.
pub struct InMemoryBus {
    channels: DashMap<String, broadcast::Sender<Vec<u8>>>,
    capacity: usize,
    published: AtomicU64,
}

impl std::fmt::Debug for InMemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBus")
            .field("channels", &self.channels.len())
            .field("capacity", &self.capacity)
            .field("published", &self.published)
            .finish()
    }
}

impl InMemoryBus {
    /// Creates a bus with the default per-channel buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a bus with a custom per-channel buffer, mainly for tests
    /// that exercise subscriber lag.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
            published: AtomicU64::new(0),
        }
    }

    /// Total messages published across all channels.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusClient for InMemoryBus {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let sender = self.sender_for(channel);
        self.published.fetch_add(1, Ordering::Relaxed);

        match sender.send(payload) {
            Ok(subscribers) => {
                debug!("📤 Published to '{}' ({} subscribers)", channel, subscribers);
            }
            Err(_) => {
                // No subscribers yet; broadcast drops the message, which is
                // the same contract a broker gives an unconsumed topic
                debug!("📤 Published to '{}' (no subscribers)", channel);
            }
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BusSubscription, BusError> {
        let receiver = self.sender_for(channel).subscribe();
        debug!("📥 Subscribed to '{}'", channel);
        Ok(BusSubscription {
            channel: channel.to_string(),
            receiver,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe_roundtrip() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("topology.delta").await.expect("subscribe should succeed");

        bus.publish("topology.delta", b"hello".to_vec())
            .await
            .expect("publish should succeed");

        let payload = sub.recv().await.expect("payload should arrive");
        assert_eq!(payload, b"hello");
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_every_message() {
        let bus = InMemoryBus::new();
        let mut first = bus.subscribe("topology.delta").await.expect("subscribe should succeed");
        let mut second = bus.subscribe("topology.delta").await.expect("subscribe should succeed");

        bus.publish("topology.delta", b"broadcast".to_vec())
            .await
            .expect("publish should succeed");

        assert_eq!(first.recv().await.expect("first copy"), b"broadcast");
        assert_eq!(second.recv().await.expect("second copy"), b"broadcast");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_a_noop() {
        let bus = InMemoryBus::new();
        bus.publish("topology.delta", b"into the void".to_vec())
            .await
            .expect("publish into silence should still succeed");
        assert_eq!(bus.published(), 1);
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let bus = InMemoryBus::new();
        let mut delta = bus.subscribe("topology.delta").await.expect("subscribe should succeed");
        let mut snapshot = bus
            .subscribe("topology.snapshot")
            .await
            .expect("subscribe should succeed");

        bus.publish("topology.delta", b"delta".to_vec())
            .await
            .expect("publish should succeed");
        bus.publish("topology.snapshot", b"snapshot".to_vec())
            .await
            .expect("publish should succeed");

        assert_eq!(delta.recv().await.expect("delta payload"), b"delta");
        assert_eq!(snapshot.recv().await.expect("snapshot payload"), b"snapshot");
    }

    #[tokio::test]
    async fn test_no_history_replay_for_late_subscribers() {
        let bus = InMemoryBus::new();
        // Open the channel so the publish actually enters a ring buffer
        let _early = bus.subscribe("topology.delta").await.expect("subscribe should succeed");

        bus.publish("topology.delta", b"before".to_vec())
            .await
            .expect("publish should succeed");

        let mut late = bus.subscribe("topology.delta").await.expect("subscribe should succeed");
        bus.publish("topology.delta", b"after".to_vec())
            .await
            .expect("publish should succeed");

        assert_eq!(late.recv().await.expect("payload"), b"after");
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_ahead_instead_of_failing() {
        let bus = InMemoryBus::with_capacity(2);
        let mut slow = bus.subscribe("topology.delta").await.expect("subscribe should succeed");

        for i in 0..5u8 {
            bus.publish("topology.delta", vec![i])
                .await
                .expect("publish should succeed");
        }

        // The first recv lands past the overwritten prefix
        let payload = slow.recv().await.expect("payload should arrive after lag");
        assert_eq!(payload, vec![3]);
        assert_eq!(slow.recv().await.expect("next payload"), vec![4]);
    }
}
