// SPDX-License-Identifier: MIT OR Apache-2.0
//! Publisher bindings for the telemetry channel.
//!
//! The core knows *what* to publish (the two event shapes) and *where* (a
//! channel identifier supplied by the task); it does not know the transport.
//! Everything behind one `publish` method.

use crate::LogEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};

/// Transport seam for telemetry events.
///
/// Publishing is fire-and-forget: a slow or absent consumer must never stall
/// a worker.
pub trait LogPublisher: Send + Sync {
    /// Publish one event on the given channel.
    fn publish(&self, channel: &str, event: &LogEvent);
}

// ---------------------------------------------------------------------------
// NoopPublisher
// ---------------------------------------------------------------------------

/// Discards every event. The default binding for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl LogPublisher for NoopPublisher {
    fn publish(&self, _channel: &str, _event: &LogEvent) {}
}

// ---------------------------------------------------------------------------
// MemoryPublisher
// ---------------------------------------------------------------------------

/// Records every event in memory so tests can assert on published lines.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<(String, LogEvent)>>,
}

impl MemoryPublisher {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all published `(channel, event)` pairs, in order.
    #[must_use]
    pub fn events(&self) -> Vec<(String, LogEvent)> {
        self.events.lock().expect("publisher lock poisoned").clone()
    }

    /// All published log/update message bodies, in order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|(_, event)| match event {
                LogEvent::Log(log) => log.message,
                LogEvent::Update(update) => update.message,
            })
            .collect()
    }
}

impl LogPublisher for MemoryPublisher {
    fn publish(&self, channel: &str, event: &LogEvent) {
        self.events
            .lock()
            .expect("publisher lock poisoned")
            .push((channel.to_string(), event.clone()));
    }
}

// ---------------------------------------------------------------------------
// BusPublisher
// ---------------------------------------------------------------------------

/// An event as seen on the in-process bus: channel plus payload.
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    /// Channel the event was published on.
    pub channel: String,
    /// The event payload.
    pub event: LogEvent,
}

/// Shared statistics counters for a [`BusPublisher`].
#[derive(Debug, Default)]
struct StatsInner {
    total_published: AtomicU64,
    dropped_events: AtomicU64,
}

/// In-process broadcast binding.
///
/// Events published with no live subscribers are dropped silently and
/// counted — same discipline a remote pub/sub bus applies.
pub struct BusPublisher {
    tx: broadcast::Sender<ChannelEvent>,
    stats: Arc<StatsInner>,
}

/// Default channel capacity for the in-process bus.
const DEFAULT_CAPACITY: usize = 256;

impl BusPublisher {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with the given channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            stats: Arc::new(StatsInner::default()),
        }
    }

    /// Subscribe to all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.tx.subscribe()
    }

    /// Number of events published so far.
    #[must_use]
    pub fn total_published(&self) -> u64 {
        self.stats.total_published.load(Ordering::Relaxed)
    }

    /// Events lost because no subscriber was listening.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.stats.dropped_events.load(Ordering::Relaxed)
    }
}

impl Default for BusPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl LogPublisher for BusPublisher {
    fn publish(&self, channel: &str, event: &LogEvent) {
        self.stats.total_published.fetch_add(1, Ordering::Relaxed);
        let payload = ChannelEvent {
            channel: channel.to_string(),
            event: event.clone(),
        };
        if self.tx.send(payload).is_err() {
            self.stats.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }
}

// ---------------------------------------------------------------------------
// RedisPublisher
// ---------------------------------------------------------------------------

/// Redis pub/sub binding for multi-worker deployments.
///
/// Publishing is decoupled from the caller through an unbounded channel and a
/// background forwarder task; transport errors are logged and swallowed so a
/// broken telemetry link never fails an execution.
pub struct RedisPublisher {
    tx: mpsc::UnboundedSender<(String, String)>,
}

impl RedisPublisher {
    /// Spawn the forwarder task on the current tokio runtime.
    #[must_use]
    pub fn new(client: redis::Client) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, String)>();
        tokio::spawn(async move {
            let mut conn = match client.get_multiplexed_async_connection().await {
                Ok(conn) => conn,
                Err(err) => {
                    tracing::warn!("telemetry redis connection failed: {err}");
                    return;
                }
            };
            while let Some((channel, payload)) = rx.recv().await {
                let sent: redis::RedisResult<i64> = redis::cmd("PUBLISH")
                    .arg(&channel)
                    .arg(&payload)
                    .query_async(&mut conn)
                    .await;
                if let Err(err) = sent {
                    tracing::warn!("telemetry publish on '{channel}' failed: {err}");
                }
            }
        });
        Self { tx }
    }
}

impl LogPublisher for RedisPublisher {
    fn publish(&self, channel: &str, event: &LogEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!("telemetry event serialization failed: {err}");
                return;
            }
        };
        // Receiver gone means the runtime is shutting down; nothing to do.
        let _ = self.tx.send((channel.to_string(), payload));
    }
}
