//! Broadcast bus carrying phase progress to SSE subscribers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::types::{Event, EventEnvelope};

/// Envelopes a slow subscriber can fall behind by before it sees `Lagged`
const DEFAULT_CAPACITY: usize = 1000;

/// Cheap to clone; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    /// Envelopes published since creation, delivered or not
    published: Arc<AtomicUsize>,
}

impl EventBus {
    /// Bus sized for a full phase run plus adjustments.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Bus holding at most `capacity` undelivered envelopes per subscriber.
    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sends `envelope` to every subscriber.
    ///
    /// Returns how many subscribers received the envelope. With no
    /// subscribers the envelope is dropped and 0 is returned.
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Wraps `event` in a fresh envelope and publishes it.
    pub fn emit(&self, event: Event) -> usize {
        self.publish(EventEnvelope::new(event))
    }

    /// Opens a receiver for phase progress.
    ///
    /// Only events published after this call are received; the SSE route
    /// replays earlier ones from its buffer.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Number of live receivers, including SSE streams.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total envelopes published since the bus was created.
    pub fn event_count(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .field("event_count", &self.event_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(phase_number: i64) -> Event {
        Event::PhaseStarted {
            phase_number,
            model: "o3-mini".to_string(),
        }
    }

    #[tokio::test]
    async fn test_emit_reaches_every_subscriber() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.emit(started(3)), 2);

        let first = rx1.recv().await.unwrap();
        let second = rx2.recv().await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.event.phase_number(), Some(3));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let bus = EventBus::new();
        assert_eq!(bus.emit(started(0)), 0);
        assert_eq!(bus.event_count(), 1);
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        bus.emit(started(0));

        let mut rx = bus.subscribe();
        bus.emit(started(1));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event.phase_number(), Some(1));
    }

    #[test]
    fn test_clones_share_the_channel() {
        let bus = EventBus::with_capacity(4);
        let clone = bus.clone();

        let _rx = clone.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        clone.emit(started(2));
        assert_eq!(bus.event_count(), 1);
    }
}
