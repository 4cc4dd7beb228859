//! Event bus distributing store notifications to consumers.
//!
//! Built on a broadcast channel: publishing never blocks the message path,
//! and a slow subscriber only loses its own backlog.

use tokio::sync::broadcast;

use crate::event::{EventMetadata, WardEvent};

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Broadcast bus for [`WardEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<(WardEvent, EventMetadata)>,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the specified capacity.
    ///
    /// The capacity bounds how many events are buffered for slow subscribers.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event. Returns `true` if at least one subscriber received it.
    pub fn publish(&self, event: WardEvent, source: impl Into<String>) -> bool {
        let metadata = EventMetadata::new(source);
        self.tx.send((event, metadata)).is_ok()
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> EventBusReceiver {
        EventBusReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Subscribe to events matching a filter predicate.
    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredReceiver<F>
    where
        F: Fn(&WardEvent) -> bool + Send + 'static,
    {
        FilteredReceiver {
            rx: self.tx.subscribe(),
            filter,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for all events from the event bus.
pub struct EventBusReceiver {
    rx: broadcast::Receiver<(WardEvent, EventMetadata)>,
}

impl EventBusReceiver {
    /// Receive the next event. Returns `None` when the bus is closed.
    pub async fn recv(&mut self) -> Option<(WardEvent, EventMetadata)> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => {
                // Missed some events; pick up from the current position.
                self.rx.try_recv().ok()
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<(WardEvent, EventMetadata)> {
        self.rx.try_recv().ok()
    }
}

/// Receiver that only yields events matching its filter.
pub struct FilteredReceiver<F>
where
    F: Fn(&WardEvent) -> bool + Send,
{
    rx: broadcast::Receiver<(WardEvent, EventMetadata)>,
    filter: F,
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&WardEvent) -> bool + Send,
{
    /// Receive the next matching event. Returns `None` when the bus is closed.
    pub async fn recv(&mut self) -> Option<(WardEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok((event, meta)) => {
                    if (self.filter)(&event) {
                        return Some((event, meta));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceType, DeviceUid};

    fn created(id: &str) -> WardEvent {
        WardEvent::DeviceCreated {
            device_id: id.to_string(),
            device_uid: DeviceUid::new(DeviceType::PositioningTag, id),
            device_type: DeviceType::PositioningTag,
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        assert!(bus.publish(created("t-1"), "test"));

        let (event, meta) = rx.recv().await.unwrap();
        assert_eq!(event.device_id(), "t-1");
        assert_eq!(meta.source, "test");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        // Discarded, not an error
        assert!(!bus.publish(created("t-2"), "test"));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_filtered(WardEvent::is_created);

        bus.publish(
            WardEvent::DeviceRemoved {
                device_id: "gone".to_string(),
            },
            "test",
        );
        bus.publish(created("t-3"), "test");

        let (event, _) = rx.recv().await.unwrap();
        assert_eq!(event.device_id(), "t-3");
    }
}
