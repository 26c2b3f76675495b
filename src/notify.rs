use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub publishing committed events per provider.
///
/// The embedding service subscribes here to push calendar changes out (UI
/// refresh, webhooks). Slow subscribers lag and drop, they never block a
/// commit.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for a provider. Creates the channel if needed.
    pub fn subscribe(&self, provider_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(provider_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish a committed event. No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        let Some(provider_id) = event.provider_id() else {
            return;
        };
        if let Some(sender) = self.channels.get(&provider_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel (e.g. when a provider is retired).
    pub fn remove(&self, provider_id: &Ulid) {
        self.channels.remove(provider_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let pid = Ulid::new();
        let mut rx = hub.subscribe(pid);

        let event = Event::ProviderRegistered {
            id: pid,
            name: Some("Dr. Who".into()),
        };
        hub.send(&event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        // No subscriber — should not panic
        hub.send(&Event::SlotDeleted {
            id: Ulid::new(),
            provider_id: Ulid::new(),
        });
    }

    #[tokio::test]
    async fn consumer_events_have_no_channel() {
        let hub = NotifyHub::new();
        hub.send(&Event::ConsumerRegistered {
            id: Ulid::new(),
            name: None,
        });
        assert!(hub.channels.is_empty());
    }
}
