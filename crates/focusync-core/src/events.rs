//! Event bus connecting stores without direct imports between domains.

use focusync_protocol::{DomainEvent, EventEnvelope, OwnerId};
use log::debug;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

const DEFAULT_BUFFER: usize = 256;

/// Synchronous subscriber invoked for every published event.
pub trait DomainEventSink: Send + Sync {
    fn handle(&self, envelope: &EventEnvelope);
}

/// Fan-out of domain events to attached stores and broadcast observers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    sinks: Arc<RwLock<Vec<Weak<dyn DomainEventSink>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            sender,
            sinks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Attach a sink. The bus holds it weakly, so dropping the sink detaches it.
    pub fn attach<S: DomainEventSink + 'static>(&self, sink: &Arc<S>) {
        let weak: Weak<S> = Arc::downgrade(sink);
        let weak: Weak<dyn DomainEventSink> = weak;
        self.sinks.write().push(weak);
    }

    /// Publish one event for `owner`.
    pub fn publish(&self, owner: &OwnerId, event: DomainEvent) {
        let envelope = EventEnvelope::new(owner.clone(), event);
        debug!(
            "publishing domain event (owner={}, kind={})",
            owner,
            envelope.payload.kind()
        );
        let sinks: Vec<Arc<dyn DomainEventSink>> = {
            let mut sinks = self.sinks.write();
            sinks.retain(|sink| sink.strong_count() > 0);
            sinks.iter().filter_map(Weak::upgrade).collect()
        };
        for sink in sinks {
            sink.handle(&envelope);
        }
        let _ = self.sender.send(envelope);
    }

    pub fn publish_all(&self, owner: &OwnerId, events: impl IntoIterator<Item = DomainEvent>) {
        for event in events {
            self.publish(owner, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use focusync_protocol::Companion;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<&'static str>>,
    }

    impl DomainEventSink for Recorder {
        fn handle(&self, envelope: &EventEnvelope) {
            self.seen.lock().push(envelope.payload.kind());
        }
    }

    fn message_sent() -> DomainEvent {
        DomainEvent::MessageSent {
            companion: Companion::Spark,
            message_id: "m1".to_string(),
        }
    }

    #[tokio::test]
    async fn publishes_to_sinks_and_observers() {
        let bus = EventBus::default();
        let recorder = Arc::new(Recorder::default());
        bus.attach(&recorder);
        let mut receiver = bus.subscribe();

        bus.publish(&OwnerId::new("u1"), message_sent());

        assert_eq!(*recorder.seen.lock(), vec!["message_sent"]);
        let envelope = receiver.recv().await.expect("event");
        assert_eq!(envelope.owner, OwnerId::new("u1"));
        assert_eq!(envelope.payload, message_sent());
    }

    #[test]
    fn dropped_sinks_are_detached() {
        let bus = EventBus::default();
        let recorder = Arc::new(Recorder::default());
        bus.attach(&recorder);
        drop(recorder);
        bus.publish(&OwnerId::new("u1"), message_sent());
        assert!(bus.sinks.read().is_empty());
    }
}
