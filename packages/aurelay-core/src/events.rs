//! Bridge event bus.
//!
//! Renderer-side state changes (transport, volume, topology, stream
//! completion) are translated into typed [`BridgeEvent`]s and broadcast to
//! whoever drives the controller side. Consumers subscribe and react; slow
//! consumers lag and drop, they never block the producers.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::renderer::events::TransportState;

/// Events emitted by the bridge core towards the controller glue.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeEvent {
    /// A renderer was registered and is ready to be used as a player.
    RendererAdded {
        udn: String,
        name: String,
    },
    /// A renderer was torn down (bye-bye or unresponsive).
    RendererRemoved {
        udn: String,
    },
    /// The renderer reported a transport state change.
    TransportState {
        udn: String,
        state: TransportState,
    },
    /// The renderer reported a volume change.
    Volume {
        udn: String,
        volume: u8,
    },
    /// The renderer reported a mute change.
    Mute {
        udn: String,
        muted: bool,
    },
    /// An audio stream finished delivering (or failed before any byte).
    StreamCompleted {
        index: u16,
    },
}

impl BridgeEvent {
    /// Serializes the event to JSON, the wire shape controller frontends
    /// consume (`{"type": ..., ...fields}`).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            log::warn!("[Events] serialization failed: {}", e);
            serde_json::Value::Null
        })
    }
}

/// Broadcast bus for [`BridgeEvent`]s.
pub struct EventBus {
    tx: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    /// Creates a bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emits an event to all current subscribers.
    ///
    /// Send failures only mean nobody is listening, which is fine.
    pub fn emit(&self, event: BridgeEvent) {
        if let Err(e) = self.tx.send(event) {
            log::trace!("[Events] no subscribers: {}", e);
        }
    }

    /// Subscribes to the event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::protocol_constants::EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.emit(BridgeEvent::StreamCompleted { index: 4 });

        match rx.recv().await.expect("event") {
            BridgeEvent::StreamCompleted { index } => assert_eq!(index, 4),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_without_subscribers_is_harmless() {
        let bus = EventBus::new(8);
        bus.emit(BridgeEvent::RendererRemoved {
            udn: "uuid:x".to_string(),
        });
    }

    #[test]
    fn events_serialize_with_tagged_type() {
        let json = BridgeEvent::Volume {
            udn: "uuid:dev".to_string(),
            volume: 42,
        }
        .to_json();
        assert_eq!(json["type"], "volume");
        assert_eq!(json["udn"], "uuid:dev");
        assert_eq!(json["volume"], 42);

        let json = BridgeEvent::TransportState {
            udn: "uuid:dev".to_string(),
            state: TransportState::Playing,
        }
        .to_json();
        assert_eq!(json["state"], "PLAYING");
    }
}
