//! In-process event bus
//!
//! One broadcast channel per symbol. The bus is attached to the state
//! store as its event sink, so every broadcast happens inside the apply
//! that commits it. Per-symbol ordering is guaranteed by the single-writer
//! discipline of the symbol worker driving that apply; the bus itself
//! never reorders. Delivery is at-least-once: a receiver that falls behind
//! the channel capacity observes `Lagged` and must re-snapshot.

use crate::events::EventEnvelope;
use dashmap::DashMap;
use state_store::{EventSink, Publication};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use types::ids::Symbol;

const DEFAULT_CAPACITY: usize = 1024;

/// Per-symbol broadcast fan-out.
pub struct EventBus {
    channels: DashMap<String, broadcast::Sender<EventEnvelope>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    fn sender(&self, symbol: &str) -> broadcast::Sender<EventEnvelope> {
        self.channels
            .entry(symbol.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish one event. Returns the number of subscribers that will
    /// observe it (zero when nobody listens, which is not an error).
    pub fn publish(&self, event: EventEnvelope) -> usize {
        let sender = self.sender(event.symbol.as_str());
        match sender.send(event) {
            Ok(receivers) => receivers,
            Err(dropped) => {
                debug!(
                    symbol = %dropped.0.symbol,
                    kind = dropped.0.kind(),
                    sequence = dropped.0.sequence,
                    "event published with no subscribers"
                );
                0
            }
        }
    }

    /// Subscribe to every event for one symbol.
    pub fn subscribe(&self, symbol: &Symbol) -> broadcast::Receiver<EventEnvelope> {
        self.sender(symbol.as_str()).subscribe()
    }

    /// Current subscriber count for a symbol.
    pub fn subscriber_count(&self, symbol: &Symbol) -> usize {
        self.channels
            .get(symbol.as_str())
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// The bus is the store's event sink: every publication an apply commits
/// is broadcast here, inside the same apply call.
impl EventSink for EventBus {
    fn deliver(&self, publication: &Publication) {
        match serde_json::from_str::<EventEnvelope>(&publication.payload) {
            Ok(event) => {
                self.publish(event);
            }
            Err(e) => {
                warn!(
                    channel = %publication.channel,
                    error = %e,
                    "dropping undecodable publication"
                );
            }
        }
    }
}
