//! Snapshot + stream handoff
//!
//! A session registers with the bus before fetching its snapshot, so events
//! arriving during snapshot construction are held and replayed afterwards.
//! Filtering by sequence at the boundary guarantees the client sees no gap
//! and no duplicate: every event with sequence ≤ s₀ is already reflected in
//! the snapshot, everything after it arrives exactly once.

use crate::events::EventEnvelope;

enum FeedState {
    /// Snapshot request in flight; events are buffered.
    AwaitingSnapshot { held: Vec<EventEnvelope> },
    /// Snapshot delivered; events stream through with dedup.
    Streaming { last_sequence: u64 },
}

/// Per-session handoff state machine.
pub struct SessionFeed {
    state: FeedState,
}

impl SessionFeed {
    pub fn new() -> Self {
        Self {
            state: FeedState::AwaitingSnapshot { held: Vec::new() },
        }
    }

    /// Offer one bus event to the session.
    ///
    /// Returns the event if it should be forwarded to the client now;
    /// `None` if it was buffered (snapshot pending) or dropped (duplicate).
    pub fn on_event(&mut self, event: EventEnvelope) -> Option<EventEnvelope> {
        match &mut self.state {
            FeedState::AwaitingSnapshot { held } => {
                held.push(event);
                None
            }
            FeedState::Streaming { last_sequence } => {
                if event.sequence > *last_sequence {
                    *last_sequence = event.sequence;
                    Some(event)
                } else {
                    None
                }
            }
        }
    }

    /// Complete the handoff with the snapshot's sequence `s0`.
    ///
    /// Returns the held events to replay, in order, deduplicated, all with
    /// sequence > s0.
    pub fn snapshot_received(&mut self, snapshot_sequence: u64) -> Vec<EventEnvelope> {
        let held = match &mut self.state {
            FeedState::AwaitingSnapshot { held } => std::mem::take(held),
            FeedState::Streaming { .. } => Vec::new(),
        };

        let mut replay: Vec<EventEnvelope> = held
            .into_iter()
            .filter(|e| e.sequence > snapshot_sequence)
            .collect();
        replay.sort();
        replay.dedup_by_key(|e| e.sequence);

        let last_sequence = replay
            .last()
            .map(|e| e.sequence)
            .unwrap_or(snapshot_sequence);
        self.state = FeedState::Streaming { last_sequence };

        replay
    }

    /// Sequence of the last event delivered to the client, if streaming.
    pub fn last_sequence(&self) -> Option<u64> {
        match &self.state {
            FeedState::AwaitingSnapshot { .. } => None,
            FeedState::Streaming { last_sequence } => Some(*last_sequence),
        }
    }
}

impl Default for SessionFeed {
    fn default() -> Self {
        Self::new()
    }
}
