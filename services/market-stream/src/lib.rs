//! Live market-data fan-out
//!
//! Event envelopes produced by the symbol workers, the in-process broadcast
//! bus, the client session wire protocol, and the snapshot+stream handoff
//! that gives every subscriber a gap-free, duplicate-free view.

pub mod bus;
pub mod events;
pub mod feed;
pub mod session;

pub use bus::EventBus;
pub use events::{EventEnvelope, EventPayload, LevelDelta};
pub use feed::SessionFeed;
pub use session::{ClientMessage, ErrorKind, ServerMessage, SessionError};
