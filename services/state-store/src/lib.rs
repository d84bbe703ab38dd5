//! Durable state store for the exchange core
//!
//! One command from a symbol worker becomes one [`ChangeSet`]; the store
//! applies it atomically (all operations commit together or not at all)
//! and hands the change-set's publications to the attached [`EventSink`]
//! inside the same apply call, so commit and event delivery are one step.
//!
//! Two implementations:
//! - [`MemoryStore`]: authoritative in-memory state, per-process.
//! - [`JournalStore`]: memory store behind an append-only checksummed WAL,
//!   replayed on open so the book survives process restart.

pub mod change_set;
pub mod journal;
pub mod memory;
pub mod store;

pub use change_set::{ChangeSet, Publication, StateOp, SymbolCounters};
pub use journal::{JournalConfig, JournalStore};
pub use memory::MemoryStore;
pub use store::{
    BookSnapshot, EventSink, LevelView, RetryPolicy, StateStore, StoreError, SymbolSnapshot,
};
