//! Matching engine
//!
//! Per-symbol limit order books under strict price/time priority, stop
//! order triggering off the last trade price, and the sharded
//! single-writer command plane that turns every Submit or Cancel into one
//! atomic store apply carrying both the state mutations and the event
//! publications.
//!
//! **Key invariants:**
//! - Price-time priority strictly enforced
//! - Every unit of quantity accounted for (filled, resting, cancelled, or
//!   rejected)
//! - No crossed book after any command
//! - Per-symbol event sequences strictly increasing and contiguous

pub mod book;
pub mod commands;
pub mod engine;
pub mod matcher;
pub mod stops;
mod worker;

pub use commands::{CancelOutcome, SubmitOutcome, SubmitRequest};
pub use engine::ExchangeCore;
pub use matcher::{CommandEffects, SymbolEngine};
