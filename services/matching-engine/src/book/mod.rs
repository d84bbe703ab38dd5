//! Order book infrastructure
//!
//! Price levels, the two book sides, and the per-symbol order book.

pub mod ask_side;
pub mod bid_side;
pub mod order_book;
pub mod price_level;

pub use ask_side::AskSide;
pub use bid_side::BidSide;
pub use order_book::{MakerFill, OrderBook};
pub use price_level::PriceLevel;
