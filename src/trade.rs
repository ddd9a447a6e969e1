//! Trade print produced by a match sweep.
//!
//! A Trade links the bid and ask orders that crossed, the executed quantity,
//! and the execution price (the best ask at the moment of the fill).

use crate::order;
use time::OffsetDateTime;

/// A single execution between a bid and an ask.
#[derive(Debug, Clone)]
pub struct Trade {
    /// The bid order involved in the trade.
    pub bid_order_id: order::Id,
    /// The ask order involved in the trade.
    pub ask_order_id: order::Id,
    /// Executed quantity for this trade.
    pub quantity: order::Qty,
    /// Execution price of the trade.
    pub price: order::Price,
    /// UTC timestamp when the trade was generated.
    pub executed_at: OffsetDateTime,
}
