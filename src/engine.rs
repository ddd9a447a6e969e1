//! Synchronization envelope around the order book.
//!
//! The engine owns the single mutual-exclusion region protecting the book
//! and the order-id counter. Every public operation acquires the lock for
//! its full duration; none of them suspends while holding it, and there are
//! no nested acquisitions. Front-end sessions submit and cancel from
//! arbitrary tasks while a background driver runs the periodic match sweep.

use crate::order::book::{self, Book, BookStatus, Depth};
use crate::order::{ClientId, Id, Order, Price, Qty, Side};
use crate::trade::Trade;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Errors reported to the submitting session. Both variants are recoverable
/// and leave the book unchanged.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Quantity and price must be positive")]
    /// Submit carried a non-positive quantity or price.
    InvalidArgument,
    #[error("order #{0} not found")]
    /// Cancel named an id that is unknown, already filled, or already
    /// canceled.
    NotFound(Id),
}

#[derive(Default)]
struct State {
    book: Book,
    next_order_id: Id,
}

/// Thread-safe coordinator over the book, handing out monotonically
/// increasing order ids. Ids are never reused, even after a cancel or a
/// full fill.
#[derive(Default)]
pub struct Engine {
    state: Mutex<State>,
}

impl Engine {
    /// Create an engine with an empty book; the first assigned id is 1.
    pub fn new() -> Self {
        Engine::default()
    }

    // Lock poisoning means another thread panicked mid-mutation; the book
    // can no longer be trusted, so propagating the panic is the only option.
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("book state poisoned")
    }

    /// Validate and rest a new limit order, returning its assigned id.
    ///
    /// Rejected submissions do not consume an id. Submitting never matches;
    /// a crossing order rests until the next sweep.
    pub fn submit(
        &self,
        side: Side,
        quantity: Qty,
        price: Price,
        client_id: ClientId,
    ) -> Result<Id, Error> {
        if quantity == 0 || price <= Price::ZERO {
            return Err(Error::InvalidArgument);
        }

        let mut state = self.state();
        state.next_order_id += 1;
        let id = state.next_order_id;
        // Normalize so 100, 100.0 and 100.00 land on the same level and
        // print identically in snapshots.
        state
            .book
            .insert(Order::new(id, client_id, side, price.normalize(), quantity));
        Ok(id)
    }

    /// Cancel a resting order.
    pub fn cancel(&self, id: Id) -> Result<(), Error> {
        match self.state().book.cancel(id) {
            Ok(_) => Ok(()),
            Err(book::Error::OrderNotFound(id)) => Err(Error::NotFound(id)),
        }
    }

    /// Run the matching loop to quiescence and return the trade prints in
    /// emission order. The returned list is owned by the caller.
    pub fn match_sweep(&self) -> Vec<Trade> {
        self.state().book.match_sweep()
    }

    /// Aggregated depth of every non-empty level, bids descending, asks
    /// ascending.
    pub fn snapshot(&self) -> Depth {
        self.state().book.depth(usize::MAX)
    }

    /// Order and level counts.
    pub fn status(&self) -> BookStatus {
        self.state().book.status()
    }
}

#[cfg(test)]
mod tests {
    use super::{Engine, Error};
    use crate::order::book::DepthItem;
    use crate::order::Side;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[test]
    fn submit_assigns_sequential_ids_from_one() {
        let engine = Engine::new();
        assert_eq!(engine.submit(Side::Bid, 10, dec!(100), 1), Ok(1));
        assert_eq!(engine.submit(Side::Ask, 5, dec!(101), 2), Ok(2));
        assert_eq!(engine.submit(Side::Bid, 1, dec!(99), 1), Ok(3));
    }

    #[test]
    fn rejected_submit_does_not_consume_an_id() {
        let engine = Engine::new();
        assert_eq!(
            engine.submit(Side::Bid, 0, dec!(100), 1),
            Err(Error::InvalidArgument),
            "zero quantity must be rejected"
        );
        assert_eq!(
            engine.submit(Side::Bid, 10, dec!(0), 1),
            Err(Error::InvalidArgument),
            "zero price must be rejected"
        );
        assert_eq!(
            engine.submit(Side::Ask, 10, dec!(-5), 1),
            Err(Error::InvalidArgument),
            "negative price must be rejected"
        );
        let s = engine.status();
        assert_eq!(s.orders, 0, "failed submits must leave the book unchanged");

        // The next successful submit still gets id 1.
        assert_eq!(engine.submit(Side::Bid, 10, dec!(100), 1), Ok(1));
    }

    #[test]
    fn submit_rests_without_matching() {
        let engine = Engine::new();
        engine.submit(Side::Bid, 10, dec!(100), 1).unwrap();
        engine.submit(Side::Ask, 10, dec!(100), 2).unwrap();

        // Crossing orders rest until a sweep runs.
        let s = engine.status();
        assert_eq!(s.orders, 2, "submit must not match inline");
        assert_eq!(s.bid_levels, 1);
        assert_eq!(s.ask_levels, 1);

        let trades = engine.match_sweep();
        assert_eq!(trades.len(), 1);
        assert_eq!(engine.status().orders, 0);
    }

    #[test]
    fn snapshot_reports_resting_depth() {
        let engine = Engine::new();
        engine.submit(Side::Bid, 10, dec!(100), 1).unwrap();

        let d = engine.snapshot();
        assert_eq!(
            d.bids,
            vec![DepthItem {
                price: dec!(100),
                quantity: 10
            }]
        );
        assert!(d.asks.is_empty());
        let s = engine.status();
        assert_eq!((s.orders, s.bid_levels, s.ask_levels), (1, 1, 0));
    }

    #[test]
    fn snapshot_is_idempotent_without_mutation() {
        let engine = Engine::new();
        engine.submit(Side::Bid, 10, dec!(100.50), 1).unwrap();
        engine.submit(Side::Ask, 4, dec!(101), 2).unwrap();

        assert_eq!(
            engine.snapshot(),
            engine.snapshot(),
            "back-to-back snapshots with no mutation must be identical"
        );
    }

    #[test]
    fn equal_prices_of_different_scale_share_a_level() {
        let engine = Engine::new();
        engine.submit(Side::Bid, 3, dec!(100), 1).unwrap();
        engine.submit(Side::Bid, 4, dec!(100.0), 2).unwrap();

        let d = engine.snapshot();
        assert_eq!(
            d.bids,
            vec![DepthItem {
                price: dec!(100),
                quantity: 7
            }],
            "price equality is exact on value, not on representation"
        );
    }

    #[test]
    fn cancel_then_cancel_again_reports_not_found() {
        let engine = Engine::new();
        let id = engine.submit(Side::Bid, 10, dec!(100), 1).unwrap();
        assert_eq!(engine.cancel(id), Ok(()));
        assert_eq!(
            engine.cancel(id),
            Err(Error::NotFound(id)),
            "a canceled id is never findable again"
        );
        assert!(engine.snapshot().bids.is_empty());
    }

    #[test]
    fn cancel_unknown_id_reports_not_found() {
        let engine = Engine::new();
        assert_eq!(engine.cancel(7), Err(Error::NotFound(7)));
    }

    #[test]
    fn ids_of_filled_orders_are_never_reused() {
        let engine = Engine::new();
        engine.submit(Side::Bid, 5, dec!(100), 1).unwrap();
        engine.submit(Side::Ask, 5, dec!(100), 2).unwrap();
        engine.match_sweep();

        // Both fully filled; the counter still advances past them.
        assert_eq!(engine.submit(Side::Bid, 1, dec!(90), 1), Ok(3));
        assert_eq!(
            engine.cancel(1),
            Err(Error::NotFound(1)),
            "a fully filled id is gone for good"
        );
    }

    #[test]
    fn quantities_are_conserved_across_submit_cancel_sweep() {
        let engine = Engine::new();
        let submitted: u64 = [
            engine.submit(Side::Bid, 10, dec!(100), 1).map(|_| 10).unwrap(),
            engine.submit(Side::Bid, 7, dec!(99), 1).map(|_| 7).unwrap(),
            engine.submit(Side::Ask, 6, dec!(100), 2).map(|_| 6).unwrap(),
            engine.submit(Side::Ask, 8, dec!(101), 2).map(|_| 8).unwrap(),
        ]
        .iter()
        .sum();

        engine.cancel(2).unwrap(); // removes 7
        let traded: u64 = engine.match_sweep().iter().map(|t| 2 * t.quantity).sum();
        let resting: u64 = {
            let d = engine.snapshot();
            d.bids.iter().chain(d.asks.iter()).map(|i| i.quantity).sum()
        };

        assert_eq!(
            submitted - 7,
            traded + resting,
            "every submitted unit is traded, resting, or canceled"
        );
    }

    #[test]
    fn non_cross_holds_after_every_sweep() {
        let engine = Engine::new();
        engine.submit(Side::Bid, 4, dec!(102), 1).unwrap();
        engine.submit(Side::Ask, 9, dec!(100), 2).unwrap();
        engine.submit(Side::Bid, 3, dec!(101), 1).unwrap();
        engine.submit(Side::Bid, 1, dec!(99), 1).unwrap();
        engine.submit(Side::Ask, 2, dec!(103), 2).unwrap();
        engine.match_sweep();

        let d = engine.snapshot();
        if let (Some(bb), Some(ba)) = (d.bids.first(), d.asks.first()) {
            assert!(
                bb.price < ba.price,
                "book crossed after sweep: {} >= {}",
                bb.price,
                ba.price
            );
        }
    }

    #[test]
    fn concurrent_submits_get_unique_ids() {
        let engine = Arc::new(Engine::new());
        let threads: u64 = 4;
        let per_thread: u64 = 200;

        let handles: Vec<_> = (0..threads)
            .map(|client| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    (0..per_thread)
                        .map(|_| engine.submit(Side::Bid, 1, dec!(100), client).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<u64, usize> = HashMap::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                *counts.entry(id).or_default() += 1;
            }
        }

        assert_eq!(
            counts.len() as u64,
            threads * per_thread,
            "every submit must receive a distinct id"
        );
        assert!(counts.values().all(|&c| c == 1), "no id handed out twice");
        assert_eq!(
            *counts.keys().max().unwrap(),
            threads * per_thread,
            "ids form a gapless 1..=n range under contention"
        );
        assert_eq!(engine.status().orders as u64, threads * per_thread);
    }
}
