//! Two-sided limit order book with price-time priority.
//!
//! The book keeps one BTreeMap of price levels per side (bids iterated
//! descending, asks ascending), so the best price on either side is an
//! O(log n) lookup from the matching loop. Each price level maintains a FIFO
//! queue of resting orders as a doubly-linked list threaded through a slab
//! arena, giving O(1) insertion at the tail and O(1) removal anywhere in the
//! queue for cancellation. An id index maps order ids to arena slots.

use crate::order::{Id, Order, Price, Qty, Side};
use crate::trade::Trade;
use slab::Slab;
use std::cmp;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use time::OffsetDateTime;

/// Aggregated depth at a single price level.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DepthItem {
    /// Price level.
    pub price: Price,
    /// Total resting quantity at this price level.
    pub quantity: Qty,
}

/// A snapshot of the price levels on both sides of the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Depth {
    /// Bids in descending price order.
    pub bids: Vec<DepthItem>,
    /// Asks in ascending price order.
    pub asks: Vec<DepthItem>,
}

/// Book-level counters reported by the STATUS command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BookStatus {
    /// Number of resting orders across both sides.
    pub orders: usize,
    /// Number of non-empty bid price levels.
    pub bid_levels: usize,
    /// Number of non-empty ask price levels.
    pub ask_levels: usize,
}

/// Order-book errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("order #{0} not found")]
    /// Tried to operate on an order that does not rest on the book.
    OrderNotFound(Id),
}

/// Aggregated state for a single price level.
///
/// Keeps the head/tail of a doubly-linked list of orders (by arena index)
/// and the cumulative resting quantity. `aggregate_qty` is maintained equal
/// to the sum of the queued orders' quantities at all times.
#[derive(Debug, Default)]
struct PriceLevel {
    head: Option<usize>,
    tail: Option<usize>,
    aggregate_qty: Qty,
}

impl PriceLevel {
    /// Append an order node to the back of the level's FIFO queue and update
    /// the aggregate. The `idx` must reference a valid entry in `arena`.
    fn push_back(&mut self, arena: &mut Slab<OrderNode>, idx: usize) {
        match self.tail {
            Some(tail) => {
                arena[tail].next = Some(idx);
                arena[idx].prev = Some(tail);
                self.tail = Some(idx);
            }
            None => {
                self.head = Some(idx);
                self.tail = Some(idx);
            }
        }

        self.aggregate_qty += arena[idx].order.quantity;
    }

    /// Remove a specific order node from the level's queue and update the
    /// aggregate. The node must be currently linked in this level.
    fn unlink(&mut self, arena: &mut Slab<OrderNode>, idx: usize) {
        let prev = arena[idx].prev;
        let next = arena[idx].next;

        if let Some(p) = prev {
            arena[p].next = next;
        } else {
            self.head = next;
        }
        if let Some(n) = next {
            arena[n].prev = prev;
        } else {
            self.tail = prev;
        }
        self.aggregate_qty -= arena[idx].order.quantity;
        arena[idx].prev = None;
        arena[idx].next = None;
    }

    fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

/// Node representing an individual order stored in the arena and linked
/// within a price level's FIFO queue.
#[derive(Debug)]
struct OrderNode {
    order: Order,
    next: Option<usize>,
    prev: Option<usize>,
}

/// BTreeMap-backed order book implementing price-time priority.
#[derive(Debug, Default)]
pub struct Book {
    bids: BTreeMap<Price, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    arena: Slab<OrderNode>,
    ids: HashMap<Id, usize>,
}

impl Book {
    /// Create a new, empty book.
    pub fn new() -> Self {
        Book::default()
    }

    /// Insert a new order at its price level, creating the level if absent.
    ///
    /// The caller is responsible for id assignment; reusing a live id is a
    /// programmer error.
    pub fn insert(&mut self, order: Order) {
        debug_assert!(
            !self.ids.contains_key(&order.id),
            "order id #{} already rests on the book",
            order.id
        );

        let idx = self.arena.insert(OrderNode {
            order,
            next: None,
            prev: None,
        });
        self.ids.insert(self.arena[idx].order.id, idx);
        let level = match self.arena[idx].order.side {
            Side::Bid => self.bids.entry(self.arena[idx].order.price).or_default(),
            Side::Ask => self.asks.entry(self.arena[idx].order.price).or_default(),
        };
        level.push_back(&mut self.arena, idx);
    }

    /// Cancel a resting order by id, dropping its level if it empties.
    pub fn cancel(&mut self, id: Id) -> Result<Order, Error> {
        let Some(&idx) = self.ids.get(&id) else {
            return Err(Error::OrderNotFound(id));
        };

        Ok(self.remove_resting(idx))
    }

    /// Get a resting order by its id.
    pub fn lookup(&self, id: Id) -> Option<&Order> {
        let idx = self.ids.get(&id)?;

        Some(&self.arena[*idx].order)
    }

    /// Return an aggregated snapshot up to `limit` levels per side.
    pub fn depth(&self, limit: usize) -> Depth {
        Depth {
            bids: self
                .bids
                .iter()
                .rev()
                .take(limit)
                .map(|(price, level)| DepthItem {
                    price: *price,
                    quantity: level.aggregate_qty,
                })
                .collect(),
            asks: self
                .asks
                .iter()
                .take(limit)
                .map(|(price, level)| DepthItem {
                    price: *price,
                    quantity: level.aggregate_qty,
                })
                .collect(),
        }
    }

    /// Current order and level counts.
    pub fn status(&self) -> BookStatus {
        BookStatus {
            orders: self.ids.len(),
            bid_levels: self.bids.len(),
            ask_levels: self.asks.len(),
        }
    }

    /// Match the best bid against the best ask while their prices overlap,
    /// producing trade prints and mutating resting quantities in place.
    ///
    /// Runs to quiescence: after this returns, either one side is empty or
    /// the best bid is strictly below the best ask. Trades print at the
    /// current best ask. Within a level the earliest arrival fills first;
    /// the partially-filled side keeps its queue position. A single sweep
    /// may walk multiple levels and multiple orders per level.
    pub fn match_sweep(&mut self) -> Vec<Trade> {
        let mut trades = Vec::new();

        loop {
            let Some((&bid_price, bid_level)) = self.bids.last_key_value() else {
                break;
            };
            let Some((&ask_price, ask_level)) = self.asks.first_key_value() else {
                break;
            };
            if bid_price < ask_price {
                break;
            }

            // Non-empty levels always have a head (empty levels are removed
            // eagerly).
            let bid_idx = bid_level.head.unwrap();
            let ask_idx = ask_level.head.unwrap();

            let traded = cmp::min(
                self.arena[bid_idx].order.quantity,
                self.arena[ask_idx].order.quantity,
            );
            trades.push(Trade {
                bid_order_id: self.arena[bid_idx].order.id,
                ask_order_id: self.arena[ask_idx].order.id,
                quantity: traded,
                price: ask_price,
                executed_at: OffsetDateTime::now_utc(),
            });

            self.arena[bid_idx].order.quantity -= traded;
            self.arena[ask_idx].order.quantity -= traded;
            self.bids.get_mut(&bid_price).unwrap().aggregate_qty -= traded;
            self.asks.get_mut(&ask_price).unwrap().aggregate_qty -= traded;

            if self.arena[bid_idx].order.quantity == 0 {
                self.remove_resting(bid_idx);
            }
            if self.arena[ask_idx].order.quantity == 0 {
                self.remove_resting(ask_idx);
            }
        }

        trades
    }

    /// Remove an order (by arena index) from its price level and delete it
    /// from the book, cleaning up the level if it becomes empty.
    fn remove_resting(&mut self, idx: usize) -> Order {
        let side = self.arena[idx].order.side;
        let price = self.arena[idx].order.price;

        let level = match side {
            Side::Bid => self.bids.get_mut(&price).unwrap(),
            Side::Ask => self.asks.get_mut(&price).unwrap(),
        };
        level.unlink(&mut self.arena, idx);
        if level.is_empty() {
            match side {
                Side::Bid => self.bids.remove(&price),
                Side::Ask => self.asks.remove(&price),
            };
        }

        let node = self.arena.remove(idx);
        self.ids.remove(&node.order.id);
        node.order
    }
}

#[cfg(test)]
impl Book {
    /// Walk every level queue and cross-check the structural invariants:
    /// aggregates equal the sum of queued quantities, no empty level or
    /// zero-quantity order rests, the id index matches the queues exactly,
    /// and every order sits on the side and price of its level.
    fn assert_consistent(&self) {
        let mut seen = 0usize;
        for (side, levels) in [(Side::Bid, &self.bids), (Side::Ask, &self.asks)] {
            for (&price, level) in levels {
                assert!(!level.is_empty(), "empty level at {price} left in book");
                let mut sum = 0;
                let mut cursor = level.head;
                while let Some(idx) = cursor {
                    let order = &self.arena[idx].order;
                    assert!(order.quantity > 0, "order #{} rests with zero qty", order.id);
                    assert_eq!(order.side, side, "order #{} on wrong side", order.id);
                    assert_eq!(order.price, price, "order #{} on wrong level", order.id);
                    assert_eq!(
                        self.ids.get(&order.id),
                        Some(&idx),
                        "id index disagrees with queue for order #{}",
                        order.id
                    );
                    sum += order.quantity;
                    seen += 1;
                    cursor = self.arena[idx].next;
                }
                assert_eq!(
                    level.aggregate_qty, sum,
                    "aggregate at {price} diverged from queue sum"
                );
            }
        }
        assert_eq!(
            self.ids.len(),
            seen,
            "id index holds entries not reachable from any level"
        );
    }
}
