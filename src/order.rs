use rust_decimal::Decimal;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}

pub type Id = u64;
pub type ClientId = u64;
pub type Price = Decimal;
pub type Qty = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: Id,
    pub client_id: ClientId,
    pub side: Side,
    pub price: Price,
    pub quantity: Qty,
}

impl Order {
    pub fn new(id: Id, client_id: ClientId, side: Side, price: Price, quantity: Qty) -> Self {
        Order {
            id,
            client_id,
            side,
            price,
            quantity,
        }
    }
}

pub mod book;
