//! Text codec for the line-oriented trading protocol.
//!
//! Commands are ASCII, space-delimited, one per line: `BUY <qty> <price>`,
//! `SELL <qty> <price>`, `CANCEL <id>`, `STATUS`. Responses are rendered as
//! single lines: `ORDER_ACCEPTED <id>`, `CANCEL_ACCEPTED <id>`, a `STATUS`
//! summary, `TRADE <bid_id> <ask_id> <qty> <price>` prints, and
//! `ERROR <reason>` for anything rejected. Parsing is strict: missing,
//! malformed, or trailing arguments are protocol errors and never reach the
//! book.

use crate::order::book::BookStatus;
use crate::order::{Id, Price, Qty};
use crate::trade::Trade;
use std::fmt::Display;
use thiserror::Error;

/// A parsed client command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
    Buy { quantity: Qty, price: Price },
    Sell { quantity: Qty, price: Price },
    Cancel { id: Id },
    Status,
}

/// Protocol-level parse errors, rendered to the client via [`error_line`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),
    #[error("invalid price: {0}")]
    InvalidPrice(String),
    #[error("invalid order id: {0}")]
    InvalidOrderId(String),
    #[error("trailing input: {0}")]
    TrailingInput(String),
    #[error("empty command")]
    Empty,
}

impl Command {
    /// Parse a single command line. The caller strips the line terminator.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut tokens = line.split_whitespace();
        let command = tokens.next().ok_or(ParseError::Empty)?;
        let parsed = match command {
            "BUY" | "SELL" => {
                let usage = if command == "BUY" {
                    "BUY <quantity> <price>"
                } else {
                    "SELL <quantity> <price>"
                };
                let quantity = tokens.next().ok_or(ParseError::Usage(usage))?;
                let price = tokens.next().ok_or(ParseError::Usage(usage))?;
                let quantity: Qty = quantity
                    .parse()
                    .map_err(|_| ParseError::InvalidQuantity(quantity.to_string()))?;
                let price: Price = price
                    .parse()
                    .map_err(|_| ParseError::InvalidPrice(price.to_string()))?;
                if command == "BUY" {
                    Command::Buy { quantity, price }
                } else {
                    Command::Sell { quantity, price }
                }
            }
            "CANCEL" => {
                let id = tokens.next().ok_or(ParseError::Usage("CANCEL <order_id>"))?;
                let id: Id = id
                    .parse()
                    .map_err(|_| ParseError::InvalidOrderId(id.to_string()))?;
                Command::Cancel { id }
            }
            "STATUS" => Command::Status,
            other => return Err(ParseError::UnknownCommand(other.to_string())),
        };

        if let Some(extra) = tokens.next() {
            return Err(ParseError::TrailingInput(extra.to_string()));
        }
        Ok(parsed)
    }
}

pub fn order_accepted(id: Id) -> String {
    format!("ORDER_ACCEPTED {id}")
}

pub fn cancel_accepted(id: Id) -> String {
    format!("CANCEL_ACCEPTED {id}")
}

pub fn status_line(status: &BookStatus) -> String {
    format!(
        "STATUS Orders: {}, Bid levels: {}, Ask levels: {}",
        status.orders, status.bid_levels, status.ask_levels
    )
}

pub fn trade_print(trade: &Trade) -> String {
    format!(
        "TRADE {} {} {} {}",
        trade.bid_order_id, trade.ask_order_id, trade.quantity, trade.price
    )
}

pub fn error_line(reason: &impl Display) -> String {
    format!("ERROR {reason}")
}
