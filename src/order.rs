// ===============================
// src/order.rs
// ===============================
//
// Order + priority rules (price-time):
// - MARKET always before LIMIT on the same side
// - MARKET vs MARKET: ascending id (FIFO)
// - LIMIT BUY: highest price first, LIMIT SELL: lowest price first
// Comparing across sides or with an unsupported type is an error, never
// a silently wrong answer.
//
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::asset::Asset;
use crate::domain::{self, CodecError};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    // belum didukung oleh matching
    StopLoss,
}

#[derive(Debug, Error, PartialEq)]
pub enum OrderError {
    #[error("can not compare order {left} ({left_side:?}) with order {right} ({right_side:?})")]
    SideMismatch {
        left: u64,
        left_side: Side,
        right: u64,
        right_side: Side,
    },
    #[error("order {id}: type {kind:?} is not supported")]
    UnsupportedType { id: u64, kind: OrderType },
}

/// A resting order. `asset_quantity` / `capital_quantity` are the
/// remaining unfilled amounts and shrink as fills happen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub symbol: String,
    pub asset_name: String,
    pub capital_name: String,
    pub side: Side,
    pub kind: OrderType,
    pub asset_quantity: f64,
    pub asset_price: f64,
    pub capital_quantity: f64,
}

impl Order {
    fn base(asset: &str, capital: &str, side: Side, kind: OrderType) -> Self {
        Self {
            id: next_id(),
            symbol: format!("{asset}{capital}"),
            asset_name: asset.to_string(),
            capital_name: capital.to_string(),
            side,
            kind,
            asset_quantity: 0.0,
            asset_price: 0.0,
            capital_quantity: 0.0,
        }
    }

    /// Market order. BUY is denominated in capital, SELL in asset.
    pub fn market(asset: &str, capital: &str, side: Side, quantity: f64) -> Self {
        let mut o = Self::base(asset, capital, side, OrderType::Market);
        match side {
            Side::Buy => o.capital_quantity = quantity,
            Side::Sell => o.asset_quantity = quantity,
        }
        o
    }

    pub fn limit(asset: &str, capital: &str, side: Side, quantity: f64, price: f64) -> Self {
        let mut o = Self::base(asset, capital, side, OrderType::Limit);
        o.asset_quantity = quantity;
        o.asset_price = price;
        o.capital_quantity = quantity * price;
        o
    }

    /// Strict priority within one side. `Ok(true)` means `self` trades
    /// before `other`.
    pub fn is_less_than(&self, other: &Order) -> Result<bool, OrderError> {
        if self.side != other.side {
            return Err(OrderError::SideMismatch {
                left: self.id,
                left_side: self.side,
                right: other.id,
                right_side: other.side,
            });
        }
        self.ensure_comparable()?;
        other.ensure_comparable()?;
        let less = match (self.kind, other.kind) {
            (OrderType::Market, OrderType::Market) => self.id < other.id,
            (OrderType::Market, OrderType::Limit) => true,
            (OrderType::Limit, OrderType::Market) => false,
            _ => match self.side {
                Side::Buy => self.asset_price > other.asset_price,
                Side::Sell => self.asset_price < other.asset_price,
            },
        };
        Ok(less)
    }

    fn ensure_comparable(&self) -> Result<(), OrderError> {
        match self.kind {
            OrderType::Market | OrderType::Limit => Ok(()),
            kind => Err(OrderError::UnsupportedType { id: self.id, kind }),
        }
    }

    /// Whether a tick at `price` is allowed to trade with this order.
    pub fn can_match(&self, price: f64) -> Result<bool, OrderError> {
        match (self.kind, self.side) {
            (OrderType::Market, _) => Ok(true),
            (OrderType::Limit, Side::Buy) => Ok(price <= self.asset_price),
            (OrderType::Limit, Side::Sell) => Ok(price >= self.asset_price),
            (kind, _) => Err(OrderError::UnsupportedType { id: self.id, kind }),
        }
    }

    /// Unfilled amount: capital for MARKET BUY, asset for the rest.
    pub fn remaining(&self) -> f64 {
        match (self.kind, self.side) {
            (OrderType::Market, Side::Buy) => self.capital_quantity,
            _ => self.asset_quantity,
        }
    }

    pub fn is_filled(&self) -> bool {
        self.remaining() <= 0.0
    }

    /// Delta that moves this order's funds from free to locked.
    pub fn reserve(&self) -> Asset {
        match self.side {
            Side::Sell => Asset::new(
                self.asset_name.clone(),
                -self.asset_quantity,
                self.asset_quantity,
            ),
            Side::Buy => Asset::new(
                self.capital_name.clone(),
                -self.capital_quantity,
                self.capital_quantity,
            ),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        domain::encode(self)
    }

    pub fn decode(bs: &[u8]) -> Result<Order, CodecError> {
        domain::decode(bs)
    }
}

/// Comparison that tolerates a missing receiver: nothing is ever less
/// than anything when there is no order.
pub fn is_less_than(order: Option<&Order>, other: &Order) -> Result<bool, OrderError> {
    match order {
        Some(o) => o.is_less_than(other),
        None => Ok(false),
    }
}

pub fn can_match(order: Option<&Order>, price: f64) -> Result<bool, OrderError> {
    match order {
        Some(o) => o.can_match(price),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_next_id(o: &Order) -> Order {
        Order { id: o.id + 1, ..o.clone() }
    }

    #[test]
    fn limit_order_survives_encode_decode() {
        let src = Order::limit("BTC", "USDT", Side::Buy, 100.0, 10000.0);
        let back = Order::decode(&src.encode().unwrap()).unwrap();
        assert_eq!(back, src);
        assert_eq!(back.capital_quantity, 1_000_000.0);
    }

    #[test]
    fn missing_order_is_never_less() {
        let o = Order::market("BTC", "USDT", Side::Buy, 1.0);
        assert_eq!(is_less_than(None, &o), Ok(false));
        assert_eq!(can_match(None, 1.0), Ok(false));
    }

    #[test]
    fn different_sides_do_not_compare() {
        let lb = Order::limit("BTC", "USDT", Side::Buy, 100.0, 100000.0);
        let ms = Order::market("BTC", "USDT", Side::Sell, 100.0);
        assert!(matches!(lb.is_less_than(&ms), Err(OrderError::SideMismatch { .. })));
        assert!(matches!(ms.is_less_than(&lb), Err(OrderError::SideMismatch { .. })));
    }

    #[test]
    fn buy_side_priority() {
        let mb0 = Order::market("BTC", "USDT", Side::Buy, 10000.0);
        let mb1 = with_next_id(&mb0);
        let lb0 = Order::limit("BTC", "USDT", Side::Buy, 100.0, 110000.0);
        let lb1 = Order::limit("BTC", "USDT", Side::Buy, 100.0, 100000.0);

        assert_eq!(mb0.is_less_than(&mb1), Ok(true));
        assert_eq!(mb1.is_less_than(&mb0), Ok(false));

        assert_eq!(lb0.is_less_than(&lb1), Ok(true));
        assert_eq!(lb1.is_less_than(&lb0), Ok(false));

        assert_eq!(mb0.is_less_than(&lb0), Ok(true));
        assert_eq!(mb1.is_less_than(&lb1), Ok(true));
        assert_eq!(lb0.is_less_than(&mb0), Ok(false));
        assert_eq!(lb1.is_less_than(&mb1), Ok(false));
    }

    #[test]
    fn sell_side_priority() {
        let ms0 = Order::market("BTC", "USDT", Side::Sell, 100.0);
        let ms1 = with_next_id(&ms0);
        let ls0 = Order::limit("BTC", "USDT", Side::Sell, 100.0, 100000.0);
        let ls1 = Order::limit("BTC", "USDT", Side::Sell, 100.0, 110000.0);

        assert_eq!(ms0.is_less_than(&ms1), Ok(true));
        assert_eq!(ms1.is_less_than(&ms0), Ok(false));

        assert_eq!(ls0.is_less_than(&ls1), Ok(true));
        assert_eq!(ls1.is_less_than(&ls0), Ok(false));

        assert_eq!(ms0.is_less_than(&ls0), Ok(true));
        assert_eq!(ls1.is_less_than(&ms1), Ok(false));
    }

    #[test]
    fn equal_limit_prices_are_not_less() {
        let a = Order::limit("BTC", "USDT", Side::Sell, 1.0, 100.0);
        let b = Order::limit("BTC", "USDT", Side::Sell, 2.0, 100.0);
        assert_eq!(a.is_less_than(&b), Ok(false));
        assert_eq!(b.is_less_than(&a), Ok(false));
    }

    #[test]
    fn only_market_and_limit_compare() {
        let mut ms = Order::market("BTC", "USDT", Side::Sell, 100.0);
        ms.kind = OrderType::StopLoss;
        let mut ls = Order::limit("BTC", "USDT", Side::Sell, 100.0, 100000.0);
        ls.kind = OrderType::StopLoss;
        assert!(matches!(ms.is_less_than(&ls), Err(OrderError::UnsupportedType { .. })));
        assert!(matches!(ms.can_match(1.0), Err(OrderError::UnsupportedType { .. })));
    }

    #[test]
    fn can_match_by_type_and_side() {
        let mb = Order::market("BTC", "USDT", Side::Buy, 1.0);
        assert_eq!(mb.can_match(0.0), Ok(true));

        let lb = Order::limit("BTC", "USDT", Side::Buy, 1.0, 100.0);
        assert_eq!(lb.can_match(100.0), Ok(true));
        assert_eq!(lb.can_match(99.0), Ok(true));
        assert_eq!(lb.can_match(101.0), Ok(false));

        let ls = Order::limit("BTC", "USDT", Side::Sell, 1.0, 100.0);
        assert_eq!(ls.can_match(100.0), Ok(true));
        assert_eq!(ls.can_match(101.0), Ok(true));
        assert_eq!(ls.can_match(99.0), Ok(false));
    }

    #[test]
    fn reserve_locks_the_right_leg() {
        let ls = Order::limit("BTC", "USDT", Side::Sell, 2.0, 100.0);
        assert_eq!(ls.reserve(), Asset::new("BTC", -2.0, 2.0));
        let mb = Order::market("BTC", "USDT", Side::Buy, 500.0);
        assert_eq!(mb.reserve(), Asset::new("USDT", -500.0, 500.0));
        assert_eq!(mb.remaining(), 500.0);
    }
}
