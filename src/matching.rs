// ===============================
// src/matching.rs
// ===============================
//
// Fill accounting:
// - MARKET trades at the tick price, LIMIT at the order's own price.
// - SELL: asset leaves `locked`, capital arrives in `free`.
// - BUY : asset arrives in `free`, capital leaves `locked`.
// Deltas are always [asset, capital].
//
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::asset::{Asset, AssetError, Balance};
use crate::domain::Tick;
use crate::metrics::{FILLS, ORDERS_FILLED, TICKS};
use crate::order::{Order, OrderError, OrderType, Side};
use crate::order_list::OrderList;

#[derive(Debug, Error, PartialEq)]
pub enum MatchError {
    #[error("order {id}: {kind:?} order passed to the {expected:?} matcher")]
    WrongType { id: u64, kind: OrderType, expected: OrderType },
    #[error("tick {tick_id}: market orders need a positive price, got {price}")]
    BadPrice { tick_id: u64, price: f64 },
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// Result of one order against one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: u64,
    pub side: Side,
    pub kind: OrderType,
    pub price: f64,
    /// Asset units traded.
    pub quantity: f64,
    /// Capital units exchanged.
    pub notional: f64,
    pub deltas: [Asset; 2],
}

impl Fill {
    fn new(order: &Order, price: f64, quantity: f64, notional: f64) -> Self {
        let (asset, capital) = match order.side {
            Side::Sell => (
                Asset::new(order.asset_name.clone(), 0.0, -quantity),
                Asset::new(order.capital_name.clone(), notional, 0.0),
            ),
            Side::Buy => (
                Asset::new(order.asset_name.clone(), quantity, 0.0),
                Asset::new(order.capital_name.clone(), 0.0, -notional),
            ),
        };
        Self {
            order_id: order.id,
            side: order.side,
            kind: order.kind,
            price,
            quantity,
            notional,
            deltas: [asset, capital],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.quantity <= 0.0
    }
}

/// Fills a MARKET order at the tick price. Nothing is mutated when the
/// order is not a MARKET order or the tick price is not positive.
pub fn match_market(order: &mut Order, tick: &mut Tick) -> Result<Fill, MatchError> {
    if order.kind != OrderType::Market {
        return Err(MatchError::WrongType {
            id: order.id,
            kind: order.kind,
            expected: OrderType::Market,
        });
    }
    let price = tick.price;
    if price <= 0.0 || price.is_nan() {
        return Err(MatchError::BadPrice { tick_id: tick.id, price });
    }
    let fill = match order.side {
        Side::Sell => {
            let quantity = order.asset_quantity.min(tick.volume);
            order.asset_quantity -= quantity;
            tick.volume -= quantity;
            Fill::new(order, price, quantity, quantity * price)
        }
        Side::Buy => {
            let available = price * tick.volume;
            let (notional, quantity) = if order.capital_quantity >= available {
                (available, tick.volume)
            } else {
                (order.capital_quantity, order.capital_quantity / price)
            };
            order.capital_quantity -= notional;
            tick.volume -= quantity;
            Fill::new(order, price, quantity, notional)
        }
    };
    Ok(fill)
}

/// Fills a LIMIT order at its own price once the tick crosses it. A tick
/// that does not cross leaves both sides untouched and yields an empty fill.
pub fn match_limit(order: &mut Order, tick: &mut Tick) -> Result<Fill, MatchError> {
    if order.kind != OrderType::Limit {
        return Err(MatchError::WrongType {
            id: order.id,
            kind: order.kind,
            expected: OrderType::Limit,
        });
    }
    let price = order.asset_price;
    if !order.can_match(tick.price)? {
        return Ok(Fill::new(order, price, 0.0, 0.0));
    }
    let quantity = order.asset_quantity.min(tick.volume);
    let notional = quantity * price;
    order.asset_quantity -= quantity;
    order.capital_quantity = if order.asset_quantity > 0.0 {
        (order.capital_quantity - notional).max(0.0)
    } else {
        0.0
    };
    tick.volume -= quantity;
    Ok(Fill::new(order, price, quantity, notional))
}

pub fn match_order(order: &mut Order, tick: &mut Tick) -> Result<Fill, MatchError> {
    match order.kind {
        OrderType::Market => match_market(order, tick),
        OrderType::Limit => match_limit(order, tick),
        kind => Err(OrderError::UnsupportedType { id: order.id, kind }.into()),
    }
}

/// Drives one tick through the head of `list`: fills are applied to
/// `balance` right away, fully filled orders are popped. Stops when the
/// list is empty, the head does not cross, or the tick runs dry.
///
/// Each fill is worked out on copies of the head and the tick and only
/// written back once `balance` has taken its deltas; on error, fills
/// already applied stay, the failing one leaves nothing behind.
pub fn run_tick(
    list: &mut OrderList,
    tick: &mut Tick,
    balance: &mut Balance,
) -> Result<Vec<Fill>, MatchError> {
    TICKS.inc();
    let mut fills = Vec::new();
    while tick.volume > 0.0 && list.can_match(tick.price)? {
        let Some(head) = list.front_mut() else { break };
        let mut order = head.clone();
        let mut rest = tick.clone();
        let fill = match_order(&mut order, &mut rest)?;
        let filled = order.is_filled();
        if fill.is_empty() && !filled {
            break;
        }
        balance.change(&fill.deltas)?;
        *head = order;
        *tick = rest;
        FILLS
            .with_label_values(&[side_label(fill.side), kind_label(fill.kind)])
            .inc();
        debug!(
            order_id = fill.order_id,
            qty = fill.quantity,
            px = fill.price,
            tick_id = tick.id,
            "fill"
        );
        fills.push(fill);
        if filled {
            list.pop();
            ORDERS_FILLED.inc();
        }
    }
    Ok(fills)
}

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

fn kind_label(kind: OrderType) -> &'static str {
    match kind {
        OrderType::Market => "market",
        OrderType::Limit => "limit",
        OrderType::StopLoss => "stop_loss",
    }
}
