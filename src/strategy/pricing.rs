//! Order pricing and sizing for volume trades and rebalances.

use crate::types::{OrderRequest, OrderSide, TradeMode, TradingPair};

/// Size multiplier for a trade of the given mode.
pub fn trade_scale(mode: TradeMode, rebalance_fraction: f64) -> f64 {
    match mode {
        TradeMode::Normal => 1.0,
        TradeMode::Rebalance => rebalance_fraction,
    }
}

/// Price for both legs of a volume trade: the ask shifted by the expected
/// spread, kept non-negative.
pub fn volume_price(ask_price: f64, expected_spread: f64) -> f64 {
    (ask_price - expected_spread).abs()
}

/// A BID and an ASK at the same price and size.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPair {
    pub bid: OrderRequest,
    pub ask: OrderRequest,
}

pub fn volume_pair(
    pair: &TradingPair,
    ask_price: f64,
    expected_spread: f64,
    trade_amount: f64,
    scale: f64,
) -> OrderPair {
    let price = pair.format_price(volume_price(ask_price, expected_spread));
    let amount = pair.format_amount(trade_amount * scale);
    OrderPair {
        bid: OrderRequest {
            pair_id: pair.id.clone(),
            side: OrderSide::Bid,
            price: price.clone(),
            amount: amount.clone(),
        },
        ask: OrderRequest {
            pair_id: pair.id.clone(),
            side: OrderSide::Ask,
            price,
            amount,
        },
    }
}

/// A single formatted order.
pub fn single_order(pair: &TradingPair, side: OrderSide, price: f64, amount: f64) -> OrderRequest {
    OrderRequest {
        pair_id: pair.id.clone(),
        side,
        price: pair.format_price(price),
        amount: pair.format_amount(amount),
    }
}
