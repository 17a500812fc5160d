//! Fixtures for duty unit tests.

use chrono::{TimeZone, Utc};
use std::sync::Arc;

use super::bus::{bus, Inboxes};
use super::metrics;
use super::nonce::NonceSource;
use super::state::SharedState;
use super::DutyContext;
use crate::config::{AppConfig, SAMPLE_CONFIG};
use crate::exchange::{ExchangeApi, MockExchangeApi};
use crate::types::{Balance, Order, OrderSide, OrderState, PriceLevel, Ticker, TradingPair};

/// Exchange clock used by order fixtures, in milliseconds.
pub const SERVER_MS: i64 = 1_700_000_100_000;

pub fn config() -> AppConfig {
    AppConfig::from_toml_str(SAMPLE_CONFIG).unwrap()
}

/// Context over a mock with the sample config and an hourly limit of 100.
pub fn harness(mock: MockExchangeApi) -> (DutyContext, Inboxes) {
    harness_with(mock, config())
}

pub fn harness_with(mock: MockExchangeApi, config: AppConfig) -> (DutyContext, Inboxes) {
    harness_with_limit(mock, config, 100.0)
}

pub fn harness_with_limit(
    mock: MockExchangeApi,
    config: AppConfig,
    hourly_limit: f64,
) -> (DutyContext, Inboxes) {
    let (bus, inboxes) = bus();
    // The receiver is dropped on return, so recorded samples are discarded.
    let (metrics, _rx) = metrics::channel();
    let api: Arc<dyn ExchangeApi> = Arc::new(mock);
    let ctx = DutyContext {
        api,
        state: Arc::new(SharedState::new(config.trading.exchange_amount, hourly_limit)),
        bus,
        pair: Arc::new(TradingPair::sample()),
        config: Arc::new(config),
        nonces: Arc::new(NonceSource::new()),
        metrics,
    };
    (ctx, inboxes)
}

pub fn balance(asset_id: &str, total: f64, locked: f64) -> Balance {
    Balance {
        asset_id: asset_id.to_string(),
        total,
        locked,
    }
}

pub fn ticker(bid: f64, ask: f64) -> Ticker {
    Ticker {
        pair_id: "ONE-USDT".to_string(),
        bid: PriceLevel {
            price: bid,
            amount: 100.0,
        },
        ask: PriceLevel {
            price: ask,
            amount: 100.0,
        },
    }
}

pub fn order(id: &str, side: OrderSide) -> Order {
    order_at(id, side, SERVER_MS)
}

pub fn order_at(id: &str, side: OrderSide, inserted_ms: i64) -> Order {
    Order {
        id: id.to_string(),
        pair_id: TradingPair::sample().id,
        price: 1.0,
        amount: 1.0,
        filled_amount: 0.0,
        side,
        state: OrderState::Pending,
        inserted_at: Utc.timestamp_millis_opt(inserted_ms).unwrap(),
    }
}
