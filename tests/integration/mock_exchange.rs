//! Mock exchange for integration testing.
//!
//! A deterministic, in-memory `ExchangeApi` that records every call it
//! receives. Balances, ticker, open orders and quota usage are all
//! controllable from test code.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::Mutex;

use b1bot::exchange::ExchangeApi;
use b1bot::types::*;

pub const PAIR_ID: &str = "d2185614-50c3-4588-b146-b8afe7534da6";
pub const BASE_ID: &str = "one-asset-id";
pub const QUOTE_ID: &str = "usdt-asset-id";

/// One recorded API call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Ping,
    ListMarkets,
    Ticker(String),
    Accounts,
    ListOrders(OrderState),
    CreateOrder {
        side: OrderSide,
        price: String,
        amount: String,
    },
    CancelOrder(String),
    CancelAll(String),
    HourlyQuota,
    DailyLimit,
}

pub struct MockExchange {
    calls: Mutex<Vec<Call>>,
    nonces: Mutex<Vec<i64>>,
    balances: Mutex<Vec<Balance>>,
    ticker: Mutex<Ticker>,
    orders: Mutex<Vec<Order>>,
    server_time_ms: Mutex<i64>,
    quota: Mutex<QuotaStats>,
    daily_limit: f64,
    /// If set, all operations will return this error.
    force_error: Mutex<Option<String>>,
}

impl MockExchange {
    /// ONE-USDT with both sides funded, ask 1.0, hourly limit 100.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            nonces: Mutex::new(Vec::new()),
            balances: Mutex::new(vec![
                balance(BASE_ID, 1000.0, 0.0),
                balance(QUOTE_ID, 1000.0, 0.0),
            ]),
            ticker: Mutex::new(ticker(0.99, 1.0)),
            orders: Mutex::new(Vec::new()),
            server_time_ms: Mutex::new(1_700_000_100_000),
            quota: Mutex::new(QuotaStats::default()),
            daily_limit: 2400.0,
            force_error: Mutex::new(None),
        }
    }

    pub fn set_balances(&self, base: (f64, f64), quote: (f64, f64)) {
        *self.balances.lock().unwrap() = vec![
            balance(BASE_ID, base.0, base.1),
            balance(QUOTE_ID, quote.0, quote.1),
        ];
    }

    pub fn set_ticker(&self, bid: f64, ask: f64) {
        *self.ticker.lock().unwrap() = ticker(bid, ask);
    }

    pub fn set_quota(&self, trade_reward: f64, invite_reward: f64) {
        *self.quota.lock().unwrap() = QuotaStats {
            trade_reward,
            invite_reward,
            total_fee_btc: 0.0,
            stat_time: "2026-01-01T10:00:00Z".to_string(),
        };
    }

    /// Add an open order inserted `age_ms` before the server clock.
    pub fn add_order(&self, id: &str, side: OrderSide, age_ms: i64) {
        let now = *self.server_time_ms.lock().unwrap();
        self.orders.lock().unwrap().push(Order {
            id: id.to_string(),
            pair_id: PAIR_ID.to_string(),
            price: 1.0,
            amount: 1.0,
            filled_amount: 0.0,
            side,
            state: OrderState::Pending,
            inserted_at: Utc.timestamp_millis_opt(now - age_ms).unwrap(),
        });
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn nonces(&self) -> Vec<i64> {
        self.nonces.lock().unwrap().clone()
    }

    pub fn created_orders(&self) -> Vec<(OrderSide, String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CreateOrder { side, price, amount } => Some((side, price, amount)),
                _ => None,
            })
            .collect()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CancelOrder(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", err));
        }
        Ok(())
    }

    fn record_signed(&self, nonce: i64, call: Call) -> Result<()> {
        self.nonces.lock().unwrap().push(nonce);
        self.record(call)
    }

    fn pair() -> TradingPair {
        TradingPair {
            id: PAIR_ID.to_string(),
            name: "ONE-USDT".to_string(),
            base: Asset {
                id: BASE_ID.to_string(),
                symbol: "ONE".to_string(),
                name: "BigONE Token".to_string(),
            },
            base_scale: 4,
            quote: Asset {
                id: QUOTE_ID.to_string(),
                symbol: "USDT".to_string(),
                name: "Tether".to_string(),
            },
            quote_scale: 2,
        }
    }
}

#[async_trait]
impl ExchangeApi for MockExchange {
    async fn ping(&self) -> Result<i64> {
        self.record(Call::Ping)?;
        Ok(*self.server_time_ms.lock().unwrap() * 1_000_000)
    }

    async fn list_markets(&self) -> Result<Vec<TradingPair>> {
        self.record(Call::ListMarkets)?;
        let mut other = Self::pair();
        other.id = "btc-usdt-id".to_string();
        other.name = "BTC-USDT".to_string();
        Ok(vec![other, Self::pair()])
    }

    async fn get_ticker(&self, pair_name: &str) -> Result<Ticker> {
        self.record(Call::Ticker(pair_name.to_string()))?;
        Ok(self.ticker.lock().unwrap().clone())
    }

    async fn get_accounts(&self, nonce: i64) -> Result<Vec<Balance>> {
        self.record_signed(nonce, Call::Accounts)?;
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn list_orders(&self, nonce: i64, query: &OrderQuery) -> Result<Vec<Order>> {
        self.record_signed(nonce, Call::ListOrders(query.state))?;
        Ok(self
            .orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.pair_id == query.pair_id && o.state == query.state)
            .take(query.first as usize)
            .cloned()
            .collect())
    }

    async fn create_order(&self, nonce: i64, request: &OrderRequest) -> Result<Order> {
        self.record_signed(
            nonce,
            Call::CreateOrder {
                side: request.side,
                price: request.price.clone(),
                amount: request.amount.clone(),
            },
        )?;
        Ok(Order {
            id: format!("order-{nonce}"),
            pair_id: request.pair_id.clone(),
            price: request.price.parse()?,
            amount: request.amount.parse()?,
            filled_amount: 0.0,
            side: request.side,
            state: OrderState::Pending,
            inserted_at: Utc::now(),
        })
    }

    async fn cancel_order(&self, nonce: i64, order_id: &str) -> Result<Order> {
        self.record_signed(nonce, Call::CancelOrder(order_id.to_string()))?;
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| anyhow!("order {order_id} not found"))?;
        order.state = OrderState::Canceled;
        Ok(order.clone())
    }

    async fn cancel_all_orders(&self, nonce: i64, pair_id: &str) -> Result<()> {
        self.record_signed(nonce, Call::CancelAll(pair_id.to_string()))?;
        for order in self.orders.lock().unwrap().iter_mut() {
            order.state = OrderState::Canceled;
        }
        Ok(())
    }

    async fn hourly_quota(&self) -> Result<QuotaStats> {
        self.record(Call::HourlyQuota)?;
        Ok(self.quota.lock().unwrap().clone())
    }

    async fn daily_quota_limit(&self) -> Result<f64> {
        self.record(Call::DailyLimit)?;
        Ok(self.daily_limit)
    }
}

fn balance(asset_id: &str, total: f64, locked: f64) -> Balance {
    Balance {
        asset_id: asset_id.to_string(),
        total,
        locked,
    }
}

fn ticker(bid: f64, ask: f64) -> Ticker {
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
