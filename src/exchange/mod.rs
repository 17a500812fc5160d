//! Exchange integration.
//!
//! Defines the `ExchangeApi` trait the engine consumes and provides the
//! BigONE v2 REST implementation plus its JWT request signer.

pub mod auth;
pub mod bigone;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Balance, Order, OrderQuery, OrderRequest, QuotaStats, Ticker, TradingPair};

/// Abstraction over the exchange's REST API.
///
/// Authenticated calls take a caller-supplied nonce; every nonce must be
/// used at most once, including across concurrent calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Exchange server time in nanoseconds since the epoch.
    async fn ping(&self) -> Result<i64>;

    /// All listed markets.
    async fn list_markets(&self) -> Result<Vec<TradingPair>>;

    /// Top-of-book for a market, looked up by market name.
    async fn get_ticker(&self, pair_name: &str) -> Result<Ticker>;

    /// Balances for every asset on the account.
    async fn get_accounts(&self, nonce: i64) -> Result<Vec<Balance>>;

    /// One page of the account's orders matching the query.
    async fn list_orders(&self, nonce: i64, query: &OrderQuery) -> Result<Vec<Order>>;

    /// Place a limit order.
    async fn create_order(&self, nonce: i64, request: &OrderRequest) -> Result<Order>;

    /// Cancel one order by id.
    async fn cancel_order(&self, nonce: i64, order_id: &str) -> Result<Order>;

    /// Cancel every open order in a market.
    async fn cancel_all_orders(&self, nonce: i64, pair_id: &str) -> Result<()>;

    /// Trade- and invite-mining totals for the current hour.
    async fn hourly_quota(&self) -> Result<QuotaStats>;

    /// The daily mining limit.
    async fn daily_quota_limit(&self) -> Result<f64>;
}
