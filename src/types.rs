//! Shared types for the B1BOT trader.
//!
//! These types form the data model used across all modules. Exchange
//! wire payloads are converted into these at the client boundary, so
//! the engine and strategy modules never see raw JSON or numeric strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Trading pair
// ---------------------------------------------------------------------------

/// A single asset listed on the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Exchange-assigned asset UUID (balances are keyed by this).
    pub id: String,
    pub symbol: String,
    pub name: String,
}

/// A tradable base/quote market, discovered once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingPair {
    /// Market UUID, used when creating and listing orders.
    pub id: String,
    /// Market name such as `ONE-USDT`, used for ticker lookups.
    pub name: String,
    pub base: Asset,
    /// Decimal places used when formatting order prices.
    pub base_scale: u32,
    pub quote: Asset,
    /// Decimal places used when formatting order amounts.
    pub quote_scale: u32,
}

impl TradingPair {
    /// Format a price for the wire using the pair's base scale.
    pub fn format_price(&self, price: f64) -> String {
        format!("{:.*}", self.base_scale as usize, price)
    }

    /// Format an amount for the wire using the pair's quote scale.
    pub fn format_amount(&self, amount: f64) -> String {
        format!("{:.*}", self.quote_scale as usize, amount)
    }

    /// Helper to build a test/sample pair with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        TradingPair {
            id: "d2185614-50c3-4588-b146-b8afe7534da6".to_string(),
            name: "ONE-USDT".to_string(),
            base: Asset {
                id: "base-uuid".to_string(),
                symbol: "ONE".to_string(),
                name: "BigONE Token".to_string(),
            },
            base_scale: 4,
            quote: Asset {
                id: "quote-uuid".to_string(),
                symbol: "USDT".to_string(),
                name: "Tether".to_string(),
            },
            quote_scale: 2,
        }
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} scale {} / {} scale {})",
            self.name, self.base.symbol, self.base_scale, self.quote.symbol, self.quote_scale
        )
    }
}

// ---------------------------------------------------------------------------
// Balances and prices
// ---------------------------------------------------------------------------

/// Account balance for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset_id: String,
    pub total: f64,
    /// Amount reserved by open orders.
    pub locked: f64,
}

impl Balance {
    /// Total minus the amount reserved by open orders.
    pub fn available(&self) -> f64 {
        self.total - self.locked
    }
}

/// Best price and size on one side of the book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub amount: f64,
}

/// Top-of-book snapshot for a pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub pair_id: String,
    pub bid: PriceLevel,
    pub ask: PriceLevel,
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bid {}@{} | ask {}@{}",
            self.bid.amount, self.bid.price, self.ask.amount, self.ask.price
        )
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Bid,
    Ask,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Bid => "BID",
            OrderSide::Ask => "ASK",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderSide {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BID" => Ok(OrderSide::Bid),
            "ASK" => Ok(OrderSide::Ask),
            other => anyhow::bail!("Unknown order side: {other}"),
        }
    }
}

/// Order lifecycle state as reported by the exchange. Parsing ignores
/// case and accepts the exchange's historical `CANCLED` spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum OrderState {
    Pending,
    Filled,
    Canceled,
}

impl TryFrom<String> for OrderState {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Pending => "PENDING",
            OrderState::Filled => "FILLED",
            OrderState::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(OrderState::Pending),
            "FILLED" => Ok(OrderState::Filled),
            "CANCELED" | "CANCLED" => Ok(OrderState::Canceled),
            other => anyhow::bail!("Unknown order state: {other}"),
        }
    }
}

/// An order on the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub pair_id: String,
    pub price: f64,
    pub amount: f64,
    pub filled_amount: f64,
    pub side: OrderSide,
    pub state: OrderState,
    /// Server-assigned insertion time.
    pub inserted_at: DateTime<Utc>,
}

/// Parameters for a new limit order. Price and amount are already
/// formatted to the pair's scales.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub pair_id: String,
    pub side: OrderSide,
    pub price: String,
    pub amount: String,
}

/// Filter for listing orders.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderQuery {
    pub pair_id: String,
    pub state: OrderState,
    /// Page size.
    pub first: u32,
}

/// Why a BID/ASK pair is being placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeMode {
    /// Regular volume trade at full size.
    Normal,
    /// Follow-up trade after a rebalance, scaled down.
    Rebalance,
}

/// Which open orders a cancellation scan may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CancelFilter {
    Bids,
    Asks,
    All,
}

impl CancelFilter {
    pub fn matches(&self, side: OrderSide) -> bool {
        match self {
            CancelFilter::Bids => side == OrderSide::Bid,
            CancelFilter::Asks => side == OrderSide::Ask,
            CancelFilter::All => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Quota
// ---------------------------------------------------------------------------

/// Per-hour trade-mining statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuotaStats {
    /// Trade-mining reward earned this hour.
    pub trade_reward: f64,
    /// Invite-mining reward earned this hour.
    pub invite_reward: f64,
    pub total_fee_btc: f64,
    pub stat_time: String,
}

impl QuotaStats {
    pub fn consumed(&self) -> f64 {
        self.trade_reward + self.invite_reward
    }
}

impl fmt::Display for QuotaStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trade {} + invite {} @ {}",
            self.trade_reward, self.invite_reward, self.stat_time
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures talking to the exchange.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("HTTP {status} from {endpoint}: {body}")]
    Http {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("API errors from {endpoint}: {messages}")]
    Api { endpoint: String, messages: String },

    #[error("Malformed response from {endpoint}: {message}")]
    Malformed { endpoint: String, message: String },

    #[error("Ticker for {0} has an empty {1} side")]
    EmptyBook(String, OrderSide),

    #[error("Cannot parse {field} value {value:?} as a number")]
    Number { field: &'static str, value: String },
}

/// Errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The configured pair is not listed. Retrying cannot fix this.
    #[error("Trading pair {0} not found on the exchange")]
    PairNotFound(String),

    #[error("Failed to fetch quota limit: {0}")]
    Quota(String),

    #[error("Failed to list markets: {0}")]
    Markets(String),
}

impl StartupError {
    /// Whether waiting and trying again could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StartupError::PairNotFound(_))
    }
}

/// Parse an exchange numeric string with full `f64` precision.
pub fn parse_number(field: &'static str, value: &str) -> Result<f64, ExchangeError> {
    value.trim().parse::<f64>().map_err(|_| ExchangeError::Number {
        field,
        value: value.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
