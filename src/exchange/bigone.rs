//! BigONE v2 REST client.
//!
//! Base URL is configured (normally `https://big.one/api/v2`).
//! Public endpoints: `/ping`, `/markets`, `/markets/{name}/ticker`,
//! `/one`, `/one/limitation`. Private endpoints live under `/viewer` and
//! need `Authorization: Bearer <jwt>`.
//!
//! Every response except `/ping` is wrapped as `{"data": ..., "errors": [...]}`;
//! a non-empty `errors` array is treated as a failure even on HTTP 200.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::debug;

use super::auth::JwtSigner;
use super::ExchangeApi;
use crate::config::Credentials;
use crate::types::{
    parse_number, Asset, Balance, ExchangeError, Order, OrderQuery, OrderRequest, OrderSide,
    PriceLevel, QuotaStats, Ticker, TradingPair,
};

// ---------------------------------------------------------------------------
// API response types (BigONE JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<ApiErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorMessage {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: i64,
}

#[derive(Debug, Deserialize)]
struct PingBody {
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct WireAsset {
    uuid: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMarket {
    uuid: String,
    name: String,
    base_scale: u32,
    base_asset: WireAsset,
    quote_scale: u32,
    quote_asset: WireAsset,
}

#[derive(Debug, Deserialize)]
struct WirePriceAmount {
    price: String,
    amount: String,
}

#[derive(Debug, Deserialize)]
struct WireTicker {
    #[serde(default)]
    market_uuid: String,
    bid: Option<WirePriceAmount>,
    ask: Option<WirePriceAmount>,
}

#[derive(Debug, Deserialize)]
struct WireBalance {
    asset_uuid: String,
    balance: String,
    locked_balance: String,
}

#[derive(Debug, Deserialize)]
struct WireOrder {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    market_uuid: String,
    #[serde(default)]
    market_id: String,
    price: String,
    amount: String,
    #[serde(default)]
    filled_amount: String,
    side: String,
    state: String,
    inserted_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct WireOrderList {
    #[serde(default)]
    edges: Vec<WireEdge>,
}

#[derive(Debug, Deserialize)]
struct WireEdge {
    node: WireOrder,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireHourlyQuota {
    #[serde(default)]
    trade_mine_one: f64,
    #[serde(default)]
    total_fee_btc: f64,
    #[serde(default)]
    stat_time: String,
    #[serde(default)]
    invite_mine_one: f64,
}

/// Order ids have been observed both as strings and as integers.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Wire → domain conversion
// ---------------------------------------------------------------------------

impl From<WireAsset> for Asset {
    fn from(a: WireAsset) -> Self {
        Asset {
            id: a.uuid,
            symbol: a.symbol,
            name: a.name,
        }
    }
}

impl From<WireMarket> for TradingPair {
    fn from(m: WireMarket) -> Self {
        TradingPair {
            id: m.uuid,
            name: m.name,
            base: m.base_asset.into(),
            base_scale: m.base_scale,
            quote: m.quote_asset.into(),
            quote_scale: m.quote_scale,
        }
    }
}

fn price_level(
    pair: &str,
    side: OrderSide,
    level: Option<WirePriceAmount>,
) -> std::result::Result<PriceLevel, ExchangeError> {
    let level = level.ok_or_else(|| ExchangeError::EmptyBook(pair.to_string(), side))?;
    Ok(PriceLevel {
        price: parse_number("ticker price", &level.price)?,
        amount: parse_number("ticker amount", &level.amount)?,
    })
}

fn convert_ticker(pair: &str, t: WireTicker) -> std::result::Result<Ticker, ExchangeError> {
    Ok(Ticker {
        pair_id: t.market_uuid,
        bid: price_level(pair, OrderSide::Bid, t.bid)?,
        ask: price_level(pair, OrderSide::Ask, t.ask)?,
    })
}

fn convert_balance(b: WireBalance) -> std::result::Result<Balance, ExchangeError> {
    Ok(Balance {
        total: parse_number("balance", &b.balance)?,
        locked: parse_number("locked_balance", &b.locked_balance)?,
        asset_id: b.asset_uuid,
    })
}

fn convert_order(o: WireOrder) -> std::result::Result<Order, ExchangeError> {
    let malformed = |message: String| ExchangeError::Malformed {
        endpoint: "viewer/orders".to_string(),
        message,
    };
    let side = o.side.parse().map_err(|e: anyhow::Error| malformed(e.to_string()))?;
    let state = o.state.parse().map_err(|e: anyhow::Error| malformed(e.to_string()))?;
    let filled_amount = if o.filled_amount.is_empty() {
        0.0
    } else {
        parse_number("filled_amount", &o.filled_amount)?
    };
    let pair_id = if o.market_uuid.is_empty() {
        o.market_id
    } else {
        o.market_uuid
    };

    Ok(Order {
        id: o.id,
        pair_id,
        price: parse_number("order price", &o.price)?,
        amount: parse_number("order amount", &o.amount)?,
        filled_amount,
        side,
        state,
        inserted_at: o.inserted_at,
    })
}

/// Decode an enveloped response body, failing on API errors or missing data.
fn decode_envelope<T: DeserializeOwned>(
    endpoint: &str,
    body: &str,
) -> std::result::Result<T, ExchangeError> {
    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|e| ExchangeError::Malformed {
            endpoint: endpoint.to_string(),
            message: format!("{e}; body: {body}"),
        })?;

    if !envelope.errors.is_empty() {
        let messages = envelope
            .errors
            .iter()
            .map(|e| format!("{} ({})", e.message, e.code))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ExchangeError::Api {
            endpoint: endpoint.to_string(),
            messages,
        });
    }

    envelope.data.ok_or_else(|| ExchangeError::Malformed {
        endpoint: endpoint.to_string(),
        message: format!("missing data; body: {body}"),
    })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// BigONE platform client.
pub struct BigOneClient {
    http: Client,
    base_url: String,
    signer: JwtSigner,
}

impl BigOneClient {
    pub fn new(endpoint: &str, credentials: Credentials, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("B1BOT/0.1.0")
            .build()
            .context("Failed to build HTTP client for BigONE")?;

        Ok(Self {
            http,
            base_url: endpoint.trim_end_matches('/').to_string(),
            signer: JwtSigner::new(credentials.app_key, credentials.app_secret),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, req: RequestBuilder, nonce: i64) -> Result<RequestBuilder> {
        Ok(req.header("Authorization", self.signer.bearer(nonce)?))
    }

    /// Send a request and return the raw body, failing on non-2xx.
    async fn send_raw(&self, endpoint: &str, req: RequestBuilder) -> Result<String> {
        debug!(endpoint, "BigONE request");

        let resp = req
            .send()
            .await
            .with_context(|| format!("BigONE request to {endpoint} failed"))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .with_context(|| format!("Failed to read BigONE response from {endpoint}"))?;

        if !status.is_success() {
            return Err(ExchangeError::Http {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        Ok(body)
    }

    async fn send<T: DeserializeOwned>(&self, endpoint: &str, req: RequestBuilder) -> Result<T> {
        let body = self.send_raw(endpoint, req).await?;
        Ok(decode_envelope(endpoint, &body)?)
    }
}

// ---------------------------------------------------------------------------
// ExchangeApi trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ExchangeApi for BigOneClient {
    async fn ping(&self) -> Result<i64> {
        let body = self.send_raw("ping", self.http.get(self.url("ping"))).await?;
        let ping: PingBody = serde_json::from_str(&body).map_err(|e| ExchangeError::Malformed {
            endpoint: "ping".to_string(),
            message: format!("{e}; body: {body}"),
        })?;
        Ok(ping.timestamp)
    }

    async fn list_markets(&self) -> Result<Vec<TradingPair>> {
        let markets: Vec<WireMarket> = self
            .send("markets", self.http.get(self.url("markets")))
            .await?;
        Ok(markets.into_iter().map(TradingPair::from).collect())
    }

    async fn get_ticker(&self, pair_name: &str) -> Result<Ticker> {
        let path = format!("markets/{}/ticker", urlencoding::encode(pair_name));
        let ticker: WireTicker = self.send(&path, self.http.get(self.url(&path))).await?;
        Ok(convert_ticker(pair_name, ticker)?)
    }

    async fn get_accounts(&self, nonce: i64) -> Result<Vec<Balance>> {
        let req = self.authorized(self.http.get(self.url("viewer/accounts")), nonce)?;
        let balances: Vec<WireBalance> = self.send("viewer/accounts", req).await?;
        Ok(balances
            .into_iter()
            .map(convert_balance)
            .collect::<std::result::Result<_, _>>()?)
    }

    async fn list_orders(&self, nonce: i64, query: &OrderQuery) -> Result<Vec<Order>> {
        let first = query.first.to_string();
        let req = self.http.get(self.url("viewer/orders")).query(&[
            ("market_id", query.pair_id.as_str()),
            ("first", first.as_str()),
            ("state", query.state.as_str()),
        ]);
        let req = self.authorized(req, nonce)?;
        let list: WireOrderList = self.send("viewer/orders", req).await?;
        Ok(list
            .edges
            .into_iter()
            .map(|e| convert_order(e.node))
            .collect::<std::result::Result<_, _>>()?)
    }

    async fn create_order(&self, nonce: i64, request: &OrderRequest) -> Result<Order> {
        let req = self.http.post(self.url("viewer/orders")).query(&[
            ("market_id", request.pair_id.as_str()),
            ("price", request.price.as_str()),
            ("amount", request.amount.as_str()),
            ("side", request.side.as_str()),
        ]);
        let req = self.authorized(req, nonce)?;
        let order: WireOrder = self.send("viewer/orders", req).await?;
        Ok(convert_order(order)?)
    }

    async fn cancel_order(&self, nonce: i64, order_id: &str) -> Result<Order> {
        let path = format!("viewer/orders/{}/cancel", urlencoding::encode(order_id));
        let req = self.authorized(self.http.post(self.url(&path)), nonce)?;
        let order: WireOrder = self.send(&path, req).await?;
        Ok(convert_order(order)?)
    }

    async fn cancel_all_orders(&self, nonce: i64, pair_id: &str) -> Result<()> {
        let endpoint = "viewer/orders/cancel_all";
        let req = self
            .http
            .post(self.url(endpoint))
            .query(&[("market_id", pair_id)]);
        let req = self.authorized(req, nonce)?;
        let body = self.send_raw(endpoint, req).await?;

        // The body shape is undocumented; only the error list matters.
        let envelope: Envelope<serde_json::Value> =
            serde_json::from_str(&body).unwrap_or(Envelope {
                data: None,
                errors: Vec::new(),
            });
        if !envelope.errors.is_empty() {
            decode_envelope::<serde_json::Value>(endpoint, &body)?;
        }
        Ok(())
    }

    async fn hourly_quota(&self) -> Result<QuotaStats> {
        let q: WireHourlyQuota = self.send("one", self.http.get(self.url("one"))).await?;
        Ok(QuotaStats {
            trade_reward: q.trade_mine_one,
            invite_reward: q.invite_mine_one,
            total_fee_btc: q.total_fee_btc,
            stat_time: q.stat_time,
        })
    }

    async fn daily_quota_limit(&self) -> Result<f64> {
        self.send("one/limitation", self.http.get(self.url("one/limitation")))
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
