//! Status route handlers.
//!
//! `/info` is a plain-text dump for eyeballing with curl; `/api/status`
//! carries the same fields as JSON plus duty states and cycle timings.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::engine::bus::DutyState;
use crate::engine::metrics::{CycleStats, DutyTiming};
use crate::engine::state::SharedState;
use crate::engine::{DutyMonitors, RunningEngine};
use crate::strategy::quota::used_percent;
use crate::strategy::Funds;
use crate::types::{QuotaStats, Ticker, TradingPair};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Read-only handles into a running engine.
pub struct DashboardState {
    pub state: Arc<SharedState>,
    pub pair: Arc<TradingPair>,
    pub balance_percent: u32,
    pub monitors: Arc<DutyMonitors>,
    pub timings: Arc<CycleStats>,
    pub started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(
        state: Arc<SharedState>,
        pair: Arc<TradingPair>,
        balance_percent: u32,
        monitors: Arc<DutyMonitors>,
        timings: Arc<CycleStats>,
    ) -> Self {
        Self {
            state,
            pair,
            balance_percent,
            monitors,
            timings,
            started_at: Utc::now(),
        }
    }

    pub fn from_engine(engine: &RunningEngine) -> Self {
        Self::new(
            engine.state(),
            engine.pair(),
            engine.config().balancing.balance_percent,
            engine.monitors(),
            engine.cycle_stats(),
        )
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub pair: String,
    pub keep_running: bool,
    pub trade_amount: f64,
    pub balance_percent: u32,
    pub funds: Funds,
    pub ticker: Option<Ticker>,
    pub hourly_limit: f64,
    pub quota: Option<QuotaStats>,
    pub quota_used_percent: Option<f64>,
    pub last_balance_check: Option<String>,
    pub duties: Vec<DutyStatus>,
    pub timings: BTreeMap<String, DutyTiming>,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DutyStatus {
    pub name: String,
    pub state: DutyState,
    pub in_flight: usize,
    pub accepted: u64,
    pub dropped: u64,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(app): State<AppState>) -> Json<StatusResponse> {
    let snap = app.state.snapshot().await;
    let quota_used_percent = snap
        .quota
        .as_ref()
        .map(|q| used_percent(q, snap.hourly_limit))
        .filter(|pct| pct.is_finite());

    let duties = app
        .monitors
        .all()
        .iter()
        .map(|m| DutyStatus {
            name: m.kind().to_string(),
            state: m.state(),
            in_flight: m.in_flight(),
            accepted: m.accepted(),
            dropped: m.dropped(),
        })
        .collect();

    Json(StatusResponse {
        pair: app.pair.name.clone(),
        keep_running: snap.keep_running,
        trade_amount: snap.trade_amount,
        balance_percent: app.balance_percent,
        funds: snap.funds,
        ticker: snap.ticker,
        hourly_limit: snap.hourly_limit,
        quota: snap.quota,
        quota_used_percent,
        last_balance_check: snap.last_balance_check.map(|t| t.to_rfc3339()),
        duties,
        timings: app.timings.snapshot().await,
        uptime_secs: (Utc::now() - app.started_at).num_seconds(),
    })
}

/// GET /info
pub async fn get_info(State(app): State<AppState>) -> String {
    let snap = app.state.snapshot().await;
    let f = &snap.funds;
    let ticker = snap
        .ticker
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string());
    let quota = snap
        .quota
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string());

    let mut out = String::new();
    let rows: [(&str, String); 12] = [
        ("pair", app.pair.name.clone()),
        ("balancePercent", app.balance_percent.to_string()),
        ("baseBalance", format!("{:.8}", f.base_total)),
        ("quoteBalance", format!("{:.8}", f.quote_total)),
        ("baseAvailable", format!("{:.8}", f.base_available)),
        ("quoteAvailable", format!("{:.8}", f.quote_available)),
        ("askPrice", format!("{:.8}", f.ask_price)),
        ("bidPrice", format!("{:.8}", f.bid_price)),
        ("currentTicker", ticker),
        ("limitation", format!("{:.8}", snap.hourly_limit)),
        ("keepRunning", snap.keep_running.to_string()),
        ("quota", quota),
    ];
    for (key, value) in rows {
        let _ = writeln!(out, "{key:<16}{value}");
    }
    let _ = writeln!(out, "{:<16}{}", "tradeAmount", snap.trade_amount);
    out
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
