//! Engine state shared by all duties.
//!
//! One `SharedState` owns the mutable trading state behind a single
//! reader/writer lock. Duties go through the accessors below and never
//! hold the lock across a network call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::strategy::Funds;
use crate::types::{Balance, QuotaStats, Ticker};

/// Point-in-time copy of the engine state.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// False while the hourly quota is exhausted.
    pub keep_running: bool,
    pub trade_amount: f64,
    /// Balances keyed by asset id.
    pub balances: HashMap<String, Balance>,
    pub ticker: Option<Ticker>,
    pub funds: Funds,
    pub hourly_limit: f64,
    pub quota: Option<QuotaStats>,
    pub last_balance_check: Option<DateTime<Utc>>,
}

/// Result of one successful balance check, committed as a unit.
#[derive(Debug, Clone)]
pub struct AccountUpdate {
    pub balances: HashMap<String, Balance>,
    pub ticker: Ticker,
    pub funds: Funds,
}

pub struct SharedState {
    inner: RwLock<Snapshot>,
}

impl SharedState {
    pub fn new(trade_amount: f64, hourly_limit: f64) -> Self {
        Self {
            inner: RwLock::new(Snapshot {
                keep_running: true,
                trade_amount,
                balances: HashMap::new(),
                ticker: None,
                funds: Funds::default(),
                hourly_limit,
                quota: None,
                last_balance_check: None,
            }),
        }
    }

    pub async fn keep_running(&self) -> bool {
        self.inner.read().await.keep_running
    }

    /// Returns the previous value.
    pub async fn set_keep_running(&self, keep_running: bool) -> bool {
        let mut state = self.inner.write().await;
        std::mem::replace(&mut state.keep_running, keep_running)
    }

    pub async fn trade_amount(&self) -> f64 {
        self.inner.read().await.trade_amount
    }

    /// Multiply the trade amount by `fraction`; returns `(old, new)`.
    pub async fn shrink_trade_amount(&self, fraction: f64) -> (f64, f64) {
        let mut state = self.inner.write().await;
        let old = state.trade_amount;
        state.trade_amount = old * fraction;
        (old, state.trade_amount)
    }

    /// Copy of the cached balances, for merging a fresh account listing.
    pub async fn balances(&self) -> HashMap<String, Balance> {
        self.inner.read().await.balances.clone()
    }

    pub async fn apply_account(&self, update: AccountUpdate) {
        let mut state = self.inner.write().await;
        state.balances = update.balances;
        state.ticker = Some(update.ticker);
        state.funds = update.funds;
        state.last_balance_check = Some(Utc::now());
    }

    pub async fn funds(&self) -> Funds {
        self.inner.read().await.funds
    }

    pub async fn hourly_limit(&self) -> f64 {
        self.inner.read().await.hourly_limit
    }

    pub async fn record_quota(&self, stats: QuotaStats) {
        self.inner.write().await.quota = Some(stats);
    }

    pub async fn last_quota(&self) -> Option<QuotaStats> {
        self.inner.read().await.quota.clone()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriceLevel;

    fn ticker() -> Ticker {
        Ticker {
            pair_id: "ONE-USDT".to_string(),
            bid: PriceLevel {
                price: 0.9,
                amount: 10.0,
            },
            ask: PriceLevel {
                price: 1.1,
                amount: 10.0,
            },
        }
    }

    #[tokio::test]
    async fn test_starts_running() {
        let state = SharedState::new(5.0, 100.0);
        assert!(state.keep_running().await);
        assert_eq!(state.trade_amount().await, 5.0);
        assert_eq!(state.hourly_limit().await, 100.0);
        assert!(state.last_quota().await.is_none());
    }

    #[tokio::test]
    async fn test_set_keep_running_returns_previous() {
        let state = SharedState::new(1.0, 1.0);
        assert!(state.set_keep_running(false).await);
        assert!(!state.set_keep_running(true).await);
        assert!(state.keep_running().await);
    }

    #[tokio::test]
    async fn test_shrink_compounds() {
        let state = SharedState::new(100.0, 1.0);
        assert_eq!(state.shrink_trade_amount(0.5).await, (100.0, 50.0));
        assert_eq!(state.shrink_trade_amount(0.5).await, (50.0, 25.0));
        assert_eq!(state.trade_amount().await, 25.0);
    }

    #[tokio::test]
    async fn test_apply_account_commits_together() {
        let state = SharedState::new(1.0, 1.0);
        let mut balances = HashMap::new();
        balances.insert(
            "base-uuid".to_string(),
            Balance {
                asset_id: "base-uuid".to_string(),
                total: 10.0,
                locked: 2.0,
            },
        );
        let funds = Funds {
            base_total: 10.0,
            base_available: 8.0,
            ask_price: 1.1,
            bid_price: 0.9,
            ..Default::default()
        };

        state
            .apply_account(AccountUpdate {
                balances,
                ticker: ticker(),
                funds,
            })
            .await;

        let snap = state.snapshot().await;
        assert_eq!(snap.funds, funds);
        assert_eq!(snap.ticker, Some(ticker()));
        assert_eq!(snap.balances["base-uuid"].available(), 8.0);
        assert!(snap.last_balance_check.is_some());
    }
}
