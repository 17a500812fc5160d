//! Balance checker.
//!
//! On each tick: fetch balances and the ticker, commit them to shared
//! state, classify funding and hand off to the trader or the balancer.
//! A failed fetch aborts the cycle and leaves state untouched.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::bus::{CheckBalance, Duty, DutyKind, Rebalance};
use super::state::AccountUpdate;
use super::DutyContext;
use crate::strategy::{dispatch_for, CheckDispatch, FundingCode, Funds};
use crate::types::{Balance, TradeMode};

pub struct BalanceChecker {
    ctx: DutyContext,
}

impl BalanceChecker {
    pub fn new(ctx: DutyContext) -> Self {
        Self { ctx }
    }

    /// Fetch, commit and classify. Does not dispatch.
    pub async fn check(&self) -> Result<FundingCode> {
        let ctx = &self.ctx;
        let pair = &ctx.pair;

        let fresh = ctx
            .api
            .get_accounts(ctx.nonces.next())
            .await
            .context("Failed to fetch account balances")?;
        let ticker = ctx
            .api
            .get_ticker(&pair.name)
            .await
            .with_context(|| format!("Failed to fetch ticker for {}", pair.name))?;

        let mut balances = ctx.state.balances().await;
        for balance in fresh {
            balances.insert(balance.asset_id.clone(), balance);
        }

        let base = balance_of(&balances, &pair.base.id);
        let quote = balance_of(&balances, &pair.quote.id);
        let funds = Funds {
            base_total: base.total,
            base_available: base.available(),
            quote_total: quote.total,
            quote_available: quote.available(),
            ask_price: ticker.ask.price,
            bid_price: ticker.bid.price,
        };

        let trade_amount = ctx.state.trade_amount().await;
        let code = FundingCode::assess(
            funds.base_available,
            funds.quote_available,
            funds.ask_price,
            trade_amount,
        );

        info!(
            base = %pair.base.symbol,
            base_available = funds.base_available,
            quote = %pair.quote.symbol,
            quote_available = funds.quote_available,
            ticker = %ticker,
            trade_amount,
            code = %code,
            "Balance check"
        );

        ctx.state
            .apply_account(AccountUpdate {
                balances,
                ticker,
                funds,
            })
            .await;

        Ok(code)
    }

    async fn dispatch(&self, code: FundingCode) -> Result<()> {
        let bus = &self.ctx.bus;
        match dispatch_for(code, self.ctx.config.balancing.enabled) {
            CheckDispatch::Trade => bus.trade.send(TradeMode::Normal).await,
            CheckDispatch::Rebalance => bus.rebalance.send(Rebalance).await,
            CheckDispatch::Nothing => {
                warn!(code = %code, "Insufficient funds and rebalancing disabled");
                Ok(())
            }
        }
    }
}

/// An asset the account has never held counts as zero.
fn balance_of(balances: &std::collections::HashMap<String, Balance>, asset_id: &str) -> Balance {
    balances.get(asset_id).cloned().unwrap_or_else(|| Balance {
        asset_id: asset_id.to_string(),
        total: 0.0,
        locked: 0.0,
    })
}

#[async_trait]
impl Duty for BalanceChecker {
    type Signal = CheckBalance;

    fn kind(&self) -> DutyKind {
        DutyKind::BalanceChecker
    }

    async fn admit(&self, _signal: &CheckBalance) -> bool {
        let running = self.ctx.state.keep_running().await;
        if !running {
            debug!("Hourly quota reached, skipping balance check");
        }
        running
    }

    async fn handle(&self, _signal: CheckBalance) {
        let _timer = self.ctx.metrics.timer(DutyKind::BalanceChecker);
        let started = Instant::now();

        let code = match self.check().await {
            Ok(code) => code,
            Err(e) => {
                error!(error = %e, "Balance check failed");
                return;
            }
        };

        let relay = Duration::from_millis(self.ctx.config.trading.check_balance_relay_ms);
        tokio::time::sleep_until(started + relay).await;

        if let Err(e) = self.dispatch(code).await {
            error!(error = %e, code = %code, "Failed to dispatch after balance check");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
