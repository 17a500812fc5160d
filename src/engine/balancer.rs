//! Balancer.
//!
//! Restores inventory when the balance check finds one side short. Works
//! from the totals and prices cached by the last balance check, and may
//! pause the canceller while it runs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{error, info, warn};

use super::bus::{Duty, DutyKind, PauseGuard, Rebalance};
use super::DutyContext;
use crate::strategy::pricing::single_order;
use crate::strategy::{plan_rebalance, RebalanceParams, RebalancePlan};
use crate::types::{CancelFilter, OrderSide, TradeMode};

pub struct Balancer {
    ctx: DutyContext,
}

impl Balancer {
    pub fn new(ctx: DutyContext) -> Self {
        Self { ctx }
    }

    /// Plan and carry out one rebalance. `pause` is released before any
    /// signal is sent to the canceller.
    pub async fn rebalance(&self, pause: Option<PauseGuard>) -> Result<RebalancePlan> {
        let ctx = &self.ctx;
        let funds = ctx.state.funds().await;
        let params = RebalanceParams {
            trade_amount: ctx.state.trade_amount().await,
            balance_fraction: ctx.config.balancing.balance_fraction(),
            shrink_fraction: ctx.config.balancing.exchange_fraction(),
        };
        let (code, plan) = plan_rebalance(&funds, &params);
        info!(code = %code, plan = ?plan, "Rebalance planned");

        match plan {
            RebalancePlan::Buy { amount } => {
                self.replenish(OrderSide::Bid, amount).await?;
            }
            RebalancePlan::Sell { amount } => {
                self.replenish(OrderSide::Ask, amount).await?;
            }
            RebalancePlan::CancelAsks { needed, available } => {
                warn!(needed, available, "Not enough free quote to buy, cancelling asks");
                drop(pause);
                ctx.bus.cancel.send(CancelFilter::Asks).await?;
            }
            RebalancePlan::CancelBids { needed, available } => {
                warn!(needed, available, "Not enough free base to sell, cancelling bids");
                drop(pause);
                ctx.bus.cancel.send(CancelFilter::Bids).await?;
            }
            RebalancePlan::CancelAllAndTrade => {
                info!("Funds are tied up in open orders, cancelling all and trading");
                drop(pause);
                ctx.bus.cancel.send(CancelFilter::All).await?;
                ctx.bus.trade.send(TradeMode::Rebalance).await?;
            }
            RebalancePlan::ShrinkTradeAmount { .. } => {
                let (from, to) = ctx
                    .state
                    .shrink_trade_amount(params.shrink_fraction)
                    .await;
                warn!(from, to, "Both assets short, trade amount reduced");
            }
        }
        Ok(plan)
    }

    /// Buy at the current ask or sell at the current bid.
    async fn replenish(&self, side: OrderSide, amount: f64) -> Result<()> {
        let ctx = &self.ctx;
        let ticker = ctx
            .api
            .get_ticker(&ctx.pair.name)
            .await
            .with_context(|| format!("Failed to fetch ticker for {}", ctx.pair.name))?;
        let price = match side {
            OrderSide::Bid => ticker.ask.price,
            OrderSide::Ask => ticker.bid.price,
        };
        let request = single_order(&ctx.pair, side, price, amount);
        let order = ctx
            .api
            .create_order(ctx.nonces.next(), &request)
            .await
            .with_context(|| format!("Failed to place {side} rebalance order"))?;
        info!(
            order_id = %order.id,
            side = %side,
            price = %request.price,
            amount = %request.amount,
            "Rebalance order placed"
        );
        Ok(())
    }
}

#[async_trait]
impl Duty for Balancer {
    type Signal = Rebalance;

    fn kind(&self) -> DutyKind {
        DutyKind::Balancer
    }

    async fn handle(&self, _signal: Rebalance) {
        let pause = self
            .ctx
            .config
            .balancing
            .lock_canceller
            .then(|| self.ctx.bus.canceller_pause.pause());
        let _timer = self.ctx.metrics.timer(DutyKind::Balancer);

        if let Err(e) = self.rebalance(pause).await {
            error!(error = %e, "Rebalance failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
