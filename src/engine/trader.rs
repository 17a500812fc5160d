//! Trader.
//!
//! Places a BID and an ASK at the same price and size so they match each
//! other and generate volume. Rebalance-mode trades are scaled down.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{error, info, warn};

use super::bus::{Duty, DutyKind};
use super::DutyContext;
use crate::strategy::pricing::{trade_scale, volume_pair};
use crate::types::{Order, OrderRequest, TradeMode};

/// Outcome of one BID/ASK placement.
#[derive(Debug)]
pub struct TradeReport {
    pub mode: TradeMode,
    pub price: String,
    pub amount: String,
    pub bid: Result<Order>,
    pub ask: Result<Order>,
}

impl TradeReport {
    pub fn placed(&self) -> usize {
        usize::from(self.bid.is_ok()) + usize::from(self.ask.is_ok())
    }
}

pub struct Trader {
    ctx: DutyContext,
}

impl Trader {
    pub fn new(ctx: DutyContext) -> Self {
        Self { ctx }
    }

    /// Price both legs off a fresh ticker and submit them concurrently.
    /// Fails only if the ticker cannot be fetched; each leg fails on its own.
    pub async fn trade(&self, mode: TradeMode) -> Result<TradeReport> {
        let ctx = &self.ctx;
        let pair = &ctx.pair;

        let ticker = ctx
            .api
            .get_ticker(&pair.name)
            .await
            .with_context(|| format!("Failed to fetch ticker for {}", pair.name))?;

        let scale = trade_scale(mode, ctx.config.balancing.exchange_fraction());
        let trade_amount = ctx.state.trade_amount().await;
        let orders = volume_pair(
            pair,
            ticker.ask.price,
            ctx.config.trading.expected_spread,
            trade_amount,
            scale,
        );

        let (bid, ask) = futures::join!(
            self.submit(&orders.bid),
            self.submit(&orders.ask)
        );

        let report = TradeReport {
            mode,
            price: orders.bid.price.clone(),
            amount: orders.bid.amount.clone(),
            bid,
            ask,
        };
        info!(
            pair = %pair.name,
            mode = ?report.mode,
            price = %report.price,
            amount = %report.amount,
            placed = report.placed(),
            "Volume trade submitted"
        );
        Ok(report)
    }

    async fn submit(&self, request: &OrderRequest) -> Result<Order> {
        let nonce = self.ctx.nonces.next();
        match self.ctx.api.create_order(nonce, request).await {
            Ok(order) => {
                info!(
                    order_id = %order.id,
                    side = %request.side,
                    price = %request.price,
                    amount = %request.amount,
                    "Order placed"
                );
                Ok(order)
            }
            Err(e) => {
                warn!(
                    side = %request.side,
                    price = %request.price,
                    amount = %request.amount,
                    error = %e,
                    "Order rejected"
                );
                Err(e.context(format!("Failed to place {} order", request.side)))
            }
        }
    }
}

#[async_trait]
impl Duty for Trader {
    type Signal = TradeMode;

    fn kind(&self) -> DutyKind {
        DutyKind::Trader
    }

    async fn handle(&self, mode: TradeMode) {
        let _timer = self.ctx.metrics.timer(DutyKind::Trader);
        if let Err(e) = self.trade(mode).await {
            error!(error = %e, mode = ?mode, "Trade cycle failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
