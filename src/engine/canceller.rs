//! Canceller.
//!
//! Scans the account's orders in each configured state and cancels those
//! whose age, measured on the exchange clock, exceeds the drift
//! threshold. Optionally pauses the trader for the length of the scan.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::bus::{Duty, DutyKind};
use super::DutyContext;
use crate::strategy::staleness::select_stale;
use crate::types::{CancelFilter, Order, OrderQuery, OrderState};

/// Outcome of one scan.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CancelReport {
    pub scanned: usize,
    pub cancelled: Vec<String>,
    pub failed: Vec<String>,
}

pub struct Canceller {
    ctx: DutyContext,
}

impl Canceller {
    pub fn new(ctx: DutyContext) -> Self {
        Self { ctx }
    }

    /// One pass over every configured order state. Listing or clock
    /// failures skip that state; a failed cancel moves on to the next order.
    pub async fn scan(&self, filter: CancelFilter) -> CancelReport {
        let mut report = CancelReport::default();
        for state in &self.ctx.config.cancel.order_states {
            if let Err(e) = self.scan_state(*state, filter, &mut report).await {
                error!(state = %state, error = %e, "Order scan failed");
            }
        }
        report
    }

    async fn scan_state(
        &self,
        state: OrderState,
        filter: CancelFilter,
        report: &mut CancelReport,
    ) -> Result<()> {
        let ctx = &self.ctx;
        let cfg = &ctx.config.cancel;

        let query = OrderQuery {
            pair_id: ctx.pair.id.clone(),
            state,
            first: cfg.page_size,
        };
        let orders = ctx.api.list_orders(ctx.nonces.next(), &query).await?;
        let server_time = ctx.api.ping().await?;
        report.scanned += orders.len();

        let stale = select_stale(&orders, filter, server_time, cfg.drift_threshold_ms);
        debug!(
            state = %state,
            filter = ?filter,
            listed = orders.len(),
            stale = stale.len(),
            "Scanned orders"
        );

        for (order, drift_ms) in stale {
            self.cancel(order, drift_ms, report).await;
            if cfg.pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(cfg.pause_ms)).await;
            }
        }
        Ok(())
    }

    async fn cancel(&self, order: &Order, drift_ms: i64, report: &mut CancelReport) {
        match self.ctx.api.cancel_order(self.ctx.nonces.next(), &order.id).await {
            Ok(_) => {
                info!(
                    order_id = %order.id,
                    side = %order.side,
                    price = order.price,
                    amount = order.amount,
                    drift_ms,
                    "Cancelled stale order"
                );
                report.cancelled.push(order.id.clone());
            }
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Failed to cancel order");
                report.failed.push(order.id.clone());
            }
        }
    }
}

#[async_trait]
impl Duty for Canceller {
    type Signal = CancelFilter;

    fn kind(&self) -> DutyKind {
        DutyKind::Canceller
    }

    async fn handle(&self, filter: CancelFilter) {
        let _trader_paused = self
            .ctx
            .config
            .cancel
            .lock_trader
            .then(|| self.ctx.bus.trader_pause.pause());
        let _timer = self.ctx.metrics.timer(DutyKind::Canceller);

        let report = self.scan(filter).await;
        if !report.cancelled.is_empty() || !report.failed.is_empty() {
            info!(
                filter = ?filter,
                scanned = report.scanned,
                cancelled = report.cancelled.len(),
                failed = report.failed.len(),
                "Cancellation pass complete"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
