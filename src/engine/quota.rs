//! Quota monitor.
//!
//! Compares this hour's mining rewards against the hourly limit and
//! flips `keep_running` off once the configured share is consumed. The
//! hourly reset turns it back on.

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::bus::{Duty, DutyKind, QuotaSignal};
use super::DutyContext;
use crate::strategy::quota::{keep_running, used_percent};

pub struct QuotaMonitor {
    ctx: DutyContext,
}

impl QuotaMonitor {
    pub fn new(ctx: DutyContext) -> Self {
        Self { ctx }
    }

    /// Fetch usage and update `keep_running`. Falls back to the last known
    /// stats when the fetch fails; with none, the cycle is skipped and
    /// `None` returned.
    pub async fn check(&self) -> Option<bool> {
        let ctx = &self.ctx;
        let stats = match ctx.api.hourly_quota().await {
            Ok(stats) => {
                ctx.state.record_quota(stats.clone()).await;
                stats
            }
            Err(e) => match ctx.state.last_quota().await {
                Some(last) => {
                    warn!(error = %e, "Quota fetch failed, using last known usage");
                    last
                }
                None => {
                    error!(error = %e, "Quota fetch failed and no usage is known");
                    return None;
                }
            },
        };

        let limit = ctx.state.hourly_limit().await;
        let used = used_percent(&stats, limit);
        let threshold = ctx.config.quota.threshold_percent;
        let keep = keep_running(used, threshold);
        let was = ctx.state.set_keep_running(keep).await;

        if was && !keep {
            warn!(
                used_percent = used,
                threshold_percent = threshold,
                hourly_limit = limit,
                stats = %stats,
                "Hourly quota reached, trading paused until the next hour"
            );
        } else {
            info!(
                used_percent = used,
                threshold_percent = threshold,
                keep_running = keep,
                "Quota checked"
            );
        }
        Some(keep)
    }

    pub async fn reset(&self) {
        let was = self.ctx.state.set_keep_running(true).await;
        info!(was_running = was, "Hourly quota reset, trading resumed");
    }
}

#[async_trait]
impl Duty for QuotaMonitor {
    type Signal = QuotaSignal;

    // A Check still in flight must not land after the hourly Reset.
    const SERIAL: bool = true;

    fn kind(&self) -> DutyKind {
        DutyKind::QuotaMonitor
    }

    async fn handle(&self, signal: QuotaSignal) {
        let _timer = self.ctx.metrics.timer(DutyKind::QuotaMonitor);
        match signal {
            QuotaSignal::Check => {
                self.check().await;
            }
            QuotaSignal::Reset => self.reset().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
