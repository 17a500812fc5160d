//! Core engine: five concurrent duties driven by a scheduler.
//!
//! - the balance checker reads the account and hands off to the trader or
//!   the balancer,
//! - the trader places matching BID/ASK pairs,
//! - the canceller clears stale orders,
//! - the balancer restores inventory when one side runs short,
//! - the quota monitor stops trading once the hourly quota is used up.
//!
//! `Engine::connect` resolves the trading pair and quota limit;
//! `Engine::start` wires the duties to the bus and starts the timers.

pub mod balance_checker;
pub mod balancer;
pub mod bus;
pub mod canceller;
pub mod metrics;
pub mod nonce;
pub mod quota;
pub mod scheduler;
pub mod state;
pub mod trader;

#[cfg(test)]
pub(crate) mod testing;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::exchange::ExchangeApi;
use crate::strategy::quota::{hourly_limit, secs_until_next_hour};
use crate::types::{CancelFilter, StartupError, TradingPair};

use self::balance_checker::BalanceChecker;
use self::balancer::Balancer;
use self::bus::{spawn_duty, Bus, CheckBalance, DutyKind, DutyMonitor, DutyState, Inboxes, QuotaSignal};
use self::canceller::Canceller;
use self::metrics::{CycleStats, MetricsSink};
use self::nonce::NonceSource;
use self::quota::QuotaMonitor;
use self::scheduler::Scheduler;
use self::state::SharedState;
use self::trader::Trader;

const HOUR: Duration = Duration::from_secs(3600);

/// Everything a duty needs, cloned into each one.
#[derive(Clone)]
pub struct DutyContext {
    pub api: Arc<dyn ExchangeApi>,
    pub state: Arc<SharedState>,
    pub bus: Bus,
    pub pair: Arc<TradingPair>,
    pub config: Arc<AppConfig>,
    pub nonces: Arc<NonceSource>,
    pub metrics: MetricsSink,
}

/// Find the configured market by name, ignoring case.
pub async fn discover_pair(api: &dyn ExchangeApi, name: &str) -> Result<TradingPair, StartupError> {
    let markets = api
        .list_markets()
        .await
        .map_err(|e| StartupError::Markets(format!("{e:#}")))?;
    markets
        .into_iter()
        .find(|m| m.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| StartupError::PairNotFound(name.to_string()))
}

/// A connected engine, ready to start.
pub struct Engine {
    config: Arc<AppConfig>,
    api: Arc<dyn ExchangeApi>,
    pair: Arc<TradingPair>,
    hourly_limit: f64,
}

impl Engine {
    pub async fn connect(config: AppConfig, api: Arc<dyn ExchangeApi>) -> Result<Self, StartupError> {
        let pair = discover_pair(api.as_ref(), &config.exchange.symbol_pair).await?;
        info!(
            pair = %pair.name,
            pair_id = %pair.id,
            base = %pair.base.symbol,
            quote = %pair.quote.symbol,
            "Trading pair found"
        );

        let limit = if config.quota.enabled {
            let daily = api
                .daily_quota_limit()
                .await
                .map_err(|e| StartupError::Quota(format!("{e:#}")))?;
            let hourly = hourly_limit(daily);
            info!(daily_limit = daily, hourly_limit = hourly, "Quota limit loaded");
            hourly
        } else {
            0.0
        };

        Ok(Self {
            config: Arc::new(config),
            api,
            pair: Arc::new(pair),
            hourly_limit: limit,
        })
    }

    pub fn pair(&self) -> &TradingPair {
        &self.pair
    }

    pub fn hourly_limit(&self) -> f64 {
        self.hourly_limit
    }

    /// Spawn every duty and start the timers.
    pub fn start(self) -> RunningEngine {
        let (bus, inboxes) = bus::bus();
        let stats = Arc::new(CycleStats::new());
        let (sink, samples) = metrics::channel();
        let aggregator = metrics::spawn_aggregator(samples, Arc::clone(&stats));

        let ctx = DutyContext {
            api: self.api,
            state: Arc::new(SharedState::new(
                self.config.trading.exchange_amount,
                self.hourly_limit,
            )),
            bus,
            pair: self.pair,
            config: self.config,
            nonces: Arc::new(NonceSource::new()),
            metrics: sink,
        };

        let monitors = DutyMonitors::new(&ctx.bus);
        let tasks = spawn_duties(&ctx, inboxes, &monitors);
        let scheduler = schedule(&ctx);

        info!(
            pair = %ctx.pair.name,
            trade_amount = ctx.config.trading.exchange_amount,
            interval_secs = ctx.config.trading.exchange_interval_secs,
            balancing = ctx.config.balancing.enabled,
            quota = ctx.config.quota.enabled,
            jobs = ?scheduler.job_names(),
            "Engine started"
        );

        RunningEngine {
            ctx,
            scheduler,
            tasks,
            aggregator,
            monitors: Arc::new(monitors),
            stats,
        }
    }
}

fn spawn_duties(ctx: &DutyContext, inboxes: Inboxes, monitors: &DutyMonitors) -> Vec<JoinHandle<()>> {
    vec![
        spawn_duty(
            Arc::new(BalanceChecker::new(ctx.clone())),
            inboxes.check_balance,
            Arc::clone(&monitors.balance_checker),
        ),
        spawn_duty(
            Arc::new(Trader::new(ctx.clone())),
            inboxes.trade,
            Arc::clone(&monitors.trader),
        ),
        spawn_duty(
            Arc::new(Canceller::new(ctx.clone())),
            inboxes.cancel,
            Arc::clone(&monitors.canceller),
        ),
        spawn_duty(
            Arc::new(Balancer::new(ctx.clone())),
            inboxes.rebalance,
            Arc::clone(&monitors.balancer),
        ),
        spawn_duty(
            Arc::new(QuotaMonitor::new(ctx.clone())),
            inboxes.quota,
            Arc::clone(&monitors.quota_monitor),
        ),
    ]
}

fn schedule(ctx: &DutyContext) -> Scheduler {
    let cfg = &ctx.config;
    let mut scheduler = Scheduler::new();

    scheduler.every(
        "check_balance",
        Duration::from_secs(cfg.trading.exchange_interval_secs),
        ctx.bus.check_balance.clone(),
        CheckBalance,
    );
    scheduler.every(
        "cancel_stale",
        Duration::from_secs(cfg.cancel.interval_secs),
        ctx.bus.cancel.clone(),
        CancelFilter::All,
    );

    if cfg.quota.enabled {
        scheduler.once("quota_initial", Duration::ZERO, ctx.bus.quota.clone(), QuotaSignal::Check);
        scheduler.every(
            "quota_check",
            Duration::from_secs(cfg.quota.check_interval_secs),
            ctx.bus.quota.clone(),
            QuotaSignal::Check,
        );
        scheduler.every_from(
            "quota_reset",
            Duration::from_secs(secs_until_next_hour(Utc::now())),
            HOUR,
            ctx.bus.quota.clone(),
            QuotaSignal::Reset,
        );
    }

    scheduler
}

/// Per-duty monitors, shared with the status endpoint.
pub struct DutyMonitors {
    pub balance_checker: Arc<DutyMonitor>,
    pub trader: Arc<DutyMonitor>,
    pub canceller: Arc<DutyMonitor>,
    pub balancer: Arc<DutyMonitor>,
    pub quota_monitor: Arc<DutyMonitor>,
}

impl DutyMonitors {
    pub fn new(bus: &Bus) -> Self {
        Self {
            balance_checker: Arc::new(DutyMonitor::new(DutyKind::BalanceChecker, None)),
            trader: Arc::new(DutyMonitor::new(DutyKind::Trader, Some(&bus.trader_pause))),
            canceller: Arc::new(DutyMonitor::new(DutyKind::Canceller, Some(&bus.canceller_pause))),
            balancer: Arc::new(DutyMonitor::new(DutyKind::Balancer, None)),
            quota_monitor: Arc::new(DutyMonitor::new(DutyKind::QuotaMonitor, None)),
        }
    }

    pub fn all(&self) -> [&DutyMonitor; 5] {
        [
            self.balance_checker.as_ref(),
            self.trader.as_ref(),
            self.canceller.as_ref(),
            self.balancer.as_ref(),
            self.quota_monitor.as_ref(),
        ]
    }

    pub fn state_of(&self, kind: DutyKind) -> DutyState {
        match kind {
            DutyKind::BalanceChecker => self.balance_checker.state(),
            DutyKind::Trader => self.trader.state(),
            DutyKind::Canceller => self.canceller.state(),
            DutyKind::Balancer => self.balancer.state(),
            DutyKind::QuotaMonitor => self.quota_monitor.state(),
        }
    }
}

/// Handle to a started engine.
pub struct RunningEngine {
    ctx: DutyContext,
    scheduler: Scheduler,
    tasks: Vec<JoinHandle<()>>,
    aggregator: JoinHandle<()>,
    monitors: Arc<DutyMonitors>,
    stats: Arc<CycleStats>,
}

impl RunningEngine {
    pub fn state(&self) -> Arc<SharedState> {
        Arc::clone(&self.ctx.state)
    }

    pub fn pair(&self) -> Arc<TradingPair> {
        Arc::clone(&self.ctx.pair)
    }

    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.ctx.config)
    }

    pub fn monitors(&self) -> Arc<DutyMonitors> {
        Arc::clone(&self.monitors)
    }

    pub fn cycle_stats(&self) -> Arc<CycleStats> {
        Arc::clone(&self.stats)
    }

    /// Sender side of the bus, for triggering duties by hand.
    pub fn bus(&self) -> &Bus {
        &self.ctx.bus
    }

    /// Stop the timers, optionally cancel every open order, then stop the
    /// duties.
    pub async fn shutdown(mut self) {
        self.scheduler.shutdown();

        if self.ctx.config.cancel.cancel_all_on_shutdown {
            let nonce = self.ctx.nonces.next();
            match self.ctx.api.cancel_all_orders(nonce, &self.ctx.pair.id).await {
                Ok(()) => info!(pair = %self.ctx.pair.name, "Cancelled all open orders"),
                Err(e) => error!(error = %e, "Failed to cancel open orders on shutdown"),
            }
        }

        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.aggregator.abort();

        let busy: Vec<_> = self
            .monitors
            .all()
            .iter()
            .filter(|m| m.state() == DutyState::Busy)
            .map(|m| m.kind().to_string())
            .collect();
        if busy.is_empty() {
            info!("Engine stopped");
        } else {
            warn!(duties = ?busy, "Engine stopped with workers still in flight");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
