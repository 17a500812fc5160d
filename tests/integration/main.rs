//! End-to-end scenarios.
//!
//! Each test connects a real `Engine` to the in-memory `MockExchange`,
//! starts every duty, and drives them through the bus by hand. Timer
//! periods are set to an hour so scheduled ticks never interfere.

mod mock_exchange;

use std::sync::Arc;
use std::time::Duration;

use b1bot::config::AppConfig;
use b1bot::engine::bus::{CheckBalance, DutyState, QuotaSignal};
use b1bot::engine::{Engine, RunningEngine};
use b1bot::exchange::ExchangeApi;
use b1bot::types::{CancelFilter, OrderSide, StartupError, TradeMode};

use mock_exchange::{Call, MockExchange, PAIR_ID};

const CONFIG: &str = r#"
[exchange]
endpoint = "http://127.0.0.1:1"
app_key_env = "B1BOT_IT_KEY"
app_secret_env = "B1BOT_IT_SECRET"
symbol_pair = "one-usdt"
request_timeout_ms = 1000

[trading]
exchange_amount = 1.0
exchange_interval_secs = 3600

[balancing]
enabled = true
balance_percent = 50
balance_exchange_percent = 50
lock_canceller = true

[cancel]
interval_secs = 3600
page_size = 50
drift_threshold_ms = 60000
order_states = ["PENDING"]
lock_trader = true

[quota]
enabled = false
threshold_percent = 80
check_interval_secs = 3600
"#;

fn config() -> AppConfig {
    AppConfig::from_toml_str(CONFIG).unwrap()
}

fn api(mock: &Arc<MockExchange>) -> Arc<dyn ExchangeApi> {
    Arc::<MockExchange>::clone(mock)
}

async fn start(mock: &Arc<MockExchange>, config: AppConfig) -> RunningEngine {
    Engine::connect(config, api(mock))
        .await
        .map_err(|e| e.to_string())
        .unwrap()
        .start()
}

/// Poll until the condition holds or a second passes.
macro_rules! eventually {
    ($cond:expr) => {{
        let mut held = false;
        for _ in 0..100 {
            if $cond {
                held = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        held
    }};
}

/// Give spawned workers time to run (for asserting that nothing happened).
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_startup_finds_pair_and_limit() {
    let mock = Arc::new(MockExchange::new());
    let mut cfg = config();
    cfg.quota.enabled = true;

    let engine = Engine::connect(cfg, api(&mock))
        .await
        .map_err(|e| e.to_string())
        .unwrap();

    assert_eq!(engine.pair().id, PAIR_ID);
    assert!((engine.hourly_limit() - 100.0).abs() < 1e-9);
    assert_eq!(mock.calls(), vec![Call::ListMarkets, Call::DailyLimit]);
}

#[tokio::test]
async fn test_unknown_pair_is_fatal() {
    let mock = Arc::new(MockExchange::new());
    let mut cfg = config();
    cfg.exchange.symbol_pair = "DOGE-USDT".to_string();

    let err = Engine::connect(cfg, api(&mock))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, StartupError::PairNotFound(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_unreachable_exchange_is_retryable() {
    let mock = Arc::new(MockExchange::new());
    mock.set_error("connection refused");

    let err = Engine::connect(config(), api(&mock))
        .await
        .err()
        .unwrap();
    assert!(err.is_retryable());
}

// ---------------------------------------------------------------------------
// Balance check hand-off
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_funded_account_trades_a_matching_pair() {
    let mock = Arc::new(MockExchange::new());
    let engine = start(&mock, config()).await;

    engine.bus().check_balance.send(CheckBalance).await.unwrap();

    assert!(eventually!(mock.created_orders().len() == 2));
    let orders = mock.created_orders();
    assert!(orders.contains(&(OrderSide::Bid, "1.0000".to_string(), "1.00".to_string())));
    assert!(orders.contains(&(OrderSide::Ask, "1.0000".to_string(), "1.00".to_string())));

    let nonces = mock.nonces();
    let mut unique = nonces.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), nonces.len());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_base_short_invokes_balancer_not_trader() {
    let mock = Arc::new(MockExchange::new());
    mock.set_balances((0.5, 0.0), (1000.0, 0.0));
    mock.set_ticker(99.0, 100.0);
    let engine = start(&mock, config()).await;

    engine.bus().check_balance.send(CheckBalance).await.unwrap();

    assert!(eventually!(!mock.created_orders().is_empty()));
    settle().await;

    // One replenishment buy of balance_percent of the trade amount at the ask.
    assert_eq!(
        mock.created_orders(),
        vec![(OrderSide::Bid, "100.0000".to_string(), "0.50".to_string())]
    );
    let state = engine.state().snapshot().await;
    assert_eq!(state.funds.base_available, 0.5);
    assert_eq!(state.funds.ask_price, 100.0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_tied_up_quote_cancels_stale_asks() {
    let mock = Arc::new(MockExchange::new());
    mock.set_balances((0.5, 0.0), (1000.0, 999.0));
    mock.set_ticker(99.0, 100.0);
    mock.add_order("stale-ask", OrderSide::Ask, 120_000);
    mock.add_order("stale-bid", OrderSide::Bid, 120_000);
    mock.add_order("fresh-ask", OrderSide::Ask, 1_000);
    let engine = start(&mock, config()).await;

    engine.bus().check_balance.send(CheckBalance).await.unwrap();

    assert!(eventually!(!mock.cancelled().is_empty()));
    settle().await;
    assert_eq!(mock.cancelled(), vec!["stale-ask"]);
    assert!(mock.created_orders().is_empty());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_both_short_shrinks_trade_amount() {
    let mock = Arc::new(MockExchange::new());
    mock.set_balances((0.1, 0.0), (0.1, 0.0));
    let engine = start(&mock, config()).await;
    let state = engine.state();

    engine.bus().check_balance.send(CheckBalance).await.unwrap();

    assert!(eventually!(state.trade_amount().await < 1.0));
    assert_eq!(state.trade_amount().await, 0.5);
    assert!(mock.created_orders().is_empty());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_rebalancing_disabled_does_nothing() {
    let mock = Arc::new(MockExchange::new());
    mock.set_balances((0.0, 0.0), (1000.0, 0.0));
    let mut cfg = config();
    cfg.balancing.enabled = false;
    let engine = start(&mock, cfg).await;

    engine.bus().check_balance.send(CheckBalance).await.unwrap();

    assert!(eventually!(mock.calls().contains(&Call::Accounts)));
    settle().await;
    assert!(mock.created_orders().is_empty());
    assert!(mock.cancelled().is_empty());

    engine.shutdown().await;
}

// ---------------------------------------------------------------------------
// Pausing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_paused_trader_makes_no_calls() {
    let mock = Arc::new(MockExchange::new());
    let engine = start(&mock, config()).await;
    let monitors = engine.monitors();

    let guard = engine.bus().trader_pause.pause();
    assert!(eventually!(monitors.trader.state() == DutyState::Paused));

    engine.bus().trade.send(TradeMode::Normal).await.unwrap();
    settle().await;
    assert!(mock.calls().iter().all(|c| *c == Call::ListMarkets));
    assert_eq!(monitors.trader.dropped(), 1);

    drop(guard);
    engine.bus().trade.send(TradeMode::Normal).await.unwrap();
    assert!(eventually!(mock.created_orders().len() == 2));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_canceller_scan_respects_filter() {
    let mock = Arc::new(MockExchange::new());
    mock.add_order("old-bid", OrderSide::Bid, 120_000);
    mock.add_order("old-ask", OrderSide::Ask, 120_000);
    mock.add_order("at-threshold", OrderSide::Bid, 60_000);
    let engine = start(&mock, config()).await;

    engine.bus().cancel.send(CancelFilter::Bids).await.unwrap();

    assert!(eventually!(!mock.cancelled().is_empty()));
    settle().await;
    assert_eq!(mock.cancelled(), vec!["old-bid"]);
    assert!(!engine.bus().trader_pause.is_paused());

    engine.shutdown().await;
}

// ---------------------------------------------------------------------------
// Quota
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_quota_at_threshold_stops_balance_checks() {
    let mock = Arc::new(MockExchange::new());
    mock.set_quota(60.0, 20.0);
    let mut cfg = config();
    cfg.quota.enabled = true;
    let engine = start(&mock, cfg).await;
    let state = engine.state();

    // The initial check fires at start.
    assert!(eventually!(!state.keep_running().await));

    let before = mock.calls().len();
    engine.bus().check_balance.send(CheckBalance).await.unwrap();
    settle().await;

    let after = mock.calls();
    assert_eq!(after.len(), before);
    assert!(!after.contains(&Call::Accounts));
    assert!(mock.created_orders().is_empty());

    // The hourly reset resumes trading without fetching usage again.
    let quota_calls = after.iter().filter(|c| **c == Call::HourlyQuota).count();
    engine.bus().quota.send(QuotaSignal::Reset).await.unwrap();
    assert!(eventually!(state.keep_running().await));
    let quota_calls_after = mock
        .calls()
        .iter()
        .filter(|c| **c == Call::HourlyQuota)
        .count();
    assert_eq!(quota_calls, quota_calls_after);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_quota_below_threshold_keeps_trading() {
    let mock = Arc::new(MockExchange::new());
    mock.set_quota(30.0, 10.0);
    let mut cfg = config();
    cfg.quota.enabled = true;
    let engine = start(&mock, cfg).await;

    assert!(eventually!(mock.calls().contains(&Call::HourlyQuota)));
    settle().await;
    assert!(engine.state().keep_running().await);

    engine.bus().check_balance.send(CheckBalance).await.unwrap();
    assert!(eventually!(mock.created_orders().len() == 2));

    engine.shutdown().await;
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_shutdown_cancels_all_orders_when_configured() {
    let mock = Arc::new(MockExchange::new());
    let mut cfg = config();
    cfg.cancel.cancel_all_on_shutdown = true;
    let engine = start(&mock, cfg).await;

    engine.shutdown().await;
    assert!(mock.calls().contains(&Call::CancelAll(PAIR_ID.to_string())));
}

#[tokio::test]
async fn test_shutdown_leaves_orders_by_default() {
    let mock = Arc::new(MockExchange::new());
    let engine = start(&mock, config()).await;

    engine.shutdown().await;
    assert!(!mock
        .calls()
        .iter()
        .any(|c| matches!(c, Call::CancelAll(_))));
}
