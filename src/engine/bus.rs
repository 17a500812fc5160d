//! Signal bus connecting the duties.
//!
//! Every trigger travels through a `Mailbox`: a bounded queue holding at
//! most one pending signal, so a sender waits while the previous signal
//! is still unconsumed. Pausing is a separate `PauseSwitch` whose latest
//! value wins. A duty loop drops triggers that arrive while it is paused.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::types::{CancelFilter, TradeMode};

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Tick for the balance checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckBalance;

/// Request for the balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rebalance;

/// Quota monitor triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaSignal {
    /// Fetch usage and decide whether trading may continue.
    Check,
    /// Hour boundary: lift the throttle.
    Reset,
}

/// The long-lived duties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DutyKind {
    BalanceChecker,
    Trader,
    Canceller,
    Balancer,
    QuotaMonitor,
}

impl DutyKind {
    pub const ALL: &'static [DutyKind] = &[
        DutyKind::BalanceChecker,
        DutyKind::Trader,
        DutyKind::Canceller,
        DutyKind::Balancer,
        DutyKind::QuotaMonitor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DutyKind::BalanceChecker => "balance_checker",
            DutyKind::Trader => "trader",
            DutyKind::Canceller => "canceller",
            DutyKind::Balancer => "balancer",
            DutyKind::QuotaMonitor => "quota_monitor",
        }
    }
}

impl fmt::Display for DutyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Mailbox
// ---------------------------------------------------------------------------

/// Sending half of a single-slot trigger queue.
pub struct Mailbox<S> {
    tx: mpsc::Sender<S>,
}

impl<S> Clone for Mailbox<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Receiving half, owned by exactly one duty loop.
pub struct Inbox<S> {
    rx: mpsc::Receiver<S>,
}

/// A mailbox with room for one pending signal.
pub fn mailbox<S>() -> (Mailbox<S>, Inbox<S>) {
    let (tx, rx) = mpsc::channel(1);
    (Mailbox { tx }, Inbox { rx })
}

impl<S: Send> Mailbox<S> {
    /// Deliver a signal, waiting while one is already pending.
    pub async fn send(&self, signal: S) -> Result<()> {
        self.tx
            .send(signal)
            .await
            .map_err(|_| anyhow!("duty has stopped"))
    }

    /// Deliver without waiting; gives the signal back if the slot is taken.
    pub fn try_send(&self, signal: S) -> std::result::Result<(), S> {
        self.tx.try_send(signal).map_err(|e| match e {
            mpsc::error::TrySendError::Full(s) | mpsc::error::TrySendError::Closed(s) => s,
        })
    }
}

impl<S> Inbox<S> {
    pub async fn recv(&mut self) -> Option<S> {
        self.rx.recv().await
    }

    /// The pending signal, if any.
    pub fn try_recv(&mut self) -> Option<S> {
        self.rx.try_recv().ok()
    }
}

// ---------------------------------------------------------------------------
// Pause switch
// ---------------------------------------------------------------------------

/// Cooperative pause flag for one duty. Last writer wins; nested pauses
/// are not counted.
#[derive(Clone)]
pub struct PauseSwitch {
    tx: Arc<watch::Sender<bool>>,
}

impl PauseSwitch {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, paused: bool) {
        self.tx.send_replace(paused);
    }

    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    /// Pause until the returned guard is dropped or released.
    pub fn pause(&self) -> PauseGuard {
        self.set(true);
        PauseGuard {
            switch: self.clone(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for PauseSwitch {
    fn default() -> Self {
        Self::new()
    }
}

/// Resumes its duty on drop.
pub struct PauseGuard {
    switch: PauseSwitch,
}

impl PauseGuard {
    /// Resume now instead of at end of scope.
    pub fn release(self) {}
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        self.switch.set(false);
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Senders for every duty, cloned into each worker.
#[derive(Clone)]
pub struct Bus {
    pub check_balance: Mailbox<CheckBalance>,
    pub rebalance: Mailbox<Rebalance>,
    pub trade: Mailbox<TradeMode>,
    pub cancel: Mailbox<CancelFilter>,
    pub quota: Mailbox<QuotaSignal>,
    pub trader_pause: PauseSwitch,
    pub canceller_pause: PauseSwitch,
}

/// Receivers, handed to the duty loops at start.
pub struct Inboxes {
    pub check_balance: Inbox<CheckBalance>,
    pub rebalance: Inbox<Rebalance>,
    pub trade: Inbox<TradeMode>,
    pub cancel: Inbox<CancelFilter>,
    pub quota: Inbox<QuotaSignal>,
}

pub fn bus() -> (Bus, Inboxes) {
    let (check_balance, check_balance_rx) = mailbox();
    let (rebalance, rebalance_rx) = mailbox();
    let (trade, trade_rx) = mailbox();
    let (cancel, cancel_rx) = mailbox();
    let (quota, quota_rx) = mailbox();

    (
        Bus {
            check_balance,
            rebalance,
            trade,
            cancel,
            quota,
            trader_pause: PauseSwitch::new(),
            canceller_pause: PauseSwitch::new(),
        },
        Inboxes {
            check_balance: check_balance_rx,
            rebalance: rebalance_rx,
            trade: trade_rx,
            cancel: cancel_rx,
            quota: quota_rx,
        },
    )
}

// ---------------------------------------------------------------------------
// Duty state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DutyState {
    Idle,
    Busy,
    Paused,
}

impl fmt::Display for DutyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DutyState::Idle => write!(f, "IDLE"),
            DutyState::Busy => write!(f, "BUSY"),
            DutyState::Paused => write!(f, "PAUSED"),
        }
    }
}

/// Live view of one duty: paused flag, workers in flight, counters.
pub struct DutyMonitor {
    kind: DutyKind,
    pause: Option<watch::Receiver<bool>>,
    in_flight: AtomicUsize,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl DutyMonitor {
    pub fn new(kind: DutyKind, pause: Option<&PauseSwitch>) -> Self {
        Self {
            kind,
            pause: pause.map(PauseSwitch::subscribe),
            in_flight: AtomicUsize::new(0),
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> DutyKind {
        self.kind
    }

    pub fn is_paused(&self) -> bool {
        self.pause.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    pub fn state(&self) -> DutyState {
        if self.is_paused() {
            DutyState::Paused
        } else if self.in_flight() > 0 {
            DutyState::Busy
        } else {
            DutyState::Idle
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    fn begin(self: &Arc<Self>) -> WorkerGuard {
        self.accepted.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        WorkerGuard {
            monitor: Arc::clone(self),
        }
    }
}

struct WorkerGuard {
    monitor: Arc<DutyMonitor>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.monitor.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Duty loop
// ---------------------------------------------------------------------------

/// A long-lived duty fed by one mailbox.
#[async_trait]
pub trait Duty: Send + Sync + 'static {
    type Signal: Send + Sync + fmt::Debug + 'static;

    /// Handle signals one at a time inside the loop instead of on a
    /// worker per signal. A later signal never overtakes an earlier one.
    const SERIAL: bool = false;

    fn kind(&self) -> DutyKind;

    /// Gate evaluated in the loop before a worker is spawned.
    async fn admit(&self, _signal: &Self::Signal) -> bool {
        true
    }

    /// One cycle of work. Runs on its own task; must not panic on
    /// exchange failures.
    async fn handle(&self, signal: Self::Signal);
}

/// Run a duty until its mailbox closes. Each admitted trigger gets its
/// own worker task so the loop stays responsive to pause changes, unless
/// the duty is `SERIAL`.
pub fn spawn_duty<D: Duty>(
    duty: Arc<D>,
    mut inbox: Inbox<D::Signal>,
    monitor: Arc<DutyMonitor>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let kind = duty.kind();
        let mut pause = monitor.pause.clone();

        loop {
            tokio::select! {
                paused = pause_changed(&mut pause) => {
                    if paused {
                        info!(duty = %kind, "Duty paused");
                    } else {
                        info!(duty = %kind, "Duty resumed");
                    }
                }
                signal = inbox.recv() => {
                    let Some(signal) = signal else {
                        debug!(duty = %kind, "Mailbox closed, duty stopping");
                        break;
                    };

                    if monitor.is_paused() {
                        monitor.dropped.fetch_add(1, Ordering::SeqCst);
                        info!(duty = %kind, ?signal, "Duty is paused, trigger dropped");
                        continue;
                    }

                    if !duty.admit(&signal).await {
                        continue;
                    }

                    let guard = monitor.begin();
                    if D::SERIAL {
                        duty.handle(signal).await;
                        drop(guard);
                        continue;
                    }
                    let duty = Arc::clone(&duty);
                    tokio::spawn(async move {
                        let _guard = guard;
                        duty.handle(signal).await;
                    });
                }
            }
        }
    })
}

/// Resolves with the new value whenever the pause flag changes; never
/// resolves for duties without a switch.
async fn pause_changed(pause: &mut Option<watch::Receiver<bool>>) -> bool {
    match pause.as_mut() {
        Some(rx) => {
            if rx.changed().await.is_ok() {
                return *rx.borrow_and_update();
            }
        }
        None => return std::future::pending().await,
    }
    *pause = None;
    std::future::pending().await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
