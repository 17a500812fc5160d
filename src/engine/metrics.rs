//! Cycle timing.
//!
//! Duties report how long each cycle took through a `MetricsSink`; one
//! aggregator task logs the samples and keeps per-duty totals for the
//! status endpoint.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::bus::DutyKind;

const SAMPLE_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct CycleSample {
    pub duty: DutyKind,
    pub elapsed: Duration,
}

#[derive(Clone)]
pub struct MetricsSink {
    tx: mpsc::Sender<CycleSample>,
}

impl MetricsSink {
    /// Non-blocking; a sample is dropped if the aggregator is behind.
    pub fn record(&self, duty: DutyKind, elapsed: Duration) {
        match self.tx.try_send(CycleSample { duty, elapsed }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(duty = %duty, "Metrics buffer full, sample dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(duty = %duty, "Metrics aggregator stopped, sample dropped");
            }
        }
    }

    /// Records the elapsed time when dropped.
    pub fn timer(&self, duty: DutyKind) -> CycleTimer {
        CycleTimer {
            sink: self.clone(),
            duty,
            started: Instant::now(),
        }
    }
}

pub struct CycleTimer {
    sink: MetricsSink,
    duty: DutyKind,
    started: Instant,
}

impl Drop for CycleTimer {
    fn drop(&mut self) {
        self.sink.record(self.duty, self.started.elapsed());
    }
}

pub fn channel() -> (MetricsSink, mpsc::Receiver<CycleSample>) {
    let (tx, rx) = mpsc::channel(SAMPLE_BUFFER);
    (MetricsSink { tx }, rx)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DutyTiming {
    pub cycles: u64,
    pub last_ms: u64,
    pub max_ms: u64,
    pub total_ms: u64,
}

#[derive(Default)]
pub struct CycleStats {
    inner: RwLock<HashMap<DutyKind, DutyTiming>>,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn observe(&self, sample: CycleSample) {
        let ms = sample.elapsed.as_millis() as u64;
        let mut stats = self.inner.write().await;
        let entry = stats.entry(sample.duty).or_default();
        entry.cycles += 1;
        entry.last_ms = ms;
        entry.max_ms = entry.max_ms.max(ms);
        entry.total_ms += ms;
    }

    pub async fn snapshot(&self) -> BTreeMap<String, DutyTiming> {
        self.inner
            .read()
            .await
            .iter()
            .map(|(duty, timing)| (duty.to_string(), timing.clone()))
            .collect()
    }
}

/// Drain samples until every sink is dropped.
pub fn spawn_aggregator(
    mut rx: mpsc::Receiver<CycleSample>,
    stats: Arc<CycleStats>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(sample) = rx.recv().await {
            info!(
                duty = %sample.duty,
                elapsed_ms = sample.elapsed.as_millis() as u64,
                "Cycle finished"
            );
            stats.observe(sample).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_aggregates_per_duty() {
        let stats = Arc::new(CycleStats::new());
        let (sink, rx) = channel();
        let task = spawn_aggregator(rx, Arc::clone(&stats));

        sink.record(DutyKind::Trader, Duration::from_millis(30));
        sink.record(DutyKind::Trader, Duration::from_millis(10));
        sink.record(DutyKind::Canceller, Duration::from_millis(5));
        drop(sink);
        task.await.unwrap();

        let snap = stats.snapshot().await;
        assert_eq!(
            snap["trader"],
            DutyTiming {
                cycles: 2,
                last_ms: 10,
                max_ms: 30,
                total_ms: 40
            }
        );
        assert_eq!(snap["canceller"].cycles, 1);
        assert!(!snap.contains_key("balancer"));
    }

    #[tokio::test]
    async fn test_record_after_aggregator_stops() {
        let (sink, rx) = channel();
        drop(rx);
        sink.record(DutyKind::Trader, Duration::from_millis(3));
        drop(sink.timer(DutyKind::Canceller));
        assert!(sink.tx.is_closed());
    }

    #[tokio::test]
    async fn test_timer_records_on_drop() {
        let (sink, mut rx) = channel();
        {
            let _timer = sink.timer(DutyKind::Balancer);
        }
        let sample = rx.recv().await.unwrap();
        assert_eq!(sample.duty, DutyKind::Balancer);
    }
}
