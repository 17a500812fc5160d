//! Periodic triggers.
//!
//! Each job is a task that sends a fixed signal into a duty's mailbox on
//! a timer. Jobs stop when the scheduler shuts down or the mailbox closes.

use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use super::bus::Mailbox;

#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `signal` every `period`, first after one period.
    pub fn every<S>(&mut self, name: &'static str, period: Duration, mailbox: Mailbox<S>, signal: S)
    where
        S: Clone + Send + fmt::Debug + 'static,
    {
        self.every_from(name, period, period, mailbox, signal);
    }

    /// Send `signal` after `first`, then every `period`.
    pub fn every_from<S>(
        &mut self,
        name: &'static str,
        first: Duration,
        period: Duration,
        mailbox: Mailbox<S>,
        signal: S,
    ) where
        S: Clone + Send + fmt::Debug + 'static,
    {
        debug!(job = name, first_ms = first.as_millis() as u64, period_ms = period.as_millis() as u64, "Scheduling job");
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if mailbox.send(signal.clone()).await.is_err() {
                    debug!(job = name, "Target duty stopped, ending job");
                    break;
                }
            }
        });
        self.jobs.push((name, handle));
    }

    /// Send `signal` once after `delay`.
    pub fn once<S>(&mut self, name: &'static str, delay: Duration, mailbox: Mailbox<S>, signal: S)
    where
        S: Send + fmt::Debug + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if mailbox.send(signal).await.is_err() {
                debug!(job = name, "Target duty stopped before one-shot fired");
            }
        });
        self.jobs.push((name, handle));
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|(name, _)| *name).collect()
    }

    /// Abort every job.
    pub fn shutdown(&mut self) {
        for (name, handle) in self.jobs.drain(..) {
            handle.abort();
            debug!(job = name, "Job stopped");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
