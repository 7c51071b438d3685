//! # Liveness Monitor
//!
//! Background task that probes every slave's heartbeat once per interval.
//! The first failed probe ends the task and sends exactly one
//! [`ShutdownSignal`] to the host. There are no retries and no restarts.
//!
//! The task also stops, without signalling, when cancelled through its
//! [`LivenessHandle`].

use crate::metrics::Metrics;
use crate::ports::SlaveConnection;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, trace, warn};

/// Process-level request sent to the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Terminate the process.
    Terminate {
        /// Why.
        reason: String,
    },
}

/// How the monitor ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LivenessOutcome {
    /// Stopped by cancellation.
    Cancelled,
    /// A slave failed its probe.
    SlaveDown {
        /// Failing slave.
        slave_id: String,
    },
}

/// Heartbeat loop over a fixed slave pool.
pub struct LivenessMonitor {
    slaves: Vec<Arc<dyn SlaveConnection>>,
    interval: Duration,
    probe_timeout: Duration,
    shutdown_tx: mpsc::Sender<ShutdownSignal>,
    metrics: Option<Arc<Metrics>>,
}

impl LivenessMonitor {
    /// Monitor probing `slaves` every `interval`, each probe bounded by
    /// `probe_timeout`.
    pub fn new(
        slaves: Vec<Arc<dyn SlaveConnection>>,
        interval: Duration,
        probe_timeout: Duration,
        shutdown_tx: mpsc::Sender<ShutdownSignal>,
    ) -> Self {
        Self {
            slaves,
            interval,
            probe_timeout,
            shutdown_tx,
            metrics: None,
        }
    }

    /// Count failed probes in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawn the loop on the current runtime.
    pub fn spawn(self) -> LivenessHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(cancel_rx));
        LivenessHandle {
            cancel_tx,
            task,
        }
    }

    /// Run until a probe fails or `cancel` flips to `true` (or its sender
    /// is dropped).
    pub async fn run(self, mut cancel: watch::Receiver<bool>) -> LivenessOutcome {
        info!(
            "[qc-18] Liveness monitor started ({} slaves, every {:?})",
            self.slaves.len(),
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wait_cancelled(&mut cancel) => {
                    info!("[qc-18] Liveness monitor cancelled");
                    return LivenessOutcome::Cancelled;
                }
            }

            let cycle = tokio::select! {
                down = self.probe_all() => down,
                _ = wait_cancelled(&mut cancel) => {
                    info!("[qc-18] Liveness monitor cancelled");
                    return LivenessOutcome::Cancelled;
                }
            };

            if let Some(slave_id) = cycle {
                return self.signal_down(slave_id).await;
            }
        }
    }

    /// Probe every slave in pool order; return the first one that failed.
    async fn probe_all(&self) -> Option<String> {
        let started = Instant::now();
        for slave in &self.slaves {
            let alive = tokio::time::timeout(self.probe_timeout, slave.heartbeat())
                .await
                .unwrap_or(false);
            if !alive {
                return Some(slave.slave_id().to_string());
            }
        }
        trace!(
            "[qc-18] Heartbeat cycle over {} slaves took {:?}",
            self.slaves.len(),
            started.elapsed()
        );
        None
    }

    async fn signal_down(self, slave_id: String) -> LivenessOutcome {
        if let Some(metrics) = &self.metrics {
            metrics.record_heartbeat_failure();
        }
        error!("[qc-18] Slave {} failed heartbeat, requesting shutdown", slave_id);

        let signal = ShutdownSignal::Terminate {
            reason: format!("slave {} failed heartbeat", slave_id),
        };
        if self.shutdown_tx.send(signal).await.is_err() {
            warn!("[qc-18] Shutdown channel closed, signal dropped");
        }
        LivenessOutcome::SlaveDown { slave_id }
    }
}

async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    while !*cancel.borrow() {
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

/// Handle to a spawned [`LivenessMonitor`]. Dropping it cancels the monitor.
pub struct LivenessHandle {
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<LivenessOutcome>,
}

impl LivenessHandle {
    /// Ask the monitor to stop.
    pub fn cancel(&self) {
        // Err only when the monitor already finished.
        let _ = self.cancel_tx.send(true);
    }

    /// Whether the monitor task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the monitor to end.
    pub async fn join(self) -> LivenessOutcome {
        let Self { cancel_tx, task } = self;
        let outcome = task.await;
        drop(cancel_tx);
        outcome.unwrap_or_else(|e| {
            error!("[qc-18] Liveness monitor task failed: {}", e);
            LivenessOutcome::Cancelled
        })
    }

    /// Cancel and wait.
    pub async fn shutdown(self) -> LivenessOutcome {
        self.cancel();
        self.join().await
    }
}
