//! Metrics collection for the cluster master

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for the cluster master
#[derive(Debug, Default)]
pub struct Metrics {
    /// Root block candidates assembled
    pub candidates_created: AtomicU64,

    /// Minor headers included across all candidates
    pub minor_headers_included: AtomicU64,

    /// Root blocks committed locally and on every slave
    pub root_blocks_committed: AtomicU64,

    /// Broadcasts that failed on at least one slave
    pub broadcast_failures: AtomicU64,

    /// Liveness probes that failed
    pub heartbeat_failures: AtomicU64,

    /// Shard status reports received
    pub shard_status_reports: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an assembled candidate
    pub fn record_candidate(&self, minor_headers: usize) {
        self.candidates_created.fetch_add(1, Ordering::Relaxed);
        self.minor_headers_included
            .fetch_add(minor_headers as u64, Ordering::Relaxed);
    }

    /// Record a fully committed root block
    pub fn record_root_block_committed(&self) {
        self.root_blocks_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed broadcast
    pub fn record_broadcast_failure(&self) {
        self.broadcast_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed liveness probe
    pub fn record_heartbeat_failure(&self) {
        self.heartbeat_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a shard status report
    pub fn record_shard_status(&self) {
        self.shard_status_reports.fetch_add(1, Ordering::Relaxed);
    }

    /// Get candidates created
    pub fn get_candidates_created(&self) -> u64 {
        self.candidates_created.load(Ordering::Relaxed)
    }

    /// Get root blocks committed
    pub fn get_root_blocks_committed(&self) -> u64 {
        self.root_blocks_committed.load(Ordering::Relaxed)
    }

    /// Get broadcast failures
    pub fn get_broadcast_failures(&self) -> u64 {
        self.broadcast_failures.load(Ordering::Relaxed)
    }

    /// Get average minor headers per candidate
    pub fn get_avg_headers_per_candidate(&self) -> f64 {
        let candidates = self.candidates_created.load(Ordering::Relaxed);
        if candidates == 0 {
            return 0.0;
        }
        let headers = self.minor_headers_included.load(Ordering::Relaxed);
        headers as f64 / candidates as f64
    }
}
