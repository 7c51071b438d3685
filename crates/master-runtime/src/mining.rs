//! # Development Mining Loop
//!
//! Drives the dev cluster: each round the local slaves produce one minor
//! block per shard, the master assembles a root candidate, the nonce is
//! searched on a blocking thread, and the sealed block is committed.

use crate::cluster::DevCluster;
use anyhow::{anyhow, Context, Result};
use qc_18_cluster_master::adapters::mine_nonce;
use qc_18_cluster_master::{Address, FullShardId, MasterApi, RootBlock};
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Nonces tried per round before giving up.
pub const MAX_NONCE_ATTEMPTS: u64 = 10_000_000;

/// Dev miner for a [`DevCluster`].
pub struct DevMiner {
    cluster: Arc<DevCluster>,
    coinbase: Address,
    confirmed: BTreeMap<FullShardId, u64>,
}

impl DevMiner {
    /// Miner paying rewards to `coinbase`.
    pub fn new(cluster: Arc<DevCluster>, coinbase: Address) -> Self {
        Self {
            cluster,
            coinbase,
            confirmed: BTreeMap::new(),
        }
    }

    /// Run one full round and return the committed root block.
    pub async fn mine_one(&mut self) -> Result<RootBlock> {
        let master = self.cluster.master();

        let produced = self.cluster.produce_minor_blocks(&self.confirmed, unix_now());
        debug!("[qc-18] Produced {} minor blocks", produced.len());

        let mut block = master
            .create_root_block_to_mine(self.coinbase)
            .await
            .context("Failed to assemble root candidate")?;

        let engine = self.cluster.engine();
        let header = block.header.clone();
        let start: u64 = rand::thread_rng().gen();
        let nonce = tokio::task::spawn_blocking(move || {
            mine_nonce(engine.as_ref(), &header, start, MAX_NONCE_ATTEMPTS)
        })
        .await
        .context("Nonce search task failed")?
        .ok_or_else(|| anyhow!("no nonce found for root block #{}", block.number()))?;
        block.header.nonce = nonce;

        master
            .add_root_block(block.clone())
            .await
            .context("Failed to commit root block")?;

        for header in &block.minor_block_headers {
            self.confirmed.insert(header.full_shard_id(), header.number);
        }
        Ok(block)
    }

    /// Mine while the master has mining enabled, one round per target root
    /// block time, until `shutdown` flips to `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("[qc-18] Dev mining loop started");
        loop {
            let wait = Duration::from_secs(
                self.cluster
                    .master()
                    .artificial_tx_config()
                    .target_root_block_time
                    .into(),
            );
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {
                    info!("[qc-18] Dev mining loop stopped");
                    return;
                }
            }

            if !self.cluster.master().is_mining() {
                continue;
            }
            match self.mine_one().await {
                Ok(block) => info!(
                    "[qc-18] Mined root block #{} ({}) with {} minor headers",
                    block.number(),
                    block.short_hash(),
                    block.minor_block_headers.len()
                ),
                Err(e) => warn!("[qc-18] Mining round failed: {:#}", e),
            }
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
