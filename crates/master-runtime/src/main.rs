//! # Cluster Master Runtime
//!
//! Runs a cluster master over a local development cluster.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`QC_LOG_LEVEL`, `QC_JSON_LOGS`)
//! 2. Load configuration (`QC_CLUSTER_CONFIG` file, env overrides)
//! 3. Build the dev cluster and initialize it (handshake, membership, head push)
//! 4. Start the liveness monitor and the dev mining loop
//! 5. Run until Ctrl+C or a liveness failure
//!
//! A liveness failure exits with an error status.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use master_runtime::{DevCluster, DevMiner};
use qc_18_cluster_master::telemetry::{init_logging, LoggingConfig};
use qc_18_cluster_master::{Address, ClusterConfig, MasterApi, ShutdownSignal};

/// Load configuration from file and environment.
fn load_config() -> Result<ClusterConfig> {
    let mut config = match std::env::var("QC_CLUSTER_CONFIG") {
        Ok(path) => {
            info!("Loading cluster config from {}", path);
            ClusterConfig::from_file(&path)
                .with_context(|| format!("Failed to load cluster config {}", path))?
        }
        Err(_) => {
            info!("QC_CLUSTER_CONFIG not set, using the default two-slave cluster");
            ClusterConfig::default()
        }
    };

    config.apply_env_overrides();
    config.validate().context("Invalid cluster configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(&LoggingConfig::from_env())?;

    info!("===========================================");
    info!("  Quantum-Chain Cluster Master v{}", qc_18_cluster_master::VERSION);
    info!("===========================================");

    let config = load_config()?;
    let cluster = Arc::new(DevCluster::new(config)?);
    let master = cluster.master();

    let (signal_tx, mut signal_rx) = mpsc::channel::<ShutdownSignal>(1);
    let liveness = master
        .start(signal_tx)
        .await
        .context("Failed to initialize cluster")?;
    master.set_mining(true).await.context("Failed to enable mining")?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let miner = DevMiner::new(Arc::clone(&cluster), Address::empty());
    let mining_task = tokio::spawn(miner.run(stop_rx));

    info!("Cluster master is running. Press Ctrl+C to stop.");

    let exit = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for Ctrl+C")?;
            info!("Ctrl+C received, shutting down");
            Ok(())
        }
        Some(ShutdownSignal::Terminate { reason }) = signal_rx.recv() => {
            error!("Shutdown requested: {}", reason);
            Err(anyhow!(reason))
        }
    };

    if stop_tx.send(true).is_err() {
        warn!("Mining loop already stopped");
    }
    if let Err(e) = mining_task.await {
        warn!("Mining loop ended abnormally: {}", e);
    }
    let outcome = liveness.shutdown().await;
    info!("Liveness monitor ended: {:?}", outcome);
    master.stop();

    if let Some(hash) = master.pending_commit() {
        warn!("Exiting with an uncommitted root block marker set: {:?}", hash);
    }

    exit
}
