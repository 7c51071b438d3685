//! Cluster Master Service
//!
//! `MasterBackend` owns the slave connection pool, the membership snapshot
//! and the handles to the root chain store and consensus engine. It
//! implements [`MasterApi`].

use crate::algorithms::{
    assemble_candidate_headers, broadcast_and_wait, call_with_deadline, fan_out_merge,
    MembershipTable,
};
use crate::config::ClusterConfig;
use crate::domain::{
    invariant_handshake_matches, AccountBranchData, Address, ArtificialTxConfig, Branch,
    FullShardId, Hash, HeadersInfo, MasterError, Result, RootBlock, ShardStats, SlaveInfo,
    Transaction,
};
use crate::liveness::{LivenessHandle, LivenessMonitor, ShutdownSignal};
use crate::metrics::Metrics;
use crate::ports::{ConsensusEngine, MasterApi, RootChainStore, SlaveConnection};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// The cluster master.
pub struct MasterBackend {
    config: ClusterConfig,
    engine: Arc<dyn ConsensusEngine>,
    root_chain: Arc<dyn RootChainStore>,
    slaves: Vec<Arc<dyn SlaveConnection>>,
    /// Published once the shard coverage check passes.
    membership: RwLock<Option<Arc<MembershipTable>>>,
    ready: AtomicBool,
    init_lock: Mutex<()>,
    /// Held from marker write to marker clear.
    commit_lock: Mutex<()>,
    artificial_tx_config: RwLock<ArtificialTxConfig>,
    mining: AtomicBool,
    shard_stats: RwLock<BTreeMap<FullShardId, ShardStats>>,
    metrics: Arc<Metrics>,
}

impl MasterBackend {
    /// Create the master over a slave pool built from `config.slaves`, in
    /// the same order.
    pub fn new(
        config: ClusterConfig,
        engine: Arc<dyn ConsensusEngine>,
        root_chain: Arc<dyn RootChainStore>,
        slaves: Vec<Arc<dyn SlaveConnection>>,
    ) -> Result<Self> {
        config.validate()?;

        let configured: Vec<&str> = config.slaves.iter().map(|s| s.id.as_str()).collect();
        let pooled: Vec<&str> = slaves.iter().map(|s| s.slave_id()).collect();
        if configured != pooled {
            return Err(MasterError::Config(format!(
                "slave pool {:?} does not match configured slaves {:?}",
                pooled, configured
            )));
        }

        let target_minor_block_time = config
            .genesis_shard_ids()
            .first()
            .and_then(|shard| config.shard_target_block_time(*shard))
            .ok_or_else(|| MasterError::Config("topology has no genesis shard".to_string()))?;
        let artificial_tx_config = ArtificialTxConfig {
            target_root_block_time: config.root.target_block_time,
            target_minor_block_time,
        };

        info!("[qc-18] Initializing Cluster Master");
        info!("  Slaves: {}", slaves.len());
        info!("  Genesis shards: {}", config.genesis_shard_ids().len());
        info!("  Consensus: {}", engine.name());

        if let Some(hash) = root_chain.committing_hash() {
            warn!(
                "[qc-18] Root block {} was not fully committed before the last shutdown",
                hex::encode(hash)
            );
        }

        Ok(Self {
            config,
            engine,
            root_chain,
            slaves,
            membership: RwLock::new(None),
            ready: AtomicBool::new(false),
            init_lock: Mutex::new(()),
            commit_lock: Mutex::new(()),
            artificial_tx_config: RwLock::new(artificial_tx_config),
            mining: AtomicBool::new(false),
            shard_stats: RwLock::new(BTreeMap::new()),
            metrics: Arc::new(Metrics::new()),
        })
    }

    /// Initialize the cluster, then spawn the liveness monitor reporting to
    /// `shutdown_tx`.
    pub async fn start(&self, shutdown_tx: mpsc::Sender<ShutdownSignal>) -> Result<LivenessHandle> {
        self.init_cluster().await?;

        let monitor = LivenessMonitor::new(
            self.slaves.clone(),
            self.config.master.heartbeat_interval(),
            self.rpc_timeout(),
            shutdown_tx,
        )
        .with_metrics(Arc::clone(&self.metrics));
        Ok(monitor.spawn())
    }

    /// Release the consensus engine.
    pub fn stop(&self) {
        self.engine.close();
        info!("[qc-18] Cluster master stopped");
    }

    /// Hash of a root block whose commit did not finish, if any.
    pub fn pending_commit(&self) -> Option<Hash> {
        self.root_chain.committing_hash()
    }

    /// Whether `init_cluster` has succeeded.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Whether mining is enabled.
    pub fn is_mining(&self) -> bool {
        self.mining.load(Ordering::SeqCst)
    }

    /// Current artificial tx config.
    pub fn artificial_tx_config(&self) -> ArtificialTxConfig {
        *self.artificial_tx_config.read()
    }

    /// Latest status of every reporting shard, ascending by shard id.
    pub fn shard_stats(&self) -> Vec<ShardStats> {
        self.shard_stats.read().values().cloned().collect()
    }

    /// Slave directory from configuration.
    pub fn slave_info_list(&self) -> Vec<SlaveInfo> {
        self.config.slave_info_list()
    }

    /// Cluster configuration.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Counters.
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// First recorded owner of the shard.
    pub fn get_one_slave_connection(
        &self,
        full_shard_id: FullShardId,
    ) -> Result<Arc<dyn SlaveConnection>> {
        self.membership()?
            .get_one(full_shard_id)
            .ok_or(MasterError::NoBranchConnection(full_shard_id))
    }

    /// Every owner of the shard.
    pub fn get_all_slave_connections(
        &self,
        full_shard_id: FullShardId,
    ) -> Result<Vec<Arc<dyn SlaveConnection>>> {
        let owners = self.membership()?.get_all(full_shard_id);
        if owners.is_empty() {
            return Err(MasterError::NoBranchConnection(full_shard_id));
        }
        Ok(owners)
    }

    fn membership(&self) -> Result<Arc<MembershipTable>> {
        self.membership
            .read()
            .as_ref()
            .cloned()
            .ok_or(MasterError::NotInitialized)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(MasterError::NotInitialized)
        }
    }

    fn rpc_timeout(&self) -> Duration {
        self.config.master.rpc_timeout()
    }

    async fn handshake(&self) -> Result<()> {
        let timeout = self.rpc_timeout();
        for slave in &self.slaves {
            let response =
                call_with_deadline(slave.slave_id(), timeout, slave.ping(None, false)).await?;
            invariant_handshake_matches(
                slave.slave_id(),
                slave.chain_masks(),
                &response.id,
                &response.chain_mask_list,
            )?;
            debug!("[qc-18] Handshake with {} ok", slave.slave_id());
        }
        Ok(())
    }

    async fn broadcast_root_block(&self, block: &RootBlock) -> Result<()> {
        broadcast_and_wait(&self.slaves, self.rpc_timeout(), |slave| {
            slave.add_root_block(block, false)
        })
        .await
        .map_err(|e| {
            self.metrics.record_broadcast_failure();
            e
        })
    }
}

#[async_trait]
impl MasterApi for MasterBackend {
    async fn init_cluster(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if self.is_ready() {
            return Err(MasterError::AlreadyInitialized);
        }

        self.handshake().await?;

        let genesis_shard_ids = self.config.genesis_shard_ids();
        let table = MembershipTable::build(&self.slaves, &genesis_shard_ids);
        for line in table.summary() {
            info!("[qc-18] Shard {}", line);
        }
        table.check_complete()?;

        let head = self.root_chain.current_block();
        broadcast_and_wait(&self.slaves, self.rpc_timeout(), |slave| {
            let head = &head;
            async move { slave.ping(Some(head), true).await.map(|_| ()) }
        })
        .await?;

        *self.membership.write() = Some(Arc::new(table));
        self.ready.store(true, Ordering::SeqCst);
        info!(
            "[qc-18] Cluster initialized: {} slaves, {} shards, root #{}",
            self.slaves.len(),
            genesis_shard_ids.len(),
            head.number()
        );
        Ok(())
    }

    async fn get_account_data(
        &self,
        address: &Address,
        block_height: Option<u64>,
    ) -> Result<BTreeMap<Branch, AccountBranchData>> {
        self.ensure_ready()?;

        let merged = fan_out_merge(
            &self.slaves,
            self.rpc_timeout(),
            |slave| slave.get_account_data(address, block_height),
            |data: &AccountBranchData| data.branch,
        )
        .await?;

        let expected = self.config.genesis_shard_ids().len();
        if merged.len() != expected {
            return Err(MasterError::AccountDataIncomplete {
                got: merged.len(),
                expected,
            });
        }
        Ok(merged)
    }

    async fn get_primary_account_data(
        &self,
        address: &Address,
        block_height: Option<u64>,
    ) -> Result<AccountBranchData> {
        self.ensure_ready()?;

        let full_shard_id = self
            .config
            .full_shard_id_by_full_shard_key(address.full_shard_key)
            .ok_or(MasterError::NoBranchConnection(address.full_shard_key))?;
        let slave = self.get_one_slave_connection(full_shard_id)?;

        let data = call_with_deadline(
            slave.slave_id(),
            self.rpc_timeout(),
            slave.get_account_data(address, block_height),
        )
        .await?;

        data.into_iter()
            .find(|entry| entry.branch.value == full_shard_id)
            .ok_or(MasterError::NoSuchData(full_shard_id))
    }

    async fn create_root_block_to_mine(&self, coinbase: Address) -> Result<RootBlock> {
        self.ensure_ready()?;

        let reports = fan_out_merge(
            &self.slaves,
            self.rpc_timeout(),
            |slave| slave.get_unconfirmed_headers(),
            |info: &HeadersInfo| info.branch.value,
        )
        .await?;

        let tip = self.root_chain.current_block();
        let mut shards_to_check = self
            .config
            .initialized_shard_ids_before_root_height(tip.number() + 1);
        shards_to_check.sort_unstable();

        let headers = assemble_candidate_headers(&reports, &shards_to_check, |hash| {
            self.root_chain.is_minor_block_validated(hash)
        })?;
        let header_count = headers.len();

        let block = self.root_chain.create_block_to_mine(headers, coinbase, None)?;
        self.root_chain
            .validate_block(&block)
            .map_err(|e| MasterError::CandidateValidation(e.to_string()))?;

        self.metrics.record_candidate(header_count);
        info!(
            "[qc-18] Root candidate #{} with {} minor headers",
            block.number(),
            header_count
        );
        Ok(block)
    }

    async fn add_root_block(&self, block: RootBlock) -> Result<()> {
        self.ensure_ready()?;

        let _guard = self.commit_lock.try_lock().map_err(|_| {
            let in_flight = self
                .root_chain
                .committing_hash()
                .map(hex::encode)
                .unwrap_or_default();
            warn!(
                "[qc-18] Rejecting root block #{} ({}): commit of {} still running",
                block.number(),
                block.short_hash(),
                in_flight
            );
            MasterError::CommitInProgress(in_flight)
        })?;

        self.root_chain.write_committing_hash(block.hash());
        self.root_chain.insert_block(block.clone())?;

        if let Err(e) = self.broadcast_root_block(&block).await {
            warn!(
                "[qc-18] Root block #{} ({}) inserted but not on every slave: {}",
                block.number(),
                block.short_hash(),
                e
            );
            return Err(e);
        }

        self.root_chain.clear_committing_hash();
        self.metrics.record_root_block_committed();
        info!(
            "[qc-18] Root block #{} ({}) committed",
            block.number(),
            block.short_hash()
        );
        Ok(())
    }

    async fn set_target_block_time(
        &self,
        root_block_time: Option<u32>,
        minor_block_time: Option<u32>,
    ) -> Result<()> {
        if root_block_time == Some(0) || minor_block_time == Some(0) {
            return Err(MasterError::Config("block time must be > 0".to_string()));
        }

        let updated = {
            let mut current = self.artificial_tx_config.write();
            let updated = ArtificialTxConfig {
                target_root_block_time: root_block_time.unwrap_or(current.target_root_block_time),
                target_minor_block_time: minor_block_time
                    .unwrap_or(current.target_minor_block_time),
            };
            *current = updated;
            updated
        };
        info!(
            "[qc-18] Target block time: root {}s, minor {}s",
            updated.target_root_block_time, updated.target_minor_block_time
        );

        if self.is_mining() {
            self.send_mining_config_to_slaves(true).await?;
        }
        Ok(())
    }

    async fn set_mining(&self, mining: bool) -> Result<()> {
        self.ensure_ready()?;
        self.mining.store(mining, Ordering::SeqCst);
        info!("[qc-18] Mining {}", if mining { "enabled" } else { "disabled" });
        self.send_mining_config_to_slaves(mining).await
    }

    async fn send_mining_config_to_slaves(&self, mining: bool) -> Result<()> {
        self.ensure_ready()?;
        let config = self.artificial_tx_config();
        broadcast_and_wait(&self.slaves, self.rpc_timeout(), |slave| {
            slave.send_mining_config(&config, mining)
        })
        .await
        .map_err(|e| {
            self.metrics.record_broadcast_failure();
            e
        })
    }

    async fn create_transactions(
        &self,
        num_tx_per_shard: u32,
        x_shard_percent: u32,
        sample: &Transaction,
    ) -> Result<()> {
        self.ensure_ready()?;
        if x_shard_percent > 100 {
            return Err(MasterError::Config(format!(
                "cross-shard percentage {} above 100",
                x_shard_percent
            )));
        }

        broadcast_and_wait(&self.slaves, self.rpc_timeout(), |slave| {
            slave.generate_tx(num_tx_per_shard, x_shard_percent, sample)
        })
        .await?;
        debug!(
            "[qc-18] Requested {} txs per shard ({}% cross-shard)",
            num_tx_per_shard, x_shard_percent
        );
        Ok(())
    }

    fn update_shard_status(&self, status: ShardStats) {
        self.metrics.record_shard_status();
        self.shard_stats.write().insert(status.branch.value, status);
    }

    fn current_block(&self) -> RootBlock {
        self.root_chain.current_block()
    }
}
