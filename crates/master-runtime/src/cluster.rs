//! # Development Cluster
//!
//! Wires a cluster master over in-process slaves and an in-memory root
//! chain, all built from one [`ClusterConfig`].

use anyhow::{Context, Result};
use qc_18_cluster_master::{
    create_consensus_engine, ClusterConfig, ConsensusEngine, FullShardId, InMemoryRootChain,
    LocalSlave, MasterBackend, MinorBlockHeader, RootChainStore, SlaveConnection,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Master plus everything it talks to.
pub struct DevCluster {
    master: Arc<MasterBackend>,
    root_chain: Arc<InMemoryRootChain>,
    engine: Arc<dyn ConsensusEngine>,
    slaves: Vec<Arc<LocalSlave>>,
    genesis_shard_ids: Vec<FullShardId>,
}

impl DevCluster {
    /// Build the cluster. The config must already be validated.
    pub fn new(config: ClusterConfig) -> Result<Self> {
        let engine = create_consensus_engine(&config.root)
            .context("Failed to create root consensus engine")?;
        let root_chain = Arc::new(InMemoryRootChain::new(
            Arc::clone(&engine),
            config.root.genesis_difficulty,
        ));

        let slaves: Vec<Arc<LocalSlave>> = config
            .slaves
            .iter()
            .map(|slave| {
                info!(
                    "[qc-18] Local slave {} ({}) masks {:?}",
                    slave.id,
                    slave.target(),
                    slave.chain_mask_list
                );
                Arc::new(LocalSlave::new(slave.id.clone(), slave.chain_mask_list.clone()))
            })
            .collect();
        let pool: Vec<Arc<dyn SlaveConnection>> = slaves
            .iter()
            .map(|slave| Arc::clone(slave) as Arc<dyn SlaveConnection>)
            .collect();

        let genesis_shard_ids = config.genesis_shard_ids();
        let master = MasterBackend::new(
            config,
            Arc::clone(&engine),
            Arc::clone(&root_chain) as Arc<dyn RootChainStore>,
            pool,
        )
        .context("Failed to create cluster master")?;

        Ok(Self {
            master: Arc::new(master),
            root_chain,
            engine,
            slaves,
            genesis_shard_ids,
        })
    }

    /// The master.
    pub fn master(&self) -> Arc<MasterBackend> {
        Arc::clone(&self.master)
    }

    /// Root chain store.
    pub fn root_chain(&self) -> Arc<InMemoryRootChain> {
        Arc::clone(&self.root_chain)
    }

    /// Root consensus engine.
    pub fn engine(&self) -> Arc<dyn ConsensusEngine> {
        Arc::clone(&self.engine)
    }

    /// Local slaves, in pool order.
    pub fn slaves(&self) -> &[Arc<LocalSlave>] {
        &self.slaves
    }

    /// One new minor block on every genesis shard, produced by the shard's
    /// first owner and marked validated on the root chain.
    ///
    /// `confirmed` holds the last height already included in a root block.
    pub fn produce_minor_blocks(
        &self,
        confirmed: &BTreeMap<FullShardId, u64>,
        create_time: u64,
    ) -> Vec<MinorBlockHeader> {
        let mut produced = Vec::new();
        for shard in &self.genesis_shard_ids {
            let Some(owner) = self.slaves.iter().find(|slave| slave.has_shard(*shard)) else {
                continue;
            };
            let confirmed_height = confirmed.get(shard).copied().unwrap_or(0);
            let header = owner.produce_minor_block(*shard, confirmed_height, create_time);
            self.root_chain.add_validated_minor_block(&header);
            produced.push(header);
        }
        produced
    }
}
