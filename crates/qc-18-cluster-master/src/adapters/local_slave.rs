//! # Local Slave
//!
//! In-process slave connection for the development cluster and for tests.
//! Keeps its shards' unconfirmed minor headers in memory, records every call
//! the master makes, and supports failure injection.

use crate::domain::{
    AccountBranchData, Address, ArtificialTxConfig, Branch, ChainMask, FullShardId, HeadersInfo,
    MasterError, MinorBlockHeader, RootBlock, Transaction,
};
use crate::ports::{PingResponse, SlaveConnection};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

#[derive(Default)]
struct SlaveState {
    reported_id: Option<String>,
    reported_masks: Option<Vec<ChainMask>>,
    unconfirmed: BTreeMap<FullShardId, Vec<MinorBlockHeader>>,
    account_data: Vec<AccountBranchData>,
    pings: Vec<(Option<u32>, bool)>,
    root_blocks: Vec<RootBlock>,
    mining_config: Option<(ArtificialTxConfig, bool)>,
    generated_tx: Vec<(u32, u32)>,
    root_block_delay: Option<Duration>,
}

/// Slave living in the master's process.
pub struct LocalSlave {
    id: String,
    chain_masks: Vec<ChainMask>,
    alive: AtomicBool,
    fail_rpcs: AtomicBool,
    hang_rpcs: AtomicBool,
    fail_add_root_block: AtomicBool,
    fail_head_push: AtomicBool,
    state: RwLock<SlaveState>,
}

impl LocalSlave {
    /// Healthy slave with the given configured identity.
    pub fn new(id: impl Into<String>, chain_masks: Vec<ChainMask>) -> Self {
        Self {
            id: id.into(),
            chain_masks,
            alive: AtomicBool::new(true),
            fail_rpcs: AtomicBool::new(false),
            hang_rpcs: AtomicBool::new(false),
            fail_add_root_block: AtomicBool::new(false),
            fail_head_push: AtomicBool::new(false),
            state: RwLock::new(SlaveState::default()),
        }
    }

    /// Make `ping` report a different identity than configured.
    pub fn report_identity(&self, id: impl Into<String>, chain_masks: Vec<ChainMask>) {
        let mut state = self.state.write();
        state.reported_id = Some(id.into());
        state.reported_masks = Some(chain_masks);
    }

    /// Fail every RPC with a transport error.
    pub fn fail_rpcs(&self, fail: bool) {
        self.fail_rpcs.store(fail, Ordering::SeqCst);
    }

    /// Never answer any RPC.
    pub fn hang_rpcs(&self, hang: bool) {
        self.hang_rpcs.store(hang, Ordering::SeqCst);
    }

    /// Fail only root block broadcasts.
    pub fn fail_add_root_block(&self, fail: bool) {
        self.fail_add_root_block.store(fail, Ordering::SeqCst);
    }

    /// Fail only pings that carry a root block with `init_shards` set.
    pub fn fail_head_push(&self, fail: bool) {
        self.fail_head_push.store(fail, Ordering::SeqCst);
    }

    /// Wait this long before answering a root block broadcast.
    pub fn delay_add_root_block(&self, delay: Duration) {
        self.state.write().root_block_delay = Some(delay);
    }

    /// Heartbeat answer.
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Replace the unconfirmed headers reported for one shard.
    pub fn set_unconfirmed_headers(&self, shard: FullShardId, headers: Vec<MinorBlockHeader>) {
        self.state.write().unconfirmed.insert(shard, headers);
    }

    /// Replace the account data returned for every address.
    pub fn set_account_data(&self, data: Vec<AccountBranchData>) {
        self.state.write().account_data = data;
    }

    /// Append the next minor block on `shard` and return its header.
    ///
    /// Heights continue from the last unconfirmed header, or from
    /// `confirmed_height + 1` when the shard has none pending.
    pub fn produce_minor_block(
        &self,
        shard: FullShardId,
        confirmed_height: u64,
        create_time: u64,
    ) -> MinorBlockHeader {
        let mut state = self.state.write();
        let pending = state.unconfirmed.entry(shard).or_default();
        let (number, parent_hash) = match pending.last() {
            Some(last) => (last.number + 1, last.hash()),
            None => (confirmed_height + 1, [0u8; 32]),
        };
        let header = MinorBlockHeader::new(Branch::new(shard), number, parent_hash, create_time);
        pending.push(header.clone());
        header
    }

    /// Shards this slave's masks cover, out of `genesis_shard_ids`.
    pub fn owned_shards(&self, genesis_shard_ids: &[FullShardId]) -> Vec<FullShardId> {
        genesis_shard_ids
            .iter()
            .copied()
            .filter(|shard| self.has_shard(*shard))
            .collect()
    }

    /// Recorded pings as `(root height, init_shards)`.
    pub fn pings(&self) -> Vec<(Option<u32>, bool)> {
        self.state.read().pings.clone()
    }

    /// Root blocks received, in order.
    pub fn root_blocks(&self) -> Vec<RootBlock> {
        self.state.read().root_blocks.clone()
    }

    /// Last mining config received.
    pub fn mining_config(&self) -> Option<(ArtificialTxConfig, bool)> {
        self.state.read().mining_config
    }

    /// Load-test requests received as `(num_tx_per_shard, x_shard_percent)`.
    pub fn generated_tx(&self) -> Vec<(u32, u32)> {
        self.state.read().generated_tx.clone()
    }

    async fn gate(&self) -> Result<(), MasterError> {
        if self.hang_rpcs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_rpcs.load(Ordering::SeqCst) {
            return Err(MasterError::rpc(&self.id, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl SlaveConnection for LocalSlave {
    fn slave_id(&self) -> &str {
        &self.id
    }

    fn chain_masks(&self) -> &[ChainMask] {
        &self.chain_masks
    }

    async fn ping(
        &self,
        root_block: Option<&RootBlock>,
        init_shards: bool,
    ) -> Result<PingResponse, MasterError> {
        self.gate().await?;
        if root_block.is_some() && init_shards && self.fail_head_push.load(Ordering::SeqCst) {
            return Err(MasterError::rpc(&self.id, "shard init failed"));
        }
        let mut state = self.state.write();
        state
            .pings
            .push((root_block.map(RootBlock::number), init_shards));

        Ok(PingResponse {
            id: state.reported_id.clone().unwrap_or_else(|| self.id.clone()),
            chain_mask_list: state
                .reported_masks
                .clone()
                .unwrap_or_else(|| self.chain_masks.clone()),
        })
    }

    async fn heartbeat(&self) -> bool {
        if self.gate().await.is_err() {
            return false;
        }
        self.alive.load(Ordering::SeqCst)
    }

    async fn get_unconfirmed_headers(&self) -> Result<Vec<HeadersInfo>, MasterError> {
        self.gate().await?;
        let state = self.state.read();
        Ok(state
            .unconfirmed
            .iter()
            .map(|(shard, headers)| HeadersInfo {
                branch: Branch::new(*shard),
                header_list: headers.clone(),
            })
            .collect())
    }

    async fn get_account_data(
        &self,
        _address: &Address,
        _block_height: Option<u64>,
    ) -> Result<Vec<AccountBranchData>, MasterError> {
        self.gate().await?;
        Ok(self.state.read().account_data.clone())
    }

    async fn send_mining_config(
        &self,
        config: &ArtificialTxConfig,
        mining: bool,
    ) -> Result<(), MasterError> {
        self.gate().await?;
        self.state.write().mining_config = Some((*config, mining));
        Ok(())
    }

    async fn add_root_block(
        &self,
        block: &RootBlock,
        _force_head_switch: bool,
    ) -> Result<(), MasterError> {
        self.gate().await?;
        let delay = self.state.read().root_block_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_add_root_block.load(Ordering::SeqCst) {
            return Err(MasterError::rpc(&self.id, "root block rejected"));
        }

        let confirmed: HashSet<_> = block
            .minor_block_headers
            .iter()
            .map(MinorBlockHeader::hash)
            .collect();
        let mut state = self.state.write();
        for pending in state.unconfirmed.values_mut() {
            pending.retain(|header| !confirmed.contains(&header.hash()));
        }
        state.root_blocks.push(block.clone());
        debug!(
            "[qc-18] Slave {} applied root block #{}",
            self.id,
            block.number()
        );
        Ok(())
    }

    async fn generate_tx(
        &self,
        num_tx_per_shard: u32,
        x_shard_percent: u32,
        _sample: &Transaction,
    ) -> Result<(), MasterError> {
        self.gate().await?;
        self.state
            .write()
            .generated_tx
            .push((num_tx_per_shard, x_shard_percent));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping_reports_configured_identity() {
        let slave = LocalSlave::new("S0", vec![ChainMask(0b10)]);
        let response = slave.ping(None, false).await.unwrap();

        assert_eq!(response.id, "S0");
        assert_eq!(response.chain_mask_list, vec![ChainMask(0b10)]);
        assert_eq!(slave.pings(), vec![(None, false)]);
    }

    #[tokio::test]
    async fn test_reported_identity_override() {
        let slave = LocalSlave::new("S0", vec![ChainMask(0b10)]);
        slave.report_identity("S9", vec![ChainMask(1)]);

        let response = slave.ping(None, false).await.unwrap();
        assert_eq!(response.id, "S9");
        assert_eq!(slave.slave_id(), "S0");
    }

    #[tokio::test]
    async fn test_heartbeat_follows_flags() {
        let slave = LocalSlave::new("S0", vec![ChainMask(1)]);
        assert!(slave.heartbeat().await);
        slave.set_alive(false);
        assert!(!slave.heartbeat().await);
        slave.set_alive(true);
        slave.fail_rpcs(true);
        assert!(!slave.heartbeat().await);
    }

    #[tokio::test]
    async fn test_head_push_failure_spares_handshake() {
        let slave = LocalSlave::new("S0", vec![ChainMask(1)]);
        slave.fail_head_push(true);
        let genesis = crate::adapters::InMemoryRootChain::genesis_block(1);

        assert!(slave.ping(None, false).await.is_ok());
        assert!(slave.ping(Some(&genesis), false).await.is_ok());
        assert!(matches!(
            slave.ping(Some(&genesis), true).await,
            Err(MasterError::SlaveRpc { .. })
        ));
        assert_eq!(slave.pings(), vec![(None, false), (Some(0), false)]);
    }

    #[tokio::test]
    async fn test_root_block_drops_confirmed_headers() {
        let slave = LocalSlave::new("S0", vec![ChainMask(1)]);
        let first = slave.produce_minor_block(2, 0, 10);
        let second = slave.produce_minor_block(2, 0, 20);
        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
        assert_eq!(second.parent_hash, first.hash());

        let block = RootBlock {
            header: crate::adapters::InMemoryRootChain::genesis_block(1).header,
            minor_block_headers: vec![first],
        };
        slave.add_root_block(&block, false).await.unwrap();

        let pending = slave.get_unconfirmed_headers().await.unwrap();
        assert_eq!(pending[0].header_list, vec![second]);
        assert_eq!(slave.root_blocks().len(), 1);
    }

    #[test]
    fn test_owned_shards() {
        let slave = LocalSlave::new("S1", vec![ChainMask(0b11)]);
        assert_eq!(
            slave.owned_shards(&[2, 3, 0x10002, 0x10003]),
            vec![0x10002, 0x10003]
        );
    }
}
