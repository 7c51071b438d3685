//! # Outbound Ports
//!
//! Traits for external dependencies: slave RPC clients, the root chain store
//! and the consensus engine.

use crate::domain::{
    AccountBranchData, Address, ArtificialTxConfig, ChainMask, FullShardId, Hash, HeadersInfo,
    MasterError, MinorBlockHeader, RootBlock, RootBlockHeader, Transaction,
};
use async_trait::async_trait;

/// Ping response: the slave's declared identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PingResponse {
    /// Slave id.
    pub id: String,
    /// Chain masks the slave serves, in order.
    pub chain_mask_list: Vec<ChainMask>,
}

/// RPC client to one slave process - outbound port.
///
/// Identity (`slave_id`, `chain_masks`) is the configured one; the values the
/// slave itself declares come back from [`SlaveConnection::ping`].
#[async_trait]
pub trait SlaveConnection: Send + Sync {
    /// Configured slave id.
    fn slave_id(&self) -> &str;

    /// Configured chain masks, in order.
    fn chain_masks(&self) -> &[ChainMask];

    /// Whether any configured mask covers the shard.
    fn has_shard(&self, full_shard_id: FullShardId) -> bool {
        self.chain_masks()
            .iter()
            .any(|mask| mask.contains_full_shard_id(full_shard_id))
    }

    /// Handshake. `root_block` carries the master's head once the cluster is
    /// wired; `init_shards` asks the slave to set up its shards.
    async fn ping(
        &self,
        root_block: Option<&RootBlock>,
        init_shards: bool,
    ) -> Result<PingResponse, MasterError>;

    /// Liveness probe.
    async fn heartbeat(&self) -> bool;

    /// Unconfirmed minor headers, grouped by shard.
    async fn get_unconfirmed_headers(&self) -> Result<Vec<HeadersInfo>, MasterError>;

    /// Account data on every shard the slave owns.
    async fn get_account_data(
        &self,
        address: &Address,
        block_height: Option<u64>,
    ) -> Result<Vec<AccountBranchData>, MasterError>;

    /// Push the artificial tx config and mining flag.
    async fn send_mining_config(
        &self,
        config: &ArtificialTxConfig,
        mining: bool,
    ) -> Result<(), MasterError>;

    /// Apply a committed root block.
    async fn add_root_block(
        &self,
        block: &RootBlock,
        force_head_switch: bool,
    ) -> Result<(), MasterError>;

    /// Generate load-test transactions from a sample.
    async fn generate_tx(
        &self,
        num_tx_per_shard: u32,
        x_shard_percent: u32,
        sample: &Transaction,
    ) -> Result<(), MasterError>;
}

/// Root chain storage and validation - outbound port.
///
/// Implementations guard their own state; the committing-hash marker in
/// particular must be read and written under exclusive access.
pub trait RootChainStore: Send + Sync {
    /// Current canonical head.
    fn current_block(&self) -> RootBlock;

    /// Whether the minor block is known valid against the root chain.
    fn is_minor_block_validated(&self, hash: &Hash) -> bool;

    /// Build an unsealed candidate on top of the current head.
    fn create_block_to_mine(
        &self,
        headers: Vec<MinorBlockHeader>,
        coinbase: Address,
        create_time: Option<u64>,
    ) -> Result<RootBlock, MasterError>;

    /// Structural validation of a block against the chain.
    fn validate_block(&self, block: &RootBlock) -> Result<(), MasterError>;

    /// Insert a block into the chain.
    fn insert_block(&self, block: RootBlock) -> Result<(), MasterError>;

    /// Set the committing-hash marker.
    fn write_committing_hash(&self, hash: Hash);

    /// Clear the committing-hash marker.
    fn clear_committing_hash(&self);

    /// Current committing-hash marker, if any.
    fn committing_hash(&self) -> Option<Hash>;
}

/// Root consensus engine - outbound port.
pub trait ConsensusEngine: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &'static str;

    /// Verify the header's proof of work against its difficulty.
    fn verify_seal(&self, header: &RootBlockHeader) -> Result<(), MasterError>;

    /// Release engine resources.
    fn close(&self);
}
