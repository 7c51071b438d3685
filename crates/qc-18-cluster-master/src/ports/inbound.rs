//! # Inbound Ports
//!
//! API trait defining what the cluster master offers to the mining loop and
//! the query surface.

use crate::domain::{
    AccountBranchData, Address, Branch, MasterError, RootBlock, ShardStats, Transaction,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Cluster Master API - inbound port.
#[async_trait]
pub trait MasterApi: Send + Sync {
    /// Handshake with every slave, build membership, push the root head.
    async fn init_cluster(&self) -> Result<(), MasterError>;

    /// Account data on every shard, keyed by branch.
    async fn get_account_data(
        &self,
        address: &Address,
        block_height: Option<u64>,
    ) -> Result<BTreeMap<Branch, AccountBranchData>, MasterError>;

    /// Account data on the address's primary shard.
    async fn get_primary_account_data(
        &self,
        address: &Address,
        block_height: Option<u64>,
    ) -> Result<AccountBranchData, MasterError>;

    /// Assemble a root block mining candidate.
    async fn create_root_block_to_mine(&self, coinbase: Address)
        -> Result<RootBlock, MasterError>;

    /// Commit a root block locally and on every slave.
    ///
    /// Only one commit runs at a time; a call made while another is running
    /// fails with `CommitInProgress`.
    async fn add_root_block(&self, block: RootBlock) -> Result<(), MasterError>;

    /// Replace the artificial tx config; `None` keeps the current value.
    async fn set_target_block_time(
        &self,
        root_block_time: Option<u32>,
        minor_block_time: Option<u32>,
    ) -> Result<(), MasterError>;

    /// Turn mining on or off across the cluster.
    async fn set_mining(&self, mining: bool) -> Result<(), MasterError>;

    /// Push the current artificial tx config to every slave.
    async fn send_mining_config_to_slaves(&self, mining: bool) -> Result<(), MasterError>;

    /// Ask every slave to generate load-test transactions.
    async fn create_transactions(
        &self,
        num_tx_per_shard: u32,
        x_shard_percent: u32,
        sample: &Transaction,
    ) -> Result<(), MasterError>;

    /// Record a shard status report.
    fn update_shard_status(&self, status: ShardStats);

    /// Current root chain head.
    fn current_block(&self) -> RootBlock;
}
