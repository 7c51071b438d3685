//! # Domain Errors
//!
//! Error types for the Cluster Master subsystem.

use thiserror::Error;

/// Full shard identifier (`chain_id << 16 | shard_size | shard_id`).
pub type FullShardId = u32;

/// Hash type (32-byte keccak256).
pub type Hash = [u8; 32];

/// Result type alias for cluster master operations.
pub type Result<T> = std::result::Result<T, MasterError>;

/// Cluster master error types.
#[derive(Debug, Error)]
pub enum MasterError {
    /// Slave reported a different identity than configured.
    #[error("Slave id mismatch: expected {expected}, got {got}")]
    SlaveIdMismatch {
        /// Configured slave id
        expected: String,
        /// Id reported in the ping response
        got: String,
    },

    /// Slave reported a chain mask list of a different length.
    #[error("Chain mask list length mismatch for slave {slave_id}: expected {expected}, got {got}")]
    ChainMaskCountMismatch {
        /// Slave id
        slave_id: String,
        /// Configured mask count
        expected: usize,
        /// Reported mask count
        got: usize,
    },

    /// Slave reported a different chain mask at some position.
    #[error("Chain mask mismatch for slave {slave_id} at index {index}: expected {expected:#x}, got {got:#x}")]
    ChainMaskMismatch {
        /// Slave id
        slave_id: String,
        /// Position in the mask list
        index: usize,
        /// Configured mask value
        expected: u32,
        /// Reported mask value
        got: u32,
    },

    /// Not every genesis shard is served by a slave.
    #[error("Incomplete shard coverage: {mapped} of {expected} genesis shards mapped")]
    IncompleteShardCoverage {
        /// Distinct shards present in the membership table
        mapped: usize,
        /// Genesis shard count
        expected: usize,
    },

    /// A shard is present in the membership table with no slave.
    #[error("Shard {0:#x} has no slave connection")]
    EmptyShard(FullShardId),

    /// Cluster initialization already completed.
    #[error("Cluster already initialized")]
    AlreadyInitialized,

    /// Operation requires an initialized cluster.
    #[error("Cluster not initialized")]
    NotInitialized,

    /// A slave RPC failed.
    #[error("Slave {slave_id} RPC failed: {reason}")]
    SlaveRpc {
        /// Slave id
        slave_id: String,
        /// Failure reason reported by the transport
        reason: String,
    },

    /// A slave RPC did not complete before its deadline.
    #[error("Slave {slave_id} RPC timed out after {timeout_ms}ms")]
    SlaveTimeout {
        /// Slave id
        slave_id: String,
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// Minor block headers for a shard are not height-contiguous.
    #[error("Headers must be ordered by height: shard {shard:#x} has {got} after {previous}")]
    HeaderOrdering {
        /// Offending shard
        shard: FullShardId,
        /// Height of the previously accepted header
        previous: u64,
        /// Height of the offending header
        got: u64,
    },

    /// The assembled root block candidate failed validation.
    #[error("Root block candidate failed validation: {0}")]
    CandidateValidation(String),

    /// Root chain store rejected an operation.
    #[error("Root chain error: {0}")]
    RootChain(String),

    /// Another root block commit has not finished.
    #[error("Root block commit already in progress: {0}")]
    CommitInProgress(String),

    /// No slave serves the requested branch.
    #[error("No such branch's connection: {0:#x}")]
    NoBranchConnection(FullShardId),

    /// The owning slave returned no data for the requested branch.
    #[error("No data for branch {0:#x}")]
    NoSuchData(FullShardId),

    /// Aggregated account data does not cover every genesis shard.
    #[error("Account data incomplete: {got} of {expected} shards")]
    AccountDataIncomplete {
        /// Shards present in the merged result
        got: usize,
        /// Genesis shard count
        expected: usize,
    },

    /// Consensus engine rejected a block seal.
    #[error("Invalid seal: {0}")]
    InvalidSeal(String),

    /// Consensus type is recognized but not supported.
    #[error("Unsupported consensus type: {0}")]
    UnsupportedConsensus(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MasterError {
    /// Build a `SlaveRpc` error.
    pub fn rpc(slave_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SlaveRpc {
            slave_id: slave_id.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is recoverable (caller may retry the operation).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SlaveRpc { .. }
                | Self::SlaveTimeout { .. }
                | Self::HeaderOrdering { .. }
                | Self::CandidateValidation(_)
                | Self::CommitInProgress(_)
                | Self::NoSuchData(_)
                | Self::AccountDataIncomplete { .. }
        )
    }

    /// Check if error is critical (cluster must not proceed).
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::SlaveIdMismatch { .. }
                | Self::ChainMaskCountMismatch { .. }
                | Self::ChainMaskMismatch { .. }
                | Self::IncompleteShardCoverage { .. }
                | Self::EmptyShard(_)
                | Self::UnsupportedConsensus(_)
                | Self::Config(_)
        )
    }
}
