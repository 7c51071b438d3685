//! # Domain Value Objects
//!
//! Immutable value types for the cluster master.

use super::errors::FullShardId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shard branch, wrapping a full shard id.
///
/// Layout: `chain_id << 16 | shard_size | shard_id`, where `shard_size` is a
/// power of two and `shard_id < shard_size`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Branch {
    /// Raw full shard id.
    pub value: FullShardId,
}

impl Branch {
    /// Wrap a raw full shard id.
    pub fn new(value: FullShardId) -> Self {
        Self { value }
    }

    /// Build a branch from its components.
    pub fn create(chain_id: u32, shard_size: u32, shard_id: u32) -> Self {
        debug_assert!(shard_size.is_power_of_two());
        Self {
            value: (chain_id << 16) | shard_size | shard_id,
        }
    }

    /// Chain id (upper 16 bits).
    pub fn chain_id(&self) -> u32 {
        self.value >> 16
    }

    /// Shard size encoded by the highest set bit of the lower 16 bits.
    pub fn shard_size(&self) -> u32 {
        let low = self.value & 0xFFFF;
        if low == 0 {
            return 0;
        }
        1 << (31 - low.leading_zeros())
    }

    /// Shard index within its chain.
    pub fn shard_id(&self) -> u32 {
        (self.value & 0xFFFF) & self.shard_size().saturating_sub(1)
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.shard_id(),
            self.shard_size(),
            self.chain_id()
        )
    }
}

/// Chain mask describing which chains a slave serves.
///
/// The highest set bit marks how many low bits of the chain id are compared.
/// Mask `0b1` matches every chain; mask `0b10` matches even chain ids; mask
/// `0b11` matches odd chain ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainMask(pub u32);

impl ChainMask {
    /// Raw mask value.
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Zero is not a valid mask.
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// Whether this mask covers the chain of the given full shard id.
    pub fn contains_full_shard_id(&self, full_shard_id: FullShardId) -> bool {
        self.contains_chain_id(full_shard_id >> 16)
    }

    /// Whether this mask covers the given chain id.
    pub fn contains_chain_id(&self, chain_id: u32) -> bool {
        if !self.is_valid() {
            return false;
        }
        let bit_mask = (1u32 << (31 - self.0.leading_zeros())) - 1;
        (chain_id & bit_mask) == (self.0 & bit_mask)
    }
}

/// Account address with its full shard key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// 20-byte recipient.
    pub recipient: [u8; 20],
    /// Full shard key selecting the account's primary shard.
    pub full_shard_key: u32,
}

impl Address {
    /// Create an address.
    pub fn new(recipient: [u8; 20], full_shard_key: u32) -> Self {
        Self {
            recipient,
            full_shard_key,
        }
    }

    /// Empty address, used as coinbase when mining is anonymous.
    pub fn empty() -> Self {
        Self::new([0u8; 20], 0)
    }
}

/// Target block-time parameters pushed to slaves.
///
/// Replaced wholesale on update, never merged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtificialTxConfig {
    /// Target root block time in seconds.
    pub target_root_block_time: u32,
    /// Target minor block time in seconds.
    pub target_minor_block_time: u32,
}

/// Slave directory entry, as configured.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaveInfo {
    /// Slave id.
    pub id: String,
    /// Host name or IP.
    pub host: String,
    /// RPC port.
    pub port: u16,
    /// Chain masks served by the slave.
    pub chain_mask_list: Vec<ChainMask>,
}
