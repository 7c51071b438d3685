//! # Domain Entities
//!
//! Blocks, headers and status records exchanged between master and slaves.

use super::errors::{FullShardId, Hash};
use super::value_objects::{Address, Branch};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Keccak-256 over the given byte slices.
pub fn keccak256(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Minor block header produced by a slave for one shard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinorBlockHeader {
    /// Owning shard.
    pub branch: Branch,
    /// Height within the shard.
    pub number: u64,
    /// Hash of the parent minor block.
    pub parent_hash: Hash,
    /// Creation time (unix seconds).
    pub create_time: u64,
    /// Block difficulty.
    pub difficulty: u64,
}

impl MinorBlockHeader {
    /// Create a header.
    pub fn new(branch: Branch, number: u64, parent_hash: Hash, create_time: u64) -> Self {
        Self {
            branch,
            number,
            parent_hash,
            create_time,
            difficulty: 1,
        }
    }

    /// Content hash over the canonical encoding.
    pub fn hash(&self) -> Hash {
        keccak256(&[
            &self.branch.value.to_be_bytes(),
            &self.number.to_be_bytes(),
            &self.parent_hash,
            &self.create_time.to_be_bytes(),
            &self.difficulty.to_be_bytes(),
        ])
    }

    /// Full shard id of the owning shard.
    pub fn full_shard_id(&self) -> FullShardId {
        self.branch.value
    }
}

/// Root block header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootBlockHeader {
    /// Header version.
    pub version: u32,
    /// Root chain height.
    pub number: u32,
    /// Hash of the parent root block.
    pub parent_hash: Hash,
    /// Hash committing to the included minor headers.
    pub minor_header_hash: Hash,
    /// Miner address.
    pub coinbase: Address,
    /// Creation time (unix seconds).
    pub create_time: u64,
    /// Block difficulty.
    pub difficulty: u64,
    /// PoW nonce.
    pub nonce: u64,
}

impl RootBlockHeader {
    /// Header hash, including the nonce.
    pub fn hash(&self) -> Hash {
        keccak256(&[&self.seal_preimage(), &self.nonce.to_be_bytes()])
    }

    /// Canonical encoding of every field except the nonce.
    pub fn seal_preimage(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(128);
        bytes.extend_from_slice(&self.version.to_be_bytes());
        bytes.extend_from_slice(&self.number.to_be_bytes());
        bytes.extend_from_slice(&self.parent_hash);
        bytes.extend_from_slice(&self.minor_header_hash);
        bytes.extend_from_slice(&self.coinbase.recipient);
        bytes.extend_from_slice(&self.coinbase.full_shard_key.to_be_bytes());
        bytes.extend_from_slice(&self.create_time.to_be_bytes());
        bytes.extend_from_slice(&self.difficulty.to_be_bytes());
        bytes
    }
}

/// Root block: header plus the minor block headers it confirms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootBlock {
    /// Header.
    pub header: RootBlockHeader,
    /// Confirmed minor headers, grouped by shard in ascending shard order.
    pub minor_block_headers: Vec<MinorBlockHeader>,
}

impl RootBlock {
    /// Block hash.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Root chain height.
    pub fn number(&self) -> u32 {
        self.header.number
    }

    /// Parent hash.
    pub fn parent_hash(&self) -> Hash {
        self.header.parent_hash
    }

    /// Recompute the minor header commitment from the included headers.
    pub fn compute_minor_header_hash(headers: &[MinorBlockHeader]) -> Hash {
        let hashes: Vec<Hash> = headers.iter().map(MinorBlockHeader::hash).collect();
        let parts: Vec<&[u8]> = hashes.iter().map(|h| h.as_slice()).collect();
        keccak256(&parts)
    }

    /// Whether the header commitment matches the included headers.
    pub fn minor_header_hash_matches(&self) -> bool {
        self.header.minor_header_hash == Self::compute_minor_header_hash(&self.minor_block_headers)
    }

    /// Short hex form of the hash for log lines.
    pub fn short_hash(&self) -> String {
        hex::encode(&self.hash()[..4])
    }
}

/// Unconfirmed headers reported by a slave for one shard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadersInfo {
    /// Shard.
    pub branch: Branch,
    /// Headers in ascending height order.
    pub header_list: Vec<MinorBlockHeader>,
}

/// Account view on one branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBranchData {
    /// Branch the data belongs to.
    pub branch: Branch,
    /// Transaction count (nonce).
    pub transaction_count: u64,
    /// Balance in the native token.
    pub balance: u128,
    /// Whether the account holds contract code.
    pub is_contract: bool,
}

/// Last reported status of a shard.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStats {
    /// Shard.
    pub branch: Branch,
    /// Tip height.
    pub height: u64,
    /// Tip timestamp.
    pub timestamp: u64,
    /// Tx count over the last minute.
    pub tx_count_60s: u32,
    /// Pending tx count.
    pub pending_tx_count: u32,
    /// Total tx count.
    pub total_tx_count: u32,
    /// Blocks produced over the last minute.
    pub block_count_60s: u32,
    /// Stale blocks over the last minute.
    pub stale_block_count_60s: u32,
    /// Time spent producing the last block, in milliseconds.
    pub last_block_time_ms: u32,
    /// Whether the shard is mining.
    pub mining: bool,
}

/// Sample transaction used as the template for load-test generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Encoded transaction payload.
    pub payload: Vec<u8>,
}

impl Transaction {
    /// Transaction hash.
    pub fn hash(&self) -> Hash {
        keccak256(&[&self.payload])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(number: u64) -> MinorBlockHeader {
        MinorBlockHeader::new(Branch::create(0, 2, 1), number, [0u8; 32], 1_000 + number)
    }

    fn root_block(headers: Vec<MinorBlockHeader>) -> RootBlock {
        RootBlock {
            header: RootBlockHeader {
                version: 0,
                number: 1,
                parent_hash: [7u8; 32],
                minor_header_hash: RootBlock::compute_minor_header_hash(&headers),
                coinbase: Address::empty(),
                create_time: 1_000,
                difficulty: 1,
                nonce: 0,
            },
            minor_block_headers: headers,
        }
    }

    #[test]
    fn test_minor_header_hash_depends_on_height() {
        assert_ne!(header(1).hash(), header(2).hash());
        assert_eq!(header(1).hash(), header(1).hash());
    }

    #[test]
    fn test_root_block_hash_changes_with_nonce() {
        let mut block = root_block(vec![header(1)]);
        let before = block.hash();
        block.header.nonce = 42;
        assert_ne!(before, block.hash());
    }

    #[test]
    fn test_minor_header_hash_matches() {
        let mut block = root_block(vec![header(1), header(2)]);
        assert!(block.minor_header_hash_matches());
        block.minor_block_headers.pop();
        assert!(!block.minor_header_hash_matches());
    }

    #[test]
    fn test_short_hash_is_eight_hex_chars() {
        assert_eq!(root_block(vec![]).short_hash().len(), 8);
    }
}
