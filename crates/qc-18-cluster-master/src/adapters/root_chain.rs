//! # In-Memory Root Chain
//!
//! Root chain store backed by process memory. Holds the root blocks, the
//! canonical tip, the minor-block-validated index and the committing-hash
//! marker. Used by the development runtime and by tests.

use crate::domain::{
    Address, Hash, MasterError, MinorBlockHeader, RootBlock, RootBlockHeader,
};
use crate::ports::{ConsensusEngine, RootChainStore};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

struct ChainState {
    blocks: HashMap<Hash, RootBlock>,
    tip: Hash,
    validated_minor: HashSet<Hash>,
    confirmed_minor: HashSet<Hash>,
    committing_hash: Option<Hash>,
}

/// Root chain store kept in memory.
pub struct InMemoryRootChain {
    engine: Arc<dyn ConsensusEngine>,
    difficulty: u64,
    state: RwLock<ChainState>,
}

impl InMemoryRootChain {
    /// Chain holding only the genesis block.
    pub fn new(engine: Arc<dyn ConsensusEngine>, genesis_difficulty: u64) -> Self {
        let genesis = Self::genesis_block(genesis_difficulty);
        let tip = genesis.hash();
        let mut blocks = HashMap::new();
        blocks.insert(tip, genesis);

        Self {
            engine,
            difficulty: genesis_difficulty.max(1),
            state: RwLock::new(ChainState {
                blocks,
                tip,
                validated_minor: HashSet::new(),
                confirmed_minor: HashSet::new(),
                committing_hash: None,
            }),
        }
    }

    /// Genesis root block: height 0, no minor headers.
    pub fn genesis_block(difficulty: u64) -> RootBlock {
        RootBlock {
            header: RootBlockHeader {
                version: 0,
                number: 0,
                parent_hash: [0u8; 32],
                minor_header_hash: RootBlock::compute_minor_header_hash(&[]),
                coinbase: Address::empty(),
                create_time: 0,
                difficulty: difficulty.max(1),
                nonce: 0,
            },
            minor_block_headers: Vec::new(),
        }
    }

    /// Record a minor block as validated against the root chain.
    pub fn add_validated_minor_block(&self, header: &MinorBlockHeader) {
        self.state.write().validated_minor.insert(header.hash());
    }

    /// Number of stored root blocks, genesis included.
    pub fn block_count(&self) -> usize {
        self.state.read().blocks.len()
    }

    /// Look up a root block by hash.
    pub fn get_block(&self, hash: &Hash) -> Option<RootBlock> {
        self.state.read().blocks.get(hash).cloned()
    }

    fn validate_against(state: &ChainState, block: &RootBlock) -> Result<(), MasterError> {
        let parent = state.blocks.get(&block.parent_hash()).ok_or_else(|| {
            MasterError::RootChain(format!(
                "unknown parent {}",
                hex::encode(&block.parent_hash()[..4])
            ))
        })?;

        if block.number() != parent.number() + 1 {
            return Err(MasterError::RootChain(format!(
                "height {} does not follow parent height {}",
                block.number(),
                parent.number()
            )));
        }
        if block.header.create_time <= parent.header.create_time {
            return Err(MasterError::RootChain(format!(
                "create time {} not after parent {}",
                block.header.create_time, parent.header.create_time
            )));
        }
        if !block.minor_header_hash_matches() {
            return Err(MasterError::RootChain("minor header hash mismatch".into()));
        }

        for header in &block.minor_block_headers {
            let hash = header.hash();
            if !state.validated_minor.contains(&hash) {
                return Err(MasterError::RootChain(format!(
                    "minor block {}#{} not validated",
                    header.branch, header.number
                )));
            }
            if state.confirmed_minor.contains(&hash) {
                return Err(MasterError::RootChain(format!(
                    "minor block {}#{} already confirmed",
                    header.branch, header.number
                )));
            }
        }

        Ok(())
    }
}

impl RootChainStore for InMemoryRootChain {
    fn current_block(&self) -> RootBlock {
        let state = self.state.read();
        // The tip is always a stored block.
        state.blocks[&state.tip].clone()
    }

    fn is_minor_block_validated(&self, hash: &Hash) -> bool {
        self.state.read().validated_minor.contains(hash)
    }

    fn create_block_to_mine(
        &self,
        headers: Vec<MinorBlockHeader>,
        coinbase: Address,
        create_time: Option<u64>,
    ) -> Result<RootBlock, MasterError> {
        let tip = self.current_block();
        let create_time = create_time
            .unwrap_or_else(now_secs)
            .max(tip.header.create_time + 1);

        Ok(RootBlock {
            header: RootBlockHeader {
                version: 0,
                number: tip.number() + 1,
                parent_hash: tip.hash(),
                minor_header_hash: RootBlock::compute_minor_header_hash(&headers),
                coinbase,
                create_time,
                difficulty: self.difficulty,
                nonce: 0,
            },
            minor_block_headers: headers,
        })
    }

    fn validate_block(&self, block: &RootBlock) -> Result<(), MasterError> {
        Self::validate_against(&self.state.read(), block)
    }

    fn insert_block(&self, block: RootBlock) -> Result<(), MasterError> {
        let hash = block.hash();
        let mut state = self.state.write();

        if state.blocks.contains_key(&hash) {
            debug!("[qc-18] Root block {} already known", block.short_hash());
            return Ok(());
        }

        Self::validate_against(&state, &block)?;
        self.engine.verify_seal(&block.header)?;

        let tip_number = state.blocks[&state.tip].number();
        if block.number() > tip_number {
            state.tip = hash;
            for header in &block.minor_block_headers {
                state.confirmed_minor.insert(header.hash());
            }
            info!(
                "[qc-18] Root tip advanced to #{} ({})",
                block.number(),
                block.short_hash()
            );
        }
        state.blocks.insert(hash, block);
        Ok(())
    }

    fn write_committing_hash(&self, hash: Hash) {
        self.state.write().committing_hash = Some(hash);
    }

    fn clear_committing_hash(&self) {
        self.state.write().committing_hash = None;
    }

    fn committing_hash(&self) -> Option<Hash> {
        self.state.read().committing_hash
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
