//! # Root Consensus Engines
//!
//! Proof-of-work seal verification for root blocks. The engine is chosen
//! once from [`RootConfig::consensus_type`].
//!
//! A seal is valid when `pow_hash(header) <= 2^256 / difficulty`.

use crate::config::{ConsensusType, RootConfig};
use crate::domain::{keccak256, Hash, MasterError, RootBlockHeader};
use crate::ports::ConsensusEngine;
use primitive_types::U256;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Build the engine for the configured consensus type.
///
/// Ethash is accepted by the config schema but has no engine here.
pub fn create_consensus_engine(
    config: &RootConfig,
) -> Result<Arc<dyn ConsensusEngine>, MasterError> {
    let engine: Arc<dyn ConsensusEngine> = match config.consensus_type {
        ConsensusType::Simulate => Arc::new(SimulatedEngine::default()),
        ConsensusType::DoubleSha256 => Arc::new(PowEngine::new(PowAlgorithm::DoubleSha256)),
        ConsensusType::Keccak256 => Arc::new(PowEngine::new(PowAlgorithm::Keccak256)),
        ConsensusType::Ethash => {
            return Err(MasterError::UnsupportedConsensus("ethash".to_string()));
        }
    };
    debug!("[qc-18] Root consensus engine: {}", engine.name());
    Ok(engine)
}

/// Upper bound a valid seal hash must not exceed.
pub fn target_for_difficulty(difficulty: u64) -> U256 {
    if difficulty <= 1 {
        return U256::MAX;
    }
    U256::MAX / U256::from(difficulty)
}

/// Search nonces from `start` until the header seals, up to `max_attempts`.
///
/// Used by the dev mining loop; returns the sealing nonce.
pub fn mine_nonce(
    engine: &dyn ConsensusEngine,
    header: &RootBlockHeader,
    start: u64,
    max_attempts: u64,
) -> Option<u64> {
    let mut candidate = header.clone();
    for offset in 0..max_attempts {
        candidate.nonce = start.wrapping_add(offset);
        if engine.verify_seal(&candidate).is_ok() {
            return Some(candidate.nonce);
        }
    }
    None
}

/// Accepts every seal. For simulations and tests.
#[derive(Default)]
pub struct SimulatedEngine {
    closed: AtomicBool,
}

impl SimulatedEngine {
    /// Whether [`ConsensusEngine::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ConsensusEngine for SimulatedEngine {
    fn name(&self) -> &'static str {
        "simulate"
    }

    fn verify_seal(&self, _header: &RootBlockHeader) -> Result<(), MasterError> {
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hash function used for the proof of work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowAlgorithm {
    /// SHA-256 applied twice.
    DoubleSha256,
    /// Keccak-256.
    Keccak256,
}

impl PowAlgorithm {
    fn digest(&self, preimage: &[u8]) -> Hash {
        match self {
            PowAlgorithm::DoubleSha256 => sha256(&sha256(preimage)),
            PowAlgorithm::Keccak256 => keccak256(&[preimage]),
        }
    }
}

fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Hash-below-target proof of work.
pub struct PowEngine {
    algorithm: PowAlgorithm,
    closed: AtomicBool,
}

impl PowEngine {
    /// Engine using `algorithm`.
    pub fn new(algorithm: PowAlgorithm) -> Self {
        Self {
            algorithm,
            closed: AtomicBool::new(false),
        }
    }

    /// Proof-of-work hash of the header including its nonce.
    pub fn pow_hash(&self, header: &RootBlockHeader) -> Hash {
        let mut preimage = header.seal_preimage();
        preimage.extend_from_slice(&header.nonce.to_be_bytes());
        self.algorithm.digest(&preimage)
    }
}

impl ConsensusEngine for PowEngine {
    fn name(&self) -> &'static str {
        match self.algorithm {
            PowAlgorithm::DoubleSha256 => "double_sha256",
            PowAlgorithm::Keccak256 => "keccak256",
        }
    }

    fn verify_seal(&self, header: &RootBlockHeader) -> Result<(), MasterError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MasterError::InvalidSeal("engine closed".to_string()));
        }
        if header.difficulty == 0 {
            return Err(MasterError::InvalidSeal("zero difficulty".to_string()));
        }

        let hash = U256::from_big_endian(&self.pow_hash(header));
        if hash > target_for_difficulty(header.difficulty) {
            return Err(MasterError::InvalidSeal(format!(
                "{} hash above target for difficulty {}",
                self.name(),
                header.difficulty
            )));
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Address;

    fn header(difficulty: u64) -> RootBlockHeader {
        RootBlockHeader {
            version: 0,
            number: 1,
            parent_hash: [1u8; 32],
            minor_header_hash: [2u8; 32],
            coinbase: Address::empty(),
            create_time: 1_700_000_000,
            difficulty,
            nonce: 0,
        }
    }

    fn root_config(consensus_type: ConsensusType) -> RootConfig {
        RootConfig {
            consensus_type,
            ..RootConfig::default()
        }
    }

    #[test]
    fn test_factory_selects_engine() {
        let engine = create_consensus_engine(&root_config(ConsensusType::Simulate)).unwrap();
        assert_eq!(engine.name(), "simulate");

        let engine = create_consensus_engine(&root_config(ConsensusType::DoubleSha256)).unwrap();
        assert_eq!(engine.name(), "double_sha256");

        let engine = create_consensus_engine(&root_config(ConsensusType::Keccak256)).unwrap();
        assert_eq!(engine.name(), "keccak256");
    }

    #[test]
    fn test_factory_rejects_ethash() {
        let result = create_consensus_engine(&root_config(ConsensusType::Ethash));
        assert!(matches!(result, Err(MasterError::UnsupportedConsensus(_))));
    }

    #[test]
    fn test_simulated_accepts_anything() {
        let engine = SimulatedEngine::default();
        assert!(engine.verify_seal(&header(u64::MAX)).is_ok());
        engine.close();
        assert!(engine.is_closed());
    }

    #[test]
    fn test_difficulty_one_always_seals() {
        let engine = PowEngine::new(PowAlgorithm::Keccak256);
        assert!(engine.verify_seal(&header(1)).is_ok());
    }

    #[test]
    fn test_mine_and_verify() {
        for algorithm in [PowAlgorithm::DoubleSha256, PowAlgorithm::Keccak256] {
            let engine = PowEngine::new(algorithm);
            let mut sealed = header(16);
            let nonce = mine_nonce(&engine, &sealed, 0, 100_000).expect("difficulty 16 seals");
            sealed.nonce = nonce;
            assert!(engine.verify_seal(&sealed).is_ok());
        }
    }

    #[test]
    fn test_rejects_bad_seal() {
        let engine = PowEngine::new(PowAlgorithm::DoubleSha256);
        // Search for a nonce that misses the target.
        let mut unsealed = header(1 << 20);
        let bad_nonce = (0..1_000u64)
            .find(|n| {
                unsealed.nonce = *n;
                engine.verify_seal(&unsealed).is_err()
            })
            .unwrap();
        unsealed.nonce = bad_nonce;
        assert!(matches!(
            engine.verify_seal(&unsealed),
            Err(MasterError::InvalidSeal(_))
        ));
    }

    #[test]
    fn test_closed_engine_rejects() {
        let engine = PowEngine::new(PowAlgorithm::Keccak256);
        engine.close();
        assert!(engine.verify_seal(&header(1)).is_err());
    }

    #[test]
    fn test_target_monotonic() {
        assert!(target_for_difficulty(2) > target_for_difficulty(3));
        assert_eq!(target_for_difficulty(0), U256::MAX);
    }
}
