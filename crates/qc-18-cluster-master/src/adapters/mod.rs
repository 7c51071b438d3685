//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements the outbound port traits for the cluster master.

mod consensus;
mod local_slave;
mod root_chain;

pub use consensus::{
    create_consensus_engine, mine_nonce, target_for_difficulty, PowAlgorithm, PowEngine,
    SimulatedEngine,
};
pub use local_slave::LocalSlave;
pub use root_chain::InMemoryRootChain;
