//! # QC-18 Cluster Master
//!
//! Coordinator of a sharded cluster: one master, many slave processes.
//!
//! **Subsystem ID:** 18
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! The master does not hold shard state. It:
//! - Verifies every slave's identity and builds the shard → slaves map
//! - Watches slave liveness and requests process shutdown on failure
//! - Assembles root block candidates from validated minor block headers
//! - Commits root blocks locally and on every slave
//! - Aggregates account queries and pushes mining configuration
//!
//! ## Guarantees
//!
//! | Property | Mechanism |
//! |----------|-----------|
//! | Handshake integrity | Reported id and chain masks must equal config |
//! | Complete coverage | Membership published only if every shard has an owner |
//! | Contiguous headers | Height gaps abort candidate assembly |
//! | Commit breadcrumb | Committing-hash marker cleared only after full broadcast |
//! | Bounded calls | Every slave RPC carries a deadline |
//!
//! ## Module Structure
//!
//! ```text
//! qc-18-cluster-master/
//! ├── domain/          # Branch, ChainMask, RootBlock, MasterError
//! ├── algorithms/      # Membership, fan-out, header assembly
//! ├── ports/           # MasterApi + SlaveConnection, RootChainStore, ConsensusEngine
//! ├── adapters/        # LocalSlave, InMemoryRootChain, PoW engines
//! ├── service.rs       # MasterBackend
//! └── liveness.rs      # Heartbeat monitor
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod config;
pub mod domain;
pub mod liveness;
pub mod metrics;
pub mod ports;
pub mod service;
pub mod telemetry;

// Re-exports
pub use adapters::{create_consensus_engine, InMemoryRootChain, LocalSlave};
pub use algorithms::{broadcast_and_wait, fan_out_merge, MembershipTable};
pub use config::{ClusterConfig, ConfigError, ConsensusType};
pub use domain::{
    AccountBranchData, Address, ArtificialTxConfig, Branch, ChainMask, FullShardId, Hash,
    HeadersInfo, MasterError, MinorBlockHeader, Result, RootBlock, RootBlockHeader, ShardStats,
    SlaveInfo, Transaction,
};
pub use liveness::{LivenessHandle, LivenessMonitor, LivenessOutcome, ShutdownSignal};
pub use metrics::Metrics;
pub use ports::{ConsensusEngine, MasterApi, PingResponse, RootChainStore, SlaveConnection};
pub use service::MasterBackend;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Subsystem identifier
pub const SUBSYSTEM_ID: u8 = 18;

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }

    #[test]
    fn test_subsystem_id() {
        assert_eq!(super::SUBSYSTEM_ID, 18);
    }
}
