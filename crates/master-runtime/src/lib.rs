//! # Cluster Master Runtime
//!
//! Library half of the `master-runtime` binary.
//!
//! - `cluster/` - Dev cluster wiring: local slaves, in-memory root chain
//! - `mining/` - Dev mining loop

pub mod cluster;
pub mod mining;

pub use cluster::DevCluster;
pub use mining::DevMiner;
