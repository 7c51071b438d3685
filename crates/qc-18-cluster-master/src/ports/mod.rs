//! # Ports Layer
//!
//! - Inbound: `MasterApi`
//! - Outbound: `SlaveConnection`, `RootChainStore`, `ConsensusEngine`

pub mod inbound;
pub mod outbound;

pub use inbound::MasterApi;
pub use outbound::{ConsensusEngine, PingResponse, RootChainStore, SlaveConnection};
