//! # Cluster Master Algorithms
//!
//! - `membership`: shard → slaves table
//! - `fan_out`: concurrent slave calls with deadlines
//! - `header_assembly`: minor header selection for root candidates

pub mod fan_out;
pub mod header_assembly;
pub mod membership;

pub use fan_out::{
    broadcast_and_wait, call_with_deadline, fan_out_collect, fan_out_merge, merge_first_seen,
};
pub use header_assembly::{assemble_candidate_headers, collect_validated_prefixes, order_by_shard};
pub use membership::MembershipTable;
