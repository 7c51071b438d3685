//! # Domain Invariants
//!
//! Rules the cluster master must hold at every coordination step.

use super::errors::{FullShardId, MasterError};
use super::value_objects::ChainMask;
use std::collections::BTreeMap;

/// Default interval between liveness cycles.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 4;

/// Default deadline for a single slave RPC.
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 10_000;

/// Invariant: a slave's ping response matches its configuration exactly.
///
/// Ids must be equal and the chain mask lists equal element by element,
/// in order.
pub fn invariant_handshake_matches(
    configured_id: &str,
    configured_masks: &[ChainMask],
    reported_id: &str,
    reported_masks: &[ChainMask],
) -> Result<(), MasterError> {
    if configured_id != reported_id {
        return Err(MasterError::SlaveIdMismatch {
            expected: configured_id.to_string(),
            got: reported_id.to_string(),
        });
    }

    if configured_masks.len() != reported_masks.len() {
        return Err(MasterError::ChainMaskCountMismatch {
            slave_id: configured_id.to_string(),
            expected: configured_masks.len(),
            got: reported_masks.len(),
        });
    }

    for (index, (expected, got)) in configured_masks.iter().zip(reported_masks).enumerate() {
        if expected != got {
            return Err(MasterError::ChainMaskMismatch {
                slave_id: configured_id.to_string(),
                index,
                expected: expected.value(),
                got: got.value(),
            });
        }
    }

    Ok(())
}

/// Invariant: every genesis shard is served by at least one slave.
///
/// `owners` maps each mapped shard to its owner count.
pub fn invariant_cluster_complete(
    owners: &BTreeMap<FullShardId, usize>,
    genesis_shard_count: usize,
) -> Result<(), MasterError> {
    if owners.len() != genesis_shard_count {
        return Err(MasterError::IncompleteShardCoverage {
            mapped: owners.len(),
            expected: genesis_shard_count,
        });
    }

    if let Some((shard, _)) = owners.iter().find(|(_, count)| **count == 0) {
        return Err(MasterError::EmptyShard(*shard));
    }

    Ok(())
}

/// Invariant: accepted headers of one shard have strictly contiguous heights.
///
/// `previous` is `None` for the first header of the shard.
pub fn invariant_contiguous_height(
    shard: FullShardId,
    previous: Option<u64>,
    next: u64,
) -> Result<(), MasterError> {
    match previous {
        Some(prev) if prev.checked_add(1) != Some(next) => Err(MasterError::HeaderOrdering {
            shard,
            previous: prev,
            got: next,
        }),
        _ => Ok(()),
    }
}
