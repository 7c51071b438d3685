//! # Candidate Header Assembly
//!
//! Turns the merged unconfirmed-header reports into the ordered minor header
//! list of a root block candidate.
//!
//! ## Algorithm
//!
//! 1. Per shard, walk the reported headers in order.
//! 2. Each header must be exactly one above the previous one, else the whole
//!    assembly fails.
//! 3. Stop the shard at the first header the root chain has not validated.
//! 4. Emit the kept headers grouped by shard, shards in ascending id order,
//!    only for shards initialized at the candidate height.

use crate::domain::{
    invariant_contiguous_height, FullShardId, Hash, HeadersInfo, MasterError, MinorBlockHeader,
};
use std::collections::BTreeMap;

/// Validated, contiguous prefix of each shard's report.
///
/// Shards whose first header is unvalidated produce no entry.
pub fn collect_validated_prefixes<F>(
    reports: &BTreeMap<FullShardId, HeadersInfo>,
    is_validated: F,
) -> Result<BTreeMap<FullShardId, Vec<MinorBlockHeader>>, MasterError>
where
    F: Fn(&Hash) -> bool,
{
    let mut prefixes: BTreeMap<FullShardId, Vec<MinorBlockHeader>> = BTreeMap::new();

    for (shard, info) in reports {
        let mut previous = None;
        for header in &info.header_list {
            invariant_contiguous_height(*shard, previous, header.number)?;
            previous = Some(header.number);

            if !is_validated(&header.hash()) {
                break;
            }
            prefixes.entry(*shard).or_default().push(header.clone());
        }
    }

    Ok(prefixes)
}

/// Flatten the prefixes in `shards_to_check` order.
pub fn order_by_shard(
    mut prefixes: BTreeMap<FullShardId, Vec<MinorBlockHeader>>,
    shards_to_check: &[FullShardId],
) -> Vec<MinorBlockHeader> {
    let mut ordered = Vec::new();
    for shard in shards_to_check {
        if let Some(headers) = prefixes.remove(shard) {
            ordered.extend(headers);
        }
    }
    ordered
}

/// Both steps together.
pub fn assemble_candidate_headers<F>(
    reports: &BTreeMap<FullShardId, HeadersInfo>,
    shards_to_check: &[FullShardId],
    is_validated: F,
) -> Result<Vec<MinorBlockHeader>, MasterError>
where
    F: Fn(&Hash) -> bool,
{
    let prefixes = collect_validated_prefixes(reports, is_validated)?;
    Ok(order_by_shard(prefixes, shards_to_check))
}
