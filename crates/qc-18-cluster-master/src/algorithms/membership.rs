//! # Shard Membership
//!
//! Maps every genesis shard to the ordered list of slaves that own it.
//! A table is built once during cluster init and never mutated; the service
//! publishes it only after [`MembershipTable::check_complete`] passes.

use crate::domain::{invariant_cluster_complete, FullShardId, MasterError};
use crate::ports::SlaveConnection;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable shard → slaves mapping.
pub struct MembershipTable {
    owners: BTreeMap<FullShardId, Vec<Arc<dyn SlaveConnection>>>,
    genesis_shard_count: usize,
}

impl MembershipTable {
    /// Build the mapping. Slaves keep pool order inside each owner list.
    pub fn build(slaves: &[Arc<dyn SlaveConnection>], genesis_shard_ids: &[FullShardId]) -> Self {
        let owners = genesis_shard_ids
            .iter()
            .map(|&shard| {
                let list = slaves
                    .iter()
                    .filter(|slave| slave.has_shard(shard))
                    .cloned()
                    .collect();
                (shard, list)
            })
            .collect();

        Self {
            owners,
            genesis_shard_count: genesis_shard_ids.len(),
        }
    }

    /// Every genesis shard must have at least one owner.
    pub fn check_complete(&self) -> Result<(), MasterError> {
        let counts: BTreeMap<FullShardId, usize> = self
            .owners
            .iter()
            .map(|(shard, list)| (*shard, list.len()))
            .collect();
        invariant_cluster_complete(&counts, self.genesis_shard_count)
    }

    /// First owner of the shard.
    pub fn get_one(&self, full_shard_id: FullShardId) -> Option<Arc<dyn SlaveConnection>> {
        self.owners
            .get(&full_shard_id)
            .and_then(|list| list.first())
            .cloned()
    }

    /// All owners of the shard; empty for unknown shards.
    pub fn get_all(&self, full_shard_id: FullShardId) -> Vec<Arc<dyn SlaveConnection>> {
        self.owners
            .get(&full_shard_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Mapped shard ids, ascending.
    pub fn shard_ids(&self) -> impl Iterator<Item = FullShardId> + '_ {
        self.owners.keys().copied()
    }

    /// `shard -> [slave ids]` lines for the startup log.
    pub fn summary(&self) -> Vec<String> {
        self.owners
            .iter()
            .map(|(shard, list)| {
                let ids: Vec<&str> = list.iter().map(|slave| slave.slave_id()).collect();
                format!("{:#x} -> [{}]", shard, ids.join(", "))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalSlave;
    use crate::domain::{Branch, ChainMask};

    fn slave(id: &str, masks: &[u32]) -> Arc<dyn SlaveConnection> {
        Arc::new(LocalSlave::new(
            id,
            masks.iter().map(|m| ChainMask(*m)).collect(),
        ))
    }

    fn genesis() -> Vec<FullShardId> {
        vec![
            Branch::create(0, 2, 0).value,
            Branch::create(0, 2, 1).value,
            Branch::create(1, 2, 0).value,
            Branch::create(1, 2, 1).value,
        ]
    }

    #[test]
    fn test_parity_split() {
        let slaves = vec![slave("S0", &[0b10]), slave("S1", &[0b11])];
        let table = MembershipTable::build(&slaves, &genesis());

        assert!(table.check_complete().is_ok());
        assert_eq!(table.get_one(2).unwrap().slave_id(), "S0");
        assert_eq!(table.get_one(0x10003).unwrap().slave_id(), "S1");
        assert_eq!(table.get_all(3).len(), 1);
    }

    #[test]
    fn test_owner_lists_follow_pool_order() {
        let slaves = vec![slave("A", &[1]), slave("B", &[0b10])];
        let table = MembershipTable::build(&slaves, &genesis());

        let owners: Vec<String> = table
            .get_all(2)
            .iter()
            .map(|s| s.slave_id().to_string())
            .collect();
        assert_eq!(owners, vec!["A", "B"]);
        assert_eq!(table.get_one(2).unwrap().slave_id(), "A");
    }

    #[test]
    fn test_unowned_shard_is_incomplete() {
        let slaves = vec![slave("S0", &[0b10])];
        let table = MembershipTable::build(&slaves, &genesis());

        assert!(matches!(
            table.check_complete(),
            Err(MasterError::EmptyShard(0x10002))
        ));
    }

    #[test]
    fn test_unknown_shard_lookup() {
        let slaves = vec![slave("S0", &[1])];
        let table = MembershipTable::build(&slaves, &genesis());

        assert!(table.get_one(0x70001).is_none());
        assert!(table.get_all(0x70001).is_empty());
    }

    #[test]
    fn test_summary_lists_every_shard() {
        let slaves = vec![slave("S0", &[1])];
        let table = MembershipTable::build(&slaves, &genesis());
        let lines = table.summary();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "0x2 -> [S0]");
    }
}
