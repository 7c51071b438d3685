//! # Fan-out / Fan-in Primitives
//!
//! Cluster-wide operations run the same call on every slave concurrently.
//! Every call carries a deadline; the first failure resolves the aggregate
//! and drops the sibling calls still in flight.

use crate::domain::MasterError;
use crate::ports::SlaveConnection;
use futures::future::try_join_all;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Run one slave call under a deadline.
pub async fn call_with_deadline<T, F>(
    slave_id: &str,
    timeout: Duration,
    call: F,
) -> Result<T, MasterError>
where
    F: Future<Output = Result<T, MasterError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(MasterError::SlaveTimeout {
            slave_id: slave_id.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Broadcast-and-wait: run `op` on every slave, fail if any call fails.
pub async fn broadcast_and_wait<'a, F, Fut>(
    slaves: &'a [Arc<dyn SlaveConnection>],
    timeout: Duration,
    op: F,
) -> Result<(), MasterError>
where
    F: Fn(&'a dyn SlaveConnection) -> Fut,
    Fut: Future<Output = Result<(), MasterError>> + 'a,
{
    let calls = slaves.iter().map(|slave| {
        let slave: &'a dyn SlaveConnection = slave.as_ref();
        call_with_deadline(slave.slave_id(), timeout, op(slave))
    });
    try_join_all(calls).await?;
    Ok(())
}

/// Fan-out half of fan-out-merge: run `op` on every slave and collect the
/// responses keyed by slave id, in pool order.
pub async fn fan_out_collect<'a, T, F, Fut>(
    slaves: &'a [Arc<dyn SlaveConnection>],
    timeout: Duration,
    op: F,
) -> Result<Vec<(String, T)>, MasterError>
where
    F: Fn(&'a dyn SlaveConnection) -> Fut,
    Fut: Future<Output = Result<T, MasterError>> + 'a,
{
    let calls = slaves.iter().map(|slave| {
        let slave: &'a dyn SlaveConnection = slave.as_ref();
        let call = op(slave);
        async move {
            let response = call_with_deadline(slave.slave_id(), timeout, call).await?;
            Ok::<_, MasterError>((slave.slave_id().to_string(), response))
        }
    });
    try_join_all(calls).await
}

/// Fan-in half of fan-out-merge: flatten per-slave responses into one map,
/// first seen wins.
///
/// Entries for a key already present are discarded, never combined. A
/// discarded entry that disagrees with the kept one is logged.
pub fn merge_first_seen<K, V, F>(responses: Vec<(String, Vec<V>)>, key_of: F) -> BTreeMap<K, V>
where
    K: Ord + Debug,
    V: PartialEq,
    F: Fn(&V) -> K,
{
    let mut merged = BTreeMap::new();
    for (slave_id, entries) in responses {
        for entry in entries {
            match merged.entry(key_of(&entry)) {
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                }
                Entry::Occupied(kept) => {
                    if *kept.get() == entry {
                        debug!(
                            "[qc-18] Duplicate report for {:?} from {} discarded",
                            kept.key(),
                            slave_id
                        );
                    } else {
                        warn!(
                            "[qc-18] Conflicting report for {:?} from {} discarded",
                            kept.key(),
                            slave_id
                        );
                    }
                }
            }
        }
    }
    merged
}

/// Fan-out-merge: [`fan_out_collect`] followed by [`merge_first_seen`].
pub async fn fan_out_merge<'a, K, V, F, Fut, KF>(
    slaves: &'a [Arc<dyn SlaveConnection>],
    timeout: Duration,
    op: F,
    key_of: KF,
) -> Result<BTreeMap<K, V>, MasterError>
where
    K: Ord + Debug,
    V: PartialEq,
    F: Fn(&'a dyn SlaveConnection) -> Fut,
    Fut: Future<Output = Result<Vec<V>, MasterError>> + 'a,
    KF: Fn(&V) -> K,
{
    let responses = fan_out_collect(slaves, timeout, op).await?;
    Ok(merge_first_seen(responses, key_of))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalSlave;
    use crate::domain::{ArtificialTxConfig, Branch, ChainMask, HeadersInfo};

    fn pool(slaves: &[Arc<LocalSlave>]) -> Vec<Arc<dyn SlaveConnection>> {
        slaves
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn SlaveConnection>)
            .collect()
    }

    fn config() -> ArtificialTxConfig {
        ArtificialTxConfig {
            target_root_block_time: 60,
            target_minor_block_time: 10,
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_slave() {
        let a = Arc::new(LocalSlave::new("A", vec![ChainMask(0b10)]));
        let b = Arc::new(LocalSlave::new("B", vec![ChainMask(0b11)]));
        let slaves = pool(&[a.clone(), b.clone()]);
        let cfg = config();

        broadcast_and_wait(&slaves, Duration::from_secs(1), |slave| {
            slave.send_mining_config(&cfg, true)
        })
        .await
        .unwrap();

        assert_eq!(a.mining_config(), Some((cfg, true)));
        assert_eq!(b.mining_config(), Some((cfg, true)));
    }

    #[tokio::test]
    async fn test_broadcast_fails_if_any_slave_fails() {
        let a = Arc::new(LocalSlave::new("A", vec![ChainMask(1)]));
        let b = Arc::new(LocalSlave::new("B", vec![ChainMask(1)]));
        b.fail_rpcs(true);
        let slaves = pool(&[a, b]);
        let cfg = config();

        let result = broadcast_and_wait(&slaves, Duration::from_secs(1), |slave| {
            slave.send_mining_config(&cfg, false)
        })
        .await;

        assert!(matches!(result, Err(MasterError::SlaveRpc { ref slave_id, .. }) if slave_id == "B"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_slave_hits_deadline() {
        let a = Arc::new(LocalSlave::new("A", vec![ChainMask(1)]));
        a.hang_rpcs(true);
        let slaves = pool(&[a]);
        let cfg = config();

        let result = broadcast_and_wait(&slaves, Duration::from_millis(250), |slave| {
            slave.send_mining_config(&cfg, false)
        })
        .await;

        assert!(matches!(
            result,
            Err(MasterError::SlaveTimeout { timeout_ms: 250, .. })
        ));
    }

    #[tokio::test]
    async fn test_collect_keys_by_slave_in_pool_order() {
        let a = Arc::new(LocalSlave::new("A", vec![ChainMask(1)]));
        let b = Arc::new(LocalSlave::new("B", vec![ChainMask(1)]));
        let slaves = pool(&[a, b]);

        let collected = fan_out_collect(&slaves, Duration::from_secs(1), |slave| {
            slave.get_unconfirmed_headers()
        })
        .await
        .unwrap();

        let ids: Vec<&str> = collected.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn test_merge_first_seen_never_combines() {
        let shard = Branch::new(2);
        let first = HeadersInfo {
            branch: shard,
            header_list: vec![],
        };
        let mut second = first.clone();
        second.header_list.push(crate::domain::MinorBlockHeader::new(
            shard,
            5,
            [0u8; 32],
            0,
        ));

        let merged = merge_first_seen(
            vec![
                ("A".to_string(), vec![first.clone()]),
                ("B".to_string(), vec![second]),
            ],
            |info: &HeadersInfo| info.branch.value,
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[&2], first);
    }
}
