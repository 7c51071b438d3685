//! End-to-end tests for the cluster master over in-process slaves.

use qc_18_cluster_master::adapters::{mine_nonce, PowAlgorithm, PowEngine};
use qc_18_cluster_master::algorithms::{assemble_candidate_headers, merge_first_seen};
use qc_18_cluster_master::{
    Address, Branch, ChainMask, ClusterConfig, ConsensusEngine, HeadersInfo, InMemoryRootChain,
    LivenessOutcome, LocalSlave, MasterApi, MasterBackend, MasterError, MinorBlockHeader,
    RootChainStore, ShutdownSignal, SlaveConnection,
};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

struct TestCluster {
    master: MasterBackend,
    chain: Arc<InMemoryRootChain>,
    a: Arc<LocalSlave>,
    b: Arc<LocalSlave>,
}

/// Slave A owns chain 0 (shards 0x2, 0x3), slave B owns chain 1
/// (shards 0x10002, 0x10003).
fn build(engine: Arc<dyn ConsensusEngine>, difficulty: u64) -> TestCluster {
    let mut config = ClusterConfig::default();
    config.slaves[0].id = "A".to_string();
    config.slaves[1].id = "B".to_string();
    config.master.rpc_timeout_ms = 500;

    let chain = Arc::new(InMemoryRootChain::new(Arc::clone(&engine), difficulty));
    let a = Arc::new(LocalSlave::new("A", vec![ChainMask(0b10)]));
    let b = Arc::new(LocalSlave::new("B", vec![ChainMask(0b11)]));
    let pool: Vec<Arc<dyn SlaveConnection>> = vec![
        a.clone() as Arc<dyn SlaveConnection>,
        b.clone() as Arc<dyn SlaveConnection>,
    ];

    let master = MasterBackend::new(config, engine, chain.clone(), pool).unwrap();
    TestCluster {
        master,
        chain,
        a,
        b,
    }
}

fn simulated() -> TestCluster {
    build(
        Arc::new(qc_18_cluster_master::adapters::SimulatedEngine::default()),
        1,
    )
}

fn headers(shard: u32, numbers: &[u64]) -> Vec<MinorBlockHeader> {
    numbers
        .iter()
        .map(|n| MinorBlockHeader::new(Branch::new(shard), *n, [0u8; 32], *n))
        .collect()
}

#[tokio::test]
async fn height_gap_blocks_the_candidate() {
    let c = simulated();
    assert_ok!(c.master.init_cluster().await);

    for header in headers(0x2, &[1, 2]) {
        c.chain.add_validated_minor_block(&header);
    }
    for header in headers(0x10002, &[7, 9]) {
        c.chain.add_validated_minor_block(&header);
    }
    c.a.set_unconfirmed_headers(0x2, headers(0x2, &[1, 2]));
    c.b.set_unconfirmed_headers(0x10002, headers(0x10002, &[7, 9]));

    let result = c.master.create_root_block_to_mine(Address::empty()).await;

    assert!(matches!(
        result,
        Err(MasterError::HeaderOrdering {
            shard: 0x10002,
            previous: 7,
            got: 9
        })
    ));
    assert_eq!(c.master.metrics().get_candidates_created(), 0);
    assert_eq!(c.master.current_block().number(), 0);
}

#[tokio::test]
async fn mine_and_commit_two_root_blocks() {
    let engine: Arc<dyn ConsensusEngine> = Arc::new(PowEngine::new(PowAlgorithm::Keccak256));
    let c = build(Arc::clone(&engine), 8);
    assert_ok!(c.master.init_cluster().await);

    let mut produced = Vec::new();
    for (slave, shard) in [(&c.a, 0x2), (&c.a, 0x3), (&c.b, 0x10003)] {
        let header = slave.produce_minor_block(shard, 0, 500);
        c.chain.add_validated_minor_block(&header);
        produced.push(header);
    }

    let mut block = c
        .master
        .create_root_block_to_mine(Address::empty())
        .await
        .unwrap();
    assert_eq!(block.minor_block_headers, produced);

    block.header.nonce = mine_nonce(engine.as_ref(), &block.header, 0, 100_000).unwrap();
    assert_ok!(c.master.add_root_block(block.clone()).await);
    assert!(c.master.pending_commit().is_none());
    assert_eq!(c.b.root_blocks().last(), Some(&block));

    // Confirmed headers are gone; only the new one is picked up.
    let next = c.b.produce_minor_block(0x10003, 1, 600);
    c.chain.add_validated_minor_block(&next);
    let second = c
        .master
        .create_root_block_to_mine(Address::empty())
        .await
        .unwrap();
    assert_eq!(second.number(), 2);
    assert_eq!(second.minor_block_headers, vec![next]);

    // Unsealed block is rejected locally before any slave sees it.
    let mut unsealed = second.clone();
    let bad_nonce = (0..1_000u64)
        .find(|n| {
            let mut h = second.header.clone();
            h.nonce = *n;
            engine.verify_seal(&h).is_err()
        })
        .unwrap();
    unsealed.header.nonce = bad_nonce;
    assert_err!(c.master.add_root_block(unsealed).await);
    assert_eq!(c.a.root_blocks().len(), 1);
}

#[tokio::test]
async fn unvalidated_header_cuts_the_shard() {
    let c = simulated();
    assert_ok!(c.master.init_cluster().await);

    let list = headers(0x3, &[4, 5, 6]);
    c.chain.add_validated_minor_block(&list[0]);
    c.chain.add_validated_minor_block(&list[2]);
    c.a.set_unconfirmed_headers(0x3, list.clone());

    let block = c
        .master
        .create_root_block_to_mine(Address::empty())
        .await
        .unwrap();
    assert_eq!(block.minor_block_headers, vec![list[0].clone()]);
}

#[tokio::test]
async fn candidate_validation_failure_is_typed() {
    let c = simulated();
    assert_ok!(c.master.init_cluster().await);

    // Confirmed by a root block the slave never heard about: the slave
    // still reports it, which makes the candidate invalid.
    let header = c.a.produce_minor_block(0x2, 0, 100);
    c.chain.add_validated_minor_block(&header);
    let block = c
        .master
        .create_root_block_to_mine(Address::empty())
        .await
        .unwrap();
    c.chain.insert_block(block).unwrap();
    assert_eq!(c.a.get_unconfirmed_headers().await.unwrap()[0].header_list, vec![header]);

    let result = c.master.create_root_block_to_mine(Address::empty()).await;
    assert!(matches!(result, Err(MasterError::CandidateValidation(_))));
}

#[tokio::test(start_paused = true)]
async fn hung_slave_times_out_candidate() {
    let c = simulated();
    assert_ok!(c.master.init_cluster().await);
    c.b.hang_rpcs(true);

    let result = c.master.create_root_block_to_mine(Address::empty()).await;
    assert!(matches!(
        result,
        Err(MasterError::SlaveTimeout { ref slave_id, timeout_ms: 500 }) if slave_id == "B"
    ));
}

#[tokio::test(start_paused = true)]
async fn liveness_failure_requests_shutdown_once() {
    let c = simulated();
    let (tx, mut rx) = mpsc::channel(8);
    let handle = c.master.start(tx).await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(rx.try_recv().is_err());

    c.a.set_alive(false);
    let signal = rx.recv().await.unwrap();
    assert_eq!(
        signal,
        ShutdownSignal::Terminate {
            reason: "slave A failed heartbeat".to_string()
        }
    );
    assert_eq!(
        handle.join().await,
        LivenessOutcome::SlaveDown {
            slave_id: "A".to_string()
        }
    );
    assert!(rx.recv().await.is_none());
}

#[test]
fn first_seen_follows_pool_order() {
    let mut rng = rand::thread_rng();
    let mut slaves: Vec<String> = (0..6).map(|i| format!("S{}", i)).collect();

    for _ in 0..20 {
        slaves.shuffle(&mut rng);
        let responses: Vec<(String, Vec<HeadersInfo>)> = slaves
            .iter()
            .map(|id| {
                let height = rng.gen_range(1..1_000);
                (
                    id.clone(),
                    vec![HeadersInfo {
                        branch: Branch::new(0x2),
                        header_list: headers(0x2, &[height]),
                    }],
                )
            })
            .collect();
        let expected = responses[0].1[0].clone();

        let merged = merge_first_seen(responses, |info: &HeadersInfo| info.branch.value);
        assert_eq!(merged[&0x2], expected);
    }
}

#[test]
fn contiguous_random_runs_assemble() {
    let mut rng = rand::thread_rng();

    for _ in 0..20 {
        let start = rng.gen_range(1..10_000u64);
        let len = rng.gen_range(1..20u64);
        let run: Vec<u64> = (start..start + len).collect();
        let list = headers(0x3, &run);
        let reports: BTreeMap<u32, HeadersInfo> = [(
            0x3,
            HeadersInfo {
                branch: Branch::new(0x3),
                header_list: list.clone(),
            },
        )]
        .into_iter()
        .collect();

        assert_eq!(
            assemble_candidate_headers(&reports, &[0x3], |_| true).unwrap(),
            list
        );

        // Any skipped height fails the whole assembly.
        let mut gapped = run.clone();
        gapped.push(start + len + rng.gen_range(1..5u64));
        let reports: BTreeMap<u32, HeadersInfo> = [(
            0x3,
            HeadersInfo {
                branch: Branch::new(0x3),
                header_list: headers(0x3, &gapped),
            },
        )]
        .into_iter()
        .collect();
        assert!(assemble_candidate_headers(&reports, &[0x3], |_| true).is_err());
    }
}
