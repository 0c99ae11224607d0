use std::{sync::Arc, thread};

use zappy_deep_memory::{DeepMemoryEngine, LineageError};

#[test]
fn create_chain_twice_shares_nodes() {
    let engine = DeepMemoryEngine::new();
    engine.create_chain("test_chain");
    engine.lineage().add_node("test_chain", "mem_000456");
    engine.lineage().add_node("test_chain", "mem_000456");
    let again = engine.create_chain("test_chain");
    assert_eq!(again.nodes.len(), 1);
    assert_eq!(engine.lineage().chain_ids(), vec!["test_chain"]);
}

#[test]
fn branch_precondition_and_atomic_merge() {
    let engine = DeepMemoryEngine::new();
    let lineage = engine.lineage();
    lineage.add_node("chain", "mem_000456");
    lineage.add_node("chain", "mem_000457");

    let before = lineage.get("chain").unwrap();
    let err = engine.branch("chain", "b1", "missing_node").unwrap_err();
    assert!(matches!(err, LineageError::NodeNotFound { .. }));
    assert_eq!(lineage.get("chain").unwrap().branches, before.branches);

    let branch = engine.branch("chain", "branch_001", "mem_000456").unwrap();
    lineage.add_node(&branch.chain_id, "mem_000458");

    lineage.add_node("other", "mem_000999");
    let chain_before = lineage.get("chain").unwrap();
    assert!(!engine.merge("chain", "other", "missing_node"));
    let chain_after = lineage.get("chain").unwrap();
    assert_eq!(chain_after.nodes, chain_before.nodes);
    assert_eq!(chain_after.branches, chain_before.branches);

    assert!(engine.merge("chain", "branch_001", "mem_000457"));
    let merged = lineage.get("chain").unwrap();
    assert_eq!(
        merged.nodes.iter().collect::<Vec<_>>(),
        vec!["mem_000456", "mem_000457", "mem_000458"]
    );
    assert_eq!(lineage.ancestry("branch_001"), vec!["branch_001", "chain"]);
}

#[test]
fn concurrent_appends_keep_one_copy_per_node() {
    let engine = Arc::new(DeepMemoryEngine::new());
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..50 {
                    engine.lineage().add_node("shared", &format!("mem_{i}"));
                    engine
                        .lineage()
                        .add_node("shared", &format!("w{worker}_{i}"));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let chain = engine.lineage().get("shared").unwrap();
    assert_eq!(chain.nodes.len(), 50 + 4 * 50);
}
