//! Strategy selection, batching contracts and limits over the in-memory source.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bionet::config::{ExplorerConfig, StrategyConfig, VisualConfig};
use bionet::network::strategy::select;
use bionet::network::{
    CachedSource, ExploreContext, ExploreRequest, Explorer, MemorySource, NetworkSource, PersonId,
    RelationType, SharedStrategyConfig, StrategyKind, StrategyOverride,
};
use bionet::BionetError;

/// Root 1 with `fan` children, each with `fan` grandchildren, each with one
/// great-grandchild. Children are tied to their neighbours by association.
fn tree(fan: i64) -> MemorySource {
    let mut source = MemorySource::new().person(1, "Root");
    let mut next = 2;
    let mut previous_child = None;
    for _ in 0..fan {
        let child = next;
        next += 1;
        source = source
            .person(child, "Child")
            .relation(1, child, RelationType::Kinship, 75, "son");
        if let Some(previous) = previous_child {
            source = source.relation(previous, child, RelationType::Association, 9, "friend");
        }
        previous_child = Some(child);
        for _ in 0..fan {
            let grandchild = next;
            let great = next + 1;
            next += 2;
            source = source
                .person(grandchild, "Grandchild")
                .person(great, "Great-grandchild")
                .relation(child, grandchild, RelationType::Kinship, 75, "son")
                .relation(grandchild, great, RelationType::Office, 4, "colleague");
        }
    }
    source
}

fn explorer_over(source: Arc<dyn NetworkSource>, limits: ExplorerConfig) -> Explorer {
    Explorer::new(
        source,
        SharedStrategyConfig::new(StrategyConfig::default()),
        limits,
        VisualConfig::default(),
    )
}

#[test]
fn test_size_heuristic_thresholds() {
    let config = StrategyConfig {
        branching_factor: 20.0,
        small_threshold: 100.0,
        large_threshold: 1000.0,
        ..StrategyConfig::default()
    };
    assert_eq!(select(&config, 1, StrategyOverride::Auto).kind(), StrategyKind::Naive);
    assert_eq!(select(&config, 3, StrategyOverride::Auto).kind(), StrategyKind::WorkerPool);
}

#[tokio::test]
async fn test_batched_strategy_call_counts() {
    let memory = Arc::new(tree(5));
    let explorer = explorer_over(memory.clone(), ExplorerConfig::default());
    let request = ExploreRequest::new(1, 3).strategy(StrategyOverride::Optimized);

    let doc = explorer.explore(&request).await.unwrap();
    assert_eq!(doc.nodes.len(), 1 + 5 + 25 + 25);
    assert_eq!(memory.edge_calls(), 3);
    assert_eq!(memory.node_calls(), 2);
    assert_eq!(memory.edge_frontier_sizes(), vec![1, 5, 25]);
}

#[tokio::test]
async fn test_naive_strategy_call_counts() {
    let memory = Arc::new(tree(3));
    let explorer = explorer_over(memory.clone(), ExplorerConfig::default());
    let request = ExploreRequest::new(1, 2).strategy(StrategyOverride::Naive);

    let doc = explorer.explore(&request).await.unwrap();
    // 1 root + 3 children looked up one by one, then 1 + 3 + 9 records.
    assert_eq!(doc.nodes.len(), 13);
    assert_eq!(memory.edge_calls(), 4);
    assert_eq!(memory.node_calls(), 1 + 12);
}

#[tokio::test]
async fn test_reciprocal_pass_one_query_per_kind() {
    let memory = Arc::new(tree(6));
    let explorer = explorer_over(memory.clone(), ExplorerConfig::default());

    let request = ExploreRequest::new(1, 2)
        .relation_types([RelationType::Kinship, RelationType::Office])
        .include_reciprocal(true);
    explorer.explore(&request).await.unwrap();

    let calls = memory.within_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls.get(&RelationType::Kinship), Some(&1));
    assert_eq!(calls.get(&RelationType::Office), Some(&1));
    assert!(!calls.contains_key(&RelationType::Association));
}

#[tokio::test]
async fn test_reciprocal_skipped_above_ceiling() {
    let memory = Arc::new(tree(6));
    let limits = ExplorerConfig {
        reciprocal_ceiling: 10,
        ..ExplorerConfig::default()
    };
    let explorer = explorer_over(memory.clone(), limits);
    explorer
        .explore(&ExploreRequest::new(1, 2).include_reciprocal(true))
        .await
        .unwrap();
    assert!(memory.within_calls().is_empty());
}

#[tokio::test]
async fn test_caps_hold_for_every_strategy() {
    let memory = Arc::new(tree(8));
    let explorer = explorer_over(memory, ExplorerConfig::default());

    for strategy in [
        StrategyOverride::Naive,
        StrategyOverride::Optimized,
        StrategyOverride::WorkerPool,
    ] {
        let request = ExploreRequest::new(1, 3).strategy(strategy).caps(10, 40);
        let doc = explorer.explore(&request).await.unwrap();
        assert!(doc.truncated, "{:?}", strategy);
        assert!(doc.nodes.len() <= 40, "{:?}: {}", strategy, doc.nodes.len());
        for depth in 1..=3 {
            assert!(doc.nodes_at_depth(depth).count() <= 10, "{:?} depth {}", strategy, depth);
        }
        let ids: HashSet<PersonId> = doc.nodes.iter().map(|n| n.id).collect();
        assert!(doc.edges.iter().all(|e| ids.contains(&e.source) && ids.contains(&e.target)));
    }
}

#[tokio::test]
async fn test_worker_pool_deadline_returns_promptly() {
    let memory = Arc::new(tree(4).with_latency(Duration::from_millis(300)));
    let explorer = explorer_over(memory, ExplorerConfig::default());
    let ctx = ExploreContext::with_timeout(Duration::from_millis(450));

    let started = Instant::now();
    let request = ExploreRequest::new(1, 3).strategy(StrategyOverride::WorkerPool);
    let result = explorer.explore_with(&request, &ctx).await;
    assert!(matches!(result, Err(BionetError::DeadlineExceeded(450))));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_person_cache_skips_repeat_lookups() {
    let memory = Arc::new(tree(3));
    let cached = Arc::new(CachedSource::new(memory.clone(), 100));
    let explorer = explorer_over(cached.clone(), ExplorerConfig::default());
    let request = ExploreRequest::new(1, 2).strategy(StrategyOverride::Optimized);

    let first = explorer.explore(&request).await.unwrap();
    let node_calls = memory.node_calls();
    assert_eq!(cached.len(), first.nodes.len());

    let second = explorer.explore(&request).await.unwrap();
    assert_eq!(memory.node_calls(), node_calls);
    assert_eq!(first.nodes, second.nodes);
}

#[tokio::test]
async fn test_runtime_threshold_update() {
    let memory = Arc::new(tree(2));
    let explorer = explorer_over(memory, ExplorerConfig::default());
    let request = ExploreRequest::new(1, 2);

    assert_eq!(
        explorer.explore(&request).await.unwrap().strategy,
        StrategyKind::BatchOptimized
    );
    explorer
        .strategy_config()
        .update(StrategyConfig {
            small_threshold: 1000.0,
            large_threshold: 2000.0,
            ..StrategyConfig::default()
        })
        .unwrap();
    assert_eq!(explorer.explore(&request).await.unwrap().strategy, StrategyKind::Naive);
}
