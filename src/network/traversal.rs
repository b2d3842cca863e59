//! Level-by-level BFS over a [`NetworkSource`].
//!
//! The walk itself is shared by every strategy; strategies only differ in how
//! a level's edges and the final person records are fetched, which is what
//! [`FrontierExpander`] abstracts.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{BionetError, Result};
use crate::network::builder::{FinishOptions, GraphBuilder};
use crate::network::model::{EdgeRow, GraphDocument, PersonId, PersonRecord, RelationType};
use crate::network::query::{ExploreContext, ExploreQuery};
use crate::network::reciprocal::{detect_reciprocal, should_detect};
use crate::network::source::NetworkSource;

/// How one strategy fetches data for the shared walk.
#[async_trait]
pub trait FrontierExpander: Send + Sync {
    /// All rows of `relation_types` touching `frontier`.
    async fn expand(
        &self,
        source: &Arc<dyn NetworkSource>,
        frontier: &[PersonId],
        relation_types: &[RelationType],
        ctx: &ExploreContext,
    ) -> Result<Vec<EdgeRow>>;

    /// Person records for discovered non-root ids.
    async fn load_records(
        &self,
        source: &Arc<dyn NetworkSource>,
        ids: &[PersonId],
        ctx: &ExploreContext,
    ) -> Result<Vec<PersonRecord>>;

    /// Turn the arena into a document.
    async fn finalize(&self, builder: GraphBuilder, options: FinishOptions) -> Result<GraphDocument> {
        Ok(builder.finish(&options))
    }
}

/// Outcome of merging one level's rows into the arena.
#[derive(Debug, PartialEq, Eq)]
enum LevelOutcome {
    /// New frontier for the next level.
    Expanded(Vec<PersonId>),
    /// Nothing new was reachable.
    Exhausted,
    /// Adding this level would exceed the total node cap.
    CapReached,
}

/// Merge rows for `depth` into the builder, applying both caps.
fn merge_level(
    builder: &mut GraphBuilder,
    rows: Vec<EdgeRow>,
    depth: u32,
    query: &ExploreQuery,
) -> LevelOutcome {
    // First-seen order decides who survives the per-level cap.
    let mut candidates: Vec<PersonId> = Vec::new();
    let mut seen: HashSet<PersonId> = HashSet::new();
    for row in &rows {
        for id in [row.source, row.target] {
            if !builder.contains(id) && seen.insert(id) {
                candidates.push(id);
            }
        }
    }

    let mut truncated = false;
    if candidates.len() > query.node_cap_per_level {
        log::warn!(
            "Depth {}: {} new people, keeping the first {}",
            depth,
            candidates.len(),
            query.node_cap_per_level
        );
        candidates.truncate(query.node_cap_per_level);
        truncated = true;
    }

    let outcome = if builder.node_count() + candidates.len() > query.total_node_cap {
        log::warn!(
            "Depth {}: {} discovered + {} new exceeds total cap {}, stopping",
            depth,
            builder.node_count(),
            candidates.len(),
            query.total_node_cap
        );
        candidates.clear();
        truncated = true;
        LevelOutcome::CapReached
    } else if candidates.is_empty() {
        LevelOutcome::Exhausted
    } else {
        LevelOutcome::Expanded(candidates.clone())
    };

    if truncated {
        builder.mark_truncated();
    }

    for id in &candidates {
        builder.add_node(*id, depth);
    }
    // Rows between already-known people are kept even when the level is cut.
    for row in rows {
        builder.add_edge(row, false);
    }

    outcome
}

/// Run the BFS for `query` and assemble the document.
pub async fn traverse<E>(
    expander: &E,
    source: &Arc<dyn NetworkSource>,
    query: &ExploreQuery,
    options: FinishOptions,
    ctx: &ExploreContext,
) -> Result<GraphDocument>
where
    E: FrontierExpander + ?Sized,
{
    let started = Instant::now();
    ctx.check()?;

    let root = source
        .fetch_nodes_batch(&[query.root_id], ctx)
        .await?
        .into_iter()
        .find(|record| record.id == query.root_id)
        .ok_or(BionetError::EntityNotFound(query.root_id))?;

    let mut builder = GraphBuilder::new(root);
    let mut frontier = vec![query.root_id];

    for depth in 1..=query.max_depth {
        ctx.check()?;
        let rows = expander
            .expand(source, &frontier, &query.relation_types, ctx)
            .await?;
        let row_count = rows.len();

        match merge_level(&mut builder, rows, depth, query) {
            LevelOutcome::Expanded(next) => {
                log::debug!(
                    "Depth {}: {} rows, {} new people ({} total)",
                    depth,
                    row_count,
                    next.len(),
                    builder.node_count()
                );
                frontier = next;
            }
            LevelOutcome::Exhausted => {
                log::debug!("Depth {}: no new people, stopping early", depth);
                break;
            }
            LevelOutcome::CapReached => break,
        }
    }

    let missing = builder.ids_missing_records();
    if !missing.is_empty() {
        ctx.check()?;
        let records = expander.load_records(source, &missing, ctx).await?;
        if records.len() < missing.len() {
            log::debug!("{} people have no person record", missing.len() - records.len());
        }
        builder.attach_records(records);
    }

    let members = builder.member_ids();
    match should_detect(query, members.len()) {
        Ok(()) => {
            let extra = detect_reciprocal(
                source.as_ref(),
                &members,
                &query.relation_types,
                |key| builder.has_edge(key),
                ctx,
            )
            .await?;
            let added = extra
                .into_iter()
                .filter(|row| builder.add_edge(row.clone(), true))
                .count();
            log::debug!("Reciprocal pass added {} edges", added);
        }
        Err(reason) => log::debug!("Reciprocal pass skipped: {:?}", reason),
    }

    ctx.check()?;
    let doc = expander.finalize(builder, options).await?;
    log::debug!(
        "Traversal from {} finished in {:?}: {} nodes, {} edges",
        query.root_id,
        started.elapsed(),
        doc.nodes.len(),
        doc.edges.len()
    );
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VisualConfig;
    use crate::network::memory::MemorySource;
    use crate::network::strategy::StrategyKind;

    /// Plain one-call-per-level expander for exercising the walk itself.
    struct Direct;

    #[async_trait]
    impl FrontierExpander for Direct {
        async fn expand(
            &self,
            source: &Arc<dyn NetworkSource>,
            frontier: &[PersonId],
            relation_types: &[RelationType],
            ctx: &ExploreContext,
        ) -> Result<Vec<EdgeRow>> {
            source.fetch_edges_batch(frontier, relation_types, ctx).await
        }

        async fn load_records(
            &self,
            source: &Arc<dyn NetworkSource>,
            ids: &[PersonId],
            ctx: &ExploreContext,
        ) -> Result<Vec<PersonRecord>> {
            source.fetch_nodes_batch(ids, ctx).await
        }
    }

    fn options(query: &ExploreQuery) -> FinishOptions {
        FinishOptions {
            max_depth: query.max_depth,
            node_cap_per_level: query.node_cap_per_level,
            visual: VisualConfig::default(),
            strategy: StrategyKind::BatchOptimized,
        }
    }

    /// 1 - 2 - 4, 1 - 3 - 5, 2 ~ 3 (association), 4 - 6
    fn chain() -> Arc<MemorySource> {
        Arc::new(
            MemorySource::new()
                .person(1, "Root")
                .person(2, "Two")
                .person(3, "Three")
                .person(4, "Four")
                .person(5, "Five")
                .person(6, "Six")
                .relation(1, 2, RelationType::Kinship, 75, "son")
                .relation(3, 1, RelationType::Kinship, 28, "father")
                .relation(2, 4, RelationType::Kinship, 75, "son")
                .relation(3, 5, RelationType::Office, 4, "colleague")
                .relation(2, 3, RelationType::Association, 9, "friend")
                .relation(4, 6, RelationType::Kinship, 75, "son"),
        )
    }

    async fn run(source: &Arc<MemorySource>, query: &ExploreQuery) -> Result<GraphDocument> {
        let dyn_source: Arc<dyn NetworkSource> = source.clone();
        traverse(&Direct, &dyn_source, query, options(query), &ExploreContext::new()).await
    }

    #[tokio::test]
    async fn test_one_edge_call_per_level() {
        let source = chain();
        let query = ExploreQuery::new(1, 3, RelationType::ALL.to_vec());
        let doc = run(&source, &query).await.unwrap();
        assert_eq!(source.edge_calls(), 3);
        // Root lookup plus one batch for everyone else.
        assert_eq!(source.node_calls(), 2);
        assert_eq!(doc.nodes.len(), 6);
        assert_eq!(doc.node(6).unwrap().depth, 3);
        assert!(!doc.truncated);
    }

    #[tokio::test]
    async fn test_depths_are_bfs_distances() {
        let source = chain();
        let query = ExploreQuery::new(1, 2, RelationType::ALL.to_vec());
        let doc = run(&source, &query).await.unwrap();
        let depth = |id| doc.node(id).unwrap().depth;
        assert_eq!(depth(1), 0);
        assert_eq!(depth(2), 1);
        assert_eq!(depth(3), 1);
        assert_eq!(depth(4), 2);
        assert_eq!(depth(5), 2);
        assert!(doc.node(6).is_none());
        // Edge between two depth-1 nodes is picked up at level 2.
        assert!(doc
            .edges
            .iter()
            .any(|e| e.kind == RelationType::Association && !e.reciprocal));
    }

    #[tokio::test]
    async fn test_relation_filter_limits_walk() {
        let source = chain();
        let query = ExploreQuery::new(1, 3, vec![RelationType::Kinship]);
        let doc = run(&source, &query).await.unwrap();
        let ids: HashSet<PersonId> = doc.nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, [1, 2, 3, 4, 6].into_iter().collect());
        assert!(doc.edges.iter().all(|e| e.kind == RelationType::Kinship));
    }

    #[tokio::test]
    async fn test_unknown_root_fails_without_edge_queries() {
        let source = chain();
        let query = ExploreQuery::new(404, 2, RelationType::ALL.to_vec());
        let result = run(&source, &query).await;
        assert!(matches!(result, Err(BionetError::EntityNotFound(404))));
        assert_eq!(source.edge_calls(), 0);
    }

    #[tokio::test]
    async fn test_per_level_cap_first_seen() {
        let mut source = MemorySource::new().person(1, "Root");
        for i in 2..=11 {
            source = source.relation(1, i, RelationType::Association, 9, "friend");
        }
        let source = Arc::new(source);
        let mut query = ExploreQuery::new(1, 1, RelationType::ALL.to_vec());
        query.node_cap_per_level = 4;

        let doc = run(&source, &query).await.unwrap();
        let mut ids: Vec<PersonId> = doc.nodes.iter().map(|n| n.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(doc.edges.len(), 4);
        assert!(doc.truncated);
    }

    #[tokio::test]
    async fn test_total_cap_stops_without_partial_level() {
        let source = chain();
        let mut query = ExploreQuery::new(1, 3, RelationType::ALL.to_vec());
        // Root + 2 at depth 1 fits; depth 2 would add 2 more.
        query.total_node_cap = 4;

        let doc = run(&source, &query).await.unwrap();
        let ids: HashSet<PersonId> = doc.nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, [1, 2, 3].into_iter().collect());
        assert!(doc.truncated);
        assert!(doc.nodes.len() <= query.total_node_cap);
        // The 2~3 association between known people is still recorded.
        assert_eq!(doc.edges.len(), 3);
        assert_eq!(source.edge_calls(), 2);
    }

    #[tokio::test]
    async fn test_reciprocal_pass_marks_edges() {
        // 2 and 3 are both depth-2 via different parents; their tie is only
        // visible to the post-pass when the walk stops at depth 2.
        let source = Arc::new(
            MemorySource::new()
                .person(1, "Root")
                .relation(1, 10, RelationType::Kinship, 75, "son")
                .relation(1, 20, RelationType::Kinship, 75, "son")
                .relation(10, 2, RelationType::Kinship, 75, "son")
                .relation(20, 3, RelationType::Kinship, 75, "son")
                .relation(2, 3, RelationType::Association, 9, "friend"),
        );
        let mut query = ExploreQuery::new(1, 2, RelationType::ALL.to_vec());

        let doc = run(&source, &query).await.unwrap();
        assert!(!doc.edges.iter().any(|e| e.kind == RelationType::Association));

        query.include_reciprocal = true;
        let doc = run(&source, &query).await.unwrap();
        let tie = doc
            .edges
            .iter()
            .find(|e| e.kind == RelationType::Association)
            .unwrap();
        assert!(tie.reciprocal);
        assert_eq!(doc.node(2).unwrap().depth, 2);
        assert_eq!(source.within_calls().values().sum::<usize>(), 3);
    }

    #[tokio::test]
    async fn test_reciprocal_tie_does_not_overfill_capped_level() {
        // 3 loses the level-1 slot to 2 and is reached through 2 at level 2.
        // The reciprocal 1-3 tie must not move it back into the full level.
        let source = Arc::new(
            MemorySource::new()
                .person(1, "Root")
                .relation(1, 2, RelationType::Kinship, 75, "son")
                .relation(1, 3, RelationType::Kinship, 75, "son")
                .relation(2, 3, RelationType::Association, 9, "friend"),
        );
        let mut query = ExploreQuery::new(1, 2, RelationType::ALL.to_vec());
        query.node_cap_per_level = 1;
        query.include_reciprocal = true;

        let doc = run(&source, &query).await.unwrap();
        let level_one: Vec<PersonId> = doc.nodes_at_depth(1).map(|n| n.id).collect();
        assert_eq!(level_one, vec![2]);
        assert_eq!(doc.node(3).unwrap().depth, 2);
        assert!(doc.truncated);
        assert!(doc
            .edges
            .iter()
            .any(|e| e.source == 1 && e.target == 3 && e.reciprocal));
    }

    #[tokio::test]
    async fn test_edge_failure_propagates() {
        let source = chain();
        source.fail_edge_calls(true);
        let query = ExploreQuery::new(1, 2, RelationType::ALL.to_vec());
        let result = run(&source, &query).await;
        assert!(matches!(result, Err(BionetError::DataSource(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let source = chain();
        let dyn_source: Arc<dyn NetworkSource> = source.clone();
        let ctx = ExploreContext::new();
        ctx.cancel();
        let query = ExploreQuery::new(1, 2, RelationType::ALL.to_vec());
        let result = traverse(&Direct, &dyn_source, &query, options(&query), &ctx).await;
        assert!(matches!(result, Err(BionetError::Cancelled)));
        assert_eq!(source.node_calls(), 0);
    }
}
