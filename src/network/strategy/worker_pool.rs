//! Fan each level out over a bounded set of tokio tasks.
//!
//! The frontier (and the final record load) is split into contiguous chunks,
//! one task per chunk, and results are reassembled in chunk order so the
//! merged rows match what a single batch call would return. Graph assembly
//! runs on the blocking pool. Tasks never outlive the call: on the first
//! failure the remaining ones are cancelled, aborted, and drained.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::config::StrategyConfig;
use crate::error::{BionetError, Result};
use crate::network::builder::{FinishOptions, GraphBuilder};
use crate::network::model::{EdgeRow, GraphDocument, PersonId, PersonRecord, RelationType};
use crate::network::query::ExploreContext;
use crate::network::source::NetworkSource;
use crate::network::traversal::FrontierExpander;

/// Frontiers smaller than this per worker are not worth splitting further.
pub const MIN_CHUNK: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolStrategy {
    workers: usize,
}

impl WorkerPoolStrategy {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Size the pool from available parallelism, clamped to the configured range.
    pub fn from_config(config: &StrategyConfig) -> Self {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(config.min_workers);
        Self::new(available.clamp(config.min_workers, config.max_workers))
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn chunks(&self, ids: &[PersonId]) -> Vec<Vec<PersonId>> {
        if ids.is_empty() {
            return Vec::new();
        }
        let count = self.workers.min(ids.len().div_ceil(MIN_CHUNK)).max(1);
        let size = ids.len().div_ceil(count);
        ids.chunks(size).map(<[PersonId]>::to_vec).collect()
    }
}

/// Run `work` once per chunk on a `JoinSet` and concatenate results in chunk order.
async fn fan_out<T, F, Fut>(
    chunks: Vec<Vec<PersonId>>,
    ctx: &ExploreContext,
    work: F,
) -> Result<Vec<T>>
where
    T: Send + 'static,
    F: Fn(Vec<PersonId>, ExploreContext) -> Fut,
    Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
{
    // Child token: failing workers cancel their siblings without touching the caller's token.
    let worker_ctx = ExploreContext::with_token(ctx.token().child_token());
    let total = chunks.len();
    let mut set = JoinSet::new();
    for (index, chunk) in chunks.into_iter().enumerate() {
        let fut = work(chunk, worker_ctx.clone());
        set.spawn(async move { (index, fut.await) });
    }

    let mut parts: Vec<Option<Vec<T>>> = (0..total).map(|_| None).collect();
    let mut failure: Option<BionetError> = None;

    while let Some(joined) = set.join_next().await {
        let outcome = match joined {
            Ok((index, Ok(rows))) => {
                parts[index] = Some(rows);
                continue;
            }
            Ok((_, Err(e))) => e,
            Err(e) if e.is_panic() => BionetError::WorkerFailed(format!("worker panicked: {}", e)),
            Err(e) if e.is_cancelled() => continue,
            Err(e) => BionetError::WorkerFailed(e.to_string()),
        };
        if failure.is_none() {
            log::warn!("Worker failed, cancelling {} remaining", set.len());
            worker_ctx.cancel();
            set.abort_all();
            failure = Some(outcome);
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }
    ctx.check()?;

    let mut merged = Vec::new();
    for part in parts {
        match part {
            Some(rows) => merged.extend(rows),
            None => return Err(BionetError::WorkerFailed("worker produced no result".to_string())),
        }
    }
    Ok(merged)
}

#[async_trait]
impl FrontierExpander for WorkerPoolStrategy {
    async fn expand(
        &self,
        source: &Arc<dyn NetworkSource>,
        frontier: &[PersonId],
        relation_types: &[RelationType],
        ctx: &ExploreContext,
    ) -> Result<Vec<EdgeRow>> {
        let chunks = self.chunks(frontier);
        log::debug!(
            "Worker pool: {} frontier ids over {} tasks",
            frontier.len(),
            chunks.len()
        );
        let types: Arc<[RelationType]> = relation_types.into();
        fan_out(chunks, ctx, |chunk, worker_ctx| {
            let source = Arc::clone(source);
            let types = Arc::clone(&types);
            async move { source.fetch_edges_batch(&chunk, &types, &worker_ctx).await }
        })
        .await
    }

    async fn load_records(
        &self,
        source: &Arc<dyn NetworkSource>,
        ids: &[PersonId],
        ctx: &ExploreContext,
    ) -> Result<Vec<PersonRecord>> {
        fan_out(self.chunks(ids), ctx, |chunk, worker_ctx| {
            let source = Arc::clone(source);
            async move { source.fetch_nodes_batch(&chunk, &worker_ctx).await }
        })
        .await
    }

    async fn finalize(&self, builder: GraphBuilder, options: FinishOptions) -> Result<GraphDocument> {
        tokio::task::spawn_blocking(move || builder.finish(&options))
            .await
            .map_err(|e| BionetError::WorkerFailed(format!("graph assembly failed: {}", e)))
    }
}
