//! Entry point tying a data source, the strategy selector, and the limits together.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{Config, ExplorerConfig, VisualConfig};
use crate::db::Db;
use crate::error::{BionetError, Result};
use crate::network::cache::CachedSource;
use crate::network::model::GraphDocument;
use crate::network::query::{ExploreContext, ExploreRequest};
use crate::network::source::NetworkSource;
use crate::network::sqlite::SqliteSource;
use crate::network::strategy::{select, SharedStrategyConfig};

/// Runs explorations against one source with shared configuration.
///
/// Cheap to clone; clones share the source and the strategy configuration.
#[derive(Clone)]
pub struct Explorer {
    source: Arc<dyn NetworkSource>,
    strategy: SharedStrategyConfig,
    limits: ExplorerConfig,
    visual: VisualConfig,
}

impl Explorer {
    pub fn new(
        source: Arc<dyn NetworkSource>,
        strategy: SharedStrategyConfig,
        limits: ExplorerConfig,
        visual: VisualConfig,
    ) -> Self {
        Self {
            source,
            strategy,
            limits,
            visual,
        }
    }

    /// SQLite-backed explorer with the person cache from `config`.
    pub fn from_config(config: &Config) -> Self {
        let db = Db::new(config.db_path());
        let source = CachedSource::new(
            SqliteSource::new(db),
            config.explorer.person_cache_capacity,
        );
        Self::new(
            Arc::new(source),
            SharedStrategyConfig::new(config.strategy.clone()),
            config.explorer.clone(),
            config.visual.clone(),
        )
    }

    pub fn strategy_config(&self) -> &SharedStrategyConfig {
        &self.strategy
    }

    pub fn limits(&self) -> &ExplorerConfig {
        &self.limits
    }

    /// Explore with the configured deadline, if any.
    pub async fn explore(&self, request: &ExploreRequest) -> Result<GraphDocument> {
        let ctx = match self.limits.query_timeout_ms {
            0 => ExploreContext::new(),
            ms => ExploreContext::with_timeout(Duration::from_millis(ms)),
        };
        self.explore_with(request, &ctx).await
    }

    /// Explore under a caller-supplied context.
    ///
    /// When the context carries a timeout and it fires, the token is
    /// cancelled, in-flight lookups are drained, and `DeadlineExceeded` is
    /// returned.
    pub async fn explore_with(
        &self,
        request: &ExploreRequest,
        ctx: &ExploreContext,
    ) -> Result<GraphDocument> {
        let Some(limit) = ctx.timeout() else {
            return self.run(request, ctx).await;
        };

        let run = self.run(request, ctx);
        tokio::pin!(run);
        tokio::select! {
            biased;
            result = &mut run => result,
            _ = tokio::time::sleep(limit) => {
                ctx.cancel();
                if let Err(e) = run.await {
                    log::debug!("Exploration wound down after deadline: {}", e);
                }
                log::warn!(
                    "Exploration of {} exceeded its {} ms deadline",
                    request.root_id,
                    limit.as_millis()
                );
                Err(BionetError::DeadlineExceeded(limit.as_millis() as u64))
            }
        }
    }

    async fn run(&self, request: &ExploreRequest, ctx: &ExploreContext) -> Result<GraphDocument> {
        let started = Instant::now();
        let query = request.into_query(&self.limits)?;
        let config = self.strategy.snapshot();
        let strategy = select(&config, query.max_depth, request.strategy_override);

        let doc = strategy.explore(&self.source, &query, &self.visual, ctx).await?;
        log::info!(
            "Explored person {} to depth {} with {}: {} nodes, {} edges{} in {:?}",
            query.root_id,
            query.max_depth,
            strategy.kind(),
            doc.metrics.node_count,
            doc.metrics.edge_count,
            if doc.truncated { " (truncated)" } else { "" },
            started.elapsed()
        );
        Ok(doc)
    }
}
