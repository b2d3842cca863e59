//! Traversal strategies and the size heuristic that picks between them.
//!
//! All strategies run the same BFS in [`crate::network::traversal`] and
//! produce identical documents for the same data; they only differ in how
//! lookups are grouped and where work runs.

pub mod batch;
pub mod naive;
pub mod worker_pool;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::config::{StrategyConfig, VisualConfig};
use crate::error::Result;
use crate::network::builder::FinishOptions;
use crate::network::model::GraphDocument;
use crate::network::query::{ExploreContext, ExploreQuery};
use crate::network::source::NetworkSource;
use crate::network::traversal::traverse;

pub use batch::BatchStrategy;
pub use naive::NaiveStrategy;
pub use worker_pool::WorkerPoolStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    #[serde(rename = "naive")]
    Naive,
    #[serde(rename = "optimized")]
    BatchOptimized,
    #[serde(rename = "workerpool")]
    WorkerPool,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Naive => "naive",
            StrategyKind::BatchOptimized => "optimized",
            StrategyKind::WorkerPool => "workerpool",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller's strategy choice; `Auto` defers to the size heuristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyOverride {
    #[default]
    Auto,
    Naive,
    Optimized,
    #[serde(rename = "workerpool")]
    WorkerPool,
}

impl StrategyOverride {
    pub fn kind(self) -> Option<StrategyKind> {
        match self {
            StrategyOverride::Auto => None,
            StrategyOverride::Naive => Some(StrategyKind::Naive),
            StrategyOverride::Optimized => Some(StrategyKind::BatchOptimized),
            StrategyOverride::WorkerPool => Some(StrategyKind::WorkerPool),
        }
    }
}

/// Expected node count for a walk of `depth` levels.
pub fn estimate_size(branching_factor: f64, depth: u32) -> f64 {
    branching_factor.powi(depth as i32)
}

/// The heuristic choice, ignoring which strategies are enabled.
pub fn auto_kind(config: &StrategyConfig, depth: u32) -> StrategyKind {
    let estimated = estimate_size(config.branching_factor, depth);
    if estimated < config.small_threshold {
        StrategyKind::Naive
    } else if estimated < config.large_threshold {
        StrategyKind::BatchOptimized
    } else {
        StrategyKind::WorkerPool
    }
}

/// Pick the strategy for a walk of `depth` levels.
pub fn select(config: &StrategyConfig, depth: u32, requested: StrategyOverride) -> TraversalStrategy {
    let kind = match requested.kind() {
        Some(kind) if config.enabled.contains(&kind) => kind,
        Some(kind) => {
            log::warn!("Strategy {} is not enabled, falling back to auto selection", kind);
            auto_kind(config, depth)
        }
        None => auto_kind(config, depth),
    };

    let kind = if config.enabled.contains(&kind) {
        kind
    } else {
        log::warn!("Strategy {} is not enabled, using {}", kind, StrategyKind::BatchOptimized);
        StrategyKind::BatchOptimized
    };

    log::debug!(
        "Selected {} for depth {} (estimated size {})",
        kind,
        depth,
        estimate_size(config.branching_factor, depth)
    );
    TraversalStrategy::from_kind(kind, config)
}

#[derive(Debug, Clone)]
pub enum TraversalStrategy {
    Naive(NaiveStrategy),
    BatchOptimized(BatchStrategy),
    WorkerPool(WorkerPoolStrategy),
}

impl TraversalStrategy {
    pub fn from_kind(kind: StrategyKind, config: &StrategyConfig) -> Self {
        match kind {
            StrategyKind::Naive => TraversalStrategy::Naive(NaiveStrategy),
            StrategyKind::BatchOptimized => TraversalStrategy::BatchOptimized(BatchStrategy),
            StrategyKind::WorkerPool => {
                TraversalStrategy::WorkerPool(WorkerPoolStrategy::from_config(config))
            }
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            TraversalStrategy::Naive(_) => StrategyKind::Naive,
            TraversalStrategy::BatchOptimized(_) => StrategyKind::BatchOptimized,
            TraversalStrategy::WorkerPool(_) => StrategyKind::WorkerPool,
        }
    }

    /// Run the walk described by `query` against `source`.
    pub async fn explore(
        &self,
        source: &Arc<dyn NetworkSource>,
        query: &ExploreQuery,
        visual: &VisualConfig,
        ctx: &ExploreContext,
    ) -> Result<GraphDocument> {
        let options = FinishOptions {
            max_depth: query.max_depth,
            node_cap_per_level: query.node_cap_per_level,
            visual: visual.clone(),
            strategy: self.kind(),
        };
        match self {
            TraversalStrategy::Naive(s) => traverse(s, source, query, options, ctx).await,
            TraversalStrategy::BatchOptimized(s) => traverse(s, source, query, options, ctx).await,
            TraversalStrategy::WorkerPool(s) => traverse(s, source, query, options, ctx).await,
        }
    }
}

/// Process-wide strategy configuration.
///
/// Readers take an `Arc` snapshot and keep it for the whole request; writers
/// validate a complete replacement and swap it in under the write lock.
#[derive(Debug, Clone, Default)]
pub struct SharedStrategyConfig {
    inner: Arc<RwLock<Arc<StrategyConfig>>>,
}

impl SharedStrategyConfig {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn snapshot(&self) -> Arc<StrategyConfig> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the whole configuration. Invalid values leave the current one in place.
    pub fn update(&self, config: StrategyConfig) -> Result<Arc<StrategyConfig>> {
        config.validate()?;
        let next = Arc::new(config);
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next.clone();
        log::info!("Strategy config updated: {:?}", next);
        Ok(next)
    }

    /// Read-modify-write under the write lock, so concurrent edits serialize.
    pub fn update_with<F>(&self, edit: F) -> Result<Arc<StrategyConfig>>
    where
        F: FnOnce(&mut StrategyConfig),
    {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut config = StrategyConfig::clone(&guard);
        edit(&mut config);
        config.validate()?;
        let next = Arc::new(config);
        *guard = next.clone();
        log::info!("Strategy config updated: {:?}", next);
        Ok(next)
    }
}
