//! Exploration requests, their validated form, and the per-call context.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::ExplorerConfig;
use crate::error::{BionetError, Result};
use crate::network::model::{PersonId, RelationType};
use crate::network::strategy::StrategyOverride;

pub const MIN_DEPTH: u32 = 1;
pub const MAX_DEPTH: u32 = 3;

/// Exploration request as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExploreRequest {
    pub root_id: PersonId,
    pub depth: u32,
    /// None means all relation types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_types: Option<Vec<RelationType>>,
    #[serde(default)]
    pub include_reciprocal: bool,
    #[serde(default)]
    pub strategy_override: StrategyOverride,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_cap_per_level: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_node_cap: Option<usize>,
}

impl ExploreRequest {
    pub fn new(root_id: PersonId, depth: u32) -> Self {
        Self {
            root_id,
            depth,
            relation_types: None,
            include_reciprocal: false,
            strategy_override: StrategyOverride::Auto,
            node_cap_per_level: None,
            total_node_cap: None,
        }
    }

    pub fn relation_types(mut self, types: impl IntoIterator<Item = RelationType>) -> Self {
        self.relation_types = Some(types.into_iter().collect());
        self
    }

    pub fn include_reciprocal(mut self, include: bool) -> Self {
        self.include_reciprocal = include;
        self
    }

    pub fn strategy(mut self, strategy: StrategyOverride) -> Self {
        self.strategy_override = strategy;
        self
    }

    pub fn caps(mut self, per_level: usize, total: usize) -> Self {
        self.node_cap_per_level = Some(per_level);
        self.total_node_cap = Some(total);
        self
    }

    /// Validate against the configured limits and resolve defaults.
    pub fn into_query(&self, limits: &ExplorerConfig) -> Result<ExploreQuery> {
        if !(MIN_DEPTH..=MAX_DEPTH).contains(&self.depth) {
            return Err(BionetError::InvalidInput(format!(
                "depth must be between {} and {}, got {}",
                MIN_DEPTH, MAX_DEPTH, self.depth
            )));
        }

        let mut relation_types = match &self.relation_types {
            Some(types) if types.is_empty() => {
                return Err(BionetError::InvalidInput(
                    "relationTypes must not be empty when given".to_string(),
                ))
            }
            Some(types) => types.clone(),
            None => RelationType::ALL.to_vec(),
        };
        relation_types.sort();
        relation_types.dedup();

        let node_cap_per_level = self.node_cap_per_level.unwrap_or(limits.node_cap_per_level);
        let total_node_cap = self.total_node_cap.unwrap_or(limits.total_node_cap);
        if node_cap_per_level == 0 {
            return Err(BionetError::InvalidInput(
                "nodeCapPerLevel must be greater than 0".to_string(),
            ));
        }
        if total_node_cap == 0 {
            return Err(BionetError::InvalidInput(
                "totalNodeCap must be greater than 0".to_string(),
            ));
        }

        Ok(ExploreQuery {
            root_id: self.root_id,
            max_depth: self.depth,
            relation_types,
            include_reciprocal: self.include_reciprocal,
            node_cap_per_level,
            total_node_cap,
            reciprocal_ceiling: limits.reciprocal_ceiling,
        })
    }
}

/// Validated exploration parameters handed to a traversal strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct ExploreQuery {
    pub root_id: PersonId,
    pub max_depth: u32,
    /// Sorted, deduplicated, never empty.
    pub relation_types: Vec<RelationType>,
    pub include_reciprocal: bool,
    pub node_cap_per_level: usize,
    pub total_node_cap: usize,
    pub reciprocal_ceiling: usize,
}

impl ExploreQuery {
    pub fn new(root_id: PersonId, max_depth: u32, relation_types: Vec<RelationType>) -> Self {
        let limits = ExplorerConfig::default();
        Self {
            root_id,
            max_depth,
            relation_types,
            include_reciprocal: false,
            node_cap_per_level: limits.node_cap_per_level,
            total_node_cap: limits.total_node_cap,
            reciprocal_ceiling: limits.reciprocal_ceiling,
        }
    }
}

/// Cancellation and deadline for one exploration.
///
/// Cloning shares the underlying token, so workers spawned for a request
/// observe the same cancellation.
#[derive(Debug, Clone, Default)]
pub struct ExploreContext {
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl ExploreContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            timeout: Some(timeout),
        }
    }

    /// Attach to a caller-owned token (e.g. shutdown of the serving loop).
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            timeout: None,
        }
    }

    /// Same token, with a deadline.
    pub fn timeout_after(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail fast with `Cancelled` once the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(BionetError::Cancelled)
        } else {
            Ok(())
        }
    }
}
