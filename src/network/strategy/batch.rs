//! One edge lookup per level and one record lookup per walk.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::network::model::{EdgeRow, PersonId, PersonRecord, RelationType};
use crate::network::query::ExploreContext;
use crate::network::source::NetworkSource;
use crate::network::traversal::FrontierExpander;

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchStrategy;

#[async_trait]
impl FrontierExpander for BatchStrategy {
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
