//! One lookup per person. Cheapest for tiny walks where a batch buys nothing.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::network::model::{EdgeRow, PersonId, PersonRecord, RelationType};
use crate::network::query::ExploreContext;
use crate::network::source::NetworkSource;
use crate::network::traversal::FrontierExpander;

#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveStrategy;

#[async_trait]
impl FrontierExpander for NaiveStrategy {
    async fn expand(
        &self,
        source: &Arc<dyn NetworkSource>,
        frontier: &[PersonId],
        relation_types: &[RelationType],
        ctx: &ExploreContext,
    ) -> Result<Vec<EdgeRow>> {
        let mut rows = Vec::new();
        for &id in frontier {
            ctx.check()?;
            rows.extend(source.fetch_edges_batch(&[id], relation_types, ctx).await?);
        }
        Ok(rows)
    }

    async fn load_records(
        &self,
        source: &Arc<dyn NetworkSource>,
        ids: &[PersonId],
        ctx: &ExploreContext,
    ) -> Result<Vec<PersonRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        for &id in ids {
            ctx.check()?;
            records.extend(source.fetch_nodes_batch(&[id], ctx).await?);
        }
        Ok(records)
    }
}
