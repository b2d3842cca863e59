//! Collaborator interfaces the traversal engine reads the biographical graph through.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::network::model::{EdgeRow, PersonId, PersonRecord, RelationType};
use crate::network::query::ExploreContext;

/// Row-returning data source behind the engine.
///
/// Every method is a batch call: implementations must answer the whole
/// input in as few round trips as they can and must never be driven once per
/// id by the engine's batch strategies.
#[async_trait]
pub trait NetworkSource: Send + Sync {
    /// Person records for `ids`. Unknown ids are simply absent from the result.
    async fn fetch_nodes_batch(
        &self,
        ids: &[PersonId],
        ctx: &ExploreContext,
    ) -> Result<Vec<PersonRecord>>;

    /// Every relation of the given types with either endpoint in `frontier`.
    ///
    /// The type filter belongs to the source: an implementation must not
    /// fetch all relation types and discard the unwanted ones afterwards.
    async fn fetch_edges_batch(
        &self,
        frontier: &[PersonId],
        relation_types: &[RelationType],
        ctx: &ExploreContext,
    ) -> Result<Vec<EdgeRow>>;

    /// Relations of one type with both endpoints in `members`, in one query.
    async fn fetch_edges_within(
        &self,
        members: &HashSet<PersonId>,
        relation: RelationType,
        ctx: &ExploreContext,
    ) -> Result<Vec<EdgeRow>>;
}

#[async_trait]
impl<T: NetworkSource + ?Sized> NetworkSource for Arc<T> {
    async fn fetch_nodes_batch(
        &self,
        ids: &[PersonId],
        ctx: &ExploreContext,
    ) -> Result<Vec<PersonRecord>> {
        (**self).fetch_nodes_batch(ids, ctx).await
    }

    async fn fetch_edges_batch(
        &self,
        frontier: &[PersonId],
        relation_types: &[RelationType],
        ctx: &ExploreContext,
    ) -> Result<Vec<EdgeRow>> {
        (**self).fetch_edges_batch(frontier, relation_types, ctx).await
    }

    async fn fetch_edges_within(
        &self,
        members: &HashSet<PersonId>,
        relation: RelationType,
        ctx: &ExploreContext,
    ) -> Result<Vec<EdgeRow>> {
        (**self).fetch_edges_within(members, relation, ctx).await
    }
}
