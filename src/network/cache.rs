use async_trait::async_trait;
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use crate::error::Result;
use crate::network::model::{EdgeRow, PersonId, PersonRecord, RelationType};
use crate::network::query::ExploreContext;
use crate::network::source::NetworkSource;

/// Thread-safe LRU cache of person records in front of another source
///
/// Person rows are immutable for the life of the process, so repeated
/// explorations around the same people skip the node lookup. Edge lookups
/// are passed through untouched.
pub struct CachedSource<S> {
    inner: S,
    cache: Option<Mutex<LruCache<PersonId, PersonRecord>>>,
}

impl<S: NetworkSource> CachedSource<S> {
    /// Wrap `inner`; a capacity of 0 disables caching.
    pub fn new(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            cache: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of cached records
    pub fn len(&self) -> usize {
        self.cache
            .as_ref()
            .map(|c| c.lock().unwrap_or_else(|p| p.into_inner()).len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().unwrap_or_else(|p| p.into_inner()).clear();
        }
    }
}

#[async_trait]
impl<S: NetworkSource> NetworkSource for CachedSource<S> {
    async fn fetch_nodes_batch(
        &self,
        ids: &[PersonId],
        ctx: &ExploreContext,
    ) -> Result<Vec<PersonRecord>> {
        let Some(cache) = &self.cache else {
            return self.inner.fetch_nodes_batch(ids, ctx).await;
        };

        let mut hits = Vec::new();
        let mut misses = Vec::new();
        {
            let mut cache = cache.lock().unwrap_or_else(|p| p.into_inner());
            for id in ids {
                match cache.get(id) {
                    Some(record) => hits.push(record.clone()),
                    None => misses.push(*id),
                }
            }
        }

        if misses.is_empty() {
            log::debug!("Person cache: {} hits, no lookup needed", hits.len());
            return Ok(hits);
        }

        let fetched = self.inner.fetch_nodes_batch(&misses, ctx).await?;
        log::debug!(
            "Person cache: {} hits, {} misses, {} fetched",
            hits.len(),
            misses.len(),
            fetched.len()
        );
        {
            let mut cache = cache.lock().unwrap_or_else(|p| p.into_inner());
            for record in &fetched {
                cache.put(record.id, record.clone());
            }
        }
        hits.extend(fetched);
        Ok(hits)
    }

    async fn fetch_edges_batch(
        &self,
        frontier: &[PersonId],
        relation_types: &[RelationType],
        ctx: &ExploreContext,
    ) -> Result<Vec<EdgeRow>> {
        self.inner.fetch_edges_batch(frontier, relation_types, ctx).await
    }

    async fn fetch_edges_within(
        &self,
        members: &HashSet<PersonId>,
        relation: RelationType,
        ctx: &ExploreContext,
    ) -> Result<Vec<EdgeRow>> {
        self.inner.fetch_edges_within(members, relation, ctx).await
    }
}
