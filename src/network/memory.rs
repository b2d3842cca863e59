//! In-memory [`NetworkSource`] with call accounting.
//!
//! Backs unit and integration tests and small embedded datasets. Every call
//! is counted so batching contracts can be asserted from the outside.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{BionetError, Result};
use crate::network::model::{EdgeRow, PersonId, PersonRecord, RelationType};
use crate::network::query::ExploreContext;
use crate::network::source::NetworkSource;

#[derive(Debug, Default)]
pub struct MemorySource {
    persons: HashMap<PersonId, PersonRecord>,
    relations: HashMap<RelationType, Vec<EdgeRow>>,
    node_calls: AtomicUsize,
    edge_calls: AtomicUsize,
    within_calls: Mutex<HashMap<RelationType, usize>>,
    edge_frontier_sizes: Mutex<Vec<usize>>,
    fail_edges: AtomicBool,
    latency: Option<Duration>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_person(mut self, record: PersonRecord) -> Self {
        self.persons.insert(record.id, record);
        self
    }

    /// Shorthand for a person with only a name.
    pub fn person(self, id: PersonId, name: &str) -> Self {
        self.with_person(PersonRecord::new(id, name))
    }

    pub fn relation(
        mut self,
        source: PersonId,
        target: PersonId,
        relation: RelationType,
        code: i64,
        label: &str,
    ) -> Self {
        self.relations
            .entry(relation)
            .or_default()
            .push(EdgeRow::new(source, target, relation, code, label));
        self
    }

    /// Sleep this long inside every call (honouring cancellation).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every subsequent edge call fail with a data source error.
    pub fn fail_edge_calls(&self, fail: bool) {
        self.fail_edges.store(fail, Ordering::SeqCst);
    }

    pub fn node_calls(&self) -> usize {
        self.node_calls.load(Ordering::SeqCst)
    }

    pub fn edge_calls(&self) -> usize {
        self.edge_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_edges_within` calls per relation type.
    pub fn within_calls(&self) -> HashMap<RelationType, usize> {
        self.within_calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Frontier length of each `fetch_edges_batch` call, in call order.
    pub fn edge_frontier_sizes(&self) -> Vec<usize> {
        self.edge_frontier_sizes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn reset_counters(&self) {
        self.node_calls.store(0, Ordering::SeqCst);
        self.edge_calls.store(0, Ordering::SeqCst);
        self.within_calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        self.edge_frontier_sizes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    async fn simulate_latency(&self, ctx: &ExploreContext) -> Result<()> {
        ctx.check()?;
        if let Some(latency) = self.latency {
            tokio::select! {
                _ = tokio::time::sleep(latency) => {}
                _ = ctx.token().cancelled() => return Err(BionetError::Cancelled),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkSource for MemorySource {
    async fn fetch_nodes_batch(
        &self,
        ids: &[PersonId],
        ctx: &ExploreContext,
    ) -> Result<Vec<PersonRecord>> {
        self.node_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency(ctx).await?;
        Ok(ids
            .iter()
            .filter_map(|id| self.persons.get(id).cloned())
            .collect())
    }

    async fn fetch_edges_batch(
        &self,
        frontier: &[PersonId],
        relation_types: &[RelationType],
        ctx: &ExploreContext,
    ) -> Result<Vec<EdgeRow>> {
        self.edge_calls.fetch_add(1, Ordering::SeqCst);
        self.edge_frontier_sizes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(frontier.len());
        self.simulate_latency(ctx).await?;
        if self.fail_edges.load(Ordering::SeqCst) {
            return Err(BionetError::DataSource("edge lookup unavailable".to_string()));
        }

        let frontier: HashSet<PersonId> = frontier.iter().copied().collect();
        let mut rows = Vec::new();
        for relation in relation_types {
            let Some(table) = self.relations.get(relation) else {
                continue;
            };
            rows.extend(
                table
                    .iter()
                    .filter(|row| frontier.contains(&row.source) || frontier.contains(&row.target))
                    .cloned(),
            );
        }
        Ok(rows)
    }

    async fn fetch_edges_within(
        &self,
        members: &HashSet<PersonId>,
        relation: RelationType,
        ctx: &ExploreContext,
    ) -> Result<Vec<EdgeRow>> {
        *self
            .within_calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(relation)
            .or_insert(0) += 1;
        self.simulate_latency(ctx).await?;

        Ok(self
            .relations
            .get(&relation)
            .map(|table| {
                table
                    .iter()
                    .filter(|row| members.contains(&row.source) && members.contains(&row.target))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
