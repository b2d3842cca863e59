//! Arena the traversal writes into, finalized into an immutable [`GraphDocument`].
//!
//! Nodes and edges live in flat vectors addressed by index; the id index and
//! the pair-key set give O(1) membership and deduplication while levels are
//! being merged.

use std::collections::{HashMap, HashSet};

use crate::config::VisualConfig;
use crate::network::curvature::assign_curvatures;
use crate::network::importance::{importance, size};
use crate::network::interpret::{compute_metrics, interpret};
use crate::network::layout::radial_positions;
use crate::network::model::{
    placeholder_label, Edge, EdgeRow, GraphDocument, Node, NodeKind, NodeMetadata, PairKey, PersonId,
    PersonRecord, RelationType,
};
use crate::network::strategy::StrategyKind;

#[derive(Debug)]
struct NodeSlot {
    id: PersonId,
    depth: u32,
    record: Option<PersonRecord>,
}

#[derive(Debug)]
struct EdgeSlot {
    row: EdgeRow,
    reciprocal: bool,
}

/// Parameters applied when the arena is turned into a document.
#[derive(Debug, Clone)]
pub struct FinishOptions {
    pub max_depth: u32,
    /// Settling never lowers a node into a level already holding this many.
    pub node_cap_per_level: usize,
    pub visual: VisualConfig,
    pub strategy: StrategyKind,
}

#[derive(Debug)]
pub struct GraphBuilder {
    nodes: Vec<NodeSlot>,
    index: HashMap<PersonId, usize>,
    edges: Vec<EdgeSlot>,
    edge_keys: HashSet<PairKey>,
    truncated: bool,
}

impl GraphBuilder {
    /// Start a graph holding only the root at depth 0.
    pub fn new(root: PersonRecord) -> Self {
        let mut index = HashMap::new();
        index.insert(root.id, 0);
        Self {
            nodes: vec![NodeSlot {
                id: root.id,
                depth: 0,
                record: Some(root),
            }],
            index,
            edges: Vec::new(),
            edge_keys: HashSet::new(),
            truncated: false,
        }
    }

    pub fn root_id(&self) -> PersonId {
        self.nodes[0].id
    }

    pub fn contains(&self, id: PersonId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Add `id` at `depth`. Returns false if it was already present; an
    /// existing node keeps its (smaller or equal) depth.
    pub fn add_node(&mut self, id: PersonId, depth: u32) -> bool {
        if self.index.contains_key(&id) {
            return false;
        }
        self.index.insert(id, self.nodes.len());
        self.nodes.push(NodeSlot {
            id,
            depth,
            record: None,
        });
        true
    }

    pub fn has_edge(&self, key: &PairKey) -> bool {
        self.edge_keys.contains(key)
    }

    /// Add an edge whose endpoints are both present and whose unordered
    /// pair is new for its relation type. Returns whether it was added.
    pub fn add_edge(&mut self, row: EdgeRow, reciprocal: bool) -> bool {
        if row.source == row.target || !self.contains(row.source) || !self.contains(row.target) {
            return false;
        }
        if !self.edge_keys.insert(row.pair_key()) {
            return false;
        }
        self.edges.push(EdgeSlot { row, reciprocal });
        true
    }

    pub fn member_ids(&self) -> HashSet<PersonId> {
        self.index.keys().copied().collect()
    }

    /// Discovered ids without a loaded record, in discovery order.
    pub fn ids_missing_records(&self) -> Vec<PersonId> {
        self.nodes
            .iter()
            .filter(|slot| slot.record.is_none())
            .map(|slot| slot.id)
            .collect()
    }

    pub fn attach_records(&mut self, records: Vec<PersonRecord>) {
        for record in records {
            if let Some(&idx) = self.index.get(&record.id) {
                self.nodes[idx].record = Some(record);
            }
        }
    }

    pub fn mark_truncated(&mut self) {
        self.truncated = true;
    }

    /// Lower depths along the kept edges toward their BFS distance from
    /// the root. Depths never increase, and a node is not moved into a level
    /// that already holds `cap` nodes, so it keeps its discovery depth when
    /// the shorter level is full.
    fn settle_depths(&mut self, cap: usize) {
        let mut per_level: HashMap<u32, usize> = HashMap::new();
        for slot in &self.nodes[1..] {
            *per_level.entry(slot.depth).or_insert(0) += 1;
        }

        let pairs: Vec<(usize, usize)> = self
            .edges
            .iter()
            .map(|slot| (self.index[&slot.row.source], self.index[&slot.row.target]))
            .collect();

        loop {
            let mut changed = false;
            for &(a, b) in &pairs {
                for (from, to) in [(a, b), (b, a)] {
                    let candidate = self.nodes[from].depth + 1;
                    if to == 0 || candidate >= self.nodes[to].depth {
                        continue;
                    }
                    let room = per_level.get(&candidate).copied().unwrap_or(0) < cap;
                    if !room {
                        continue;
                    }
                    if let Some(count) = per_level.get_mut(&self.nodes[to].depth) {
                        *count -= 1;
                    }
                    *per_level.entry(candidate).or_insert(0) += 1;
                    self.nodes[to].depth = candidate;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// Display kind from incident edge counts. The most frequent relation
    /// type wins, kinship wins any tie it is part of, and an
    /// association/office tie is `Mixed`.
    fn resolve_kinds(&self) -> Vec<NodeKind> {
        let mut counts: Vec<[usize; 3]> = vec![[0; 3]; self.nodes.len()];
        for slot in &self.edges {
            let col = match slot.row.relation {
                RelationType::Kinship => 0,
                RelationType::Association => 1,
                RelationType::Office => 2,
            };
            counts[self.index[&slot.row.source]][col] += 1;
            counts[self.index[&slot.row.target]][col] += 1;
        }

        counts
            .iter()
            .enumerate()
            .map(|(idx, &[kin, assoc, office])| {
                if idx == 0 {
                    return NodeKind::Central;
                }
                let top = kin.max(assoc).max(office);
                if top == 0 {
                    NodeKind::Mixed
                } else if kin == top {
                    NodeKind::Kinship
                } else if assoc == top && office == top {
                    NodeKind::Mixed
                } else if assoc == top {
                    NodeKind::Association
                } else {
                    NodeKind::Office
                }
            })
            .collect()
    }

    /// Annotate and freeze the graph.
    pub fn finish(mut self, options: &FinishOptions) -> GraphDocument {
        self.settle_depths(options.node_cap_per_level);
        let kinds = self.resolve_kinds();
        let depths: Vec<u32> = self.nodes.iter().map(|slot| slot.depth).collect();
        let positions = radial_positions(&depths);
        let central_id = self.root_id();

        let nodes: Vec<Node> = self
            .nodes
            .into_iter()
            .zip(kinds)
            .zip(positions)
            .map(|((slot, kind), (x, y))| {
                let level = importance(slot.depth, kind);
                let (label, metadata) = match &slot.record {
                    Some(record) => (record.display_label(), NodeMetadata::from(record)),
                    None => (placeholder_label(slot.id), NodeMetadata::default()),
                };
                Node {
                    id: slot.id,
                    label,
                    kind,
                    depth: slot.depth,
                    importance: level,
                    size: size(level as i32),
                    x,
                    y,
                    metadata,
                }
            })
            .collect();

        let mut edges: Vec<Edge> = self
            .edges
            .into_iter()
            .map(|slot| Edge::from_row(slot.row, slot.reciprocal))
            .collect();
        assign_curvatures(
            &mut edges,
            options.visual.curvature_mode,
            options.visual.amplitude,
            options.visual.base_curvature,
        );

        let metrics = compute_metrics(nodes.len(), edges.len());
        let interpretation = interpret(central_id, &nodes, &edges, options.max_depth, self.truncated);

        GraphDocument {
            central_id,
            nodes,
            edges,
            metrics,
            interpretation,
            truncated: self.truncated,
            strategy: options.strategy,
        }
    }
}
