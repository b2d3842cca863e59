//! Domain types shared by the traversal engine, its data sources and its consumers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BionetError;
use crate::network::strategy::StrategyKind;

/// Primary key of a person in the biographical tables.
pub type PersonId = i64;

/// The three person-to-person relation families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationType {
    Kinship,
    Association,
    Office,
}

impl RelationType {
    pub const ALL: [RelationType; 3] = [
        RelationType::Kinship,
        RelationType::Association,
        RelationType::Office,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RelationType::Kinship => "kinship",
            RelationType::Association => "association",
            RelationType::Office => "office",
        }
    }

    /// Edge weight: kin ties count double.
    pub fn weight(self) -> f64 {
        match self {
            RelationType::Kinship => 2.0,
            RelationType::Association | RelationType::Office => 1.0,
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = BionetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kinship" | "kin" => Ok(RelationType::Kinship),
            "association" | "assoc" => Ok(RelationType::Association),
            "office" => Ok(RelationType::Office),
            other => Err(BionetError::InvalidInput(format!(
                "unknown relation type '{}' (expected kinship, association or office)",
                other
            ))),
        }
    }
}

/// Display category of a node, derived from its incident edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Central,
    Kinship,
    Association,
    Office,
    Mixed,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Central => "central",
            NodeKind::Kinship => "kinship",
            NodeKind::Association => "association",
            NodeKind::Office => "office",
            NodeKind::Mixed => "mixed",
        }
    }
}

impl From<RelationType> for NodeKind {
    fn from(relation: RelationType) -> Self {
        match relation {
            RelationType::Kinship => NodeKind::Kinship,
            RelationType::Association => NodeKind::Association,
            RelationType::Office => NodeKind::Office,
        }
    }
}

/// A person row as returned by the node-batch lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: PersonId,
    pub name: String,
    pub name_chn: Option<String>,
    pub index_year: Option<i32>,
    pub dynasty: Option<String>,
    pub alt_names: Vec<String>,
}

impl PersonRecord {
    pub fn new(id: PersonId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            name_chn: None,
            index_year: None,
            dynasty: None,
            alt_names: Vec::new(),
        }
    }

    /// Romanized name, falling back to the Chinese name when empty.
    pub fn display_label(&self) -> String {
        if !self.name.trim().is_empty() {
            return self.name.clone();
        }
        match &self.name_chn {
            Some(chn) if !chn.trim().is_empty() => chn.clone(),
            _ => placeholder_label(self.id),
        }
    }
}

/// Label used for nodes whose person row is missing.
pub fn placeholder_label(id: PersonId) -> String {
    format!("Person {}", id)
}

/// A typed relation row as returned by the edge-batch lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRow {
    pub source: PersonId,
    pub target: PersonId,
    pub relation: RelationType,
    pub code: i64,
    pub label: String,
}

impl EdgeRow {
    pub fn new(
        source: PersonId,
        target: PersonId,
        relation: RelationType,
        code: i64,
        label: impl Into<String>,
    ) -> Self {
        Self {
            source,
            target,
            relation,
            code,
            label: label.into(),
        }
    }

    /// Deduplication key: unordered endpoints plus relation type.
    pub fn pair_key(&self) -> PairKey {
        PairKey::new(self.source, self.target, self.relation)
    }
}

/// Unordered (low, high) endpoint pair scoped to one relation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey {
    pub low: PersonId,
    pub high: PersonId,
    pub relation: RelationType,
}

impl PairKey {
    pub fn new(a: PersonId, b: PersonId, relation: RelationType) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
            relation,
        }
    }
}

/// Person metadata carried through to consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_chn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynasty: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name_variants: Vec<String>,
}

impl From<&PersonRecord> for NodeMetadata {
    fn from(record: &PersonRecord) -> Self {
        Self {
            name_chn: record.name_chn.clone(),
            index_year: record.index_year,
            dynasty: record.dynasty.clone(),
            name_variants: record.alt_names.clone(),
        }
    }
}

/// A person in the materialized network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: PersonId,
    pub label: String,
    pub kind: NodeKind,
    pub depth: u32,
    pub importance: u8,
    pub size: f64,
    pub x: f64,
    pub y: f64,
    #[serde(flatten)]
    pub metadata: NodeMetadata,
}

/// A relation in the materialized network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: PersonId,
    pub target: PersonId,
    pub kind: RelationType,
    pub code: i64,
    pub label: String,
    pub weight: f64,
    #[serde(default)]
    pub curvature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_index: Option<usize>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reciprocal: bool,
}

impl Edge {
    pub fn from_row(row: EdgeRow, reciprocal: bool) -> Self {
        Self {
            source: row.source,
            target: row.target,
            kind: row.relation,
            code: row.code,
            weight: row.relation.weight(),
            label: row.label,
            curvature: 0.0,
            parallel_index: None,
            reciprocal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub density: f64,
    pub avg_degree: f64,
}

/// Cosmetic textual reading of the network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interpretation {
    pub summary: String,
    pub key_findings: Vec<String>,
}

/// The finished, immutable result of one exploration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDocument {
    pub central_id: PersonId,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub metrics: GraphMetrics,
    pub interpretation: Interpretation,
    /// Set when a node cap cut the traversal short.
    pub truncated: bool,
    pub strategy: StrategyKind,
}

impl GraphDocument {
    pub fn node(&self, id: PersonId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn central(&self) -> Option<&Node> {
        self.node(self.central_id)
    }

    pub fn nodes_at_depth(&self, depth: u32) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.depth == depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_type_parse() {
        assert_eq!("Kinship".parse::<RelationType>().unwrap(), RelationType::Kinship);
        assert_eq!("assoc".parse::<RelationType>().unwrap(), RelationType::Association);
        assert!("friendship".parse::<RelationType>().is_err());
    }

    #[test]
    fn test_kinship_weighs_more() {
        assert!(RelationType::Kinship.weight() > RelationType::Association.weight());
        assert!(RelationType::Kinship.weight() > RelationType::Office.weight());
    }

    #[test]
    fn test_pair_key_is_unordered() {
        let a = EdgeRow::new(1, 2, RelationType::Kinship, 75, "son");
        let b = EdgeRow::new(2, 1, RelationType::Kinship, 28, "father");
        let c = EdgeRow::new(2, 1, RelationType::Office, 1, "colleague");
        assert_eq!(a.pair_key(), b.pair_key());
        assert_ne!(a.pair_key(), c.pair_key());
    }

    #[test]
    fn test_display_label_fallbacks() {
        let mut record = PersonRecord::new(7, "");
        assert_eq!(record.display_label(), "Person 7");
        record.name_chn = Some("王安石".to_string());
        assert_eq!(record.display_label(), "王安石");
        record.name = "Wang Anshi".to_string();
        assert_eq!(record.display_label(), "Wang Anshi");
    }

    #[test]
    fn test_node_serializes_flat_metadata() {
        let node = Node {
            id: 1762,
            label: "Wang Anshi".to_string(),
            kind: NodeKind::Central,
            depth: 0,
            importance: 4,
            size: 10.0,
            x: 0.0,
            y: 0.0,
            metadata: NodeMetadata {
                dynasty: Some("Song".to_string()),
                ..NodeMetadata::default()
            },
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["kind"], "central");
        assert_eq!(json["dynasty"], "Song");
        assert!(json.get("nameVariants").is_none());
    }

    #[test]
    fn test_edge_omits_default_flags() {
        let edge = Edge::from_row(EdgeRow::new(1, 2, RelationType::Office, 3, "colleague"), false);
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["kind"], "office");
        assert_eq!(json["weight"], 1.0);
        assert!(json.get("reciprocal").is_none());
        assert!(json.get("parallelIndex").is_none());
    }
}
