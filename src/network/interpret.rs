//! Summary metrics and a short textual reading of a finished network.

use std::collections::HashMap;

use crate::network::model::{Edge, GraphMetrics, Interpretation, Node, PersonId, RelationType};

/// Key findings list at most this many "most connected" figures.
const TOP_CONNECTED: usize = 3;

/// Density and average degree of an undirected graph.
pub fn compute_metrics(node_count: usize, edge_count: usize) -> GraphMetrics {
    let n = node_count as f64;
    let e = edge_count as f64;
    let density = if node_count < 2 { 0.0 } else { 2.0 * e / (n * (n - 1.0)) };
    let avg_degree = if node_count == 0 { 0.0 } else { 2.0 * e / n };
    GraphMetrics {
        node_count,
        edge_count,
        density,
        avg_degree,
    }
}

pub fn interpret(
    central_id: PersonId,
    nodes: &[Node],
    edges: &[Edge],
    max_depth: u32,
    truncated: bool,
) -> Interpretation {
    let central_label = nodes
        .iter()
        .find(|n| n.id == central_id)
        .map(|n| n.label.as_str())
        .unwrap_or("The central figure");

    let mut by_kind: HashMap<RelationType, usize> = HashMap::new();
    for edge in edges {
        *by_kind.entry(edge.kind).or_insert(0) += 1;
    }
    let count = |kind: RelationType| by_kind.get(&kind).copied().unwrap_or(0);

    let summary = format!(
        "{} is linked to {} people within {} degree{} through {} kinship, {} association and {} office relations.",
        central_label,
        nodes.len().saturating_sub(1),
        max_depth,
        if max_depth == 1 { "" } else { "s" },
        count(RelationType::Kinship),
        count(RelationType::Association),
        count(RelationType::Office),
    );

    let mut key_findings = Vec::new();

    let mut degree: HashMap<PersonId, usize> = HashMap::new();
    for edge in edges {
        *degree.entry(edge.source).or_insert(0) += 1;
        *degree.entry(edge.target).or_insert(0) += 1;
    }
    let mut ranked: Vec<&Node> = nodes.iter().filter(|n| n.id != central_id).collect();
    ranked.sort_by(|a, b| {
        let da = degree.get(&a.id).copied().unwrap_or(0);
        let db = degree.get(&b.id).copied().unwrap_or(0);
        db.cmp(&da).then(a.id.cmp(&b.id))
    });
    for node in ranked.iter().take(TOP_CONNECTED) {
        let d = degree.get(&node.id).copied().unwrap_or(0);
        if d < 2 {
            break;
        }
        key_findings.push(format!("{} is one of the most connected figures ({} relations).", node.label, d));
    }

    if let Some((kind, n)) = by_kind.iter().max_by_key(|(kind, n)| (**n, std::cmp::Reverse(**kind))) {
        key_findings.push(format!("Most relations are of the {} type ({}).", kind, n));
    }

    let reciprocal = edges.iter().filter(|e| e.reciprocal).count();
    if reciprocal > 0 {
        key_findings.push(format!(
            "{} relation{} link people already reached through other paths.",
            reciprocal,
            if reciprocal == 1 { "" } else { "s" }
        ));
    }

    if truncated {
        key_findings.push("The network was cut off at the configured node limit; it is larger than shown.".to_string());
    }

    Interpretation { summary, key_findings }
}
