//! Curvature for parallel edges so edges sharing a node pair stay visually apart.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::network::model::{Edge, PersonId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurvatureMode {
    /// Every edge is drawn straight.
    Straight,
    /// Every edge gets the base curvature.
    Curved,
    /// Only parallel edges are curved, spread by index.
    #[default]
    Auto,
}

/// Curvature of the `index`-th of `max_index + 1` parallel edges.
///
/// Odd in `index` and linear in it for a fixed `max_index`; a lone edge
/// (`max_index == 0`) is straight.
pub fn curvature(index: i64, max_index: i64, amplitude: f64, base_curvature: f64) -> f64 {
    if max_index <= 0 || index == 0 || amplitude <= 0.0 {
        return 0.0;
    }
    if index < 0 {
        return -curvature(-index, max_index, amplitude, base_curvature);
    }
    let max_index = max_index as f64;
    let max_curvature = amplitude * (1.0 - (-max_index / amplitude).exp()) * base_curvature;
    max_curvature * index as f64 / max_index
}

/// Assign `curvature` and `parallel_index` to every edge in place.
///
/// Parallel groups are keyed by unordered endpoints across relation types
/// and indexed in edge order. Values are expressed relative to the
/// low-to-high id direction, so an edge stored high-to-low is negated.
pub fn assign_curvatures(edges: &mut [Edge], mode: CurvatureMode, amplitude: f64, base_curvature: f64) {
    match mode {
        CurvatureMode::Straight => {
            for edge in edges.iter_mut() {
                edge.curvature = 0.0;
                edge.parallel_index = None;
            }
        }
        CurvatureMode::Curved => {
            for edge in edges.iter_mut() {
                edge.curvature = base_curvature;
                edge.parallel_index = None;
            }
        }
        CurvatureMode::Auto => {
            let mut groups: HashMap<(PersonId, PersonId), Vec<usize>> = HashMap::new();
            for (idx, edge) in edges.iter().enumerate() {
                let key = (edge.source.min(edge.target), edge.source.max(edge.target));
                groups.entry(key).or_default().push(idx);
            }

            for members in groups.values() {
                if members.len() == 1 {
                    let edge = &mut edges[members[0]];
                    edge.curvature = 0.0;
                    edge.parallel_index = None;
                    continue;
                }
                let max_index = (members.len() - 1) as i64;
                for (position, &idx) in members.iter().enumerate() {
                    let edge = &mut edges[idx];
                    let value = curvature(position as i64, max_index, amplitude, base_curvature);
                    edge.curvature = if edge.source > edge.target { -value } else { value };
                    edge.parallel_index = Some(position);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::model::{EdgeRow, RelationType};

    const AMPLITUDE: f64 = 3.5;
    const BASE: f64 = 0.25;

    fn edge(source: PersonId, target: PersonId, relation: RelationType) -> Edge {
        Edge::from_row(EdgeRow::new(source, target, relation, 0, ""), false)
    }

    #[test]
    fn test_single_edge_is_straight() {
        assert_eq!(curvature(0, 0, AMPLITUDE, BASE), 0.0);
        assert_eq!(curvature(1, 0, AMPLITUDE, BASE), 0.0);
    }

    #[test]
    fn test_curvature_is_odd() {
        for max_index in 1..8 {
            for i in 0..=max_index {
                for amplitude in [0.5, 1.0, 3.5, 10.0] {
                    let pos = curvature(i, max_index, amplitude, BASE);
                    let neg = curvature(-i, max_index, amplitude, BASE);
                    assert_eq!(neg, -pos);
                }
            }
        }
    }

    #[test]
    fn test_curvature_monotonic_in_index() {
        for max_index in 1..10 {
            let values: Vec<f64> = (0..=max_index)
                .map(|i| curvature(i, max_index, AMPLITUDE, BASE))
                .collect();
            assert!(values.windows(2).all(|w| w[0] <= w[1]), "{:?}", values);
        }
    }

    #[test]
    fn test_max_curvature_formula() {
        let expected = AMPLITUDE * (1.0 - (-2.0f64 / AMPLITUDE).exp()) * BASE;
        assert!((curvature(2, 2, AMPLITUDE, BASE) - expected).abs() < 1e-12);
        assert!((curvature(1, 2, AMPLITUDE, BASE) - expected / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_assign_auto_spreads_parallel_edges() {
        let mut edges = vec![
            edge(1, 2, RelationType::Kinship),
            edge(1, 3, RelationType::Kinship),
            edge(1, 2, RelationType::Association),
            edge(1, 2, RelationType::Office),
        ];
        assign_curvatures(&mut edges, CurvatureMode::Auto, AMPLITUDE, BASE);

        assert_eq!(edges[1].curvature, 0.0);
        assert_eq!(edges[1].parallel_index, None);

        assert_eq!(edges[0].parallel_index, Some(0));
        assert_eq!(edges[2].parallel_index, Some(1));
        assert_eq!(edges[3].parallel_index, Some(2));
        assert_eq!(edges[0].curvature, 0.0);
        assert!(edges[2].curvature > 0.0);
        assert!(edges[3].curvature > edges[2].curvature);
    }

    #[test]
    fn test_assign_auto_negates_reversed_edges() {
        let mut edges = vec![edge(1, 2, RelationType::Kinship), edge(2, 1, RelationType::Association)];
        assign_curvatures(&mut edges, CurvatureMode::Auto, AMPLITUDE, BASE);
        assert!(edges[1].curvature < 0.0);
        assert_eq!(edges[1].curvature, -curvature(1, 1, AMPLITUDE, BASE));
    }

    #[test]
    fn test_assign_forced_modes() {
        let mut edges = vec![edge(1, 2, RelationType::Kinship), edge(1, 2, RelationType::Office)];
        assign_curvatures(&mut edges, CurvatureMode::Straight, AMPLITUDE, BASE);
        assert!(edges.iter().all(|e| e.curvature == 0.0));

        assign_curvatures(&mut edges, CurvatureMode::Curved, AMPLITUDE, BASE);
        assert!(edges.iter().all(|e| e.curvature == BASE));
    }
}
