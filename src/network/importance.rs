//! Node importance levels and the render sizes they map to.

use crate::network::model::NodeKind;

pub const MIN_IMPORTANCE: u8 = 1;
pub const MAX_IMPORTANCE: u8 = 5;

/// Render size per importance level 1..=5. Few very small or very large
/// nodes, most in the middle.
const SIZE_TABLE: [f64; 5] = [0.0, 4.0, 7.0, 10.0, 28.0];

/// Importance of a node from its BFS depth and display kind.
///
/// Level 5 is reserved and never produced here.
pub fn importance(depth: u32, kind: NodeKind) -> u8 {
    match (depth, kind) {
        (0, _) => 4,
        (1, NodeKind::Kinship) => 3,
        (1, _) => 2,
        _ => 1,
    }
}

/// Render size for an importance level; out-of-range levels are clamped.
pub fn size(level: i32) -> f64 {
    let clamped = level.clamp(MIN_IMPORTANCE as i32, MAX_IMPORTANCE as i32);
    SIZE_TABLE[(clamped - 1) as usize]
}
