//! Initial radial placement: the root at the origin, each depth on its own ring.
//!
//! Front ends run their own layout; these coordinates only give exported
//! files a readable starting point.

use std::collections::HashMap;
use std::f64::consts::TAU;

pub const RING_SPACING: f64 = 100.0;

/// Rotation applied per ring so spokes of consecutive rings don't line up.
const RING_TWIST: f64 = 0.35;

/// Positions for nodes given their depths, in the same order.
pub fn radial_positions(depths: &[u32]) -> Vec<(f64, f64)> {
    let mut ring_sizes: HashMap<u32, usize> = HashMap::new();
    for depth in depths {
        *ring_sizes.entry(*depth).or_insert(0) += 1;
    }

    let mut placed: HashMap<u32, usize> = HashMap::new();
    depths
        .iter()
        .map(|&depth| {
            if depth == 0 {
                return (0.0, 0.0);
            }
            let slot = placed.entry(depth).or_insert(0);
            let count = ring_sizes[&depth] as f64;
            let angle = TAU * (*slot as f64) / count + RING_TWIST * depth as f64;
            *slot += 1;
            let radius = RING_SPACING * depth as f64;
            (round2(radius * angle.cos()), round2(radius * angle.sin()))
        })
        .collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
