//! Input graph: edge-list validation and fixed-point weight scaling
//!
//! All internal distances are unsigned 32-bit fixed-point: one cost unit of
//! the caller's weights becomes `SCALE` internal units. `u32::MAX` is the
//! infinity sentinel throughout the crate.

use crate::error::{Error, Result};

/// Fixed-point scaling factor: internal distance units per input cost unit.
pub const SCALE: u32 = 1000;

/// Infinity / unreachable sentinel for fixed-point distances.
pub const INF: u32 = u32::MAX;

/// Convert an input cost to fixed-point, rejecting malformed values.
pub fn scale_weight(weight: f64) -> Result<u32> {
    if !weight.is_finite() {
        return Err(Error::InvalidGraph(format!(
            "edge weight {weight} is not finite"
        )));
    }
    if weight < 0.0 {
        return Err(Error::InvalidGraph(format!(
            "edge weight {weight} is negative"
        )));
    }
    let scaled = (weight * SCALE as f64).round();
    if scaled >= INF as f64 {
        return Err(Error::InvalidGraph(format!(
            "edge weight {weight} overflows fixed-point range"
        )));
    }
    Ok(scaled as u32)
}

/// Convert a fixed-point distance back to input cost units.
#[inline]
pub fn unscale(dist: u32) -> f64 {
    dist as f64 / SCALE as f64
}

/// A validated directed input edge in fixed-point units.
///
/// `forward`/`backward` say in which directions the edge is traversable:
/// a `twoway` input edge has both set on a single physical edge.
#[derive(Debug, Clone, Copy)]
pub struct InputEdge {
    pub from: u32,
    pub to: u32,
    pub weight: u32,
    pub forward: bool,
    pub backward: bool,
}

/// Validated input graph, ready for contraction.
#[derive(Debug, Clone)]
pub struct InputGraph {
    pub n_nodes: usize,
    pub edges: Vec<InputEdge>,
}

impl InputGraph {
    /// Build from an edge list over dense internal node indices.
    ///
    /// `twoway` is a global flag: when set, every edge is stored once with
    /// both direction flags (equal weight both ways). Mixed directionality
    /// is expressed by passing each direction as its own edge with
    /// `twoway = false`.
    pub fn from_edge_list(
        n_nodes: usize,
        edges: &[(u32, u32)],
        weights: &[f64],
        twoway: bool,
    ) -> Result<Self> {
        if n_nodes == 0 {
            return Err(Error::InvalidGraph("empty node set".to_string()));
        }
        if edges.len() != weights.len() {
            return Err(Error::InvalidGraph(format!(
                "{} edges but {} weights",
                edges.len(),
                weights.len()
            )));
        }

        let mut out = Vec::with_capacity(edges.len());
        for (i, (&(from, to), &weight)) in edges.iter().zip(weights.iter()).enumerate() {
            if from as usize >= n_nodes || to as usize >= n_nodes {
                return Err(Error::InvalidGraph(format!(
                    "edge {i} ({from} -> {to}) references a node outside [0, {n_nodes})"
                )));
            }
            let weight = scale_weight(weight)?;
            out.push(InputEdge {
                from,
                to,
                weight,
                forward: true,
                backward: twoway,
            });
        }

        Ok(Self {
            n_nodes,
            edges: out,
        })
    }
}
