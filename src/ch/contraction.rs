//! CH contraction: builds the hierarchy topology
//!
//! Contracts nodes one at a time in ascending importance, adding shortcut
//! edges so that shortest-path distances survive into the up/down query
//! graph. Witness searches keep the shortcut count down: a shortcut
//! `u -> w` through `v` is only added when no path avoiding `v` is as
//! short.

use bit_vec::BitVec;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::ordering::{ContractionParams, ImportanceQueue, ImportanceTerms};
use crate::graph::{InputGraph, INF, SCALE};

/// Shortcut midpoint sentinel for original edges.
pub const NO_MID: u32 = u32::MAX;

/// Contracted hierarchy topology.
///
/// Each physical edge appears twice: in the UP adjacency of its
/// lower-ranked endpoint and the DOWN adjacency of its higher-ranked one.
/// `fwd`/`bwd` flags are relative to the storing node: `fwd[i]` means the
/// edge is traversable from the storing node to `targets[i]`. UP edges per
/// node are sorted by target rank descending so stall-on-demand scans the
/// most dominating candidates first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChTopo {
    pub n_nodes: u32,
    /// Fixed-point scaling factor the weights were built with.
    pub scale: u32,
    pub n_shortcuts: u64,
    /// Node -> importance rank (higher contracted later).
    pub rank: Vec<u32>,

    pub up_offsets: Vec<u64>,
    pub up_targets: Vec<u32>,
    pub up_weights: Vec<u32>,
    pub up_fwd: Vec<bool>,
    pub up_bwd: Vec<bool>,
    pub up_mid: Vec<u32>,

    pub down_offsets: Vec<u64>,
    pub down_targets: Vec<u32>,
    pub down_weights: Vec<u32>,
    pub down_fwd: Vec<bool>,
    pub down_bwd: Vec<bool>,
    pub down_mid: Vec<u32>,
}

impl ChTopo {
    #[inline(always)]
    pub fn up_range(&self, node: u32) -> std::ops::Range<usize> {
        self.up_offsets[node as usize] as usize..self.up_offsets[node as usize + 1] as usize
    }

    #[inline(always)]
    pub fn down_range(&self, node: u32) -> std::ops::Range<usize> {
        self.down_offsets[node as usize] as usize..self.down_offsets[node as usize + 1] as usize
    }
}

/// A working edge during contraction. Stored at both endpoints with
/// swapped direction flags.
#[derive(Debug, Clone, Copy)]
struct DynEdge {
    target: u32,
    weight: u32,
    forward: bool,
    backward: bool,
    mid: u32,
}

/// Version-stamped scratch for witness searches: distance plus hop count.
struct WitnessState {
    dist: Vec<u32>,
    hops: Vec<u32>,
    version: Vec<u32>,
    current: u32,
    heap: BinaryHeap<Reverse<(u32, u32)>>,
}

impl WitnessState {
    fn new(n_nodes: usize) -> Self {
        Self {
            dist: vec![INF; n_nodes],
            hops: vec![0; n_nodes],
            version: vec![0; n_nodes],
            current: 0,
            heap: BinaryHeap::with_capacity(256),
        }
    }

    fn reset(&mut self) {
        self.current = self.current.wrapping_add(1);
        if self.current == 0 {
            self.version.fill(0);
            self.current = 1;
        }
        self.heap.clear();
    }

    #[inline(always)]
    fn dist(&self, node: u32) -> u32 {
        if self.version[node as usize] == self.current {
            self.dist[node as usize]
        } else {
            INF
        }
    }

    #[inline(always)]
    fn hops(&self, node: u32) -> u32 {
        self.hops[node as usize]
    }

    #[inline(always)]
    fn set(&mut self, node: u32, dist: u32, hops: u32) {
        let idx = node as usize;
        self.dist[idx] = dist;
        self.hops[idx] = hops;
        self.version[idx] = self.current;
    }
}

/// Bounded forward Dijkstra on the not-yet-contracted subgraph, skipping
/// `forbidden`. Hop-limited: may overestimate, which only means an extra
/// shortcut, never a wrong distance.
fn witness_search(
    adj: &[Vec<DynEdge>],
    contracted: &BitVec,
    state: &mut WitnessState,
    source: u32,
    forbidden: u32,
    limit: u32,
    hop_limit: u32,
) {
    state.reset();
    state.set(source, 0, 0);
    state.heap.push(Reverse((0, source)));

    while let Some(Reverse((d, u))) = state.heap.pop() {
        if d > state.dist(u) {
            continue;
        }
        let hops = state.hops(u);
        if hops >= hop_limit {
            continue;
        }
        for e in &adj[u as usize] {
            if !e.forward || e.target == forbidden || contracted[e.target as usize] {
                continue;
            }
            let new_dist = d.saturating_add(e.weight);
            if new_dist > limit {
                continue;
            }
            if new_dist < state.dist(e.target) {
                state.set(e.target, new_dist, hops + 1);
                state.heap.push(Reverse((new_dist, e.target)));
            }
        }
    }
}

struct Contractor {
    params: ContractionParams,
    adj: Vec<Vec<DynEdge>>,
    contracted: BitVec,
    depth: Vec<i64>,
    deleted_neighbors: Vec<i64>,
    witness: WitnessState,
    n_shortcuts: u64,
}

/// Keep the minimum-weight entry per neighbor.
fn dedup_min(neighbors: &mut Vec<(u32, u32)>) {
    neighbors.sort_unstable();
    neighbors.dedup_by_key(|&mut (node, _)| node);
}

impl Contractor {
    fn new(input: &InputGraph, params: ContractionParams) -> Self {
        let n_nodes = input.n_nodes;
        let mut adj: Vec<Vec<DynEdge>> = vec![Vec::new(); n_nodes];

        for e in &input.edges {
            if e.from == e.to {
                // Self-loops never lie on a shortest path.
                continue;
            }
            adj[e.from as usize].push(DynEdge {
                target: e.to,
                weight: e.weight,
                forward: e.forward,
                backward: e.backward,
                mid: NO_MID,
            });
            adj[e.to as usize].push(DynEdge {
                target: e.from,
                weight: e.weight,
                forward: e.backward,
                backward: e.forward,
                mid: NO_MID,
            });
        }

        Self {
            params,
            adj,
            contracted: BitVec::from_elem(n_nodes, false),
            depth: vec![0; n_nodes],
            deleted_neighbors: vec![0; n_nodes],
            witness: WitnessState::new(n_nodes),
            n_shortcuts: 0,
        }
    }

    /// Simulate contracting `node`: the shortcuts it would need plus the
    /// remaining in/out degree. Runs one witness search per in-neighbor.
    fn contraction_profile(&mut self, node: u32) -> (Vec<(u32, u32, u32)>, usize, usize) {
        let mut in_neighbors: Vec<(u32, u32)> = Vec::new();
        let mut out_neighbors: Vec<(u32, u32)> = Vec::new();

        for e in &self.adj[node as usize] {
            if e.target == node || self.contracted[e.target as usize] {
                continue;
            }
            if e.backward {
                in_neighbors.push((e.target, e.weight));
            }
            if e.forward {
                out_neighbors.push((e.target, e.weight));
            }
        }
        dedup_min(&mut in_neighbors);
        dedup_min(&mut out_neighbors);

        let mut needed = Vec::new();
        if !in_neighbors.is_empty() && !out_neighbors.is_empty() {
            let max_out = out_neighbors.iter().map(|&(_, w)| w).max().unwrap();
            for &(u, w_in) in &in_neighbors {
                witness_search(
                    &self.adj,
                    &self.contracted,
                    &mut self.witness,
                    u,
                    node,
                    w_in.saturating_add(max_out),
                    self.params.witness_hop_limit,
                );
                for &(w, w_out) in &out_neighbors {
                    if w == u {
                        continue;
                    }
                    let shortcut_weight = w_in.saturating_add(w_out);
                    if self.witness.dist(w) > shortcut_weight {
                        needed.push((u, w, shortcut_weight));
                    }
                }
            }
        }

        (needed, in_neighbors.len(), out_neighbors.len())
    }

    fn importance(&mut self, node: u32) -> i64 {
        let (shortcuts, n_in, n_out) = self.contraction_profile(node);
        ImportanceTerms {
            edge_difference: shortcuts.len() as i64 - (n_in + n_out) as i64,
            deleted_neighbors: self.deleted_neighbors[node as usize],
            depth: self.depth[node as usize],
        }
        .score(&self.params)
    }

    /// Insert shortcut `from -> to` through `via`, merging with the
    /// opposite direction when an equal-weight twin already exists.
    fn add_shortcut(&mut self, from: u32, to: u32, weight: u32, via: u32) {
        match self.adj[from as usize]
            .iter_mut()
            .find(|e| e.target == to && e.weight == weight && e.mid == via)
        {
            Some(e) => e.forward = true,
            None => self.adj[from as usize].push(DynEdge {
                target: to,
                weight,
                forward: true,
                backward: false,
                mid: via,
            }),
        }
        match self.adj[to as usize]
            .iter_mut()
            .find(|e| e.target == from && e.weight == weight && e.mid == via)
        {
            Some(e) => e.backward = true,
            None => self.adj[to as usize].push(DynEdge {
                target: from,
                weight,
                forward: false,
                backward: true,
                mid: via,
            }),
        }
    }

    /// Contract `node` and return its surviving neighbors (for importance
    /// updates).
    fn contract_node(&mut self, node: u32) -> Vec<u32> {
        let (shortcuts, _, _) = self.contraction_profile(node);
        self.n_shortcuts += shortcuts.len() as u64;
        for (from, to, weight) in shortcuts {
            self.add_shortcut(from, to, weight, node);
        }
        self.contracted.set(node as usize, true);

        let mut neighbors: Vec<u32> = self.adj[node as usize]
            .iter()
            .map(|e| e.target)
            .filter(|&t| t != node && !self.contracted[t as usize])
            .collect();
        neighbors.sort_unstable();
        neighbors.dedup();

        let node_depth = self.depth[node as usize];
        for &u in &neighbors {
            self.deleted_neighbors[u as usize] += 1;
            let d = &mut self.depth[u as usize];
            *d = (*d).max(node_depth + 1);
        }
        neighbors
    }
}

/// Run CH preprocessing over a validated input graph.
pub fn contract(input: &InputGraph, params: ContractionParams) -> ChTopo {
    let n_nodes = input.n_nodes;
    info!(
        "contracting {} nodes, {} input edges",
        n_nodes,
        input.edges.len()
    );

    let mut contractor = Contractor::new(input, params);
    let mut queue = ImportanceQueue::new();
    for node in 0..n_nodes as u32 {
        let importance = contractor.importance(node);
        queue.push(node, importance);
    }

    let mut rank = vec![0u32; n_nodes];
    let mut next_rank = 0u32;
    let mut last_progress = 0usize;

    while let Some((node, _)) = queue.pop_lazy(|n| contractor.importance(n)) {
        rank[node as usize] = next_rank;
        next_rank += 1;

        let neighbors = contractor.contract_node(node);
        for u in neighbors {
            let importance = contractor.importance(u);
            queue.update(u, importance);
        }

        let progress = next_rank as usize * 10 / n_nodes;
        if progress > last_progress {
            last_progress = progress;
            debug!(
                "contracted {}/{} nodes, {} shortcuts",
                next_rank, n_nodes, contractor.n_shortcuts
            );
        }
    }

    info!(
        "contraction done: {} shortcuts added",
        contractor.n_shortcuts
    );
    build_topo(n_nodes, contractor.adj, rank, contractor.n_shortcuts)
}

/// Split the final adjacency into rank-partitioned UP/DOWN CSR arrays.
fn build_topo(n_nodes: usize, adj: Vec<Vec<DynEdge>>, rank: Vec<u32>, n_shortcuts: u64) -> ChTopo {
    let mut up_offsets = Vec::with_capacity(n_nodes + 1);
    let mut up_targets = Vec::new();
    let mut up_weights = Vec::new();
    let mut up_fwd = Vec::new();
    let mut up_bwd = Vec::new();
    let mut up_mid = Vec::new();

    let mut down_offsets = Vec::with_capacity(n_nodes + 1);
    let mut down_targets = Vec::new();
    let mut down_weights = Vec::new();
    let mut down_fwd = Vec::new();
    let mut down_bwd = Vec::new();
    let mut down_mid = Vec::new();

    let mut up_edges: Vec<DynEdge> = Vec::new();
    let mut down_edges: Vec<DynEdge> = Vec::new();

    for u in 0..n_nodes {
        up_offsets.push(up_targets.len() as u64);
        down_offsets.push(down_targets.len() as u64);

        up_edges.clear();
        down_edges.clear();
        for e in &adj[u] {
            if rank[e.target as usize] > rank[u] {
                up_edges.push(*e);
            } else {
                down_edges.push(*e);
            }
        }
        up_edges.sort_unstable_by_key(|e| Reverse(rank[e.target as usize]));
        down_edges.sort_unstable_by_key(|e| Reverse(rank[e.target as usize]));

        for e in up_edges.iter() {
            up_targets.push(e.target);
            up_weights.push(e.weight);
            up_fwd.push(e.forward);
            up_bwd.push(e.backward);
            up_mid.push(e.mid);
        }
        for e in down_edges.iter() {
            down_targets.push(e.target);
            down_weights.push(e.weight);
            down_fwd.push(e.forward);
            down_bwd.push(e.backward);
            down_mid.push(e.mid);
        }
    }
    up_offsets.push(up_targets.len() as u64);
    down_offsets.push(down_targets.len() as u64);

    ChTopo {
        n_nodes: n_nodes as u32,
        scale: SCALE,
        n_shortcuts,
        rank,
        up_offsets,
        up_targets,
        up_weights,
        up_fwd,
        up_bwd,
        up_mid,
        down_offsets,
        down_targets,
        down_weights,
        down_fwd,
        down_bwd,
        down_mid,
    }
}
