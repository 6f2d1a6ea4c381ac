//! CH query algorithms: bidirectional point-to-point, path unpacking,
//! and the bounded searches underlying range and POI queries.

use std::cmp::Reverse;

use super::contraction::{contract, ChTopo, NO_MID};
use super::ordering::ContractionParams;
use super::search::{QueryScratch, SearchState, NO_NODE};
use crate::graph::{InputGraph, INF};

/// A contracted graph ready for queries. Immutable after construction;
/// shared freely across worker threads.
#[derive(Debug, Clone)]
pub struct ChGraph {
    pub topo: ChTopo,
}

impl ChGraph {
    pub fn build(input: &InputGraph, params: ContractionParams) -> Self {
        Self {
            topo: contract(input, params),
        }
    }

    #[inline]
    pub fn n_nodes(&self) -> u32 {
        self.topo.n_nodes
    }

    /// Shortest-path distance in fixed-point units, `INF` if unreachable.
    pub fn distance(&self, source: u32, target: u32, scratch: &mut QueryScratch) -> u32 {
        match self.bidirectional(source, target, scratch) {
            Some((dist, _)) => dist,
            None => INF,
        }
    }

    /// Shortest path as a node sequence (including endpoints), empty if
    /// unreachable.
    pub fn shortest_path(&self, source: u32, target: u32, scratch: &mut QueryScratch) -> Vec<u32> {
        if source == target {
            return vec![source];
        }
        let (_, meeting) = match self.bidirectional(source, target, scratch) {
            Some(result) => result,
            None => return Vec::new(),
        };

        // Forward half: walk parent pointers meeting -> source, then expand
        // each hop in path order.
        let mut hops: Vec<(u32, u32, u32)> = Vec::new();
        let mut current = meeting;
        while current != source {
            let (prev, mid) = scratch.fwd.parent(current);
            hops.push((prev, current, mid));
            current = prev;
        }
        hops.reverse();

        let mut path = vec![source];
        for (from, to, mid) in hops {
            self.expand_edge(from, to, mid, &mut path);
        }

        // Backward half: parent pointers already run meeting -> target in
        // path direction.
        let mut current = meeting;
        while current != target {
            let (next, mid) = scratch.bwd.parent(current);
            self.expand_edge(current, next, mid, &mut path);
            current = next;
        }

        path
    }

    /// Bidirectional upward search. Returns `(distance, meeting_node)`.
    fn bidirectional(
        &self,
        source: u32,
        target: u32,
        scratch: &mut QueryScratch,
    ) -> Option<(u32, u32)> {
        if source == target {
            return Some((0, source));
        }

        let topo = &self.topo;
        let fwd = &mut scratch.fwd;
        let bwd = &mut scratch.bwd;

        fwd.reset();
        bwd.reset();
        fwd.set(source, 0, NO_NODE, NO_MID);
        bwd.set(target, 0, NO_NODE, NO_MID);
        fwd.heap.push(Reverse((0, source)));
        bwd.heap.push(Reverse((0, target)));

        let mut best = INF;
        let mut meeting = NO_NODE;

        loop {
            let fwd_active = fwd.heap.peek().is_some_and(|&Reverse((d, _))| d < best);
            let bwd_active = bwd.heap.peek().is_some_and(|&Reverse((d, _))| d < best);
            if !fwd_active && !bwd_active {
                break;
            }

            // Forward step: relax upward edges traversable away from the
            // storing node.
            if fwd_active {
                if let Some(Reverse((d, u))) = fwd.heap.pop() {
                    if d <= fwd.dist(u) && !stalled(topo, fwd, u, d, StallSide::Forward) {
                        let d_other = bwd.dist(u);
                        if d_other != INF {
                            let total = d.saturating_add(d_other);
                            if total < best {
                                best = total;
                                meeting = u;
                            }
                        }
                        for i in topo.up_range(u) {
                            if !topo.up_fwd[i] {
                                continue;
                            }
                            let v = topo.up_targets[i];
                            let new_dist = d.saturating_add(topo.up_weights[i]);
                            if new_dist < fwd.dist(v) {
                                fwd.set(v, new_dist, u, topo.up_mid[i]);
                                fwd.heap.push(Reverse((new_dist, v)));
                            }
                        }
                    }
                }
            }

            // Backward step: relax upward edges traversable toward the
            // storing node (reverse graph).
            if bwd_active {
                if let Some(Reverse((d, u))) = bwd.heap.pop() {
                    if d <= bwd.dist(u) && !stalled(topo, bwd, u, d, StallSide::Backward) {
                        let d_other = fwd.dist(u);
                        if d_other != INF {
                            let total = d.saturating_add(d_other);
                            if total < best {
                                best = total;
                                meeting = u;
                            }
                        }
                        for i in topo.up_range(u) {
                            if !topo.up_bwd[i] {
                                continue;
                            }
                            let v = topo.up_targets[i];
                            let new_dist = d.saturating_add(topo.up_weights[i]);
                            if new_dist < bwd.dist(v) {
                                bwd.set(v, new_dist, u, topo.up_mid[i]);
                                bwd.heap.push(Reverse((new_dist, v)));
                            }
                        }
                    }
                }
            }
        }

        if best == INF {
            None
        } else {
            Some((best, meeting))
        }
    }

    /// Bounded Dijkstra over every forward-traversable edge (up and down).
    /// All original edges survive contraction, so the distances are exact.
    /// Appends unordered `(node, dist)` pairs with `dist <= radius` to
    /// `out`, including the source at distance 0.
    pub fn range(
        &self,
        source: u32,
        radius: u32,
        scratch: &mut QueryScratch,
        out: &mut Vec<(u32, u32)>,
    ) {
        let topo = &self.topo;
        let state = &mut scratch.fwd;
        state.reset();
        state.set(source, 0, NO_NODE, NO_MID);
        state.heap.push(Reverse((0, source)));

        while let Some(Reverse((d, u))) = state.heap.pop() {
            if d > state.dist(u) {
                continue;
            }
            out.push((u, d));

            for i in topo.up_range(u) {
                if !topo.up_fwd[i] {
                    continue;
                }
                let v = topo.up_targets[i];
                let new_dist = d.saturating_add(topo.up_weights[i]);
                if new_dist <= radius && new_dist < state.dist(v) {
                    state.set(v, new_dist, u, NO_MID);
                    state.heap.push(Reverse((new_dist, v)));
                }
            }
            for i in topo.down_range(u) {
                if !topo.down_fwd[i] {
                    continue;
                }
                let v = topo.down_targets[i];
                let new_dist = d.saturating_add(topo.down_weights[i]);
                if new_dist <= radius && new_dist < state.dist(v) {
                    state.set(v, new_dist, u, NO_MID);
                    state.heap.push(Reverse((new_dist, v)));
                }
            }
        }
    }

    /// Bounded upward Dijkstra in the forward direction, with
    /// stall-on-demand. Calls `on_settle` for every settled `(node, dist)`.
    pub fn forward_up_search<F>(&self, source: u32, bound: u32, state: &mut SearchState, on_settle: F)
    where
        F: FnMut(u32, u32),
    {
        self.up_search(source, bound, state, StallSide::Forward, on_settle);
    }

    /// Bounded upward Dijkstra in the reverse graph (used to seed POI
    /// buckets and as the target side of bucket joins).
    pub fn backward_up_search<F>(
        &self,
        source: u32,
        bound: u32,
        state: &mut SearchState,
        on_settle: F,
    ) where
        F: FnMut(u32, u32),
    {
        self.up_search(source, bound, state, StallSide::Backward, on_settle);
    }

    fn up_search<F>(
        &self,
        source: u32,
        bound: u32,
        state: &mut SearchState,
        side: StallSide,
        mut on_settle: F,
    ) where
        F: FnMut(u32, u32),
    {
        let topo = &self.topo;
        state.reset();
        state.set(source, 0, NO_NODE, NO_MID);
        state.heap.push(Reverse((0, source)));

        while let Some(Reverse((d, u))) = state.heap.pop() {
            if d > state.dist(u) {
                continue;
            }
            if stalled(topo, state, u, d, side) {
                continue;
            }
            on_settle(u, d);

            for i in topo.up_range(u) {
                let traversable = match side {
                    StallSide::Forward => topo.up_fwd[i],
                    StallSide::Backward => topo.up_bwd[i],
                };
                if !traversable {
                    continue;
                }
                let v = topo.up_targets[i];
                let new_dist = d.saturating_add(topo.up_weights[i]);
                if new_dist <= bound && new_dist < state.dist(v) {
                    state.set(v, new_dist, u, topo.up_mid[i]);
                    state.heap.push(Reverse((new_dist, v)));
                }
            }
        }
    }

    /// Midpoint of the cheapest forward-traversable edge `from -> to`
    /// (`NO_MID` for an original edge). The edge is guaranteed to exist for
    /// every hop produced by a search.
    fn edge_mid(&self, from: u32, to: u32) -> u32 {
        let topo = &self.topo;
        let mut best_weight = INF;
        let mut best_mid = NO_MID;
        if topo.rank[to as usize] > topo.rank[from as usize] {
            for i in topo.up_range(from) {
                if topo.up_fwd[i] && topo.up_targets[i] == to && topo.up_weights[i] < best_weight {
                    best_weight = topo.up_weights[i];
                    best_mid = topo.up_mid[i];
                }
            }
        } else {
            for i in topo.down_range(from) {
                if topo.down_fwd[i] && topo.down_targets[i] == to && topo.down_weights[i] < best_weight
                {
                    best_weight = topo.down_weights[i];
                    best_mid = topo.down_mid[i];
                }
            }
        }
        best_mid
    }

    /// Append the expansion of edge `from -> to` (excluding `from`,
    /// including `to`). Shortcuts are replaced by their two halves
    /// recursively; midpoint ranks strictly decrease, so this terminates.
    fn expand_edge(&self, from: u32, to: u32, mid: u32, path: &mut Vec<u32>) {
        if mid == NO_MID {
            path.push(to);
            return;
        }
        let first_mid = self.edge_mid(from, mid);
        self.expand_edge(from, mid, first_mid, path);
        let second_mid = self.edge_mid(mid, to);
        self.expand_edge(mid, to, second_mid, path);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum StallSide {
    Forward,
    Backward,
}

/// Stall-on-demand: a settled key is dominated when a higher-ranked
/// neighbor reaches this node more cheaply through an edge pointing the
/// opposite way. UP adjacency is rank-sorted, so dominating candidates
/// come first in storage order.
#[inline]
fn stalled(topo: &ChTopo, state: &SearchState, node: u32, key: u32, side: StallSide) -> bool {
    for i in topo.up_range(node) {
        let incoming = match side {
            StallSide::Forward => topo.up_bwd[i],
            StallSide::Backward => topo.up_fwd[i],
        };
        if !incoming {
            continue;
        }
        let x = state.dist(topo.up_targets[i]);
        if x != INF && x.saturating_add(topo.up_weights[i]) < key {
            return true;
        }
    }
    false
}
