//! Contraction ordering: node importance and the lazily-updated queue
//!
//! Nodes are contracted in ascending importance. Importance is a linear
//! combination of the edge difference (shortcuts a contraction would add
//! minus edges it removes), the number of already-contracted neighbors
//! (spreads contraction evenly across the graph), and an upper bound on
//! the hierarchy depth through the node.
//!
//! The queue is lazy: recomputing every importance after each contraction
//! is too expensive, so stale keys are tolerated and re-checked on pop.

use priority_queue::PriorityQueue;
use std::cmp::Reverse;

/// Tuning knobs for preprocessing.
#[derive(Debug, Clone)]
pub struct ContractionParams {
    /// Weight of the edge-difference term.
    pub edge_diff_coeff: i64,
    /// Weight of the deleted-neighbors term.
    pub deleted_coeff: i64,
    /// Weight of the hierarchy-depth term.
    pub depth_coeff: i64,
    /// Hop bound for witness searches.
    pub witness_hop_limit: u32,
}

impl Default for ContractionParams {
    fn default() -> Self {
        Self {
            edge_diff_coeff: 190,
            deleted_coeff: 120,
            depth_coeff: 10,
            witness_hop_limit: 5,
        }
    }
}

/// Raw importance terms for one node.
#[derive(Debug, Clone, Copy)]
pub struct ImportanceTerms {
    pub edge_difference: i64,
    pub deleted_neighbors: i64,
    pub depth: i64,
}

impl ImportanceTerms {
    pub fn score(&self, params: &ContractionParams) -> i64 {
        self.edge_difference * params.edge_diff_coeff
            + self.deleted_neighbors * params.deleted_coeff
            + self.depth * params.depth_coeff
    }
}

/// Min-queue over node importance with lazy re-evaluation.
pub struct ImportanceQueue {
    pq: PriorityQueue<u32, Reverse<i64>>,
}

impl ImportanceQueue {
    pub fn new() -> Self {
        Self {
            pq: PriorityQueue::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pq.is_empty()
    }

    pub fn push(&mut self, node: u32, importance: i64) {
        self.pq.push(node, Reverse(importance));
    }

    /// Re-key a node in place (used after a neighbor was contracted).
    pub fn update(&mut self, node: u32, importance: i64) {
        self.pq.change_priority(&node, Reverse(importance));
    }

    /// Pop the next node to contract. `recompute` supplies the node's fresh
    /// importance; if the stored key was stale and the node no longer beats
    /// the queue front, it is reinserted and the scan continues.
    pub fn pop_lazy<F>(&mut self, mut recompute: F) -> Option<(u32, i64)>
    where
        F: FnMut(u32) -> i64,
    {
        while let Some((node, Reverse(stored))) = self.pq.pop() {
            let fresh = recompute(node);
            if fresh > stored {
                // Stale key: only contract now if the node still wins.
                if let Some((_, &Reverse(front))) = self.pq.peek() {
                    if fresh > front {
                        self.pq.push(node, Reverse(fresh));
                        continue;
                    }
                }
            }
            return Some((node, fresh));
        }
        None
    }
}

impl Default for ImportanceQueue {
    fn default() -> Self {
        Self::new()
    }
}
