//! POI bucket index: k-nearest points of interest per category
//!
//! For every POI a bounded backward upward search seeds per-node buckets
//! with `(distance, poi)` entries. A k-nearest query is then a forward
//! upward search from the source joined against the buckets of every
//! settled node — the classic bucket join, shared with many-to-many
//! distance tables.
//!
//! Buckets are kept in two parts: a sorted prefix holding the exact
//! smallest entries and an unsorted overflow. Insertion stays cheap while
//! the full order is only materialized by the query.

use rustc_hash::FxHashMap;

use crate::ch::{ChGraph, SearchState};

/// Sorted prefix capacity. Buckets rarely need more than this many
/// ordered entries; the rest ride in the overflow.
const PREFIX_CAP: usize = 16;

/// One per-node bucket: sorted prefix + unsorted overflow, capped at
/// `max_items` entries in total.
///
/// Invariant: the prefix holds the exact smallest entries, so every
/// overflow entry compares >= the prefix tail. Eviction therefore always
/// targets the overflow maximum when the overflow is non-empty.
#[derive(Debug, Clone, Default)]
struct PartialBucket {
    prefix: Vec<(u32, u32)>,
    overflow: Vec<(u32, u32)>,
}

impl PartialBucket {
    fn len(&self) -> usize {
        self.prefix.len() + self.overflow.len()
    }

    fn insert(&mut self, dist: u32, poi: u32, max_items: usize, prefix_cap: usize) {
        if max_items == 0 {
            return;
        }
        let entry = (dist, poi);

        if self.len() == max_items {
            if self.overflow.is_empty() {
                let worst = *self.prefix.last().unwrap();
                if entry >= worst {
                    return;
                }
                self.prefix.pop();
            } else {
                let (worst_idx, &worst) = self
                    .overflow
                    .iter()
                    .enumerate()
                    .max_by_key(|&(_, &e)| e)
                    .unwrap();
                if entry >= worst {
                    return;
                }
                self.overflow.swap_remove(worst_idx);
            }
        }

        if self.prefix.len() < prefix_cap {
            let pos = self.prefix.partition_point(|&e| e <= entry);
            self.prefix.insert(pos, entry);
        } else if entry < *self.prefix.last().unwrap() {
            let displaced = self.prefix.pop().unwrap();
            let pos = self.prefix.partition_point(|&e| e <= entry);
            self.prefix.insert(pos, entry);
            self.overflow.push(displaced);
        } else {
            self.overflow.push(entry);
        }
    }

    fn entries(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.prefix
            .iter()
            .chain(self.overflow.iter())
            .copied()
    }
}

/// Bucket table for one category on one graph. Immutable after build;
/// shared across worker threads.
#[derive(Debug, Clone)]
pub struct PoiIndex {
    max_dist: u32,
    max_items: usize,
    n_pois: u32,
    buckets: Vec<PartialBucket>,
}

impl PoiIndex {
    /// Seed the buckets: one bounded backward upward search per POI.
    /// `poi_nodes[p]` anchors the POI with dense index `p`; colocated POIs
    /// each keep their own index.
    pub fn build(
        graph: &ChGraph,
        poi_nodes: &[u32],
        max_dist: u32,
        max_items: usize,
        state: &mut SearchState,
    ) -> Self {
        let n_nodes = graph.n_nodes() as usize;
        let prefix_cap = max_items.min(PREFIX_CAP);
        let mut buckets = vec![PartialBucket::default(); n_nodes];

        for (p, &node) in poi_nodes.iter().enumerate() {
            graph.backward_up_search(node, max_dist, state, |settled, dist| {
                buckets[settled as usize].insert(dist, p as u32, max_items, prefix_cap);
            });
        }

        Self {
            max_dist,
            max_items,
            n_pois: poi_nodes.len() as u32,
            buckets,
        }
    }

    pub fn n_pois(&self) -> u32 {
        self.n_pois
    }

    pub fn max_dist(&self) -> u32 {
        self.max_dist
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// The k nearest distinct POIs within `radius` of `source`, ascending
    /// by `(distance, poi)`. Exact whenever `radius <= max_dist` and
    /// `k <= max_items` (the index-time bounds).
    pub fn nearest(
        &self,
        graph: &ChGraph,
        source: u32,
        radius: u32,
        k: usize,
        state: &mut SearchState,
        candidates: &mut FxHashMap<u32, u32>,
    ) -> Vec<(u32, u32)> {
        candidates.clear();
        graph.forward_up_search(source, radius, state, |settled, d_fwd| {
            for (d_bwd, poi) in self.buckets[settled as usize].entries() {
                let total = d_fwd.saturating_add(d_bwd);
                if total <= radius {
                    candidates
                        .entry(poi)
                        .and_modify(|d| *d = (*d).min(total))
                        .or_insert(total);
                }
            }
        });

        let mut result: Vec<(u32, u32)> = candidates.iter().map(|(&poi, &d)| (d, poi)).collect();
        result.sort_unstable();
        result.truncate(k);
        result
    }
}
