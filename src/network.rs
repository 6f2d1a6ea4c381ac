//! Facade over one or more contracted graphs sharing a node set
//!
//! Owns the external-ID bijection, the per-category POI and attribute
//! registries, the range cache, and the rayon fan-out. All query state
//! lives in per-worker scratch packs reached through a thread local; the
//! graphs, buckets, and cache are read-only after construction and shared
//! without locks.

use log::info;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::cell::RefCell;

use crate::aggregate::{self, Aggregation, Decay};
use crate::cache::RangeCache;
use crate::ch::{ChGraph, ContractionParams, QueryScratch, SearchState};
use crate::error::{Error, Result};
use crate::graph::{unscale, InputGraph, INF, SCALE};
use crate::poi::PoiIndex;

/// Scratch pack owned by one worker thread.
struct WorkerScratch {
    query: QueryScratch,
    poi_candidates: FxHashMap<u32, u32>,
    dists: Vec<(u32, u32)>,
    vals: Vec<f64>,
}

impl WorkerScratch {
    fn new(n_nodes: usize) -> Self {
        Self {
            query: QueryScratch::new(n_nodes),
            poi_candidates: FxHashMap::default(),
            dists: Vec::with_capacity(1024),
            vals: Vec::new(),
        }
    }

    fn n_nodes(&self) -> usize {
        self.query.n_nodes()
    }
}

thread_local! {
    static WORKER: RefCell<Option<WorkerScratch>> = const { RefCell::new(None) };
}

/// Run `f` with this thread's scratch pack, (re)allocating when the
/// current network is larger than what the pack was sized for.
fn with_worker<R>(n_nodes: usize, f: impl FnOnce(&mut WorkerScratch) -> R) -> R {
    WORKER.with(|cell| {
        let mut slot = cell.borrow_mut();
        let needs_new = slot.as_ref().map_or(true, |w| w.n_nodes() < n_nodes);
        if needs_new {
            *slot = Some(WorkerScratch::new(n_nodes));
        }
        f(slot.as_mut().unwrap())
    })
}

/// Scale a query radius to fixed-point, saturating instead of erroring:
/// radii are bounds, not graph data.
fn scale_radius(radius: f64) -> u32 {
    if !radius.is_finite() || radius <= 0.0 {
        return 0;
    }
    let scaled = (radius * SCALE as f64).round();
    if scaled >= INF as f64 {
        INF - 1
    } else {
        scaled as u32
    }
}

/// Network accessibility engine over a static weighted graph.
///
/// Multiple graphs share the node set (e.g. congested vs. free-flow
/// weights) and are selected by `graphno`. POI and attribute categories
/// are registered once and replaced on re-registration.
pub struct Network {
    n_nodes: usize,
    node_ids: Vec<i64>,
    id_to_index: FxHashMap<i64, u32>,
    graphs: Vec<ChGraph>,
    poi_indexes: FxHashMap<String, Vec<PoiIndex>>,
    attributes: FxHashMap<String, Vec<Vec<f64>>>,
    cache: Option<RangeCache>,
}

impl Network {
    /// Construct and preprocess. One contracted graph is built per weight
    /// vector; every vector must parallel `edges`. `twoway` treats every
    /// edge as undirected.
    pub fn new(
        node_ids: &[i64],
        edges: &[(i64, i64)],
        weights: &[Vec<f64>],
        twoway: bool,
    ) -> Result<Self> {
        if node_ids.is_empty() {
            return Err(Error::InvalidGraph("empty node set".to_string()));
        }
        if weights.is_empty() {
            return Err(Error::InvalidGraph(
                "at least one weight vector is required".to_string(),
            ));
        }

        let mut id_to_index =
            FxHashMap::with_capacity_and_hasher(node_ids.len(), Default::default());
        for (i, &id) in node_ids.iter().enumerate() {
            if id_to_index.insert(id, i as u32).is_some() {
                return Err(Error::InvalidGraph(format!("duplicate node id {id}")));
            }
        }

        let mut internal_edges = Vec::with_capacity(edges.len());
        for &(from, to) in edges {
            let from = *id_to_index
                .get(&from)
                .ok_or_else(|| Error::InvalidGraph(format!("edge endpoint {from} is not a node")))?;
            let to = *id_to_index
                .get(&to)
                .ok_or_else(|| Error::InvalidGraph(format!("edge endpoint {to} is not a node")))?;
            internal_edges.push((from, to));
        }

        let mut graphs = Vec::with_capacity(weights.len());
        for weight_vec in weights {
            let input =
                InputGraph::from_edge_list(node_ids.len(), &internal_edges, weight_vec, twoway)?;
            graphs.push(ChGraph::build(&input, ContractionParams::default()));
        }
        info!(
            "network ready: {} nodes, {} edges, {} graphs",
            node_ids.len(),
            edges.len(),
            graphs.len()
        );

        Ok(Self {
            n_nodes: node_ids.len(),
            node_ids: node_ids.to_vec(),
            id_to_index,
            graphs,
            poi_indexes: FxHashMap::default(),
            attributes: FxHashMap::default(),
            cache: None,
        })
    }

    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    pub fn n_graphs(&self) -> usize {
        self.graphs.len()
    }

    pub fn node_ids(&self) -> &[i64] {
        &self.node_ids
    }

    /// Radius of the precomputed range cache, if one has been filled.
    pub fn cache_radius(&self) -> Option<f64> {
        self.cache.as_ref().map(|c| unscale(c.radius()))
    }

    fn index_of(&self, id: i64) -> Result<u32> {
        self.id_to_index
            .get(&id)
            .copied()
            .ok_or_else(|| Error::InvalidArgument(format!("unknown node id {id}")))
    }

    fn graph(&self, graphno: usize) -> Result<&ChGraph> {
        self.graphs.get(graphno).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "graph index {graphno} out of range ({} graphs)",
                self.graphs.len()
            ))
        })
    }

    /// Fill the range cache: one range result per node per graph. Queries
    /// with a radius at or below this one reuse the cached lists.
    pub fn precompute_range(&mut self, radius: f64) {
        let r = scale_radius(radius);
        let n = self.n_nodes;
        info!("precomputing range cache at radius {radius}");

        let per_graph = self
            .graphs
            .iter()
            .map(|graph| {
                (0..n as u32)
                    .into_par_iter()
                    .map(|source| {
                        with_worker(n, |w| {
                            let mut out = Vec::new();
                            graph.range(source, r, &mut w.query, &mut out);
                            out
                        })
                    })
                    .collect()
            })
            .collect();

        self.cache = Some(RangeCache::new(r, per_graph));
    }

    /// All nodes within `radius` of each source, as `(node_id, distance)`
    /// pairs in unspecified order. Served from the cache when it covers
    /// the radius; a larger radius silently bypasses the cache.
    pub fn range(
        &self,
        sources: &[i64],
        radius: f64,
        graphno: usize,
    ) -> Result<Vec<Vec<(i64, f64)>>> {
        let graph = self.graph(graphno)?;
        let r = scale_radius(radius);
        let srcs: Vec<u32> = sources
            .iter()
            .map(|&s| self.index_of(s))
            .collect::<Result<_>>()?;

        if let Some(cache) = self.cache.as_ref().filter(|c| c.covers(r)) {
            return Ok(srcs
                .iter()
                .map(|&s| {
                    cache
                        .get(graphno, s)
                        .iter()
                        .filter(|&&(_, d)| d <= r)
                        .map(|&(node, d)| (self.node_ids[node as usize], unscale(d)))
                        .collect()
                })
                .collect());
        }

        Ok(srcs
            .par_iter()
            .map(|&s| {
                with_worker(self.n_nodes, |w| {
                    w.dists.clear();
                    graph.range(s, r, &mut w.query, &mut w.dists);
                    w.dists
                        .iter()
                        .map(|&(node, d)| (self.node_ids[node as usize], unscale(d)))
                        .collect()
                })
            })
            .collect())
    }

    /// Shortest path as a node-ID sequence, empty when unreachable.
    pub fn route(&self, src: i64, tgt: i64, graphno: usize) -> Result<Vec<i64>> {
        let graph = self.graph(graphno)?;
        let s = self.index_of(src)?;
        let t = self.index_of(tgt)?;
        let path = with_worker(self.n_nodes, |w| graph.shortest_path(s, t, &mut w.query));
        Ok(path
            .into_iter()
            .map(|n| self.node_ids[n as usize])
            .collect())
    }

    /// Paths for pairwise `(sources[i], targets[i])`, truncated to the
    /// shorter list.
    pub fn routes(
        &self,
        sources: &[i64],
        targets: &[i64],
        graphno: usize,
    ) -> Result<Vec<Vec<i64>>> {
        let graph = self.graph(graphno)?;
        let n_pairs = sources.len().min(targets.len());
        let pairs: Vec<(u32, u32)> = sources[..n_pairs]
            .iter()
            .zip(&targets[..n_pairs])
            .map(|(&s, &t)| Ok((self.index_of(s)?, self.index_of(t)?)))
            .collect::<Result<_>>()?;

        Ok(pairs
            .par_iter()
            .map(|&(s, t)| {
                with_worker(self.n_nodes, |w| {
                    graph
                        .shortest_path(s, t, &mut w.query)
                        .into_iter()
                        .map(|n| self.node_ids[n as usize])
                        .collect()
                })
            })
            .collect())
    }

    /// Shortest-path cost, `f64::INFINITY` when unreachable.
    pub fn distance(&self, src: i64, tgt: i64, graphno: usize) -> Result<f64> {
        let graph = self.graph(graphno)?;
        let s = self.index_of(src)?;
        let t = self.index_of(tgt)?;
        let d = with_worker(self.n_nodes, |w| graph.distance(s, t, &mut w.query));
        Ok(if d == INF { f64::INFINITY } else { unscale(d) })
    }

    /// Costs for pairwise `(sources[i], targets[i])`, truncated to the
    /// shorter list.
    pub fn distances(
        &self,
        sources: &[i64],
        targets: &[i64],
        graphno: usize,
    ) -> Result<Vec<f64>> {
        let graph = self.graph(graphno)?;
        let n_pairs = sources.len().min(targets.len());
        let pairs: Vec<(u32, u32)> = sources[..n_pairs]
            .iter()
            .zip(&targets[..n_pairs])
            .map(|(&s, &t)| Ok((self.index_of(s)?, self.index_of(t)?)))
            .collect::<Result<_>>()?;

        Ok(pairs
            .par_iter()
            .map(|&(s, t)| {
                let d = with_worker(self.n_nodes, |w| graph.distance(s, t, &mut w.query));
                if d == INF {
                    f64::INFINITY
                } else {
                    unscale(d)
                }
            })
            .collect())
    }

    /// Register a POI category: builds one bucket index per graph.
    /// Re-registering replaces the category. POI dense indices follow the
    /// order of `node_ids`; colocated POIs keep separate indices.
    pub fn init_category_poi(
        &mut self,
        max_dist: f64,
        max_items: usize,
        category: &str,
        node_ids: &[i64],
    ) -> Result<()> {
        let nodes: Vec<u32> = node_ids
            .iter()
            .map(|&id| self.index_of(id))
            .collect::<Result<_>>()?;
        let bound = scale_radius(max_dist);

        let mut state = SearchState::new(self.n_nodes);
        let indexes: Vec<PoiIndex> = self
            .graphs
            .iter()
            .map(|graph| PoiIndex::build(graph, &nodes, bound, max_items, &mut state))
            .collect();
        info!(
            "registered POI category {category:?}: {} POIs, max_dist {max_dist}, max_items {max_items}",
            nodes.len()
        );
        self.poi_indexes.insert(category.to_string(), indexes);
        Ok(())
    }

    /// Up to `k` nearest POIs of `category` within `radius` of `src`, as
    /// `(distance, poi_index)` ascending. Exact when `radius` and `k` stay
    /// within the category's index-time bounds. Unknown category: empty.
    pub fn find_nearest_pois(
        &self,
        src: i64,
        radius: f64,
        k: usize,
        category: &str,
        graphno: usize,
    ) -> Result<Vec<(f64, i32)>> {
        let graph = self.graph(graphno)?;
        let s = self.index_of(src)?;
        let index = match self.poi_indexes.get(category) {
            Some(per_graph) => &per_graph[graphno],
            None => return Ok(Vec::new()),
        };
        let r = scale_radius(radius);

        let found = with_worker(self.n_nodes, |w| {
            index.nearest(graph, s, r, k, &mut w.query.fwd, &mut w.poi_candidates)
        });
        Ok(found
            .into_iter()
            .map(|(d, p)| (unscale(d), p as i32))
            .collect())
    }

    /// `find_nearest_pois` from every node: N rows of `k` distances and
    /// `k` POI indices, missing slots `-1.0` / `-1`. Unknown category:
    /// empty grids.
    pub fn find_all_nearest_pois(
        &self,
        radius: f64,
        k: usize,
        category: &str,
        graphno: usize,
    ) -> Result<(Vec<Vec<f64>>, Vec<Vec<i32>>)> {
        let graph = self.graph(graphno)?;
        let index = match self.poi_indexes.get(category) {
            Some(per_graph) => &per_graph[graphno],
            None => return Ok((Vec::new(), Vec::new())),
        };
        let r = scale_radius(radius);

        let rows: Vec<(Vec<f64>, Vec<i32>)> = (0..self.n_nodes as u32)
            .into_par_iter()
            .map(|s| {
                with_worker(self.n_nodes, |w| {
                    let found =
                        index.nearest(graph, s, r, k, &mut w.query.fwd, &mut w.poi_candidates);
                    let mut dist_row = vec![-1.0; k];
                    let mut id_row = vec![-1; k];
                    for (j, (d, p)) in found.into_iter().enumerate() {
                        dist_row[j] = unscale(d);
                        id_row[j] = p as i32;
                    }
                    (dist_row, id_row)
                })
            })
            .collect();

        Ok(rows.into_iter().unzip())
    }

    /// Register an attribute category: `values[i]` is anchored at
    /// `node_ids[i]`; several values may land on one node. Re-registering
    /// replaces the category.
    pub fn init_acc_var(&mut self, category: &str, node_ids: &[i64], values: &[f64]) -> Result<()> {
        if node_ids.len() != values.len() {
            return Err(Error::InvalidArgument(format!(
                "{} nodes but {} values",
                node_ids.len(),
                values.len()
            )));
        }
        let nodes: Vec<u32> = node_ids
            .iter()
            .map(|&id| self.index_of(id))
            .collect::<Result<_>>()?;
        self.attributes.insert(
            category.to_string(),
            aggregate::build_attr_table(self.n_nodes, &nodes, values),
        );
        Ok(())
    }

    /// Decay-weighted aggregation of `category` within `radius`, for every
    /// node: a length-N vector with `-1.0` where the range is empty.
    /// Unknown category, aggregation, decay, or graph index: empty vector.
    pub fn aggregate_all(
        &self,
        radius: f64,
        category: &str,
        aggtyp: &str,
        decay: &str,
        graphno: usize,
    ) -> Vec<f64> {
        let (graph, vars, agg, decay) = match (
            self.graphs.get(graphno),
            self.attributes.get(category),
            Aggregation::parse(aggtyp),
            Decay::parse(decay),
        ) {
            (Some(g), Some(v), Some(a), Some(d)) => (g, v, a, d),
            _ => return Vec::new(),
        };
        let r = scale_radius(radius);

        (0..self.n_nodes as u32)
            .into_par_iter()
            .map(|s| self.aggregate_one(graph, graphno, s, r, vars, agg, decay))
            .collect()
    }

    /// `aggregate_all` restricted to an explicit source list.
    pub fn aggregate_batch(
        &self,
        sources: &[i64],
        radius: f64,
        category: &str,
        aggtyp: &str,
        decay: &str,
        graphno: usize,
    ) -> Result<Vec<f64>> {
        let srcs: Vec<u32> = sources
            .iter()
            .map(|&s| self.index_of(s))
            .collect::<Result<_>>()?;
        let (graph, vars, agg, decay) = match (
            self.graphs.get(graphno),
            self.attributes.get(category),
            Aggregation::parse(aggtyp),
            Decay::parse(decay),
        ) {
            (Some(g), Some(v), Some(a), Some(d)) => (g, v, a, d),
            _ => return Ok(Vec::new()),
        };
        let r = scale_radius(radius);

        Ok(srcs
            .par_iter()
            .map(|&s| self.aggregate_one(graph, graphno, s, r, vars, agg, decay))
            .collect())
    }

    fn aggregate_one(
        &self,
        graph: &ChGraph,
        graphno: usize,
        source: u32,
        radius: u32,
        vars: &[Vec<f64>],
        agg: Aggregation,
        decay: Decay,
    ) -> f64 {
        with_worker(self.n_nodes, |w| {
            w.dists.clear();
            match self.cache.as_ref().filter(|c| c.covers(radius)) {
                Some(cache) => w.dists.extend_from_slice(cache.get(graphno, source)),
                None => graph.range(source, radius, &mut w.query, &mut w.dists),
            }
            aggregate::aggregate(&mut w.dists, vars, agg, decay, radius, &mut w.vals)
        })
    }
}
