//! End-to-end tests for the accessibility engine
//!
//! Small literal scenarios first, then randomized checks against a plain
//! Dijkstra oracle (petgraph) on seeded graphs.

use anyhow::Result;
use petgraph::algo::dijkstra;
use petgraph::graph::{DiGraph, NodeIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use netreach::Network;

/// Plain Dijkstra distances from `source` over explicit directed edges
/// with fixed-point weights. `None` = unreachable.
fn oracle_dists(n: usize, edges: &[(usize, usize, u32)], source: usize) -> Vec<Option<u32>> {
    let mut g: DiGraph<(), u32> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..n).map(|_| g.add_node(())).collect();
    for &(a, b, w) in edges {
        g.add_edge(nodes[a], nodes[b], w);
    }
    let map = dijkstra(&g, nodes[source], None, |e| *e.weight());
    (0..n).map(|v| map.get(&nodes[v]).copied()).collect()
}

/// Convert a facade distance (cost units) back to fixed-point for exact
/// comparison against the oracle.
fn to_fixed(dist: f64) -> u32 {
    (dist * 1000.0).round() as u32
}

// ---------------------------------------------------------------------------
// Literal scenarios
// ---------------------------------------------------------------------------

fn line_network() -> Network {
    Network::new(
        &[0, 1, 2, 3],
        &[(0, 1), (1, 2), (2, 3)],
        &[vec![1.0, 1.0, 1.0]],
        true,
    )
    .unwrap()
}

/// Star: center 0, leaves 1..=9 at weight i, value i at each leaf.
fn star_network() -> Network {
    let node_ids: Vec<i64> = (0..10).collect();
    let edges: Vec<(i64, i64)> = (1..10).map(|i| (0, i)).collect();
    let weights: Vec<f64> = (1..10).map(|i| i as f64).collect();
    let mut net = Network::new(&node_ids, &edges, &[weights], true).unwrap();
    let leaf_ids: Vec<i64> = (1..10).collect();
    let values: Vec<f64> = (1..10).map(|i| i as f64).collect();
    net.init_acc_var("v", &leaf_ids, &values).unwrap();
    net
}

#[test]
fn test_line_distance() -> Result<()> {
    let net = line_network();
    assert_eq!(net.distance(0, 3, 0)?, 3.0);
    Ok(())
}

#[test]
fn test_line_range() -> Result<()> {
    let net = line_network();
    let mut result = net.range(&[0], 2.0, 0)?.remove(0);
    result.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(result, vec![(0, 0.0), (1, 1.0), (2, 2.0)]);
    Ok(())
}

#[test]
fn test_line_nearest_poi() -> Result<()> {
    let mut net = line_network();
    net.init_category_poi(10.0, 1, "x", &[3])?;
    let result = net.find_nearest_pois(0, 5.0, 1, "x", 0)?;
    assert_eq!(result, vec![(3.0, 0)]);
    Ok(())
}

#[test]
fn test_star_flat_sum() {
    let net = star_network();
    let scores = net.aggregate_all(5.0, "v", "sum", "flat", 0);
    assert_eq!(scores[0], 15.0);
}

#[test]
fn test_star_linear_sum() {
    let net = star_network();
    let scores = net.aggregate_all(5.0, "v", "sum", "linear", 0);
    assert!((scores[0] - 4.0).abs() < 1e-9, "got {}", scores[0]);
}

#[test]
fn test_star_median() {
    let net = star_network();
    let scores = net.aggregate_all(5.0, "v", "median", "flat", 0);
    assert_eq!(scores[0], 3.0);
}

#[test]
fn test_disconnected_distance_is_infinite() -> Result<()> {
    let net = Network::new(
        &[0, 1, 2, 3],
        &[(0, 1), (2, 3)],
        &[vec![1.0, 1.0]],
        true,
    )?;
    assert_eq!(net.distance(0, 2, 0)?, f64::INFINITY);
    assert!(net.route(0, 2, 0)?.is_empty());
    Ok(())
}

#[test]
fn test_find_all_nearest_pois_grid() -> Result<()> {
    let mut net = line_network();
    net.init_category_poi(10.0, 2, "x", &[0, 3])?;
    let (dists, ids) = net.find_all_nearest_pois(10.0, 2, "x", 0)?;
    assert_eq!(dists.len(), 4);

    // From node 1: POI 0 at distance 1, POI 1 at distance 2.
    assert_eq!(ids[1], vec![0, 1]);
    assert_eq!(dists[1], vec![1.0, 2.0]);

    // One-slot shortfall fills with -1.
    let (dists, ids) = net.find_all_nearest_pois(1.5, 2, "x", 0)?;
    assert_eq!(ids[3], vec![1, -1]);
    assert_eq!(dists[3], vec![0.0, -1.0]);
    Ok(())
}

#[test]
fn test_aggregate_batch_matches_aggregate_all() -> Result<()> {
    let net = star_network();
    let all = net.aggregate_all(5.0, "v", "sum", "exp", 0);
    let batch = net.aggregate_batch(&[0, 3, 7], 5.0, "v", "sum", "exp", 0)?;
    assert_eq!(batch, vec![all[0], all[3], all[7]]);
    Ok(())
}

#[test]
fn test_empty_range_sentinel() {
    // Node 9 is 9.0 away from everything else; radius 0.5 sees only
    // itself, which carries a value -> sum of one item, flat = 9.
    let net = star_network();
    let scores = net.aggregate_all(0.5, "v", "sum", "flat", 0);
    assert_eq!(scores[9], 9.0);

    // A network with no attribute anywhere in range returns -1 via the
    // quantile path.
    let scores = net.aggregate_all(0.5, "v", "median", "flat", 0);
    assert_eq!(scores[0], -1.0);
}

// ---------------------------------------------------------------------------
// Randomized properties against the Dijkstra oracle
// ---------------------------------------------------------------------------

struct RandomGraph {
    n: usize,
    node_ids: Vec<i64>,
    edges: Vec<(i64, i64)>,
    weights: Vec<f64>,
    /// Directed fixed-point edges for the oracle (twoway expanded).
    oracle_edges: Vec<(usize, usize, u32)>,
}

/// Seeded random graph: a random spanning chain keeps most of it
/// connected, extra edges create shortcuts worth contracting. Weights are
/// multiples of 1/1000 so fixed-point scaling is exact.
fn random_graph(seed: u64, n: usize, extra_edges: usize, twoway: bool) -> RandomGraph {
    let mut rng = StdRng::seed_from_u64(seed);
    let node_ids: Vec<i64> = (0..n).map(|i| 1000 + i as i64).collect();

    let mut raw: Vec<(usize, usize, u32)> = Vec::new();
    for v in 1..n {
        let u = rng.gen_range(0..v);
        raw.push((u, v, rng.gen_range(1..=3000)));
    }
    for _ in 0..extra_edges {
        let u = rng.gen_range(0..n);
        let v = rng.gen_range(0..n);
        if u != v {
            raw.push((u, v, rng.gen_range(1..=3000)));
        }
    }

    let edges: Vec<(i64, i64)> = raw
        .iter()
        .map(|&(u, v, _)| (node_ids[u], node_ids[v]))
        .collect();
    let weights: Vec<f64> = raw.iter().map(|&(_, _, w)| w as f64 / 1000.0).collect();

    let mut oracle_edges = Vec::new();
    for &(u, v, w) in &raw {
        oracle_edges.push((u, v, w));
        if twoway {
            oracle_edges.push((v, u, w));
        }
    }

    RandomGraph {
        n,
        node_ids,
        edges,
        weights,
        oracle_edges,
    }
}

#[test]
fn test_ch_distances_match_plain_dijkstra() -> Result<()> {
    for (seed, twoway) in [(7, true), (8, true), (9, false), (10, false)] {
        let g = random_graph(seed, 60, 90, twoway);
        let net = Network::new(&g.node_ids, &g.edges, &[g.weights.clone()], twoway)?;

        let mut rng = StdRng::seed_from_u64(seed ^ 0xdead);
        for _ in 0..40 {
            let s = rng.gen_range(0..g.n);
            let t = rng.gen_range(0..g.n);
            let expected = oracle_dists(g.n, &g.oracle_edges, s)[t];
            let got = net.distance(g.node_ids[s], g.node_ids[t], 0)?;
            match expected {
                Some(d) => assert_eq!(to_fixed(got), d, "seed {seed} pair {s}->{t}"),
                None => assert_eq!(got, f64::INFINITY, "seed {seed} pair {s}->{t}"),
            }
        }
    }
    Ok(())
}

#[test]
fn test_route_endpoints_and_length_are_consistent() -> Result<()> {
    let g = random_graph(21, 40, 60, true);
    let net = Network::new(&g.node_ids, &g.edges, &[g.weights.clone()], true)?;

    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..20 {
        let s = rng.gen_range(0..g.n);
        let t = rng.gen_range(0..g.n);
        let path = net.route(g.node_ids[s], g.node_ids[t], 0)?;
        let dist = net.distance(g.node_ids[s], g.node_ids[t], 0)?;
        if dist.is_infinite() {
            assert!(path.is_empty());
            continue;
        }
        assert_eq!(path.first(), Some(&g.node_ids[s]));
        assert_eq!(path.last(), Some(&g.node_ids[t]));

        // Path edges must exist and their weights telescope to the
        // distance.
        let mut total = 0u32;
        for pair in path.windows(2) {
            let a = (pair[0] - 1000) as usize;
            let b = (pair[1] - 1000) as usize;
            let w = g
                .oracle_edges
                .iter()
                .filter(|&&(u, v, _)| u == a && v == b)
                .map(|&(_, _, w)| w)
                .min()
                .unwrap_or_else(|| panic!("no edge {a}->{b} on returned path"));
            total += w;
        }
        assert_eq!(total, to_fixed(dist));
    }
    Ok(())
}

#[test]
fn test_range_soundness_and_completeness() -> Result<()> {
    let g = random_graph(33, 50, 80, true);
    let net = Network::new(&g.node_ids, &g.edges, &[g.weights.clone()], true)?;
    let radius = 4.0;
    let radius_fixed = 4000u32;

    for s in [0usize, 7, 23, 49] {
        let oracle = oracle_dists(g.n, &g.oracle_edges, s);
        let mut got = net.range(&[g.node_ids[s]], radius, 0)?.remove(0);
        got.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let mut expected: Vec<(i64, u32)> = oracle
            .iter()
            .enumerate()
            .filter_map(|(v, d)| d.filter(|&d| d <= radius_fixed).map(|d| (g.node_ids[v], d)))
            .collect();
        expected.sort_unstable();

        let got_fixed: Vec<(i64, u32)> = got.iter().map(|&(id, d)| (id, to_fixed(d))).collect();
        assert_eq!(got_fixed, expected, "source {s}");
    }
    Ok(())
}

#[test]
fn test_cache_transparency() -> Result<()> {
    let g = random_graph(55, 40, 70, true);
    let mut net = Network::new(&g.node_ids, &g.edges, &[g.weights.clone()], true)?;
    let sources: Vec<i64> = g.node_ids.clone();

    let sort = |mut rows: Vec<Vec<(i64, f64)>>| {
        for row in rows.iter_mut() {
            row.sort_by(|a, b| a.partial_cmp(b).unwrap());
        }
        rows
    };

    let fresh = sort(net.range(&sources, 2.5, 0)?);
    net.precompute_range(4.0);
    assert_eq!(net.cache_radius(), Some(4.0));
    let cached = sort(net.range(&sources, 2.5, 0)?);
    assert_eq!(fresh, cached);

    // A radius above the precomputed one silently bypasses the cache.
    let wide_cached_net = sort(net.range(&sources, 6.0, 0)?);
    let net2 = Network::new(&g.node_ids, &g.edges, &[g.weights.clone()], true)?;
    let wide_direct = sort(net2.range(&sources, 6.0, 0)?);
    assert_eq!(wide_cached_net, wide_direct);

    // Aggregations served from the cache match fresh computation.
    let mut net3 = Network::new(&g.node_ids, &g.edges, &[g.weights.clone()], true)?;
    let attr_nodes: Vec<i64> = g.node_ids.iter().copied().step_by(3).collect();
    let attr_vals: Vec<f64> = attr_nodes.iter().map(|&id| (id % 17) as f64).collect();
    net3.init_acc_var("jobs", &attr_nodes, &attr_vals)?;
    let fresh_scores = net3.aggregate_all(2.5, "jobs", "sum", "linear", 0);
    net3.precompute_range(4.0);
    let cached_scores = net3.aggregate_all(2.5, "jobs", "sum", "linear", 0);
    assert_eq!(fresh_scores, cached_scores);
    Ok(())
}

#[test]
fn test_k_nearest_poi_matches_oracle() -> Result<()> {
    let g = random_graph(77, 50, 80, true);
    let mut net = Network::new(&g.node_ids, &g.edges, &[g.weights.clone()], true)?;

    // POIs on every fifth node, in a scrambled registration order.
    let poi_nodes: Vec<usize> = vec![5, 30, 10, 45, 0, 25];
    let poi_ids: Vec<i64> = poi_nodes.iter().map(|&v| g.node_ids[v]).collect();
    net.init_category_poi(20.0, 8, "stops", &poi_ids)?;

    let radius = 8.0;
    let radius_fixed = 8000u32;
    let k = 3;

    for s in [2usize, 17, 31, 44] {
        let oracle = oracle_dists(g.n, &g.oracle_edges, s);
        let mut expected: Vec<(u32, i32)> = poi_nodes
            .iter()
            .enumerate()
            .filter_map(|(p, &v)| {
                oracle[v]
                    .filter(|&d| d <= radius_fixed)
                    .map(|d| (d, p as i32))
            })
            .collect();
        expected.sort_unstable();
        expected.truncate(k);

        let got: Vec<(u32, i32)> = net
            .find_nearest_pois(g.node_ids[s], radius, k, "stops", 0)?
            .into_iter()
            .map(|(d, p)| (to_fixed(d), p))
            .collect();
        assert_eq!(got, expected, "source {s}");
    }
    Ok(())
}

#[test]
fn test_twoway_symmetry() -> Result<()> {
    let g = random_graph(88, 45, 70, true);
    let net = Network::new(&g.node_ids, &g.edges, &[g.weights.clone()], true)?;

    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..25 {
        let s = g.node_ids[rng.gen_range(0..g.n)];
        let t = g.node_ids[rng.gen_range(0..g.n)];
        assert_eq!(net.distance(s, t, 0)?, net.distance(t, s, 0)?);
    }
    Ok(())
}

#[test]
fn test_multiple_graphs_share_nodes() -> Result<()> {
    let g = random_graph(99, 30, 40, true);
    let slow: Vec<f64> = g.weights.iter().map(|w| w * 2.0).collect();
    let net = Network::new(
        &g.node_ids,
        &g.edges,
        &[g.weights.clone(), slow],
        true,
    )?;
    assert_eq!(net.n_graphs(), 2);

    let free_flow = net.distance(g.node_ids[0], g.node_ids[19], 0)?;
    let congested = net.distance(g.node_ids[0], g.node_ids[19], 1)?;
    assert!((congested - 2.0 * free_flow).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_aggregation_is_deterministic() -> Result<()> {
    let g = random_graph(111, 50, 80, true);
    let mut net = Network::new(&g.node_ids, &g.edges, &[g.weights.clone()], true)?;
    let attr_nodes: Vec<i64> = g.node_ids.iter().copied().step_by(2).collect();
    let attr_vals: Vec<f64> = attr_nodes
        .iter()
        .map(|&id| ((id * 31) % 101) as f64 / 7.0)
        .collect();
    net.init_acc_var("jobs", &attr_nodes, &attr_vals)?;

    let first = net.aggregate_all(5.0, "jobs", "sum", "exp", 0);
    for _ in 0..3 {
        let again = net.aggregate_all(5.0, "jobs", "sum", "exp", 0);
        let identical = first
            .iter()
            .zip(again.iter())
            .all(|(a, b)| a.to_bits() == b.to_bits());
        assert!(identical, "aggregate_all drifted between runs");
    }
    Ok(())
}

#[test]
fn test_contracted_topology_round_trips_through_serde() -> Result<()> {
    let g = random_graph(123, 20, 25, true);

    // The checkpointable pieces (ranks, adjacency, flags, midpoints,
    // scale) must survive a serialize/deserialize cycle.
    use netreach::graph::InputGraph;
    use netreach::{ChGraph, ChTopo, ContractionParams};

    let internal: Vec<(u32, u32)> = g
        .edges
        .iter()
        .map(|&(a, b)| ((a - 1000) as u32, (b - 1000) as u32))
        .collect();
    let input = InputGraph::from_edge_list(g.n, &internal, &g.weights, true)?;
    let built = ChGraph::build(&input, ContractionParams::default());

    let blob = serde_json::to_string(&built.topo)?;
    let restored: ChTopo = serde_json::from_str(&blob)?;
    assert_eq!(restored.rank, built.topo.rank);
    assert_eq!(restored.up_targets, built.topo.up_targets);
    assert_eq!(restored.up_mid, built.topo.up_mid);
    assert_eq!(restored.down_weights, built.topo.down_weights);
    assert_eq!(restored.scale, built.topo.scale);
    Ok(())
}
