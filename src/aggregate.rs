//! Accessibility aggregation: decay-weighted statistics over a range result
//!
//! Takes the `(node, distance)` list a range search produced and an
//! attribute table (list of values per node, colocated features allowed)
//! and reduces to a single score. Quantile-class aggregations collect and
//! sort raw values; moment-class aggregations accumulate decay-weighted
//! sums in one pass.
//!
//! The settled list is sorted by `(distance, node)` before any float
//! accumulation, so results are byte-identical across runs and thread
//! counts.

/// Aggregation kinds. `-1.0` marks an empty result; callers are expected
/// to treat attribute domains as non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Mean,
    Min,
    Pct25,
    Median,
    Pct75,
    Max,
    Std,
    Count,
}

impl Aggregation {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(Self::Sum),
            "mean" => Some(Self::Mean),
            "min" => Some(Self::Min),
            "25pct" => Some(Self::Pct25),
            "median" => Some(Self::Median),
            "75pct" => Some(Self::Pct75),
            "max" => Some(Self::Max),
            "std" => Some(Self::Std),
            "count" => Some(Self::Count),
            _ => None,
        }
    }

    /// The quantile this aggregation selects, if it is quantile-class.
    fn quantile(self) -> Option<f64> {
        match self {
            Self::Min => Some(0.0),
            Self::Pct25 => Some(0.25),
            Self::Median => Some(0.5),
            Self::Pct75 => Some(0.75),
            Self::Max => Some(1.0),
            _ => None,
        }
    }
}

/// Distance-decay kinds weighting an attribute's contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decay {
    Exp,
    Linear,
    Flat,
}

impl Decay {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "exp" => Some(Self::Exp),
            "linear" => Some(Self::Linear),
            "flat" => Some(Self::Flat),
            _ => None,
        }
    }

    /// Weight for a settled node at `dist` given the query `radius`, both
    /// in the same (fixed-point) units.
    #[inline]
    pub fn weight(self, dist: f64, radius: f64) -> f64 {
        match self {
            Self::Exp => (-dist / radius).exp(),
            Self::Linear => (1.0 - dist / radius).max(0.0),
            Self::Flat => 1.0,
        }
    }
}

/// Build a per-node attribute table from parallel node/value lists.
pub fn build_attr_table(n_nodes: usize, nodes: &[u32], values: &[f64]) -> Vec<Vec<f64>> {
    let mut table = vec![Vec::new(); n_nodes];
    for (&node, &value) in nodes.iter().zip(values.iter()) {
        table[node as usize].push(value);
    }
    table
}

/// Reduce one range result against an attribute table.
///
/// `dists` is sorted in place by `(distance, node)`; entries beyond
/// `radius` are skipped (a cached range may carry them). Returns `-1.0`
/// when no node was settled, or when a quantile-class aggregation finds
/// no items in range.
pub fn aggregate(
    dists: &mut [(u32, u32)],
    vars: &[Vec<f64>],
    agg: Aggregation,
    decay: Decay,
    radius: u32,
    vals_buf: &mut Vec<f64>,
) -> f64 {
    if dists.is_empty() {
        return -1.0;
    }
    dists.sort_unstable_by_key(|&(node, dist)| (dist, node));

    if let Some(q) = agg.quantile() {
        return quantile(dists, vars, q, radius, vals_buf);
    }

    // std measures spread of the raw values; decay does not apply.
    let decay = if agg == Aggregation::Std {
        Decay::Flat
    } else {
        decay
    };
    let radius_f = radius as f64;

    let mut count = 0usize;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;

    for &(node, dist) in dists.iter() {
        if dist > radius {
            continue;
        }
        let weight = decay.weight(dist as f64, radius_f);
        for &value in &vars[node as usize] {
            count += 1;
            sum += weight * value;
            sum_sq += value * value;
        }
    }

    match agg {
        Aggregation::Count => count as f64,
        Aggregation::Mean if count > 0 => sum / count as f64,
        Aggregation::Std if count > 0 => {
            let mean = sum / count as f64;
            (sum_sq / count as f64 - mean * mean).max(0.0).sqrt()
        }
        _ => sum,
    }
}

/// Two passes over the settled nodes: count items, then collect into a
/// single buffer for sorting. Quantile index is `floor(q * count)`,
/// clamped to the valid range.
fn quantile(
    dists: &[(u32, u32)],
    vars: &[Vec<f64>],
    q: f64,
    radius: u32,
    vals_buf: &mut Vec<f64>,
) -> f64 {
    vals_buf.clear();
    for &(node, dist) in dists {
        if dist > radius {
            continue;
        }
        vals_buf.extend_from_slice(&vars[node as usize]);
    }
    if vals_buf.is_empty() {
        return -1.0;
    }
    vals_buf.sort_unstable_by(|a, b| a.total_cmp(b));

    let mut index = (vals_buf.len() as f64 * q) as usize;
    if q <= 0.0 {
        index = 0;
    }
    if q >= 1.0 {
        index = vals_buf.len() - 1;
    }
    vals_buf[index.min(vals_buf.len() - 1)]
}
