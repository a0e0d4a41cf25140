// src/detectors/graph_scorer.rs
//
// Graph Scorer (spec §4.6): a 2-layer graph convolutional pass over the
// target's ego-network (target + 1-hop neighbours), producing an embedding
// whose Mahalanobis distance from the neighbourhood centroid becomes an
// anomaly contribution. Grounded on this codebase's ML layer's GCN encoder
// (Xavier-initialised weights, symmetric adjacency normalisation, ReLU
// between layers) — no training loop, a fixed random projection used
// purely as a deterministic embedding function.

use std::collections::HashMap;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::domain::{Address, FeatureVector, FEATURE_COUNT};

const HIDDEN_DIM: usize = 32;
const OUTPUT_DIM: usize = 16;
const SEED: u64 = 42;
const DEGREE_RATIO_LOW: f64 = 0.3;
const DEGREE_RATIO_HIGH: f64 = 3.0;
const COSINE_DENOM_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphScore {
    /// `[0, 100]`, a weighted blend of the Mahalanobis, cosine and degree
    /// anomaly components below.
    pub anomaly_score: f64,
    pub mahalanobis_distance: f64,
    pub cosine_anomaly: f64,
    pub degree_anomaly: bool,
    /// In-degree / out-degree ratio in the ego-network, `None` when the
    /// node has no edges at all.
    pub degree_ratio: Option<f64>,
    pub ego_network_size: usize,
    pub used_l2_fallback: bool,
}

/// `edges` are `(from, to, value_eth)` triples spanning the target's
/// ego-network; `target` must appear as an endpoint of at least one edge
/// for a non-trivial score (otherwise a neutral zero score is returned).
/// `node_features` supplies each node's standardised wallet feature vector
/// (the same 33-dimension vector `features::extract` produces); a node
/// absent from the map — a neighbour the fetch layer couldn't resolve —
/// falls back to an all-zero vector.
pub fn score(
    target: &Address,
    edges: &[(Address, Address, f64)],
    node_features: &HashMap<Address, FeatureVector>,
) -> GraphScore {
    let mut nodes: Vec<Address> = Vec::new();
    let mut index = std::collections::HashMap::new();
    for (a, b, _) in edges {
        for n in [a, b] {
            if !index.contains_key(n) {
                index.insert(n.clone(), nodes.len());
                nodes.push(n.clone());
            }
        }
    }

    let Some(&target_idx) = index.get(target) else {
        return GraphScore {
            anomaly_score: 0.0,
            mahalanobis_distance: 0.0,
            cosine_anomaly: 0.0,
            degree_anomaly: false,
            degree_ratio: None,
            ego_network_size: 0,
            used_l2_fallback: false,
        };
    };

    let n = nodes.len();
    let mut adj = Array2::<f64>::zeros((n, n));
    let mut in_deg = vec![0u32; n];
    let mut out_deg = vec![0u32; n];
    for (a, b, v) in edges {
        let i = index[a];
        let j = index[b];
        let value = v.max(0.0);
        // Undirected, value-weighted adjacency: mirror both directions and
        // accumulate the actual transferred value rather than a flat count.
        adj[[i, j]] += value;
        adj[[j, i]] += value;
        out_deg[i] += 1;
        in_deg[j] += 1;
    }
    adj.mapv_inplace(f64::ln_1p);

    let degree_ratio = if out_deg[target_idx] == 0 {
        None
    } else {
        Some(in_deg[target_idx] as f64 / out_deg[target_idx] as f64)
    };

    let normalized = symmetric_normalize(&adj);

    // Node feature matrix: each row is the node's full standardised wallet
    // feature vector, the same one `features::extract` produces per-wallet
    // upstream — not a handful of degree-derived scalars.
    let mut features = Array2::<f64>::zeros((n, FEATURE_COUNT));
    for (i, node) in nodes.iter().enumerate() {
        let row = node_features.get(node).map(FeatureVector::as_slice);
        if let Some(row) = row {
            for (j, v) in row.iter().enumerate() {
                features[[i, j]] = *v;
            }
        }
    }

    let mut rng = Rng::new(SEED);
    let w1 = xavier(FEATURE_COUNT, HIDDEN_DIM, &mut rng);
    let w2 = xavier(HIDDEN_DIM, OUTPUT_DIM, &mut rng);

    let h1 = relu(&normalized.dot(&features).dot(&w1));
    let h2 = normalized.dot(&h1).dot(&w2);

    let target_embedding = h2.row(target_idx).to_owned();
    let neighbour_rows: Vec<usize> = (0..n).filter(|&i| i != target_idx).collect();

    let (mahalanobis_distance, cosine_anomaly, used_l2_fallback) = if neighbour_rows.is_empty() {
        (0.0, 0.0, false)
    } else {
        let neighbour_matrix = h2.select(ndarray::Axis(0), &neighbour_rows);
        let (distance, used_l2_fallback) = mahalanobis_or_l2(&target_embedding, &neighbour_matrix);
        let centroid = neighbour_matrix.mean_axis(ndarray::Axis(0)).unwrap();
        let cosine_anomaly = 1.0 - cosine_similarity(&target_embedding, &centroid);
        (distance, cosine_anomaly, used_l2_fallback)
    };

    let mean_degree = if n == 0 {
        0.0
    } else {
        (0..n).map(|i| (in_deg[i] + out_deg[i]) as f64).sum::<f64>() / n as f64
    };
    let target_degree = (in_deg[target_idx] + out_deg[target_idx]) as f64;
    let degree_anomaly = mean_degree > 0.0
        && {
            let ratio = target_degree / mean_degree;
            ratio < DEGREE_RATIO_LOW || ratio > DEGREE_RATIO_HIGH
        };

    let anomaly_score = ((mahalanobis_distance / 10.0) * 50.0
        + (cosine_anomaly / 2.0) * 30.0
        + if degree_anomaly { 20.0 } else { 0.0 })
    .clamp(0.0, 100.0);

    GraphScore {
        anomaly_score,
        mahalanobis_distance,
        cosine_anomaly,
        degree_anomaly,
        degree_ratio,
        ego_network_size: n,
        used_l2_fallback,
    }
}

/// Cosine similarity with a denominator floored at [`COSINE_DENOM_FLOOR`]
/// so a zero-norm embedding (an isolated or all-zero node) doesn't divide
/// by zero.
fn cosine_similarity(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    let dot = a.dot(b);
    let norm = (a.dot(a).sqrt() * b.dot(b).sqrt()).max(COSINE_DENOM_FLOOR);
    dot / norm
}

fn relu(m: &Array2<f64>) -> Array2<f64> {
    m.mapv(|v| v.max(0.0))
}

/// `D^-1/2 (A + I) D^-1/2`.
fn symmetric_normalize(adj: &Array2<f64>) -> Array2<f64> {
    let n = adj.nrows();
    let mut a_hat = adj.clone();
    for i in 0..n {
        a_hat[[i, i]] += 1.0;
    }
    let degrees: Array1<f64> = a_hat.sum_axis(ndarray::Axis(1));
    let d_inv_sqrt: Array1<f64> = degrees.mapv(|d| if d > 0.0 { d.powf(-0.5) } else { 0.0 });

    let mut out = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            out[[i, j]] = d_inv_sqrt[i] * a_hat[[i, j]] * d_inv_sqrt[j];
        }
    }
    out
}

fn xavier(fan_in: usize, fan_out: usize, rng: &mut Rng) -> Array2<f64> {
    let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
    Array2::from_shape_fn((fan_in, fan_out), |_| rng.next_uniform(-limit, limit))
}

/// Mahalanobis distance from `point` to the centroid of `others`'
/// rows, covariance regularised by `1e-6 * I`. Falls back to Euclidean
/// distance (from the centroid) when the regularised covariance is still
/// singular (degenerate neighbourhoods, e.g. a single neighbour).
fn mahalanobis_or_l2(point: &Array1<f64>, others: &Array2<f64>) -> (f64, bool) {
    let centroid = others.mean_axis(ndarray::Axis(0)).unwrap();
    let diff = point - &centroid;

    let dim = point.len();
    if others.nrows() < 2 {
        return (diff.dot(&diff).sqrt(), true);
    }

    let mut cov = Array2::<f64>::zeros((dim, dim));
    for row in others.rows() {
        let d = &row.to_owned() - &centroid;
        for i in 0..dim {
            for j in 0..dim {
                cov[[i, j]] += d[i] * d[j];
            }
        }
    }
    let n = others.nrows() as f64;
    cov.mapv_inplace(|v| v / (n - 1.0));
    for i in 0..dim {
        cov[[i, i]] += 1e-6;
    }

    match invert(&cov) {
        Some(inv) => {
            let md2 = diff.dot(&inv.dot(&diff));
            (md2.max(0.0).sqrt(), false)
        }
        None => (diff.dot(&diff).sqrt(), true),
    }
}

/// Gauss-Jordan matrix inverse. Returns `None` on a (near-)singular pivot;
/// no BLAS/LAPACK backend is in the dependency tree, so this is a direct
/// O(n^3) implementation sized for the small (`<= 3x3`, in practice)
/// feature-covariance matrices this module works with.
fn invert(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    let mut aug = Array2::<f64>::zeros((n, 2 * n));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = m[[i, j]];
        }
        aug[[i, n + i]] = 1.0;
    }

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&a, &b| {
            aug[[a, col]].abs().partial_cmp(&aug[[b, col]].abs()).unwrap()
        })?;
        if aug[[pivot_row, col]].abs() < 1e-12 {
            return None;
        }
        if pivot_row != col {
            for k in 0..2 * n {
                aug.swap([col, k], [pivot_row, k]);
            }
        }
        let pivot = aug[[col, col]];
        for k in 0..2 * n {
            aug[[col, k]] /= pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[[row, col]];
            if factor != 0.0 {
                for k in 0..2 * n {
                    aug[[row, k]] -= factor * aug[[col, k]];
                }
            }
        }
    }

    let mut inv = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            inv[[i, j]] = aug[[i, n + j]];
        }
    }
    Some(inv)
}

struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        Rng { state: seed ^ 0x9E3779B97F4A7C15 }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let mut x = self.state;
        x ^= x >> 33;
        x = x.wrapping_mul(0xff51afd7ed558ccd);
        x ^= x >> 33;
        x
    }

    fn next_uniform(&mut self, lo: f64, hi: f64) -> f64 {
        let unit = (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
        lo + unit * (hi - lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{n:040x}")).unwrap()
    }

    fn no_features() -> HashMap<Address, FeatureVector> {
        HashMap::new()
    }

    #[test]
    fn isolated_target_scores_zero() {
        let target = addr(1);
        let edges = vec![(addr(2), addr(3), 1.0)];
        let s = score(&target, &edges, &no_features());
        assert_eq!(s.ego_network_size, 0);
        assert_eq!(s.anomaly_score, 0.0);
    }

    #[test]
    fn single_neighbour_uses_l2_fallback() {
        let target = addr(1);
        let edges = vec![(addr(1), addr(2), 5.0)];
        let s = score(&target, &edges, &no_features());
        assert!(s.used_l2_fallback);
        assert!(s.anomaly_score.is_finite());
    }

    #[test]
    fn degree_ratio_none_with_no_outgoing_edges() {
        let target = addr(1);
        let edges = vec![(addr(2), addr(1), 1.0), (addr(3), addr(1), 2.0)];
        let s = score(&target, &edges, &no_features());
        assert_eq!(s.degree_ratio, None);
    }

    #[test]
    fn richer_ego_network_produces_finite_mahalanobis_score() {
        let target = addr(0);
        let edges = vec![
            (addr(0), addr(1), 1.0),
            (addr(0), addr(2), 2.0),
            (addr(3), addr(0), 1.0),
            (addr(1), addr(2), 0.5),
            (addr(2), addr(3), 0.5),
        ];
        let s = score(&target, &edges, &no_features());
        assert!(s.anomaly_score.is_finite());
        assert!(!s.used_l2_fallback);
    }

    #[test]
    fn node_features_widen_the_embedding_input() {
        let target = addr(0);
        let edges = vec![(addr(0), addr(1), 3.0), (addr(1), addr(0), 1.0)];
        let mut features = HashMap::new();
        features.insert(target.clone(), FeatureVector::zero());
        let mut neighbour = FeatureVector::zero();
        neighbour.0[0] = 42.0;
        features.insert(addr(1), neighbour);
        let s = score(&target, &edges, &features);
        assert!(s.anomaly_score.is_finite());
    }
}
