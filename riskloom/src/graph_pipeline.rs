// src/graph_pipeline.rs
//
// Unsupervised graph pipeline (spec §4.12): builds a directed multigraph
// over a batch of wallets, extracts the 7-feature graph vector per node,
// runs isolation-based outlier detection over that feature space, induces
// the subgraph of anomalous wallets and clusters it into weakly-connected
// components, scores each cluster, propagates known labels through the
// cluster graph, and emits rule-based explanations per cluster. Grounded
// on `petgraph`'s directed-multigraph support, as this codebase already
// depends on it for parallel-edge-preserving transaction graphs.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Address, EdgeWeight, GraphSubject};
use crate::features::graph::{self, GraphFeatures, GRAPH_FEATURE_COUNT};
use crate::label_registry::LabelRegistry;

const ISOLATION_TREES: usize = 100;
const ISOLATION_SEED: u64 = 42;
const PASS_THROUGH_RATIO_THRESHOLD: f64 = 0.15;
const PASS_THROUGH_WALLET_FRACTION: f64 = 0.40;
const INTERNAL_RATIO_EXPLANATION_THRESHOLD: f64 = 0.5;
const RAPID_CADENCE_SECONDS: f64 = 120.0;
const HUB_DEGREE_THRESHOLD: f64 = 10.0;
const ANOMALOUS_THRESHOLD: f64 = 0.5;
const MALICIOUS_BOOST: f64 = 0.25;
const BENIGN_SUPPRESS: f64 = 0.30;
const PROPAGATION_WEIGHT: f64 = 0.10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterResult {
    pub members: Vec<Address>,
    pub score: f64,
    pub internal_tx_ratio: f64,
    pub explanations: Vec<String>,
    pub predicted_exits: Vec<Address>,
    pub labels_used: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub node_anomaly_scores: HashMap<Address, f64>,
    pub node_is_anomalous: HashMap<Address, bool>,
    pub clusters: Vec<ClusterResult>,
}

/// `edges` is the full multigraph edge list across the batch:
/// `(from, to, value_eth, timestamp)`. Parallel edges between the same
/// pair are preserved — each transaction is its own edge.
pub fn build_graph(edges: &[(Address, Address, f64, DateTime<Utc>)]) -> GraphSubject {
    fn get_or_insert(
        g: &mut GraphSubject,
        index: &mut HashMap<Address, petgraph::graph::NodeIndex>,
        a: &Address,
    ) -> petgraph::graph::NodeIndex {
        if let Some(&i) = index.get(a) {
            return i;
        }
        let i = g.add_node(a.clone());
        index.insert(a.clone(), i);
        i
    }

    let mut g: GraphSubject = GraphSubject::new();
    let mut index: HashMap<Address, petgraph::graph::NodeIndex> = HashMap::new();

    for (from, to, value_eth, timestamp) in edges {
        let fi = get_or_insert(&mut g, &mut index, from);
        let ti = get_or_insert(&mut g, &mut index, to);
        g.add_edge(fi, ti, EdgeWeight { value_eth: *value_eth, timestamp: *timestamp });
    }
    g
}

/// Runs the full pipeline: graph features, isolation scoring, weakly
/// connected component clustering, hybrid label propagation, and
/// rule-based cluster explanation.
pub fn run(graph: &GraphSubject, registry: &LabelRegistry) -> PipelineResult {
    let node_indices: Vec<_> = graph.node_indices().collect();
    if node_indices.is_empty() {
        return PipelineResult {
            node_anomaly_scores: HashMap::new(),
            node_is_anomalous: HashMap::new(),
            clusters: Vec::new(),
        };
    }

    let (in_edges, out_edges) = collect_incidence(graph);

    let addresses: Vec<Address> = node_indices.iter().map(|&i| graph[i].clone()).collect();
    let features: Vec<GraphFeatures> = addresses
        .iter()
        .map(|a| {
            graph::compute(
                in_edges.get(a).map(|v| v.as_slice()).unwrap_or(&[]),
                out_edges.get(a).map(|v| v.as_slice()).unwrap_or(&[]),
            )
        })
        .collect();

    let raw_scores = isolation_anomaly_scores(&features);
    let mut normalized: HashMap<Address, f64> = addresses
        .iter()
        .cloned()
        .zip(raw_scores.iter().map(|s| s / 100.0))
        .collect();

    // §4.12 step 3: threshold via the model's own anomaly label, before any
    // hybrid adjustment. Step 4 then induces the subgraph of exactly those
    // wallets and clusters only it — matching
    // `cluster_analysis.py::find_anomalous_clusters`'s
    // `subgraph = G.subgraph(anomalous_wallets).copy()`, not the full batch
    // graph.
    let anomalous: HashSet<Address> =
        normalized.iter().filter(|(_, v)| **v > ANOMALOUS_THRESHOLD).map(|(a, _)| a.clone()).collect();
    let components = weakly_connected_components(graph, &anomalous);

    apply_hybrid_labels(&mut normalized, &components, registry, &in_edges, &out_edges);

    let node_anomaly_scores: HashMap<Address, f64> = normalized.iter().map(|(a, v)| (a.clone(), (v * 100.0).clamp(0.0, 100.0))).collect();
    let node_is_anomalous: HashMap<Address, bool> = addresses.iter().map(|a| (a.clone(), anomalous.contains(a))).collect();

    let feature_by_addr: HashMap<Address, GraphFeatures> = addresses.iter().cloned().zip(features.iter().cloned()).collect();

    let clusters = components
        .into_iter()
        .map(|members| score_cluster(&members, graph, &node_anomaly_scores, &feature_by_addr, registry, &out_edges))
        .collect();

    PipelineResult { node_anomaly_scores, node_is_anomalous, clusters }
}

type Incidence = HashMap<Address, Vec<(Address, f64, i64)>>;

fn collect_incidence(graph: &GraphSubject) -> (Incidence, Incidence) {
    let mut in_edges: Incidence = HashMap::new();
    let mut out_edges: Incidence = HashMap::new();
    for edge in graph.edge_indices() {
        let (from_idx, to_idx) = graph.edge_endpoints(edge).unwrap();
        let weight = graph.edge_weight(edge).unwrap();
        let from = graph[from_idx].clone();
        let to = graph[to_idx].clone();
        out_edges.entry(from.clone()).or_default().push((to.clone(), weight.value_eth, weight.timestamp.timestamp()));
        in_edges.entry(to).or_default().push((from, weight.value_eth, weight.timestamp.timestamp()));
    }
    (in_edges, out_edges)
}

/// Weakly connected components of the subgraph induced by `include`, via
/// union-find over the directed edge set treated as undirected —
/// clustering by "who transacted with whom", direction doesn't matter.
/// Nodes outside `include` and edges touching them are ignored entirely;
/// an anomalous node with no anomalous neighbour still yields a
/// singleton component.
fn weakly_connected_components(graph: &GraphSubject, include: &HashSet<Address>) -> Vec<Vec<Address>> {
    let node_indices: Vec<_> = graph.node_indices().filter(|&i| include.contains(&graph[i])).collect();
    let mut parent: HashMap<petgraph::graph::NodeIndex, petgraph::graph::NodeIndex> =
        node_indices.iter().map(|&i| (i, i)).collect();

    fn find(parent: &mut HashMap<petgraph::graph::NodeIndex, petgraph::graph::NodeIndex>, x: petgraph::graph::NodeIndex) -> petgraph::graph::NodeIndex {
        let p = parent[&x];
        if p != x {
            let root = find(parent, p);
            parent.insert(x, root);
            root
        } else {
            x
        }
    }

    for edge in graph.edge_indices() {
        let (a, b) = graph.edge_endpoints(edge).unwrap();
        if !parent.contains_key(&a) || !parent.contains_key(&b) {
            continue;
        }
        let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
        if ra != rb {
            parent.insert(ra, rb);
        }
    }

    let mut groups: HashMap<petgraph::graph::NodeIndex, Vec<Address>> = HashMap::new();
    for &i in &node_indices {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(graph[i].clone());
    }
    groups.into_values().collect()
}

/// §4.12 hybrid adjustment: a cluster member matching a known-malicious
/// label boosts every member's normalized anomaly score by
/// `0.25 * confidence`; a known-benign label suppresses it by
/// `0.30 * confidence`. Unlabelled wallets with nonzero touched volume
/// additionally get a one-hop propagation term proportional to the share
/// of their touched volume that flows to/from a malicious neighbour.
fn apply_hybrid_labels(
    scores: &mut HashMap<Address, f64>,
    components: &[Vec<Address>],
    registry: &LabelRegistry,
    in_edges: &Incidence,
    out_edges: &Incidence,
) {
    for members in components {
        let mut boost = 0.0_f64;
        let mut suppress = 0.0_f64;
        for member in members {
            if let Some(label) = registry.lookup(member) {
                if is_malicious_category(label.category) {
                    boost = boost.max(MALICIOUS_BOOST * label.confidence as f64);
                } else if is_benign_category(label.category) {
                    suppress = suppress.max(BENIGN_SUPPRESS * label.confidence as f64);
                }
            }
        }
        if boost == 0.0 && suppress == 0.0 {
            continue;
        }
        for member in members {
            if let Some(v) = scores.get_mut(member) {
                *v = (*v + boost - suppress).clamp(0.0, 1.0);
            }
        }
    }

    for members in components {
        for member in members {
            if registry.lookup(member).is_some() {
                continue;
            }
            let empty = Vec::new();
            let touched: Vec<&(Address, f64, i64)> = in_edges
                .get(member)
                .unwrap_or(&empty)
                .iter()
                .chain(out_edges.get(member).unwrap_or(&empty).iter())
                .collect();
            let total_volume: f64 = touched.iter().map(|(_, v, _)| v).sum();
            if total_volume <= 0.0 {
                continue;
            }
            let malicious_volume: f64 = touched
                .iter()
                .filter(|(cp, _, _)| {
                    registry.lookup(cp).map(|l| is_malicious_category(l.category)).unwrap_or(false)
                })
                .map(|(_, v, _)| v)
                .sum();
            if malicious_volume <= 0.0 {
                continue;
            }
            if let Some(v) = scores.get_mut(member) {
                *v = (*v + PROPAGATION_WEIGHT * (malicious_volume / total_volume)).clamp(0.0, 1.0);
            }
        }
    }
}

fn is_malicious_category(category: crate::domain::LabelCategory) -> bool {
    use crate::domain::LabelCategory::*;
    matches!(category, Sanctioned | Scam | MevBot)
}

fn is_benign_category(category: crate::domain::LabelCategory) -> bool {
    use crate::domain::LabelCategory::*;
    matches!(category, Exchange | Stablecoin)
}

fn score_cluster(
    members: &[Address],
    graph: &GraphSubject,
    node_anomaly_scores: &HashMap<Address, f64>,
    feature_by_addr: &HashMap<Address, GraphFeatures>,
    registry: &LabelRegistry,
    out_edges: &Incidence,
) -> ClusterResult {
    let member_set: HashSet<&Address> = members.iter().collect();

    let mean_anomaly = members.iter().filter_map(|m| node_anomaly_scores.get(m)).sum::<f64>() / members.len().max(1) as f64;

    let mut internal_edges = 0u32;
    let mut total_edges_touching = 0u32;
    for edge in graph.edge_indices() {
        let (a, b) = graph.edge_endpoints(edge).unwrap();
        let (addr_a, addr_b) = (&graph[a], &graph[b]);
        let a_in = member_set.contains(addr_a);
        let b_in = member_set.contains(addr_b);
        if !a_in && !b_in {
            continue;
        }
        total_edges_touching += 1;
        if a_in && b_in {
            internal_edges += 1;
        }
    }
    let external_edges = total_edges_touching.saturating_sub(internal_edges);
    let internal_tx_ratio = internal_edges as f64 / external_edges.max(1) as f64;

    let size_component = (members.len().min(20) as f64 / 20.0) * 100.0;
    let score = (0.40 * mean_anomaly + 0.35 * internal_tx_ratio.min(1.0) * 100.0 + 0.25 * size_component).clamp(0.0, 100.0);

    let mut explanations = Vec::new();
    if internal_tx_ratio >= INTERNAL_RATIO_EXPLANATION_THRESHOLD {
        explanations.push("High ratio of internal-to-external transaction volume".to_string());
    }

    let avg_gaps: Vec<f64> = members
        .iter()
        .filter_map(|m| feature_by_addr.get(m))
        .map(|f| f.0[graph::GRAPH_FEATURE_NAMES.iter().position(|&n| n == "avg_time_gap").unwrap()])
        .filter(|&g| g > 0.0)
        .collect();
    let mean_gap = if avg_gaps.is_empty() { f64::INFINITY } else { avg_gaps.iter().sum::<f64>() / avg_gaps.len() as f64 };
    if mean_gap < RAPID_CADENCE_SECONDS {
        explanations.push("Rapid internal transaction cadence across cluster members".to_string());
    }

    let pass_through_fraction = members
        .iter()
        .filter_map(|m| feature_by_addr.get(m))
        .filter(|f| {
            let volume = f.0[2] + f.0[3];
            volume > 0.0 && f.0[5] / volume <= PASS_THROUGH_RATIO_THRESHOLD
        })
        .count() as f64
        / members.len().max(1) as f64;
    if pass_through_fraction >= PASS_THROUGH_WALLET_FRACTION {
        explanations.push("Pass-through wallet pattern consistent with layering".to_string());
    }

    let max_degree = members
        .iter()
        .filter_map(|m| feature_by_addr.get(m))
        .map(|f| f.0[0] + f.0[1])
        .fold(0.0_f64, f64::max);
    if max_degree >= HUB_DEGREE_THRESHOLD {
        explanations.push("Hub wallet with high connectivity present in cluster".to_string());
    }

    if explanations.is_empty() {
        explanations.push("No significant cluster-level anomalies detected".to_string());
    }

    let predicted_exits: Vec<Address> = members
        .iter()
        .filter(|m| {
            let external_out = out_edges.get(*m).map(|v| v.iter().filter(|(cp, _, _)| !member_set.contains(cp)).count()).unwrap_or(0);
            let internal_out = out_edges.get(*m).map(|v| v.iter().filter(|(cp, _, _)| member_set.contains(cp)).count()).unwrap_or(0);
            external_out > internal_out && external_out >= 2
        })
        .cloned()
        .collect();

    let mut labels_used: Vec<String> = members
        .iter()
        .filter_map(|m| registry.lookup(m))
        .map(|l| l.label.clone())
        .collect();
    labels_used.sort();
    labels_used.dedup();

    ClusterResult {
        members: members.to_vec(),
        score,
        internal_tx_ratio,
        explanations,
        predicted_exits,
        labels_used,
    }
}

/// A compact isolation forest over the 7-dimensional graph feature space,
/// distinct from the wallet-feature outlier detector because the
/// dimensionality and the population (nodes in a batch graph, not a
/// single wallet's neighbours) differ.
fn isolation_anomaly_scores(features: &[GraphFeatures]) -> Vec<f64> {
    if features.is_empty() {
        return Vec::new();
    }
    let rows: Vec<[f64; GRAPH_FEATURE_COUNT]> = features.iter().map(|f| f.0).collect();
    let scaled = robust_scale(&rows);

    let subsample = scaled.len().min(128);
    let forest = build_forest(&scaled, ISOLATION_TREES, subsample, ISOLATION_SEED);

    let raw: Vec<f64> = scaled.iter().map(|r| forest.anomaly_score(r)).collect();
    let min = raw.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = (max - min).max(1e-9);
    raw.iter().map(|&r| ((1.0 - (r - min) / range) * 100.0).clamp(0.0, 100.0)).collect()
}

fn robust_scale(rows: &[[f64; GRAPH_FEATURE_COUNT]]) -> Vec<[f64; GRAPH_FEATURE_COUNT]> {
    let mut out = rows.to_vec();
    for j in 0..GRAPH_FEATURE_COUNT {
        let col: Vec<f64> = rows.iter().map(|r| r[j]).collect();
        let med = median(&col);
        let mad = median(&col.iter().map(|v| (v - med).abs()).collect::<Vec<_>>());
        let scale = mad.max(0.01);
        for (i, row) in out.iter_mut().enumerate() {
            row[j] = (rows[i][j] - med) / scale;
        }
    }
    out
}

fn median(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let mut v = xs.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = v.len() / 2;
    if v.len() % 2 == 0 { (v[mid - 1] + v[mid]) / 2.0 } else { v[mid] }
}

struct GraphIsolationTree {
    feature: Option<usize>,
    split: f64,
    left: Option<Box<GraphIsolationTree>>,
    right: Option<Box<GraphIsolationTree>>,
    size: usize,
    depth: usize,
}

impl GraphIsolationTree {
    fn build(rows: &[[f64; GRAPH_FEATURE_COUNT]], depth: usize, max_depth: usize, rng: &mut Lcg) -> Self {
        if rows.len() <= 1 || depth >= max_depth {
            return GraphIsolationTree { feature: None, split: 0.0, left: None, right: None, size: rows.len(), depth };
        }
        let feature = rng.next_usize(GRAPH_FEATURE_COUNT);
        let vals: Vec<f64> = rows.iter().map(|r| r[feature]).collect();
        let min = vals.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if (max - min).abs() < 1e-12 {
            return GraphIsolationTree { feature: None, split: 0.0, left: None, right: None, size: rows.len(), depth };
        }
        let split = min + rng.next_unit() * (max - min);
        let (left, right): (Vec<_>, Vec<_>) = rows.iter().cloned().partition(|r| r[feature] < split);
        if left.is_empty() || right.is_empty() {
            return GraphIsolationTree { feature: None, split: 0.0, left: None, right: None, size: rows.len(), depth };
        }
        GraphIsolationTree {
            feature: Some(feature),
            split,
            left: Some(Box::new(Self::build(&left, depth + 1, max_depth, rng))),
            right: Some(Box::new(Self::build(&right, depth + 1, max_depth, rng))),
            size: rows.len(),
            depth,
        }
    }

    fn path_length(&self, row: &[f64; GRAPH_FEATURE_COUNT]) -> f64 {
        match self.feature {
            None => self.depth as f64 + average_path_length(self.size),
            Some(f) => {
                if row[f] < self.split {
                    self.left.as_ref().unwrap().path_length(row)
                } else {
                    self.right.as_ref().unwrap().path_length(row)
                }
            }
        }
    }
}

fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + 0.5772156649) - 2.0 * (n - 1.0) / n
}

struct GraphIsolationForest {
    trees: Vec<GraphIsolationTree>,
    subsample: usize,
}

impl GraphIsolationForest {
    fn anomaly_score(&self, row: &[f64; GRAPH_FEATURE_COUNT]) -> f64 {
        let avg_path = self.trees.iter().map(|t| t.path_length(row)).sum::<f64>() / self.trees.len() as f64;
        let c = average_path_length(self.subsample).max(1e-9);
        2f64.powf(-avg_path / c)
    }
}

fn build_forest(rows: &[[f64; GRAPH_FEATURE_COUNT]], n_trees: usize, subsample: usize, seed: u64) -> GraphIsolationForest {
    let mut rng = Lcg::new(seed);
    let subsample = subsample.min(rows.len()).max(1);
    let max_depth = (subsample.max(2) as f64).log2().ceil() as usize + 8;
    let mut trees = Vec::with_capacity(n_trees);
    for _ in 0..n_trees {
        let mut idx: Vec<usize> = (0..rows.len()).collect();
        for i in (1..idx.len()).rev() {
            let j = rng.next_usize(i + 1);
            idx.swap(i, j);
        }
        idx.truncate(subsample);
        let sample: Vec<[f64; GRAPH_FEATURE_COUNT]> = idx.iter().map(|&i| rows[i]).collect();
        trees.push(GraphIsolationTree::build(&sample, 0, max_depth, &mut rng));
    }
    GraphIsolationForest { trees, subsample }
}

struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Lcg { state: seed ^ 0x9E3779B97F4A7C15 }
    }
    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let mut x = self.state;
        x ^= x >> 33;
        x = x.wrapping_mul(0xff51afd7ed558ccd);
        x ^= x >> 33;
        x
    }
    fn next_unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
    fn next_usize(&mut self, bound: usize) -> usize {
        if bound == 0 { 0 } else { (self.next_u64() as usize) % bound }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{n:040x}")).unwrap()
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn empty_graph_produces_empty_result() {
        let g = build_graph(&[]);
        let registry = LabelRegistry::new();
        let result = run(&g, &registry);
        assert!(result.clusters.is_empty());
    }

    #[test]
    fn clustering_is_induced_over_anomalous_nodes_only() {
        // A 3-node chain 1->2->3, but only 1 and 3 are "anomalous". Since
        // node 2 (the only bridge between them) is excluded from the
        // induced subgraph, 1 and 3 must NOT merge into one cluster even
        // though they're weakly connected in the full graph.
        let edges = vec![(addr(1), addr(2), 1.0, ts(0)), (addr(2), addr(3), 1.0, ts(10))];
        let g = build_graph(&edges);
        let anomalous: HashSet<Address> = [addr(1), addr(3)].into_iter().collect();
        let components = weakly_connected_components(&g, &anomalous);

        assert_eq!(components.len(), 2);
        for c in &components {
            assert_eq!(c.len(), 1);
            assert!(c[0] == addr(1) || c[0] == addr(3));
        }
    }

    #[test]
    fn anomalous_neighbours_still_cluster_together() {
        let edges = vec![(addr(1), addr(2), 1.0, ts(0)), (addr(2), addr(3), 1.0, ts(10))];
        let g = build_graph(&edges);
        let anomalous: HashSet<Address> = [addr(1), addr(2), addr(3)].into_iter().collect();
        let components = weakly_connected_components(&g, &anomalous);

        assert_eq!(components.len(), 1);
        assert_eq!(components[0].len(), 3);
    }

    #[test]
    fn two_disconnected_pairs_form_two_clusters() {
        let edges = vec![
            (addr(1), addr(2), 1.0, ts(0)),
            (addr(3), addr(4), 1.0, ts(10)),
        ];
        let g = build_graph(&edges);
        let registry = LabelRegistry::new();
        let result = run(&g, &registry);
        assert_eq!(result.clusters.len(), 2);
        for c in &result.clusters {
            assert_eq!(c.members.len(), 2);
        }
    }

    #[test]
    fn tight_wash_trading_ring_scores_high_internal_ratio() {
        let edges = vec![
            (addr(1), addr(2), 1.0, ts(0)),
            (addr(2), addr(3), 1.0, ts(30)),
            (addr(3), addr(1), 1.0, ts(60)),
            (addr(1), addr(2), 0.9, ts(90)),
            (addr(2), addr(3), 0.9, ts(120)),
            (addr(3), addr(1), 0.9, ts(150)),
        ];
        let g = build_graph(&edges);
        let registry = LabelRegistry::new();
        let result = run(&g, &registry);
        assert_eq!(result.clusters.len(), 1);
        assert!(result.clusters[0].internal_tx_ratio > 0.0);
    }

    #[test]
    fn parallel_edges_are_preserved() {
        let edges = vec![
            (addr(1), addr(2), 1.0, ts(0)),
            (addr(1), addr(2), 2.0, ts(10)),
        ];
        let g = build_graph(&edges);
        assert_eq!(g.edge_count(), 2);
    }
}
