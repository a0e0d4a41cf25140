// src/engine/orchestrator.rs
//
// Orchestrator (spec §4/§9): the single entry point that fetches a
// wallet's history, runs every detector, and composes the blended
// ml/heuristic score plus sanctions/community modifiers into a
// RiskReport. Grounded on this codebase's event-processing pipeline
// (fetch → score → dispatch in one method per unit of work), adapted
// from a streaming per-event loop to a single async analysis call.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use tracing::warn;

use crate::community::CommunityStore;
use crate::config::{chain_descriptor, Config};
use crate::detectors::{bridge, graph_scorer, heuristics, mev, outlier, sanctions, temporal};
use crate::domain::{
    Address, ChainDescriptor, CounterpartyBreakdown, FeatureVector, GraphLink, GraphNode,
    ReportGraph, RiskLabel, RiskReport, Transaction, FEATURE_NAMES,
};
use crate::errors::RiskError;
use crate::features;
use crate::fetcher::Fetcher;
use crate::label_registry::LabelRegistry;

/// I3/§4.5 blend: `risk_score = 0.7 * ml_raw_score + 0.3 * heuristic_score`.
/// This is the complete score formula — the graph/temporal/MEV/bridge
/// detectors surface their own scores and flags in the report but are
/// never summed into `risk_score`; only sanctions and the community
/// modifier adjust it afterward (I4).
const ML_WEIGHT: f64 = 0.7;
const HEURISTIC_WEIGHT: f64 = 0.3;

const EGO_NETWORK_MAX_NEIGHBOURS: usize = 25;
const GRAPH_TIMELINE_MAX_NODES: usize = 100;

pub struct Orchestrator {
    config: Config,
    fetcher: Fetcher,
    registry: LabelRegistry,
    community: Option<Arc<CommunityStore>>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        fetcher: Fetcher,
        registry: LabelRegistry,
        community: Option<Arc<CommunityStore>>,
    ) -> Self {
        Orchestrator { config, fetcher, registry, community }
    }

    /// Runs the full analysis for `address`. Never returns `Err` for a
    /// degraded upstream fetch — a failed fetch produces empty history and
    /// a "No Data" report, matching §7's boundary error policy.
    pub async fn analyze(&self, address: &Address) -> Result<RiskReport> {
        let chain = chain_descriptor(self.config.chain_id);

        let normal = self.fetch_or_degrade("txlist", || self.fetcher.fetch_transactions(address)).await;
        let internal = self
            .fetch_or_degrade("txlistinternal", || self.fetcher.fetch_internal_transactions(address))
            .await;
        let tokens = self.fetch_or_degrade("tokentx", || self.fetcher.fetch_token_transfers(address)).await;
        let balance = self.fetcher.fetch_balance(address).await.ok();

        let mut all_txs: Vec<Transaction> = Vec::with_capacity(normal.len() + internal.len() + tokens.len());
        all_txs.extend(normal);
        all_txs.extend(internal);
        all_txs.extend(tokens.into_iter().map(|t| t.tx));

        if all_txs.is_empty() {
            return Ok(self.no_data_report(address.clone(), chain, balance));
        }

        let feature_vector = features::extract(address, &all_txs);
        let heuristic_score = heuristics::score(&feature_vector);
        let heuristic_flags = heuristics::flags(&feature_vector, heuristic_score);

        let neighbours = self.fetcher.discover_neighbours(address, &all_txs, EGO_NETWORK_MAX_NEIGHBOURS);
        let mut neighbour_rows = vec![feature_vector.clone()];
        let mut node_features: HashMap<Address, FeatureVector> = HashMap::new();
        node_features.insert(address.clone(), feature_vector.clone());
        for n in &neighbours {
            match self.fetcher.fetch_transactions(n).await {
                Ok(ntx) => {
                    let nf = features::extract(n, &ntx);
                    node_features.insert(n.clone(), nf.clone());
                    neighbour_rows.push(nf);
                }
                Err(e) => warn!(neighbour = n.as_str(), error = %e, "skipping neighbour in ego-network"),
            }
        }
        let outlier_result = outlier::detect(&neighbour_rows);

        let edges: Vec<(Address, Address, f64)> = all_txs
            .iter()
            .filter_map(|tx| tx.to.as_ref().map(|to| (tx.from.clone(), to.clone(), tx.value_eth)))
            .collect();
        let gnn = graph_scorer::score(address, &edges, &node_features);

        let mut block_windows: HashMap<u64, Vec<Transaction>> = HashMap::new();
        for tx in &all_txs {
            block_windows.entry(tx.block).or_default().push(tx.clone());
        }
        let mev_result = mev::analyze(address, &all_txs, &block_windows);

        let bridge_result = bridge::detect(address, &all_txs);
        let sanctions_result = sanctions::detect(address, &all_txs, &self.registry);

        let daily_events = bucket_daily(address, &all_txs);
        let tx_timestamps: Vec<_> = all_txs.iter().map(|t| t.timestamp).collect();
        let temporal_result = temporal::analyze(daily_events, &tx_timestamps);

        let community_risk_modifier = match &self.community {
            Some(store) => store.risk_modifier(address, self.config.community_min_reports),
            None => 0,
        };

        let blended = ML_WEIGHT * outlier_result.raw_score + HEURISTIC_WEIGHT * heuristic_score;
        let composite = blended + sanctions_result.risk_modifier + community_risk_modifier as f64;
        let risk_score = composite.clamp(0.0, 100.0).round() as u32;

        let mut risk_label = RiskLabel::from_score(risk_score);
        if sanctions_result.is_sanctioned {
            risk_label = RiskLabel::Critical;
        }

        // Sanctions flags lead the list — a sanctions hit always surfaces as
        // the first flag in the report, ahead of the heuristic/detector noise.
        let mut flags = sanctions_result.flags.clone();
        flags.extend(heuristic_flags);
        flags.extend(bridge_result.flags.clone());
        flags.extend(mev_result.flags.clone());

        let counterparties = counterparty_breakdown(address, &all_txs, &self.registry);
        let graph = report_graph(address, &all_txs);

        Ok(RiskReport {
            address: address.clone(),
            chain_descriptor: chain,
            risk_score,
            risk_label,
            ml_raw_score: outlier_result.raw_score,
            heuristic_score,
            flags,
            feature_summary: feature_summary(&feature_vector),
            counterparties,
            timeline: temporal_result.daily_buckets.clone(),
            gnn,
            temporal: temporal_result,
            mev: mev_result,
            bridges: bridge_result,
            sanctions: sanctions_result,
            community_risk_modifier,
            graph,
            balance,
            tx_count: all_txs.len() as u32,
        })
    }

    async fn fetch_or_degrade<T, F, Fut>(&self, kind: &str, f: F) -> Vec<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<T>, RiskError>>,
    {
        match f().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(kind, error = %e, "fetch degraded to empty history");
                Vec::new()
            }
        }
    }

    /// §7: "if the core cannot reach the remote API at all, the report
    /// contains `tx_count=0`, `risk_score = sanctions.risk_modifier`
    /// (still applies on direct hits), `risk_label = No Data` (or
    /// `Critical Risk` if sanctioned), and one flag describing the
    /// absence." A direct sanctions hit still fires even with empty
    /// history since the registry lookup is keyed on the address alone.
    fn no_data_report(&self, address: Address, chain: ChainDescriptor, balance: Option<f64>) -> RiskReport {
        let sanctions_result = sanctions::detect(&address, &[], &self.registry);
        let risk_score = sanctions_result.risk_modifier.clamp(0.0, 100.0).round() as u32;
        let risk_label = if sanctions_result.is_sanctioned { RiskLabel::Critical } else { RiskLabel::NoData };

        let mut flags = sanctions_result.flags.clone();
        flags.push("No transactions found on this chain for this address".to_string());

        RiskReport {
            address: address.clone(),
            chain_descriptor: chain,
            risk_score,
            risk_label,
            ml_raw_score: 0.0,
            heuristic_score: 0.0,
            flags,
            feature_summary: feature_summary(&FeatureVector::zero()),
            counterparties: Vec::new(),
            timeline: Vec::new(),
            gnn: graph_scorer::score(&address, &[], &HashMap::new()),
            temporal: temporal::analyze(Vec::new(), &[]),
            mev: mev::analyze(&address, &[], &HashMap::new()),
            bridges: bridge::detect(&address, &[]),
            sanctions: sanctions_result,
            community_risk_modifier: 0,
            graph: ReportGraph { nodes: Vec::new(), links: Vec::new() },
            balance,
            tx_count: 0,
        }
    }
}

fn feature_summary(f: &FeatureVector) -> std::collections::BTreeMap<String, f64> {
    FEATURE_NAMES.iter().zip(f.0.iter()).map(|(name, value)| (name.to_string(), *value)).collect()
}

fn bucket_daily(address: &Address, transactions: &[Transaction]) -> Vec<(NaiveDate, u32, f64, u32, u32, u32)> {
    use std::collections::HashSet;

    struct Acc {
        tx_count: u32,
        volume: f64,
        in_count: u32,
        out_count: u32,
        counterparties: HashSet<Address>,
    }

    let mut by_day: HashMap<NaiveDate, Acc> = HashMap::new();
    for tx in transactions {
        let day = tx.timestamp.date_naive();
        let acc = by_day.entry(day).or_insert_with(|| Acc {
            tx_count: 0,
            volume: 0.0,
            in_count: 0,
            out_count: 0,
            counterparties: HashSet::new(),
        });
        acc.tx_count += 1;
        acc.volume += tx.value_eth;
        if &tx.from == address {
            acc.out_count += 1;
            if let Some(to) = &tx.to {
                acc.counterparties.insert(to.clone());
            }
        } else {
            acc.in_count += 1;
            acc.counterparties.insert(tx.from.clone());
        }
    }

    by_day
        .into_iter()
        .map(|(day, acc)| (day, acc.tx_count, acc.volume, acc.in_count, acc.out_count, acc.counterparties.len() as u32))
        .collect()
}

fn counterparty_breakdown(
    address: &Address,
    transactions: &[Transaction],
    registry: &LabelRegistry,
) -> Vec<CounterpartyBreakdown> {
    let mut totals: HashMap<Address, (f64, u32)> = HashMap::new();
    for tx in transactions {
        let counterparty = if &tx.from == address { tx.to.clone() } else { Some(tx.from.clone()) };
        if let Some(cp) = counterparty {
            let entry = totals.entry(cp).or_insert((0.0, 0));
            entry.0 += tx.value_eth;
            entry.1 += 1;
        }
    }

    let mut out: Vec<CounterpartyBreakdown> = totals
        .into_iter()
        .map(|(address, (total_value_eth, tx_count))| {
            let label = registry.lookup(&address).cloned();
            CounterpartyBreakdown { address, total_value_eth, tx_count, label }
        })
        .collect();
    out.sort_by(|a, b| b.total_value_eth.partial_cmp(&a.total_value_eth).unwrap_or(std::cmp::Ordering::Equal));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::CommunityStore;
    use crate::config::Config;
    use crate::fetcher::Fetcher;
    use crate::label_registry::LabelRegistry;
    use crate::state::cache::Cache;

    /// Every test here points the fetcher at an unreachable loopback port so
    /// every fetch degrades to an empty list (§7's boundary error policy) —
    /// the same trick `concurrency.rs`'s tests use. That exercises exactly
    /// the "no data" path of §8's seed scenarios without standing up a mock
    /// explorer server.
    fn unreachable_orchestrator() -> Orchestrator {
        let config = Config::default();
        let cache = Arc::new(Cache::new(std::env::temp_dir().join("riskloom-orchestrator-test"), 0));
        let fetcher = Fetcher::new(&config, "http://127.0.0.1:0", cache);
        let registry = LabelRegistry::new();
        Orchestrator::new(config, fetcher, registry, None::<Arc<CommunityStore>>)
    }

    #[tokio::test]
    async fn empty_history_no_sanctions_is_no_data() {
        let orchestrator = unreachable_orchestrator();
        let address = Address::parse("0x0000000000000000000000000000000000dead").unwrap();
        let report = orchestrator.analyze(&address).await.unwrap();

        assert_eq!(report.risk_score, 0);
        assert_eq!(report.risk_label, RiskLabel::NoData);
        assert_eq!(report.tx_count, 0);
        assert_eq!(report.flags, vec!["No transactions found on this chain for this address".to_string()]);
    }

    #[tokio::test]
    async fn sanctioned_address_empty_history_is_critical() {
        let orchestrator = unreachable_orchestrator();
        // Lazarus Group, present in the static OFAC table (label_registry.rs).
        let address = Address::parse("0x098b716b8aaf21512996dc57eb0615e2383e2f96").unwrap();
        let report = orchestrator.analyze(&address).await.unwrap();

        assert_eq!(report.risk_score, 40);
        assert_eq!(report.risk_label, RiskLabel::Critical);
        assert_eq!(report.tx_count, 0);
        assert!(report.sanctions.is_sanctioned);
        assert!(!report.flags.is_empty());
        assert_eq!(report.flags[0], "Target address matches a sanctioned-entity label");
    }

    #[test]
    fn risk_label_thresholds_match_spec() {
        assert_eq!(RiskLabel::from_score(0), RiskLabel::Low);
        assert_eq!(RiskLabel::from_score(39), RiskLabel::Low);
        assert_eq!(RiskLabel::from_score(40), RiskLabel::Medium);
        assert_eq!(RiskLabel::from_score(74), RiskLabel::Medium);
        assert_eq!(RiskLabel::from_score(75), RiskLabel::High);
        assert_eq!(RiskLabel::from_score(100), RiskLabel::High);
    }

    #[test]
    fn counterparty_breakdown_sums_value_and_sorts_descending() {
        use chrono::{TimeZone, Utc};

        fn tx(from: &str, to: &str, value: f64) -> Transaction {
            Transaction {
                hash: "0x1".into(),
                block: 1,
                tx_index: 0,
                timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                from: Address::parse(from).unwrap(),
                to: Some(Address::parse(to).unwrap()),
                value_eth: value,
                gas_used: 21_000.0,
                gas_price_gwei: 20.0,
                input: String::new(),
                is_error: false,
                receipt_status: Some(1),
            }
        }

        let target = Address::parse("0x0000000000000000000000000000000000dead").unwrap();
        let big = "0x0000000000000000000000000000000000b1c1";
        let small = "0x0000000000000000000000000000000000531c";
        let txs = vec![tx(target.as_str(), big, 5.0), tx(small, target.as_str(), 1.0)];

        let registry = LabelRegistry::new();
        let breakdown = counterparty_breakdown(&target, &txs, &registry);
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].address.as_str(), big);
        assert!((breakdown[0].total_value_eth - 5.0).abs() < 1e-9);
        assert_eq!(breakdown[1].address.as_str(), small);
    }
}

fn report_graph(address: &Address, transactions: &[Transaction]) -> ReportGraph {
    let mut nodes: Vec<GraphNode> = vec![GraphNode { address: address.clone(), label: None }];
    let mut seen = std::collections::HashSet::new();
    seen.insert(address.clone());

    let mut links = Vec::new();
    for tx in transactions.iter().take(GRAPH_TIMELINE_MAX_NODES) {
        let Some(to) = &tx.to else { continue };
        if seen.insert(tx.from.clone()) {
            nodes.push(GraphNode { address: tx.from.clone(), label: None });
        }
        if seen.insert(to.clone()) {
            nodes.push(GraphNode { address: to.clone(), label: None });
        }
        links.push(GraphLink { source: tx.from.clone(), target: to.clone(), value_eth: tx.value_eth });
    }

    ReportGraph { nodes, links }
}
