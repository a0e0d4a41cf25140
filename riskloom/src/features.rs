// src/features.rs
//
// 33-dimensional per-wallet feature extractor (spec §4.3). The original
// Python extractor this was distilled from could not be recovered, so this
// module follows the specification's feature index map and semantic
// descriptions directly.

use std::collections::{HashMap, HashSet};

use crate::domain::{Address, FeatureVector, Transaction};

const EPSILON: f64 = 1e-9;

/// Extracts the normative 33-slot feature vector for `address` from its
/// transaction list (normal + internal + token, already merged by the
/// caller — this function does not care which kind a transaction came
/// from).
pub fn extract(address: &Address, transactions: &[Transaction]) -> FeatureVector {
    let mut f = FeatureVector::zero();
    if transactions.is_empty() {
        return f;
    }

    let tx_count = transactions.len();
    let mut sent_count = 0u32;
    let mut recv_count = 0u32;
    let mut total_sent = 0.0;
    let mut total_recv = 0.0;
    let mut values = Vec::with_capacity(tx_count);
    let mut sent_values = Vec::new();
    let mut recv_values = Vec::new();
    let mut targets: HashSet<&Address> = HashSet::new();
    let mut sources: HashSet<&Address> = HashSet::new();
    let mut target_counts: HashMap<&Address, u32> = HashMap::new();
    let mut self_transfers = 0u32;
    let mut timestamps = Vec::with_capacity(tx_count);
    let mut gas_prices = Vec::with_capacity(tx_count);
    let mut gas_used_vals = Vec::with_capacity(tx_count);
    let mut contract_calls = 0u32;
    let mut failed = 0u32;
    let mut round_values = 0u32;
    let mut dates: HashSet<String> = HashSet::new();

    for tx in transactions {
        values.push(tx.value_eth);
        timestamps.push(tx.timestamp.timestamp());
        gas_prices.push(tx.gas_price_gwei);
        gas_used_vals.push(tx.gas_used);
        dates.insert(tx.timestamp.format("%Y-%m-%d").to_string());

        let is_sent = &tx.from == address;
        let is_recv = tx.to.as_ref() == Some(address);

        let is_self_transfer = is_sent && is_recv;
        if is_self_transfer {
            self_transfers += 1;
        }
        if is_sent {
            sent_count += 1;
            total_sent += tx.value_eth;
            sent_values.push(tx.value_eth);
            // A self-transfer's `to` is the wallet itself — don't let it
            // count as a counterparty.
            if let Some(to) = &tx.to {
                if !is_self_transfer {
                    targets.insert(to);
                    *target_counts.entry(to).or_insert(0) += 1;
                }
            }
        }
        if is_recv {
            recv_count += 1;
            total_recv += tx.value_eth;
            recv_values.push(tx.value_eth);
            if !is_self_transfer {
                sources.insert(&tx.from);
            }
        }
        if tx.is_contract_call() {
            contract_calls += 1;
        }
        if tx.is_error || tx.receipt_status == Some(0) {
            failed += 1;
        }
        if is_round_value(tx.value_eth) {
            round_values += 1;
        }
    }

    let unique_counterparties = targets.union(&sources).collect::<HashSet<_>>().len();
    let repeated_targets = target_counts.values().filter(|&&c| c >= 3).count();

    timestamps.sort_unstable();
    let gaps: Vec<f64> = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64)
        .collect();
    let burst_ratio = if gaps.is_empty() {
        0.0
    } else {
        gaps.iter().filter(|&&g| g < 300.0).count() as f64 / gaps.len() as f64
    };

    let lifespan_days = if timestamps.len() >= 2 {
        (*timestamps.last().unwrap() - timestamps[0]) as f64 / 86_400.0
    } else {
        0.0
    };

    f.0[0] = tx_count as f64;
    f.0[1] = sent_count as f64;
    f.0[2] = recv_count as f64;
    f.0[3] = total_sent;
    f.0[4] = total_recv;
    f.0[5] = total_sent - total_recv;
    f.0[6] = (total_sent / total_recv.max(EPSILON)).min(100.0);
    f.0[7] = mean(&values);
    f.0[8] = median(&values);
    f.0[9] = std_dev(&values);
    f.0[10] = values.iter().cloned().fold(f64::MIN, f64::max);
    f.0[11] = values.iter().cloned().fold(f64::MAX, f64::min);
    f.0[12] = mean(&sent_values);
    f.0[13] = mean(&recv_values);
    f.0[14] = unique_counterparties as f64;
    f.0[15] = targets.len() as f64;
    f.0[16] = sources.len() as f64;
    f.0[17] = repeated_targets as f64;
    f.0[18] = self_transfers as f64;
    f.0[19] = dates.len() as f64;
    f.0[20] = lifespan_days;
    f.0[21] = mean(&gaps);
    f.0[22] = std_dev(&gaps);
    f.0[23] = if gaps.is_empty() { 0.0 } else { gaps.iter().cloned().fold(f64::MAX, f64::min) };
    f.0[24] = burst_ratio;
    f.0[25] = mean(&gas_prices);
    f.0[26] = std_dev(&gas_prices);
    f.0[27] = mean(&gas_used_vals);
    f.0[28] = contract_calls as f64 / tx_count as f64;
    f.0[29] = failed as f64 / tx_count as f64;
    f.0[30] = round_values as f64 / tx_count as f64;
    f.0[31] = tx_count as f64 / lifespan_days.max(1.0);
    f.0[32] = (total_sent + total_recv) / unique_counterparties.max(1) as f64;

    f.sanitize();
    f
}

/// "Round value" per the glossary: v == floor(v) or 10v == floor(10v).
fn is_round_value(v: f64) -> bool {
    (v - v.floor()).abs() < 1e-9 || ((10.0 * v) - (10.0 * v).floor()).abs() < 1e-9
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

fn std_dev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64).sqrt()
}

fn median(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// The separate 7-feature graph extractor used only by the unsupervised
/// pipeline (§4.12 step 2). Deliberately kept distinct from [`extract`]
/// per the source's two-extractor split (§9).
pub mod graph {
    use super::*;

    pub const GRAPH_FEATURE_COUNT: usize = 7;
    pub const GRAPH_FEATURE_NAMES: [&str; GRAPH_FEATURE_COUNT] = [
        "in_degree",
        "out_degree",
        "total_in_eth",
        "total_out_eth",
        "transaction_count",
        "pass_through_score",
        "avg_time_gap",
    ];

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct GraphFeatures(pub [f64; GRAPH_FEATURE_COUNT]);

    /// `in_edges`/`out_edges` are `(counterparty, value_eth, timestamp_secs)`
    /// triples incident to the wallet in each direction.
    pub fn compute(
        in_edges: &[(Address, f64, i64)],
        out_edges: &[(Address, f64, i64)],
    ) -> GraphFeatures {
        let total_in: f64 = in_edges.iter().map(|(_, v, _)| v).sum();
        let total_out: f64 = out_edges.iter().map(|(_, v, _)| v).sum();

        let mut timestamps: Vec<i64> = in_edges
            .iter()
            .chain(out_edges.iter())
            .map(|(_, _, ts)| *ts)
            .collect();
        timestamps.sort_unstable();
        let avg_gap = if timestamps.len() >= 2 {
            let diffs: Vec<f64> = timestamps.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
            mean(&diffs)
        } else {
            0.0
        };

        let mut gf = GraphFeatures([
            in_edges.len() as f64,
            out_edges.len() as f64,
            total_in,
            total_out,
            (in_edges.len() + out_edges.len()) as f64,
            (total_in - total_out).abs(),
            avg_gap,
        ]);
        for v in gf.0.iter_mut() {
            if !v.is_finite() {
                *v = 0.0;
            }
        }
        gf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn tx(from: &str, to: &str, value: f64, ts: i64) -> Transaction {
        Transaction {
            hash: format!("0x{ts:064x}"),
            block: 1,
            tx_index: 0,
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
            from: Address::parse(from).unwrap(),
            to: Some(Address::parse(to).unwrap()),
            value_eth: value,
            gas_used: 21000.0,
            gas_price_gwei: 20.0,
            input: String::new(),
            is_error: false,
            receipt_status: Some(1),
        }
    }

    const TARGET: &str = "0x0000000000000000000000000000000000000a";
    const OTHER: &str = "0x0000000000000000000000000000000000000b";

    #[test]
    fn empty_history_yields_zero_vector() {
        let addr = Address::parse(TARGET).unwrap();
        let f = extract(&addr, &[]);
        assert_eq!(f.0, [0.0; 33]);
    }

    #[test]
    fn all_entries_finite() {
        let addr = Address::parse(TARGET).unwrap();
        let txns = vec![tx(TARGET, OTHER, 1.0, 1_700_000_000)];
        let f = extract(&addr, &txns);
        assert!(f.0.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn round_value_ratio_detects_integer_values() {
        let addr = Address::parse(TARGET).unwrap();
        let txns: Vec<_> = (0..5)
            .map(|i| tx(TARGET, OTHER, 1.0, 1_700_000_000 + i * 3600))
            .collect();
        let f = extract(&addr, &txns);
        assert_eq!(f.get("round_value_ratio"), 1.0);
    }

    #[test]
    fn flow_ratio_uses_epsilon_floor_when_no_receipts() {
        let addr = Address::parse(TARGET).unwrap();
        let txns = vec![tx(TARGET, OTHER, 2.0, 1_700_000_000)];
        let f = extract(&addr, &txns);
        assert_eq!(f.get("flow_ratio"), 100.0);
    }
}
