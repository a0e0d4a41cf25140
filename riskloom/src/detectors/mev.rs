// src/detectors/mev.rs
//
// MEV Detector (spec §4.8): sandwich/frontrun/arbitrage heuristics over a
// same-block transaction window, a DEX-router registry backed `dex_heavy`
// signal, a gas-price coefficient-of-variation outlier check, and a
// known-bot registry. Grounded on
// original_source/backend/ml/mev_detector.py.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::{Address, Transaction};

const SANDWICH_MIN_INDEX_GAP: u32 = 2;
const FRONTRUN_GAS_PREMIUM_MIN: f64 = 1.1;
const ARBITRAGE_WINDOW_SECONDS: i64 = 60;
const ARBITRAGE_MIN_CALLS: usize = 3;
const ARBITRAGE_BOT_MIN_SEQUENCES: u32 = 3;
const GAS_CV_THRESHOLD: f64 = 1.0;
const GAS_OUTLIER_MULTIPLE: f64 = 5.0;
const EXTREME_GAS_MULTIPLE: f64 = 3.0;
const DEX_HEAVY_MIN_CALLS: u32 = 5;
const DEX_HEAVY_FRACTION: f64 = 0.5;
const BOT_CLASSIFICATION_THRESHOLD: f64 = 40.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandwichMatch {
    pub front_index: u32,
    pub back_index: u32,
    pub contract: String,
    pub victims_between: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontrunMatch {
    pub tx_hash: String,
    pub premium_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MevResult {
    pub mev_score: f64,
    pub sandwiches: Vec<SandwichMatch>,
    pub frontruns: Vec<FrontrunMatch>,
    pub arbitrage_count: u32,
    pub gas_outlier: bool,
    pub extreme_gas_txns: u32,
    pub dex_heavy: bool,
    pub known_bot_interactions: u32,
    pub is_known_bot: bool,
    pub classified_as_bot: bool,
    pub flags: Vec<String>,
}

/// `target`'s own transactions plus the full same-block transaction set
/// each of them belongs to — a single wallet's history in isolation can't
/// reveal sandwich/frontrun patterns, which need the surrounding block.
pub fn analyze(target: &Address, target_txs: &[Transaction], block_windows: &HashMap<u64, Vec<Transaction>>) -> MevResult {
    let is_known_bot = KNOWN_MEV_BOTS.iter().any(|b| *b == target.as_str());

    let mut sandwiches = Vec::new();
    let mut frontruns = Vec::new();
    let mut known_bot_interactions = 0u32;
    let mut seen_bot_counterparties: HashSet<&str> = HashSet::new();

    for tx in target_txs {
        if let Some(to) = &tx.to {
            if to != target && KNOWN_MEV_BOTS.contains(&to.as_str()) && seen_bot_counterparties.insert(to.as_str()) {
                known_bot_interactions += 1;
            }
        }
        if tx.from != *target && KNOWN_MEV_BOTS.contains(&tx.from.as_str()) && seen_bot_counterparties.insert(tx.from.as_str()) {
            known_bot_interactions += 1;
        }

        let Some(block_txs) = block_windows.get(&tx.block) else { continue };
        if block_txs.len() < 2 {
            continue;
        }
        let mut sorted = block_txs.clone();
        sorted.sort_by_key(|t| t.tx_index);

        sandwiches.extend(find_sandwiches(target, &sorted));
        frontruns.extend(find_frontruns(target, tx, &sorted));
    }
    sandwiches.sort_by_key(|s| s.front_index);
    sandwiches.dedup_by(|a, b| a.front_index == b.front_index && a.back_index == b.back_index && a.contract == b.contract);
    frontruns.dedup_by(|a, b| a.tx_hash == b.tx_hash);

    let arbitrage_count = count_arbitrage_windows(target, target_txs);

    let dex_calls: u32 = target_txs
        .iter()
        .filter(|t| t.to.as_ref().map(|a| is_dex_router(a)).unwrap_or(false))
        .count() as u32;
    let dex_heavy = target_txs.len() > 0
        && dex_calls as f64 > target_txs.len() as f64 * DEX_HEAVY_FRACTION
        && dex_calls >= DEX_HEAVY_MIN_CALLS;

    let (gas_outlier, extreme_gas_txns) = gas_price_outliers(target_txs);

    let mut flags = Vec::new();
    if is_known_bot {
        flags.push("Address matches known MEV bot registry".to_string());
    }
    if !sandwiches.is_empty() {
        flags.push(format!("{} sandwich-attack pattern(s) detected", sandwiches.len()));
    }
    if !frontruns.is_empty() {
        flags.push(format!("{} frontrunning pattern(s) detected", frontruns.len()));
    }
    if arbitrage_count > 0 {
        flags.push(format!("{arbitrage_count} windowed arbitrage run(s) detected"));
    }
    if dex_heavy {
        flags.push(format!("{dex_calls} of {} transactions are DEX router calls", target_txs.len()));
    }
    if gas_outlier {
        flags.push("Gas price distribution shows outlier behaviour consistent with priority-gas bidding".to_string());
    }
    if known_bot_interactions > 0 {
        flags.push(format!("{known_bot_interactions} direct interaction(s) with known MEV bot addresses"));
    }

    let mut mev_score = 0.0;
    mev_score += (sandwiches.len() as f64 * 15.0).min(35.0);
    mev_score += (frontruns.len() as f64 * 10.0).min(25.0);
    if dex_heavy {
        mev_score += 15.0;
    }
    mev_score += (known_bot_interactions as f64 * 5.0).min(15.0);
    if gas_outlier {
        mev_score += 10.0;
    }
    // Ground truth only classifies the target as an arb bot (and awards the
    // bonus) once it's seen 3+ separate windowed sequences, not merely one.
    if arbitrage_count >= ARBITRAGE_BOT_MIN_SEQUENCES {
        mev_score += 20.0;
    }
    let mev_score = mev_score.min(100.0);

    let classified_as_bot = is_known_bot || mev_score >= BOT_CLASSIFICATION_THRESHOLD;

    MevResult {
        mev_score,
        sandwiches,
        frontruns,
        arbitrage_count,
        gas_outlier,
        extreme_gas_txns,
        dex_heavy,
        known_bot_interactions,
        is_known_bot,
        classified_as_bot,
        flags,
    }
}

/// A sandwich is a pair of `target`'s own transactions to the same
/// contract within a block, separated by at least [`SANDWICH_MIN_INDEX_GAP`]
/// positions, with at least one other sender's transaction to that same
/// contract landing strictly between them (the victim being squeezed).
fn find_sandwiches(target: &Address, sorted_block: &[Transaction]) -> Vec<SandwichMatch> {
    let mut own_hits: HashMap<String, Vec<usize>> = HashMap::new();
    for (pos, tx) in sorted_block.iter().enumerate() {
        if &tx.from == target {
            if let Some(to) = &tx.to {
                own_hits.entry(to.as_str().to_string()).or_default().push(pos);
            }
        }
    }

    let mut out = Vec::new();
    for (contract, positions) in own_hits {
        for window in positions.windows(2) {
            let (front_pos, back_pos) = (window[0], window[1]);
            if (back_pos - front_pos) as u32 + 0 < SANDWICH_MIN_INDEX_GAP {
                continue;
            }
            let victims = sorted_block[front_pos + 1..back_pos]
                .iter()
                .filter(|t| t.to.as_ref().map(|a| a.as_str() == contract).unwrap_or(false) && t.from != *target)
                .count();
            if victims == 0 {
                continue;
            }
            out.push(SandwichMatch {
                front_index: sorted_block[front_pos].tx_index,
                back_index: sorted_block[back_pos].tx_index,
                contract: contract.clone(),
                victims_between: victims as u32,
            });
        }
    }
    out
}

/// A frontrun occurs when an earlier transaction to the same contract as
/// `tx`, sent by someone other than `target`, carries a materially higher
/// gas price — the signature of an attacker jumping the priority queue
/// ahead of `target`'s pending transaction.
fn find_frontruns(target: &Address, tx: &Transaction, sorted_block: &[Transaction]) -> Vec<FrontrunMatch> {
    let pos = sorted_block.iter().position(|t| t.hash == tx.hash);
    let Some(pos) = pos else { return Vec::new() };

    sorted_block[..pos]
        .iter()
        .filter(|earlier| {
            earlier.from != *target
                && earlier.to == tx.to
                && earlier.gas_price_gwei > tx.gas_price_gwei * FRONTRUN_GAS_PREMIUM_MIN
        })
        .map(|earlier| {
            let premium = (earlier.gas_price_gwei / tx.gas_price_gwei.max(0.01) - 1.0) * 100.0;
            FrontrunMatch {
                tx_hash: tx.hash.clone(),
                premium_pct: (premium * 10.0).round() / 10.0,
            }
        })
        .collect()
}

/// Non-overlapping 60-second windows of 3+ consecutive DEX-router calls by
/// `target`, sorted by timestamp. The scan advances past all three
/// transactions once a window qualifies, so a single burst of calls can't
/// be counted as more than one arbitrage run.
fn count_arbitrage_windows(target: &Address, target_txs: &[Transaction]) -> u32 {
    let mut calls: Vec<&Transaction> = target_txs
        .iter()
        .filter(|t| t.from == *target && t.to.as_ref().map(|a| is_dex_router(a)).unwrap_or(false))
        .collect();
    calls.sort_by_key(|t| t.timestamp);

    let mut count = 0u32;
    let mut i = 0;
    while i + ARBITRAGE_MIN_CALLS <= calls.len() {
        let span = calls[i + ARBITRAGE_MIN_CALLS - 1].timestamp - calls[i].timestamp;
        if span.num_seconds() <= ARBITRAGE_WINDOW_SECONDS {
            count += 1;
            i += ARBITRAGE_MIN_CALLS;
        } else {
            i += 1;
        }
    }
    count
}

/// Coefficient of variation over `target`'s own gas prices; `gas_outlier`
/// is true when that CV exceeds [`GAS_CV_THRESHOLD`] or any single
/// transaction pays more than [`GAS_OUTLIER_MULTIPLE`]x the mean.
/// `extreme_gas_txns` separately counts transactions over
/// [`EXTREME_GAS_MULTIPLE`]x the mean, a looser bar used for reporting.
fn gas_price_outliers(target_txs: &[Transaction]) -> (bool, u32) {
    if target_txs.is_empty() {
        return (false, 0);
    }
    let prices: Vec<f64> = target_txs.iter().map(|t| t.gas_price_gwei).collect();
    let mean = prices.iter().sum::<f64>() / prices.len() as f64;
    if mean <= 0.0 {
        return (false, 0);
    }
    let var = prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / prices.len() as f64;
    let cv = var.sqrt() / mean;

    let extreme_gas_txns = prices.iter().filter(|&&p| p > mean * EXTREME_GAS_MULTIPLE).count() as u32;
    let any_over_outlier_multiple = prices.iter().any(|&p| p > mean * GAS_OUTLIER_MULTIPLE);

    (cv > GAS_CV_THRESHOLD || any_over_outlier_multiple, extreme_gas_txns)
}

fn is_dex_router(address: &Address) -> bool {
    DEX_ROUTERS.contains(&address.as_str())
}

/// Representative mainnet DEX router / aggregator contracts.
const DEX_ROUTERS: &[&str] = &[
    "0x7a250d5630b4cf539739df2c5dacb4c659f2488d",
    "0xe592427a0aece92de3edee1f18e0157c05861564",
    "0x68b3465833fb72a70ecdf485e0e4c7bd8665fc45",
    "0xd9e1ce17f2641f24ae83637ab66a2cca9c378b9f",
    "0x1111111254eeb25477b68fb85ed929f73a960582",
    "0xdef1c0ded9bec7f1a1670819833240f027b25eff",
    "0x11111112542d85b3ef69ae05771c2dccff4faa26",
];

/// Representative known MEV bot/searcher contracts.
const KNOWN_MEV_BOTS: &[&str] = &[
    "0x000000000035b5e5ad9019092c665357240f594e",
    "0x00000000003b3cc22af3ae1eac0440bcee416b4",
    "0x0000000000007f150bd6f54c40a34d7c3d5e9f56",
];

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn tx(hash: &str, from: &str, to: &str, block: u64, idx: u32, ts: i64, gas: f64) -> Transaction {
        Transaction {
            hash: hash.to_string(),
            block,
            tx_index: idx,
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
            from: Address::parse(from).unwrap(),
            to: Some(Address::parse(to).unwrap()),
            value_eth: 1.0,
            gas_used: 100_000.0,
            gas_price_gwei: gas,
            input: "0xabcdef01".into(),
            is_error: false,
            receipt_status: Some(1),
        }
    }

    const BOT: &str = "0x000000000000000000000000000000000000b0";
    const VICTIM: &str = "0x00000000000000000000000000000000000bad";
    const POOL: &str = "0x0000000000000000000000000000000000000ee";

    #[test]
    fn sandwich_with_one_victim_between_detected() {
        let front = tx("0x1", BOT, POOL, 1, 5, 1_700_000_000, 100.0);
        let victim = tx("0x2", VICTIM, POOL, 1, 7, 1_700_000_000, 20.0);
        let back = tx("0x3", BOT, POOL, 1, 9, 1_700_000_001, 90.0);

        let mut blocks = HashMap::new();
        blocks.insert(1u64, vec![front.clone(), victim, back.clone()]);

        let target = Address::parse(BOT).unwrap();
        let result = analyze(&target, &[front, back], &blocks);
        assert_eq!(result.sandwiches.len(), 1);
        assert_eq!(result.sandwiches[0].front_index, 5);
        assert_eq!(result.sandwiches[0].back_index, 9);
        assert_eq!(result.sandwiches[0].victims_between, 1);
        assert!(result.mev_score > 0.0);
    }

    #[test]
    fn known_bot_registry_flags_address() {
        let target = Address::parse(KNOWN_MEV_BOTS[0]).unwrap();
        let result = analyze(&target, &[], &HashMap::new());
        assert!(result.is_known_bot);
        assert!(result.classified_as_bot);
    }

    #[test]
    fn no_activity_scores_zero() {
        let target = Address::parse(VICTIM).unwrap();
        let result = analyze(&target, &[], &HashMap::new());
        assert_eq!(result.mev_score, 0.0);
        assert!(result.flags.is_empty());
        assert!(!result.classified_as_bot);
    }

    #[test]
    fn tight_dex_router_burst_flags_arbitrage() {
        let target = Address::parse(BOT).unwrap();
        let router_a = "0x7a250d5630b4cf539739df2c5dacb4c659f2488d";
        let router_b = "0xe592427a0aece92de3edee1f18e0157c05861564";
        let txs = vec![
            tx("0x1", BOT, router_a, 1, 0, 1_700_000_000, 20.0),
            tx("0x2", BOT, router_b, 1, 1, 1_700_000_020, 20.0),
            tx("0x3", BOT, router_a, 1, 2, 1_700_000_040, 20.0),
        ];
        let result = analyze(&target, &txs, &HashMap::new());
        assert_eq!(result.arbitrage_count, 1);
        // A lone windowed sequence isn't enough to classify as an arb bot —
        // the +20 bonus only applies at ARBITRAGE_BOT_MIN_SEQUENCES.
        assert_eq!(result.mev_score, 0.0);
    }

    // `count` windows of 3 DEX-router calls each, padded with an equal
    // number of plain (non-router) calls so `dex_heavy` never fires and the
    // arbitrage bonus can be isolated in the resulting score.
    fn dex_burst_windows(target: &str, count: usize) -> Vec<Transaction> {
        let router_a = "0x7a250d5630b4cf539739df2c5dacb4c659f2488d";
        let router_b = "0xe592427a0aece92de3edee1f18e0157c05861564";
        let plain = "0x0000000000000000000000000000000000dead";
        let mut txs = Vec::new();
        let mut idx = 0u32;
        for w in 0..count {
            let base = 1_700_000_000 + (w as i64) * 1_000;
            txs.push(tx(&format!("0x{w}a"), target, router_a, 1, idx, base, 20.0));
            idx += 1;
            txs.push(tx(&format!("0x{w}b"), target, router_b, 1, idx, base + 20, 20.0));
            idx += 1;
            txs.push(tx(&format!("0x{w}c"), target, router_a, 1, idx, base + 40, 20.0));
            idx += 1;
        }
        for w in 0..(count * 3) {
            let base = 1_700_100_000 + (w as i64) * 1_000;
            txs.push(tx(&format!("0x{w}p"), target, plain, 1, idx, base, 20.0));
            idx += 1;
        }
        txs
    }

    #[test]
    fn two_sequences_below_bot_threshold_score_zero() {
        let target = Address::parse(BOT).unwrap();
        let txs = dex_burst_windows(BOT, 2);
        let result = analyze(&target, &txs, &HashMap::new());
        assert_eq!(result.arbitrage_count, 2);
        assert_eq!(result.mev_score, 0.0);
    }

    #[test]
    fn three_sequences_crosses_bot_threshold() {
        let target = Address::parse(BOT).unwrap();
        let txs = dex_burst_windows(BOT, 3);
        let result = analyze(&target, &txs, &HashMap::new());
        assert_eq!(result.arbitrage_count, 3);
        assert_eq!(result.mev_score, 20.0);
    }
}
