// src/detectors/bridge.rs
//
// Bridge Tracker (spec §4.9): matches a wallet's transactions against a
// static bridge-contract registry, infers deposit/withdrawal direction, and
// scores obfuscation/rapid-hopping patterns. Grounded on
// original_source/backend/ml/bridge_tracker.py.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Address, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeDirection {
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeInteraction {
    pub tx_hash: String,
    pub protocol: String,
    pub direction: BridgeDirection,
    pub value_eth: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolUsage {
    pub protocol: String,
    pub tx_count: u32,
    pub volume_eth: f64,
    pub directions: Vec<BridgeDirection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeResult {
    pub bridge_risk_score: f64,
    pub bridges_used: Vec<ProtocolUsage>,
    pub timeline: Vec<BridgeInteraction>,
    pub flags: Vec<String>,
}

struct BridgeContract {
    address: &'static str,
    protocol: &'static str,
    compromised: bool,
}

/// Static registry cross-referenced against the label registry (§4.2) so
/// the two tables answer the same "is this a bridge" question without a
/// duplicated source of truth — this copy carries the per-protocol
/// metadata (compromised-history flag) the label registry doesn't.
const BRIDGE_CONTRACTS: &[BridgeContract] = &[
    BridgeContract { address: "0x8731d54e9d02c286767d56ac03e8037c07e01e98", protocol: "Stargate", compromised: false },
    BridgeContract { address: "0x150f94b44927f0783737562f0fcf3c68ef358f18", protocol: "Stargate", compromised: false },
    BridgeContract { address: "0x6cdcb1c4a4d1c3c6d054b27ac5b77e89eafb971d", protocol: "Stargate", compromised: false },
    BridgeContract { address: "0xb0d502e938ed5f4df2e681fe6e419ff29631d62b", protocol: "Across", compromised: false },
    BridgeContract { address: "0x4d9079bb4165aeb4084c526a32695dcfd2f77381", protocol: "Across", compromised: false },
    BridgeContract { address: "0xb8901acb165ed027e32754e0ffe830802919727f", protocol: "Hop", compromised: false },
    BridgeContract { address: "0x3ee18b2214aff97000d974cf647e7c347e8fa585", protocol: "Wormhole", compromised: false },
    BridgeContract { address: "0x6b7a87899490ece95443e979ca9485cbe7e71b2a", protocol: "LayerZero", compromised: false },
    BridgeContract { address: "0x6f25b1b192a16003cf5104db5c9c2ba49ab5f6e2", protocol: "Synapse", compromised: false },
    BridgeContract { address: "0x5427fefa711eff984124bfbb1ab6fbf5e3da1820", protocol: "Celer", compromised: false },
    BridgeContract { address: "0x1ccad820b6d031b41c54f1f3da11c0d48b399c0b", protocol: "Multichain", compromised: true },
    BridgeContract { address: "0x6a39909e805a3eadd2b61fff61147796ca6abb47", protocol: "Orbiter", compromised: false },
    BridgeContract { address: "0x8a4a4ba0c3c68e8f6a5bdf0f53bda6c2ba4c7f8a", protocol: "Connext", compromised: false },
    BridgeContract { address: "0xa0c68c638235ee32657e8f720a23cec1bfc77c77", protocol: "Polygon PoS Bridge", compromised: false },
    BridgeContract { address: "0x8315177ab297ba92a06054ce80a67ed4dbd7ed3a", protocol: "Arbitrum Bridge", compromised: false },
    BridgeContract { address: "0x4200000000000000000000000000000000000010", protocol: "Optimism Standard Bridge", compromised: false },
];

fn lookup_protocol(addr: &Address) -> Option<&'static BridgeContract> {
    BRIDGE_CONTRACTS.iter().find(|c| c.address == addr.as_str())
}

/// `transactions` merges normal and token-transfer-derived rows — callers
/// flatten both lists before calling this.
pub fn detect(target: &Address, transactions: &[Transaction]) -> BridgeResult {
    let mut interactions = Vec::new();

    for tx in transactions {
        let from_bridge = lookup_protocol(&tx.from);
        let to_bridge = tx.to.as_ref().and_then(lookup_protocol);

        // Exactly one endpoint must match; both or neither is not recorded.
        let (bridge, direction) = match (from_bridge, to_bridge) {
            (Some(b), None) => (b, BridgeDirection::Withdrawal),
            (None, Some(b)) => (b, BridgeDirection::Deposit),
            _ => continue,
        };

        // direction is relative to `target`: target sending into the
        // bridge is a deposit, target receiving out of it is a withdrawal.
        let direction = if &tx.from == target {
            BridgeDirection::Deposit
        } else if tx.to.as_ref() == Some(target) {
            BridgeDirection::Withdrawal
        } else {
            direction
        };

        interactions.push((bridge, direction, tx));
    }

    interactions.sort_by_key(|(_, _, tx)| tx.timestamp);

    let mut by_protocol: BTreeMap<&'static str, (u32, f64, Vec<BridgeDirection>, bool)> = BTreeMap::new();
    let mut timeline = Vec::new();
    for (bridge, direction, tx) in &interactions {
        let entry = by_protocol
            .entry(bridge.protocol)
            .or_insert((0, 0.0, Vec::new(), bridge.compromised));
        entry.0 += 1;
        entry.1 += tx.value_eth;
        entry.2.push(*direction);

        if timeline.len() < 50 {
            timeline.push(BridgeInteraction {
                tx_hash: tx.hash.clone(),
                protocol: bridge.protocol.to_string(),
                direction: *direction,
                value_eth: tx.value_eth,
                timestamp: tx.timestamp,
            });
        }
    }

    let mut bridges_used: Vec<ProtocolUsage> = by_protocol
        .into_iter()
        .map(|(protocol, (tx_count, volume_eth, directions, _))| ProtocolUsage {
            protocol: protocol.to_string(),
            tx_count,
            volume_eth,
            directions,
        })
        .collect();
    bridges_used.sort_by(|a, b| b.tx_count.cmp(&a.tx_count));

    let (score, flags) = score_bridge_usage(&interactions, &bridges_used);

    BridgeResult {
        bridge_risk_score: score,
        bridges_used,
        timeline,
        flags,
    }
}

fn score_bridge_usage(
    interactions: &[(&BridgeContract, BridgeDirection, &Transaction)],
    bridges_used: &[ProtocolUsage],
) -> (f64, Vec<String>) {
    if interactions.is_empty() {
        return (0.0, Vec::new());
    }

    let mut score = 0.0;
    let mut flags = Vec::new();

    let protocol_count = bridges_used.len();
    if protocol_count >= 4 {
        score += 25.0;
        flags.push(format!("{protocol_count} distinct bridge protocols used"));
    } else if protocol_count >= 2 {
        score += 10.0;
    }

    let total_volume: f64 = bridges_used.iter().map(|b| b.volume_eth).sum();
    if total_volume > 100.0 {
        score += 20.0;
    } else if total_volume > 10.0 {
        score += 10.0;
    }

    let total_count: u32 = bridges_used.iter().map(|b| b.tx_count).sum();
    if total_count > 20 {
        score += 15.0;
    } else if total_count > 5 {
        score += 5.0;
    }

    let timestamps: Vec<DateTime<Utc>> = {
        let mut ts: Vec<DateTime<Utc>> = interactions.iter().map(|(_, _, tx)| tx.timestamp).collect();
        ts.sort();
        ts
    };
    let rapid_gaps = timestamps
        .windows(2)
        .filter(|w| (w[1] - w[0]).num_seconds() < 3600)
        .count();
    if total_count >= 3 && rapid_gaps >= 3 {
        score += 20.0;
        flags.push("Rapid successive bridge transactions (< 1 hour apart)".to_string());
    }

    let directions: HashSet<BridgeDirection> = interactions.iter().map(|(_, d, _)| *d).collect();
    if directions.len() == 1 && directions.contains(&BridgeDirection::Deposit) {
        score += 10.0;
        flags.push("All observed bridge interactions are deposits (no return path observed)".to_string());
    }

    for (bridge, _, _) in interactions {
        if bridge.compromised {
            score += 10.0;
        }
    }
    if interactions.iter().any(|(b, _, _)| b.compromised) {
        flags.push("Interacted with a bridge protocol with a known historical compromise".to_string());
    }

    (score.min(100.0), flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tx(hash: &str, from: &str, to: &str, value: f64, ts: i64) -> Transaction {
        Transaction {
            hash: hash.to_string(),
            block: 1,
            tx_index: 0,
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
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

    const WALLET: &str = "0x000000000000000000000000000000000beef11";
    const STARGATE: &str = "0x8731d54e9d02c286767d56ac03e8037c07e01e98";
    const STARGATE_BASE: &str = "0x150f94b44927f0783737562f0fcf3c68ef358f18";
    const STARGATE_OTHER: &str = "0x6cdcb1c4a4d1c3c6d054b27ac5b77e89eafb971d";

    #[test]
    fn no_bridge_interactions_scores_zero() {
        let target = Address::parse(WALLET).unwrap();
        let txs = vec![tx("0x1", WALLET, "0x00000000000000000000000000000000001234", 1.0, 1_700_000_000)];
        let result = detect(&target, &txs);
        assert!(result.bridges_used.is_empty());
        assert_eq!(result.bridge_risk_score, 0.0);
    }

    #[test]
    fn rapid_successive_bridge_hops_flagged() {
        let target = Address::parse(WALLET).unwrap();
        let txs = vec![
            tx("0x1", WALLET, STARGATE, 1.0, 1_700_000_000),
            tx("0x2", WALLET, STARGATE_BASE, 1.0, 1_700_000_600),
            tx("0x3", WALLET, STARGATE_OTHER, 1.0, 1_700_001_200),
        ];
        let result = detect(&target, &txs);
        assert!(result.bridge_risk_score >= 20.0);
        assert!(result
            .flags
            .iter()
            .any(|f| f.contains("Rapid successive bridge transactions")));
    }
}
