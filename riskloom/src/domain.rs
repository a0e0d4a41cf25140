// src/domain.rs
//
// Core wire/value types shared across every detector and the orchestrator.
// Everything here is plain data — no behavior beyond construction helpers
// and the invariants called out in the doc comments.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 20-byte EVM account identifier, always normalised to `0x` + 40 lowercase
/// hex chars. Construction is the only place that validates the shape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Normalises and validates. Rejects anything that isn't `0x` + 40 hex
    /// chars after lowercasing.
    pub fn parse(raw: &str) -> Result<Self, crate::errors::RiskError> {
        let lower = raw.trim().to_lowercase();
        let body = lower.strip_prefix("0x").ok_or_else(|| {
            crate::errors::RiskError::InvalidInput {
                field: "address".into(),
                reason: format!("missing 0x prefix: {raw}"),
            }
        })?;
        if body.len() != 40 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(crate::errors::RiskError::InvalidInput {
                field: "address".into(),
                reason: format!("expected 40 hex chars, got: {raw}"),
            });
        }
        Ok(Address(lower))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What kind of transaction list is being requested from the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Normal,
    Internal,
    Token,
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxKind::Normal => "normal",
            TxKind::Internal => "internal",
            TxKind::Token => "token",
        };
        f.write_str(s)
    }
}

/// A single on-chain transaction. Amounts are floating ether for scoring
/// convenience — the fetch adapter is responsible for converting from
/// smallest-unit integers before handing transactions to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub block: u64,
    pub tx_index: u32,
    pub timestamp: DateTime<Utc>,
    pub from: Address,
    /// Absent only for contract-creation internal transactions.
    pub to: Option<Address>,
    pub value_eth: f64,
    pub gas_used: f64,
    pub gas_price_gwei: f64,
    #[serde(default)]
    pub input: String,
    pub is_error: bool,
    pub receipt_status: Option<u8>,
}

impl Transaction {
    pub fn to_addr(&self) -> Option<&Address> {
        self.to.as_ref()
    }

    /// Non-empty input longer than a bare 4-byte function selector (8 hex
    /// chars after an optional 0x) counts as a contract call with payload.
    pub fn is_contract_call(&self) -> bool {
        let body = self.input.strip_prefix("0x").unwrap_or(&self.input);
        body.len() > 8
    }
}

/// ERC-20/721 transfer event. Shares the normal transaction schema plus
/// token metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTransfer {
    #[serde(flatten)]
    pub tx: Transaction,
    pub contract: Address,
    pub token_symbol: String,
    pub token_name: String,
    pub token_decimals: u8,
}

/// Internal (trace-level) transaction. `to` is `None` for contract creation.
pub type InternalTransaction = Transaction;

/// Chain descriptor: `(id, name, short, explorer_url, native_symbol)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    pub id: u64,
    pub name: String,
    pub short: String,
    pub explorer_url: String,
    pub native_symbol: String,
}

impl ChainDescriptor {
    pub fn unknown(id: u64) -> Self {
        ChainDescriptor {
            id,
            name: format!("Chain {id}"),
            short: "UNKNOWN".into(),
            explorer_url: String::new(),
            native_symbol: "ETH".into(),
        }
    }
}

/// Number of scalar slots in a [`FeatureVector`]. Order is part of the
/// contract — see [`FEATURE_NAMES`] for the normative name→index mapping.
pub const FEATURE_COUNT: usize = 33;

/// Name→index mapping, compile-time constant, in normative order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "tx_count",
    "sent_count",
    "recv_count",
    "total_sent_eth",
    "total_recv_eth",
    "net_flow_eth",
    "flow_ratio",
    "mean_value",
    "median_value",
    "std_value",
    "max_value",
    "min_value",
    "mean_sent",
    "mean_recv",
    "unique_counterparties",
    "unique_targets",
    "unique_sources",
    "repeated_targets",
    "self_transfers",
    "active_days",
    "lifespan_days",
    "mean_time_between_tx",
    "std_time_between_tx",
    "min_time_between_tx",
    "burst_ratio",
    "mean_gas_price",
    "std_gas_price",
    "mean_gas_used",
    "contract_call_ratio",
    "failed_tx_ratio",
    "round_value_ratio",
    "tx_per_day",
    "value_per_counterparty",
];

/// Fixed-order 33-scalar feature vector. Index positions are the contract;
/// never pass features around as a `HashMap<String, f64>`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn zero() -> Self {
        FeatureVector([0.0; FEATURE_COUNT])
    }

    pub fn get(&self, name: &str) -> f64 {
        FEATURE_NAMES
            .iter()
            .position(|&n| n == name)
            .map(|i| self.0[i])
            .unwrap_or(0.0)
    }

    pub fn as_slice(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    /// I5: coerce every non-finite slot to 0 in place.
    pub fn sanitize(&mut self) {
        for v in self.0.iter_mut() {
            if !v.is_finite() {
                *v = 0.0;
            }
        }
    }
}

/// Category enum for statically known and community-sourced labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelCategory {
    Exchange,
    Bridge,
    Dex,
    Defi,
    Nft,
    Mixer,
    Stablecoin,
    Sanctioned,
    Scam,
    MevBot,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelEntry {
    pub label: String,
    pub category: LabelCategory,
    /// `1.0` for the static compile-time table; community-sourced entries
    /// carry a lower confidence and a source tag.
    pub confidence: f32,
    pub source: String,
}

/// Overall risk tier. Ord derive gives the label-promotion comparisons a
/// natural `<` / `>=` reading (`Low < Medium < High < Critical`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLabel {
    NoData,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLabel::NoData => "No Data",
            RiskLabel::Low => "Low Risk",
            RiskLabel::Medium => "Medium Risk",
            RiskLabel::High => "High Risk",
            RiskLabel::Critical => "Critical Risk",
        };
        f.write_str(s)
    }
}

impl RiskLabel {
    /// §4.5: `<40 → Low`, `<75 → Medium`, `>=75 → High`.
    pub fn from_score(score: u32) -> Self {
        if score >= 75 {
            RiskLabel::High
        } else if score >= 40 {
            RiskLabel::Medium
        } else {
            RiskLabel::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterpartyBreakdown {
    pub address: Address,
    pub total_value_eth: f64,
    pub tx_count: u32,
    pub label: Option<LabelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyBucket {
    pub date: String, // YYYY-MM-DD UTC
    pub tx_count: u32,
    pub volume_eth: f64,
    pub in_count: u32,
    pub out_count: u32,
    pub unique_counterparties: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub address: Address,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphLink {
    pub source: Address,
    pub target: Address,
    pub value_eth: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportGraph {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

/// Top-level output of a single-wallet analysis. See spec §3 for the field
/// list; every field here is required, none are `Option` unless the
/// underlying detector can legitimately produce "no data".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    pub address: Address,
    pub chain_descriptor: ChainDescriptor,
    pub risk_score: u32,
    pub risk_label: RiskLabel,
    pub ml_raw_score: f64,
    pub heuristic_score: f64,
    pub flags: Vec<String>,
    pub feature_summary: BTreeMap<String, f64>,
    pub counterparties: Vec<CounterpartyBreakdown>,
    pub timeline: Vec<DailyBucket>,
    pub gnn: crate::detectors::graph_scorer::GraphScore,
    pub temporal: crate::detectors::temporal::TemporalResult,
    pub mev: crate::detectors::mev::MevResult,
    pub bridges: crate::detectors::bridge::BridgeResult,
    pub sanctions: crate::detectors::sanctions::SanctionsResult,
    pub community_risk_modifier: u32,
    pub graph: ReportGraph,
    pub balance: Option<f64>,
    pub tx_count: u32,
}

/// GraphSubject for the unsupervised pipeline only: a directed multigraph
/// keyed on address with `{value, timestamp}` edge weights. Parallel edges
/// are preserved — never collapsed into a single weighted edge.
pub type GraphSubject = petgraph::stable_graph::StableDiGraph<Address, EdgeWeight>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeWeight {
    pub value_eth: f64,
    pub timestamp: DateTime<Utc>,
}
