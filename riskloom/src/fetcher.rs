// src/fetcher.rs
//
// Explorer-backed transaction fetcher (spec §4.1): a rate-limited,
// cache-fronted adapter over an Etherscan-family block-explorer API
// (`module=account`, `action=txlist|tokentx|txlistinternal|balance`), the
// de facto standard read surface for EVM wallet history. Grounded on
// original_source/backend/ml/fetcher.py; the HTTP layer
// itself follows this pack's reqwest usage (see
// aka-1976-Axiom-Protocol/src/ai/oracle.rs).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::{Address, InternalTransaction, TokenTransfer, Transaction};
use crate::errors::RiskError;
use crate::state::cache::Cache;

const RATE_LIMIT_ERROR_BUDGET: u32 = 5;

/// Single-slot rate limiter: only one request may be in flight against the
/// upstream explorer at a time, with at least `min_gap` between requests.
/// After [`RATE_LIMIT_ERROR_BUDGET`] consecutive upstream errors the
/// limiter fails open — waiting on a slow-dying upstream is worse than
/// briefly exceeding its rate limit.
pub struct RateLimiter {
    min_gap: Duration,
    last_request: Mutex<Option<Instant>>,
    consecutive_errors: AtomicU32,
}

impl RateLimiter {
    pub fn new(min_gap_seconds: f64) -> Self {
        RateLimiter {
            min_gap: Duration::from_secs_f64(min_gap_seconds.max(0.0)),
            last_request: Mutex::new(None),
            consecutive_errors: AtomicU32::new(0),
        }
    }

    pub async fn acquire(&self) {
        if self.consecutive_errors.load(Ordering::Relaxed) >= RATE_LIMIT_ERROR_BUDGET {
            return;
        }
        let wait = {
            let mut last = self.last_request.lock();
            let now = Instant::now();
            let wait = last
                .map(|t| self.min_gap.saturating_sub(now.saturating_duration_since(t)))
                .unwrap_or(Duration::ZERO);
            *last = Some(now + wait);
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    pub fn record_success(&self) {
        self.consecutive_errors.store(0, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.consecutive_errors.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Deserialize)]
struct ExplorerEnvelope<T> {
    status: String,
    message: String,
    result: T,
}

#[derive(Debug, Deserialize)]
struct RawTx {
    hash: String,
    #[serde(rename = "blockNumber")]
    block_number: String,
    #[serde(rename = "transactionIndex", default)]
    transaction_index: String,
    #[serde(rename = "timeStamp")]
    timestamp: String,
    from: String,
    to: String,
    value: String,
    #[serde(rename = "gasUsed")]
    gas_used: String,
    #[serde(rename = "gasPrice", default)]
    gas_price: String,
    #[serde(default)]
    input: String,
    #[serde(rename = "isError", default)]
    is_error: String,
    #[serde(rename = "txreceipt_status", default)]
    receipt_status: String,
}

#[derive(Debug, Deserialize)]
struct RawTokenTx {
    #[serde(flatten)]
    base: RawTx,
    #[serde(rename = "contractAddress")]
    contract_address: String,
    #[serde(rename = "tokenSymbol", default)]
    token_symbol: String,
    #[serde(rename = "tokenName", default)]
    token_name: String,
    #[serde(rename = "tokenDecimal", default)]
    token_decimal: String,
}

pub struct Fetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    chain_id: u64,
    rate_limiter: RateLimiter,
    cache: Arc<Cache>,
}

impl Fetcher {
    pub fn new(config: &Config, base_url: impl Into<String>, cache: Arc<Cache>) -> Self {
        Fetcher {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: config.api_key.clone(),
            chain_id: config.chain_id,
            rate_limiter: RateLimiter::new(config.rate_limit_seconds),
            cache,
        }
    }

    pub async fn fetch_transactions(&self, address: &Address) -> Result<Vec<Transaction>, RiskError> {
        let raw: Vec<RawTx> = self.fetch_cached("txlist", address).await?;
        raw.into_iter().map(|r| parse_tx(r)).collect()
    }

    pub async fn fetch_internal_transactions(&self, address: &Address) -> Result<Vec<InternalTransaction>, RiskError> {
        let raw: Vec<RawTx> = self.fetch_cached("txlistinternal", address).await?;
        raw.into_iter().map(|r| parse_tx(r)).collect()
    }

    pub async fn fetch_token_transfers(&self, address: &Address) -> Result<Vec<TokenTransfer>, RiskError> {
        let raw: Vec<RawTokenTx> = self.fetch_cached("tokentx", address).await?;
        raw.into_iter()
            .map(|r| {
                let tx = parse_tx(r.base)?;
                Ok(TokenTransfer {
                    tx,
                    contract: Address::parse(&r.contract_address)
                        .map_err(|e| RiskError::MalformedData { reason: e.to_string() })?,
                    token_symbol: r.token_symbol,
                    token_name: r.token_name,
                    token_decimals: r.token_decimal.parse().unwrap_or(18),
                })
            })
            .collect()
    }

    pub async fn fetch_balance(&self, address: &Address) -> Result<f64, RiskError> {
        let raw: String = self.fetch_cached("balance", address).await?;
        raw.parse::<f64>()
            .map(|wei| wei / 1e18)
            .map_err(|e| RiskError::MalformedData { reason: e.to_string() })
    }

    /// Returns up to `max` counterparty addresses ranked by total value
    /// exchanged with `address`, used to build the 1-hop ego-network the
    /// graph scorer and outlier detector both operate over.
    pub fn discover_neighbours(&self, address: &Address, transactions: &[Transaction], max: usize) -> Vec<Address> {
        use std::collections::HashMap;

        // §4.1: each tx is floored at 0.001 before accumulation so a run of
        // zero-value (or dust) transfers can't crowd out genuine volume.
        const MIN_VALUE_FLOOR: f64 = 0.001;

        let mut order: HashMap<Address, usize> = HashMap::new();
        let mut totals: HashMap<Address, f64> = HashMap::new();
        for tx in transactions {
            let counterparty = if &tx.from == address { tx.to.clone() } else { Some(tx.from.clone()) };
            if let Some(cp) = counterparty {
                let next_idx = order.len();
                order.entry(cp.clone()).or_insert(next_idx);
                *totals.entry(cp).or_insert(0.0) += tx.value_eth.max(MIN_VALUE_FLOOR);
            }
        }
        let mut ranked: Vec<(Address, f64, usize)> =
            totals.into_iter().map(|(a, v)| { let idx = order[&a]; (a, v, idx) }).collect();
        // Ties broken by insertion order (first-seen counterparty wins).
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.2.cmp(&b.2)));
        ranked.into_iter().take(max).map(|(a, _, _)| a).collect()
    }

    async fn fetch_cached<T>(&self, action: &str, address: &Address) -> Result<T, RiskError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let key = Cache::key(address, self.chain_id, action);
        if let Some(cached) = self.cache.get(&key).await {
            debug!(action, address = address.as_str(), "cache hit");
            return serde_json::from_slice(&cached).map_err(|e| RiskError::MalformedData { reason: e.to_string() });
        }

        self.rate_limiter.acquire().await;
        let result = self.request(action, address).await;
        match &result {
            Ok(_) => self.rate_limiter.record_success(),
            Err(_) => self.rate_limiter.record_error(),
        }
        let value = result?;

        if let Ok(bytes) = serde_json::to_vec(&value) {
            self.cache.put(&key, &bytes).await;
        }
        Ok(value)
    }

    async fn request<T>(&self, action: &str, address: &Address) -> Result<T, RiskError>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut req = self
            .client
            .get(&self.base_url)
            .query(&[("module", "account"), ("action", action), ("address", address.as_str())]);
        if let Some(key) = &self.api_key {
            req = req.query(&[("apikey", key.as_str())]);
        }

        let response = req.send().await.map_err(|e| RiskError::TransientFetch {
            kind: action.to_string(),
            chain_id: self.chain_id,
            reason: e.to_string(),
        })?;

        let envelope: ExplorerEnvelope<T> = response.json().await.map_err(|e| RiskError::MalformedData { reason: e.to_string() })?;

        if envelope.status != "1" && envelope.message != "No transactions found" {
            warn!(action, message = %envelope.message, "explorer returned non-success status");
        }

        Ok(envelope.result)
    }
}

fn parse_tx(raw: RawTx) -> Result<Transaction, RiskError> {
    let block: u64 = raw
        .block_number
        .parse()
        .map_err(|_| RiskError::MalformedData { reason: format!("bad blockNumber `{}`", raw.block_number) })?;
    let tx_index: u32 = raw.transaction_index.parse().unwrap_or(0);
    let timestamp_secs: i64 = raw
        .timestamp
        .parse()
        .map_err(|_| RiskError::MalformedData { reason: format!("bad timeStamp `{}`", raw.timestamp) })?;
    let timestamp = Utc
        .timestamp_opt(timestamp_secs, 0)
        .single()
        .ok_or_else(|| RiskError::MalformedData { reason: "out-of-range timestamp".to_string() })?;

    let from = Address::parse(&raw.from).map_err(|e| RiskError::MalformedData { reason: e.to_string() })?;
    let to = if raw.to.is_empty() { None } else { Some(Address::parse(&raw.to).map_err(|e| RiskError::MalformedData { reason: e.to_string() })?) };

    let value_wei: u128 = raw.value.parse().unwrap_or(0);
    let value_eth = value_wei as f64 / 1e18;
    let gas_used: f64 = raw.gas_used.parse().unwrap_or(0.0);
    let gas_price_wei: f64 = raw.gas_price.parse().unwrap_or(0.0);
    let gas_price_gwei = gas_price_wei / 1e9;

    Ok(Transaction {
        hash: raw.hash,
        block,
        tx_index,
        timestamp,
        from,
        to,
        value_eth,
        gas_used,
        gas_price_gwei,
        input: raw.input,
        is_error: raw.is_error == "1",
        receipt_status: raw.receipt_status.parse().ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wei_value_into_eth() {
        let raw = RawTx {
            hash: "0xabc".into(),
            block_number: "100".into(),
            transaction_index: "3".into(),
            timestamp: "1700000000".into(),
            from: "0x0000000000000000000000000000000000dead".into(),
            to: "0x0000000000000000000000000000000000beef".into(),
            value: "1500000000000000000".into(),
            gas_used: "21000".into(),
            gas_price: "20000000000".into(),
            input: String::new(),
            is_error: "0".into(),
            receipt_status: "1".into(),
        };
        let tx = parse_tx(raw).unwrap();
        assert!((tx.value_eth - 1.5).abs() < 1e-9);
        assert!((tx.gas_price_gwei - 20.0).abs() < 1e-9);
        assert_eq!(tx.block, 100);
    }

    #[test]
    fn empty_to_address_is_none() {
        let raw = RawTx {
            hash: "0xabc".into(),
            block_number: "100".into(),
            transaction_index: "0".into(),
            timestamp: "1700000000".into(),
            from: "0x0000000000000000000000000000000000dead".into(),
            to: String::new(),
            value: "0".into(),
            gas_used: "53000".into(),
            gas_price: "0".into(),
            input: "0x60806040".into(),
            is_error: "0".into(),
            receipt_status: "1".into(),
        };
        let tx = parse_tx(raw).unwrap();
        assert!(tx.to.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_enforces_minimum_gap() {
        let limiter = RateLimiter::new(0.25);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(Instant::now().saturating_duration_since(start) >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn fails_open_after_error_budget_exhausted() {
        let limiter = RateLimiter::new(10.0);
        for _ in 0..RATE_LIMIT_ERROR_BUDGET {
            limiter.record_error();
        }
        let start = std::time::Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
