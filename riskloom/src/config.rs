// src/config.rs
//
// Runtime configuration (spec §6). Environment-scoped with documented
// defaults; no config crate pulled in for six scalar knobs.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub chain_id: u64,
    pub api_key: Option<String>,
    pub rate_limit_seconds: f64,
    pub cache_ttl_seconds: u64,
    pub max_batch_size: usize,
    pub community_min_reports: u32,
    pub cache_dir: PathBuf,
    pub worker_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chain_id: 1,
            api_key: None,
            rate_limit_seconds: 0.25,
            cache_ttl_seconds: 300,
            max_batch_size: 50,
            community_min_reports: 2,
            cache_dir: PathBuf::from(".cache"),
            worker_concurrency: 2,
        }
    }
}

impl Config {
    /// Overlays values present in the process environment on top of the
    /// defaults. Absence of any variable is not an error.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();
        if let Ok(v) = std::env::var("RISKLOOM_CHAIN_ID") {
            if let Ok(n) = v.parse() {
                cfg.chain_id = n;
            }
        }
        if let Ok(v) = std::env::var("RISKLOOM_API_KEY") {
            if !v.is_empty() {
                cfg.api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("RISKLOOM_RATE_LIMIT_SECONDS") {
            if let Ok(n) = v.parse() {
                cfg.rate_limit_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("RISKLOOM_CACHE_TTL_SECONDS") {
            if let Ok(n) = v.parse() {
                cfg.cache_ttl_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("RISKLOOM_MAX_BATCH_SIZE") {
            if let Ok(n) = v.parse() {
                cfg.max_batch_size = n;
            }
        }
        if let Ok(v) = std::env::var("RISKLOOM_COMMUNITY_MIN_REPORTS") {
            if let Ok(n) = v.parse() {
                cfg.community_min_reports = n;
            }
        }
        if let Ok(v) = std::env::var("RISKLOOM_CACHE_DIR") {
            cfg.cache_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("RISKLOOM_WORKER_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                cfg.worker_concurrency = n;
            }
        }
        cfg
    }
}

/// Static table of major EVM chains. Lookup by id falls back to an
/// `Unknown` placeholder for unregistered ids (§6).
pub fn chain_descriptor(id: u64) -> crate::domain::ChainDescriptor {
    use crate::domain::ChainDescriptor;

    let table: &[(u64, &str, &str, &str, &str)] = &[
        (1, "Ethereum Mainnet", "ETH", "https://etherscan.io", "ETH"),
        (8453, "Base", "BASE", "https://basescan.org", "ETH"),
        (84532, "Base Sepolia", "BASESEP", "https://sepolia.basescan.org", "ETH"),
        (137, "Polygon", "MATIC", "https://polygonscan.com", "MATIC"),
        (42161, "Arbitrum One", "ARB", "https://arbiscan.io", "ETH"),
        (10, "Optimism", "OP", "https://optimistic.etherscan.io", "ETH"),
        (56, "BNB Smart Chain", "BSC", "https://bscscan.com", "BNB"),
        (43114, "Avalanche C-Chain", "AVAX", "https://snowtrace.io", "AVAX"),
        (11155111, "Sepolia Testnet", "SEP", "https://sepolia.etherscan.io", "ETH"),
    ];

    table
        .iter()
        .find(|(cid, ..)| *cid == id)
        .map(|(cid, name, short, url, native)| ChainDescriptor {
            id: *cid,
            name: name.to_string(),
            short: short.to_string(),
            explorer_url: url.to_string(),
            native_symbol: native.to_string(),
        })
        .unwrap_or_else(|| ChainDescriptor::unknown(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.chain_id, 1);
        assert_eq!(cfg.rate_limit_seconds, 0.25);
        assert_eq!(cfg.cache_ttl_seconds, 300);
        assert_eq!(cfg.max_batch_size, 50);
        assert_eq!(cfg.community_min_reports, 2);
        assert_eq!(cfg.worker_concurrency, 2);
    }

    #[test]
    fn unknown_chain_falls_back() {
        let d = chain_descriptor(999_999);
        assert_eq!(d.short, "UNKNOWN");
        assert_eq!(d.name, "Chain 999999");
    }

    #[test]
    fn known_chain_resolves() {
        let d = chain_descriptor(1);
        assert_eq!(d.name, "Ethereum Mainnet");
    }
}
