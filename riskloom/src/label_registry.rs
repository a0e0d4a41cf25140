// src/label_registry.rs
//
// Static lookup table of known addresses (exchanges, bridges, DEX routers,
// defi protocols, mixers, sanctioned/scam wallets). Populated once at
// construction; read-only afterwards, so no synchronisation is needed for
// the static half. Community-sourced entries (confidence < 1.0) are added
// at runtime by the orchestrator, never self-located.

use std::collections::HashMap;

use crate::domain::{Address, LabelCategory, LabelEntry};

pub struct LabelRegistry {
    table: HashMap<String, LabelEntry>,
}

impl LabelRegistry {
    pub fn new() -> Self {
        let mut table = HashMap::new();
        for (addr, label, category) in STATIC_LABELS {
            table.insert(
                addr.to_lowercase(),
                LabelEntry {
                    label: label.to_string(),
                    category: *category,
                    confidence: 1.0,
                    source: "static".into(),
                },
            );
        }
        LabelRegistry { table }
    }

    pub fn lookup(&self, address: &Address) -> Option<&LabelEntry> {
        self.table.get(address.as_str())
    }

    pub fn lookup_batch<'a>(
        &'a self,
        addresses: &[Address],
    ) -> HashMap<Address, &'a LabelEntry> {
        addresses
            .iter()
            .filter_map(|a| self.lookup(a).map(|l| (a.clone(), l)))
            .collect()
    }

    pub fn is_mixer(&self, address: &Address) -> bool {
        matches!(
            self.lookup(address).map(|l| l.category),
            Some(LabelCategory::Mixer)
        )
    }

    pub fn is_exchange(&self, address: &Address) -> bool {
        matches!(
            self.lookup(address).map(|l| l.category),
            Some(LabelCategory::Exchange)
        )
    }

    /// Adds (or overwrites) a runtime community label. Never called by a
    /// detector directly — only the orchestrator, after consulting the
    /// community report store, mutates the registry.
    pub fn add_community_label(&mut self, address: Address, label: LabelEntry) {
        self.table.insert(address.as_str().to_string(), label);
    }
}

impl Default for LabelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

use LabelCategory::*;

/// Real mainnet addresses, grounded on known_labels.py / bridge_tracker.py /
/// sanctions.py. Not exhaustive — a representative seed per category.
const STATIC_LABELS: &[(&str, &str, LabelCategory)] = &[
    // Exchanges
    ("0x28c6c06298d514db089934071355e5743bf21d60", "Binance 14", Exchange),
    ("0x21a31ee1afc51d94c2efccaa2092ad1028285549", "Binance 15", Exchange),
    ("0x71660c4005ba85c37ccec55d0c4493e66fe775d3", "Coinbase 1", Exchange),
    ("0x503828976d22510aad0201ac7ec88293211d23da", "Coinbase 2", Exchange),
    ("0x2910543af39aba0cd09dbb2d50200b3e800a63d2", "Kraken 4", Exchange),
    ("0x0d0707963952f2fba59dd06f2b425ace40b492fe", "Gate.io 1", Exchange),
    ("0xe93380fb2fbe7e7deaa0a1fd7de39c84a21ca5cc", "MEXC 1", Exchange),
    // DEX routers
    ("0x7a250d5630b4cf539739df2c5dacb4c659f2488d", "Uniswap V2 Router", Dex),
    ("0xe592427a0aece92de3edee1f18e0157c05861564", "Uniswap V3 Router", Dex),
    ("0x68b3465833fb72a70ecdf485e0e4c7bd8665fc45", "Uniswap Universal Router", Dex),
    ("0xd9e1ce17f2641f24ae83637ab66a2cca9c378b9f", "SushiSwap Router", Dex),
    ("0x1111111254eeb25477b68fb85ed929f73a960582", "1inch V5 Router", Dex),
    ("0xdef1c0ded9bec7f1a1670819833240f027b25eff", "0x Exchange Proxy", Dex),
    // Bridges (cross-referenced against the bridge tracker registry, §4.9)
    ("0x8731d54e9d02c286767d56ac03e8037c07e01e98", "Stargate Router (Ethereum)", Bridge),
    ("0x150f94b44927f0783737562f0fcf3c68ef358f18", "Stargate Router (Base)", Bridge),
    ("0xb0d502e938ed5f4df2e681fe6e419ff29631d62b", "Across SpokePool (Ethereum)", Bridge),
    ("0x3ee18b2214aff97000d974cf647e7c347e8fa585", "Wormhole Token Bridge", Bridge),
    ("0x6f25b1b192a16003cf5104db5c9c2ba49ab5f6e2", "Synapse Bridge", Bridge),
    ("0x1ccad820b6d031b41c54f1f3da11c0d48b399c0b", "Multichain Router", Bridge),
    ("0x4200000000000000000000000000000000000010", "Optimism Standard Bridge", Bridge),
    // Defi
    ("0x7d2768de32b0b80b7a3454c06bdac94a69ddc7a9", "Aave V2 LendingPool", Defi),
    ("0x87870bca3f3fd6335c3f4ce8392d69350b4fa4e2", "Aave V3 Pool", Defi),
    ("0xc3d688b66703497daa19211eedff47f25384cdc3", "Compound V3 Comet", Defi),
    ("0xbebc44782c7db0a1a60cb6fe97d0b483032ff1c7", "Curve 3pool", Defi),
    // Mixers
    ("0x8589427373d6d84e98730d7795d8f6f8731fda0e", "Tornado Cash Router", Mixer),
    ("0x722122df12d4e14e13ac3b6895a86e84145b6967", "Tornado Cash 0.1 ETH", Mixer),
    ("0xdd4c48c0b24039969fc16d1cdf626eab821d3384", "Tornado Cash 100 ETH", Mixer),
    ("0xd90e2f925da726b50c4ed8d0fb90ad053324f31b", "Blender.io Mixer", Mixer),
    // Sanctioned (OFAC) / scam, mirrored in detectors::sanctions so both
    // modules answer the same question without duplicating the source list
    ("0x098b716b8aaf21512996dc57eb0615e2383e2f96", "Lazarus Group", Sanctioned),
    ("0x7ff9cfad3877f21d41da833e2f775db0569ee3d9", "Ronin Bridge Exploiter", Sanctioned),
    ("0x5512d943ed1f7c8a43f3435c85f7ab68b30121b0", "Garantex Exchange", Sanctioned),
    ("0x1da5821544e25c636c1417ba96ade4cf6d2f9b5a", "Suex OTC", Sanctioned),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_exchange_resolves() {
        let reg = LabelRegistry::new();
        let addr = Address::parse("0x28c6c06298d514db089934071355e5743bf21d60").unwrap();
        assert!(reg.is_exchange(&addr));
        assert!(!reg.is_mixer(&addr));
    }

    #[test]
    fn unknown_address_has_no_label() {
        let reg = LabelRegistry::new();
        let addr = Address::parse("0x000000000000000000000000000000000000dead").unwrap();
        assert!(reg.lookup(&addr).is_none());
    }

    #[test]
    fn mixer_flag_set_for_tornado_cash() {
        let reg = LabelRegistry::new();
        let addr = Address::parse("0x8589427373d6d84e98730d7795d8f6f8731fda0e").unwrap();
        assert!(reg.is_mixer(&addr));
    }
}
