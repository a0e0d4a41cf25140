// src/detectors/sanctions.rs
//
// Sanctions & scam exposure (spec §4.10): checks the target address and
// its counterparties against the label registry's Sanctioned/Scam/Mixer
// categories and folds the result into a risk modifier and a counterparty
// exposure level. Grounded on original_source/backend/ml/sanctions.py.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Address, LabelCategory, Transaction};
use crate::label_registry::LabelRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterpartyExposure {
    Clean,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanctionsResult {
    pub is_sanctioned: bool,
    pub is_scam: bool,
    pub has_mixer_interaction: bool,
    pub risk_modifier: f64,
    pub counterparty_exposure: CounterpartyExposure,
    pub matched_entities: Vec<String>,
    pub flags: Vec<String>,
}

/// `transactions` merges normal, internal and token-transfer-derived rows —
/// callers flatten all three before calling this, same convention as the
/// bridge tracker.
pub fn detect(target: &Address, transactions: &[Transaction], registry: &LabelRegistry) -> SanctionsResult {
    let target_label = registry.lookup(target);
    let is_sanctioned = matches!(target_label.map(|l| l.category), Some(LabelCategory::Sanctioned));
    let is_scam = matches!(target_label.map(|l| l.category), Some(LabelCategory::Scam));
    let is_target_mixer = matches!(target_label.map(|l| l.category), Some(LabelCategory::Mixer));

    let mut counterparties: HashMap<&Address, ()> = HashMap::new();
    let mut mixer_hits = 0u32;
    let mut sanctioned_hits = 0u32;
    let mut scam_hits = 0u32;
    let mut matched_entities = Vec::new();

    for tx in transactions {
        let counterparty = if &tx.from == target { tx.to.as_ref() } else { Some(&tx.from) };
        let Some(cp) = counterparty else { continue };
        if counterparties.insert(cp, ()).is_some() {
            continue;
        }
        let Some(label) = registry.lookup(cp) else { continue };
        match label.category {
            LabelCategory::Mixer => {
                mixer_hits += 1;
                matched_entities.push(label.label.clone());
            }
            LabelCategory::Sanctioned => {
                sanctioned_hits += 1;
                matched_entities.push(label.label.clone());
            }
            LabelCategory::Scam => {
                scam_hits += 1;
                matched_entities.push(label.label.clone());
            }
            _ => {}
        }
    }

    let has_mixer_interaction = mixer_hits > 0;

    // §4.10: all three terms are computed from the target itself, not its
    // counterparties — `check_sanctions(address)` in the ground-truth
    // source never looks past the target address for this modifier.
    // Counterparty exposure (below) is a separate aggregate.
    let risk_modifier = (40.0 * is_sanctioned as u8 as f64
        + 30.0 * is_scam as u8 as f64
        + 25.0 * is_target_mixer as u8 as f64)
        .min(50.0);

    let counterparty_exposure = if is_sanctioned || sanctioned_hits > 0 {
        CounterpartyExposure::Critical
    } else if has_mixer_interaction {
        CounterpartyExposure::High
    } else if is_scam || scam_hits > 0 {
        CounterpartyExposure::Medium
    } else {
        CounterpartyExposure::Clean
    };

    let mut flags = Vec::new();
    if is_sanctioned {
        flags.push("Target address matches a sanctioned-entity label".to_string());
    }
    if is_scam {
        flags.push("Target address matches a reported scam label".to_string());
    }
    if is_target_mixer {
        flags.push("Target address matches a known mixer label".to_string());
    }
    if sanctioned_hits > 0 {
        flags.push(format!("{sanctioned_hits} direct counterparty(ies) match sanctioned-entity labels"));
    }
    if scam_hits > 0 {
        flags.push(format!("{scam_hits} direct counterparty(ies) match reported scam labels"));
    }
    if mixer_hits > 0 {
        flags.push(format!("{mixer_hits} direct interaction(s) with known mixer contracts"));
    }

    matched_entities.sort();
    matched_entities.dedup();

    SanctionsResult {
        is_sanctioned,
        is_scam,
        has_mixer_interaction,
        risk_modifier,
        counterparty_exposure,
        matched_entities,
        flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn tx(hash: &str, from: &str, to: &str) -> Transaction {
        Transaction {
            hash: hash.to_string(),
            block: 1,
            tx_index: 0,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            from: Address::parse(from).unwrap(),
            to: Some(Address::parse(to).unwrap()),
            value_eth: 1.0,
            gas_used: 21_000.0,
            gas_price_gwei: 20.0,
            input: String::new(),
            is_error: false,
            receipt_status: Some(1),
        }
    }

    const WALLET: &str = "0x000000000000000000000000000000000beef11";
    const MIXER: &str = "0x8589427373d6d84e98730d7795d8f6f8731fda0e";
    const SANCTIONED: &str = "0x098b716b8aaf21512996dc57eb0615e2383e2f96";

    #[test]
    fn clean_wallet_has_no_exposure() {
        let registry = LabelRegistry::new();
        let target = Address::parse(WALLET).unwrap();
        let txs = vec![tx("0x1", WALLET, "0x00000000000000000000000000000000001234")];
        let result = detect(&target, &txs, &registry);
        assert_eq!(result.counterparty_exposure, CounterpartyExposure::Clean);
        assert_eq!(result.risk_modifier, 0.0);
    }

    #[test]
    fn counterparty_mixer_interaction_raises_exposure_not_modifier() {
        // §4.10: risk_modifier is computed from the target alone. A
        // counterparty-only mixer hit still raises counterparty exposure,
        // but the target here isn't itself a mixer, so it contributes
        // nothing to risk_modifier.
        let registry = LabelRegistry::new();
        let target = Address::parse(WALLET).unwrap();
        let txs = vec![tx("0x1", WALLET, MIXER)];
        let result = detect(&target, &txs, &registry);
        assert!(result.has_mixer_interaction);
        assert_eq!(result.risk_modifier, 0.0);
        assert_eq!(result.counterparty_exposure, CounterpartyExposure::High);
    }

    #[test]
    fn target_mixer_status_raises_risk_modifier() {
        let registry = LabelRegistry::new();
        let target = Address::parse(MIXER).unwrap();
        let txs = vec![tx("0x1", MIXER, WALLET)];
        let result = detect(&target, &txs, &registry);
        assert_eq!(result.risk_modifier, 25.0);
    }

    #[test]
    fn sanctioned_counterparty_is_critical() {
        let registry = LabelRegistry::new();
        let target = Address::parse(WALLET).unwrap();
        let txs = vec![tx("0x1", SANCTIONED, WALLET)];
        let result = detect(&target, &txs, &registry);
        assert_eq!(result.counterparty_exposure, CounterpartyExposure::Critical);
        // risk_modifier reflects only the target's own status (§4.10); a
        // sanctioned counterparty alone doesn't move it.
        assert_eq!(result.risk_modifier, 0.0);
    }

    #[test]
    fn sanctioned_target_modifier_ignores_counterparty_mixer() {
        let registry = LabelRegistry::new();
        let target = Address::parse(SANCTIONED).unwrap();
        let txs = vec![tx("0x1", SANCTIONED, MIXER)];
        let result = detect(&target, &txs, &registry);
        assert!(result.is_sanctioned);
        // Target is sanctioned (40) but not itself a mixer or scam entity —
        // the counterparty mixer hit doesn't feed risk_modifier.
        assert_eq!(result.risk_modifier, 40.0);
    }
}
