// src/detectors/heuristics.rs
//
// Deterministic rule bank over the 33-feature vector (spec §4.4), grounded
// verbatim on the boost/flag rules this codebase's ML layer has always
// used for wallet scoring.

use crate::domain::FeatureVector;

/// Additive score in `[0, 100]`. Rules apply in the listed order; no
/// interpolation between thresholds.
pub fn score(f: &FeatureVector) -> f64 {
    let mut score = 0.0;

    let round_value_ratio = f.get("round_value_ratio");
    if round_value_ratio > 0.6 {
        score += 20.0;
    } else if round_value_ratio > 0.3 {
        score += 10.0;
    }

    let burst_ratio = f.get("burst_ratio");
    if burst_ratio > 0.5 {
        score += 25.0;
    } else if burst_ratio > 0.2 {
        score += 10.0;
    }

    let self_transfers = f.get("self_transfers");
    if self_transfers > 3.0 {
        score += 15.0;
    } else if self_transfers > 0.0 {
        score += 5.0;
    }

    let flow_ratio = f.get("flow_ratio");
    if flow_ratio > 5.0 {
        score += 20.0;
    } else if flow_ratio > 2.0 {
        score += 10.0;
    }

    if f.get("failed_tx_ratio") > 0.3 {
        score += 15.0;
    }

    if f.get("tx_count") > 20.0 && f.get("unique_counterparties") < 5.0 {
        score += 15.0;
    }

    let lifespan_days = f.get("lifespan_days");
    let tx_count = f.get("tx_count");
    if lifespan_days < 7.0 && tx_count > 30.0 {
        score += 20.0;
    }
    if lifespan_days < 3.0 && f.get("max_value") > 10.0 {
        score += 15.0;
    }

    score.min(100.0)
}

/// Human-readable flags independent of the numeric thresholds above (a
/// wider set of feature ranges surface as flags even when they don't add
/// to the score).
pub fn flags(f: &FeatureVector, heuristic_score: f64) -> Vec<String> {
    let mut flags = Vec::new();

    if f.get("burst_ratio") > 0.3 {
        flags.push("High frequency of rapid-succession transactions".to_string());
    }
    if f.get("round_value_ratio") > 0.5 {
        flags.push("Unusually high proportion of round-value transfers".to_string());
    }
    if f.get("self_transfers") > 0.0 {
        flags.push("Self-transfers detected".to_string());
    }
    if f.get("flow_ratio") > 3.0 {
        flags.push("Outflow significantly exceeds inflow".to_string());
    }
    if f.get("failed_tx_ratio") > 0.2 {
        flags.push("Elevated failed-transaction ratio".to_string());
    }
    if f.get("tx_count") > 20.0 && f.get("unique_counterparties") < 5.0 {
        flags.push("High transaction volume concentrated among few counterparties (cycling pattern)".to_string());
    }
    if f.get("lifespan_days") < 7.0 && f.get("tx_count") > 30.0 {
        flags.push("New account with disproportionately high activity".to_string());
    }
    if f.get("contract_call_ratio") > 0.8 {
        flags.push("Predominantly contract-interaction traffic".to_string());
    }
    if heuristic_score < 25.0 {
        flags.push("No significant anomalies detected".to_string());
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_caps_at_100() {
        let mut f = FeatureVector::zero();
        f.0[30] = 0.9; // round_value_ratio
        f.0[24] = 0.9; // burst_ratio
        f.0[18] = 5.0; // self_transfers
        f.0[6] = 10.0; // flow_ratio
        f.0[29] = 0.9; // failed_tx_ratio
        f.0[0] = 50.0; // tx_count
        f.0[14] = 1.0; // unique_counterparties
        f.0[20] = 1.0; // lifespan_days
        f.0[10] = 20.0; // max_value
        assert_eq!(score(&f), 100.0);
    }

    #[test]
    fn zero_vector_scores_zero() {
        let f = FeatureVector::zero();
        assert_eq!(score(&f), 0.0);
        assert!(flags(&f, 0.0).contains(&"No significant anomalies detected".to_string()));
    }

    #[test]
    fn round_value_laundering_scenario_scores_at_least_55() {
        // §8 scenario 4: 40 outbound txs of exactly 1.0 unit to 2
        // counterparties over 2 days.
        let mut f = FeatureVector::zero();
        f.0[0] = 40.0; // tx_count
        f.0[30] = 1.0; // round_value_ratio
        f.0[14] = 2.0; // unique_counterparties
        f.0[20] = 2.0; // lifespan_days
        f.0[10] = 1.0; // max_value
        let s = score(&f);
        assert!(s >= 55.0, "expected >= 55, got {s}");
    }
}
