// src/eval/report.rs
//
// Markdown/JSON rendering for a `TrainResult` (spec §4.13 evaluation
// output). Grounded on this codebase's eval/report module, narrowed from a
// per-worker-precision/recall table and ROC-histogram approximation to the
// supervised trainer's directly-computed confusion matrix, ROC-AUC and
// feature importances.

use super::TrainResult;

pub fn print_markdown(result: &TrainResult) {
    println!("\n# Supervised Trainer Evaluation Report\n");
    println!(
        "**Train rows**: {}  **Test rows**: {}",
        result.n_train, result.n_test
    );
    println!();
    println!("| Metric    | Value  |");
    println!("|-----------|--------|");
    println!("| Accuracy  | {:.4}  |", result.accuracy);
    println!("| Precision | {:.4}  |", result.precision);
    println!("| Recall    | {:.4}  |", result.recall);
    println!("| ROC-AUC   | {:.4}  |", result.roc_auc);
    println!();

    println!("### Confusion Matrix\n");
    println!("|            | Predicted Healthy | Predicted Scam |");
    println!("|------------|--------------------|-----------------|");
    println!(
        "| Actual Healthy | {:18} | {:15} |",
        result.confusion_matrix[0][0], result.confusion_matrix[0][1]
    );
    println!(
        "| Actual Scam    | {:18} | {:15} |",
        result.confusion_matrix[1][0], result.confusion_matrix[1][1]
    );
    println!();

    println!("### Feature Importances\n");
    let mut ranked: Vec<(&String, &f64)> = result.feature_importances.iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap());
    for (name, importance) in ranked {
        let bar_len = (importance * 80.0).round() as usize;
        println!("{:28} | {:.4} | {}", name, importance, "#".repeat(bar_len));
    }
}

pub fn to_json(result: &TrainResult) -> String {
    serde_json::to_string(result).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_result() -> TrainResult {
        let mut feature_importances = BTreeMap::new();
        feature_importances.insert("fan_in".to_string(), 0.6);
        feature_importances.insert("fan_out".to_string(), 0.4);
        TrainResult {
            n_train: 80,
            n_test: 20,
            accuracy: 0.9,
            precision: 0.85,
            recall: 0.8,
            roc_auc: 0.92,
            confusion_matrix: [[9, 1], [2, 8]],
            feature_importances,
        }
    }

    #[test]
    fn to_json_round_trips_core_fields() {
        let result = sample_result();
        let json = to_json(&result);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["n_train"], 80);
        assert_eq!(parsed["roc_auc"], 0.92);
    }
}
