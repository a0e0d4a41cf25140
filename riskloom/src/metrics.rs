// src/metrics.rs
//
// Structured operational counters (ambient §4/§7 observability concern, no
// Non-goal excludes it): throughput, risk-label distribution, per-detector
// degradation counts and cache hit rate. Grounded on this codebase's
// metrics registry (atomics behind an `Arc`, one `record_*` method per
// event kind) — narrowed from a Prometheus `/metrics` HTTP exporter to
// periodic structured `tracing` events, since this crate ships no HTTP
// surface of its own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::domain::RiskLabel;

pub struct RiskLoomMetrics {
    analyses_total: AtomicU64,
    label_no_data: AtomicU64,
    label_low: AtomicU64,
    label_medium: AtomicU64,
    label_high: AtomicU64,
    label_critical: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    detector_degradations: Mutex<HashMap<String, u64>>,
}

impl RiskLoomMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(RiskLoomMetrics {
            analyses_total: AtomicU64::new(0),
            label_no_data: AtomicU64::new(0),
            label_low: AtomicU64::new(0),
            label_medium: AtomicU64::new(0),
            label_high: AtomicU64::new(0),
            label_critical: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            detector_degradations: Mutex::new(HashMap::new()),
        })
    }

    pub fn record_analysis(&self, label: RiskLabel) {
        self.analyses_total.fetch_add(1, Ordering::Relaxed);
        let counter = match label {
            RiskLabel::NoData => &self.label_no_data,
            RiskLabel::Low => &self.label_low,
            RiskLabel::Medium => &self.label_medium,
            RiskLabel::High => &self.label_high,
            RiskLabel::Critical => &self.label_critical,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Recorded whenever a detector returns `DetectorInternal` and the
    /// orchestrator degrades that detector's contribution rather than
    /// aborting the whole analysis.
    pub fn record_detector_degradation(&self, detector: &str) {
        if let Ok(mut map) = self.detector_degradations.lock() {
            *map.entry(detector.to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed) as f64;
        let misses = self.cache_misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Emits one `tracing::info!` event carrying every counter. Intended to
    /// be called periodically (a batch worker pool tick, a CLI run's
    /// completion) rather than on a fixed schedule of its own.
    pub fn log_snapshot(&self) {
        let degradations = self.detector_degradations.lock().map(|m| m.clone()).unwrap_or_default();
        info!(
            analyses_total = self.analyses_total.load(Ordering::Relaxed),
            label_no_data = self.label_no_data.load(Ordering::Relaxed),
            label_low = self.label_low.load(Ordering::Relaxed),
            label_medium = self.label_medium.load(Ordering::Relaxed),
            label_high = self.label_high.load(Ordering::Relaxed),
            label_critical = self.label_critical.load(Ordering::Relaxed),
            cache_hit_rate = self.cache_hit_rate(),
            detector_degradations = ?degradations,
            "riskloom metrics snapshot"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_hit_rate_is_zero_with_no_activity() {
        let metrics = RiskLoomMetrics::new();
        assert_eq!(metrics.cache_hit_rate(), 0.0);
    }

    #[test]
    fn cache_hit_rate_reflects_hits_and_misses() {
        let metrics = RiskLoomMetrics::new();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        assert!((metrics.cache_hit_rate() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn record_analysis_buckets_by_label() {
        let metrics = RiskLoomMetrics::new();
        metrics.record_analysis(RiskLabel::Critical);
        metrics.record_analysis(RiskLabel::Critical);
        metrics.record_analysis(RiskLabel::Low);
        assert_eq!(metrics.label_critical.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.label_low.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.analyses_total.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn detector_degradation_counts_accumulate_per_name() {
        let metrics = RiskLoomMetrics::new();
        metrics.record_detector_degradation("bridge");
        metrics.record_detector_degradation("bridge");
        metrics.record_detector_degradation("mev");
        let map = metrics.detector_degradations.lock().unwrap();
        assert_eq!(map["bridge"], 2);
        assert_eq!(map["mev"], 1);
    }
}
