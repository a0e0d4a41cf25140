// src/detectors/temporal.rs
//
// Temporal Detector (spec §4.7): rolling statistics over a zero-filled
// daily activity series — separate z-score series for transaction count
// and volume, CUSUM change-point detection on both, an EMA crossover
// regime signal on transaction count, and a raw-timestamp burst/gap
// analysis. Grounded on this codebase's time-series anomaly workers
// (windowed z-score plus reset-on-detect CUSUM), generalised from
// per-event windows to per-wallet daily buckets.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::DailyBucket;

const ROLLING_WINDOW: usize = 7;
const TX_COUNT_Z_THRESHOLD: f64 = 2.5;
const VOLUME_Z_THRESHOLD: f64 = 2.0;
const CUSUM_DRIFT: f64 = 0.5;
const CUSUM_THRESHOLD_TX_COUNT: f64 = 5.0;
const CUSUM_THRESHOLD_VOLUME: f64 = 4.0;
const EMA_SHORT_SPAN: usize = 3;
const EMA_LONG_SPAN: usize = 10;
const BURST_GAP_SECONDS: i64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalResult {
    pub anomaly_score: f64,
    pub tx_count_z_anomalies: Vec<String>,
    pub volume_z_anomalies: Vec<String>,
    pub cusum_breach_dates: Vec<String>,
    pub regime: Regime,
    pub burst_count: u32,
    pub burst_longest_streak: u32,
    pub burst_mean_gap_seconds: f64,
    pub burst_percent: f64,
    pub daily_buckets: Vec<DailyBucket>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Quiet,
    Accelerating,
    Decelerating,
}

/// `daily_events` are `(date, tx_count, volume_eth, in_count, out_count,
/// unique_counterparties)` one-per-day, not necessarily contiguous — gap
/// days are zero-filled before statistics are computed. `tx_timestamps` are
/// every transaction the wallet touched in either direction, used for the
/// burst/gap analysis, which needs finer resolution than a daily bucket can
/// give it.
pub fn analyze(mut daily_events: Vec<(NaiveDate, u32, f64, u32, u32, u32)>, tx_timestamps: &[DateTime<Utc>]) -> TemporalResult {
    daily_events.sort_by_key(|e| e.0);

    let buckets = zero_fill(&daily_events);
    let volumes: Vec<f64> = buckets.iter().map(|b| b.volume_eth).collect();
    let counts: Vec<f64> = buckets.iter().map(|b| b.tx_count as f64).collect();

    let tx_count_z_anomalies = rolling_z_anomalies(&buckets, &counts, TX_COUNT_Z_THRESHOLD);
    let volume_z_anomalies = rolling_z_anomalies(&buckets, &volumes, VOLUME_Z_THRESHOLD);

    let tx_count_breaches = cusum_breaches(&buckets, &counts, CUSUM_THRESHOLD_TX_COUNT);
    let volume_breaches = cusum_breaches(&buckets, &volumes, CUSUM_THRESHOLD_VOLUME);
    let mut cusum_breach_dates: Vec<String> = tx_count_breaches.into_iter().chain(volume_breaches).collect();
    cusum_breach_dates.sort();
    cusum_breach_dates.dedup();

    let regime = ema_crossover(&counts);
    let (burst_count, burst_longest_streak, burst_mean_gap_seconds, burst_percent) = burst_analysis(tx_timestamps);

    let z_component = (tx_count_z_anomalies.len() as f64 * 5.0).min(25.0);
    let volume_component = (volume_z_anomalies.len() as f64 * 5.0).min(20.0);
    let change_point_component = (cusum_breach_dates.len() as f64 * 8.0).min(20.0);
    let regime_component = if regime == Regime::Quiet { 0.0 } else { 15.0 };
    let burst_component = if burst_percent > 50.0 {
        20.0
    } else if burst_percent > 25.0 {
        12.0
    } else if burst_percent > 10.0 {
        6.0
    } else {
        0.0
    };

    let anomaly_score =
        (z_component + volume_component + change_point_component + regime_component + burst_component).clamp(0.0, 100.0);

    TemporalResult {
        anomaly_score,
        tx_count_z_anomalies,
        volume_z_anomalies,
        cusum_breach_dates,
        regime,
        burst_count,
        burst_longest_streak,
        burst_mean_gap_seconds,
        burst_percent,
        daily_buckets: buckets,
    }
}

fn zero_fill(events: &[(NaiveDate, u32, f64, u32, u32, u32)]) -> Vec<DailyBucket> {
    if events.is_empty() {
        return Vec::new();
    }
    let start = events.first().unwrap().0;
    let end = events.last().unwrap().0;

    let mut by_date = std::collections::HashMap::new();
    for e in events {
        by_date.insert(e.0, *e);
    }

    let mut out = Vec::new();
    let mut day = start;
    while day <= end {
        let bucket = match by_date.get(&day) {
            Some((_, tx_count, volume, in_c, out_c, unique_cp)) => DailyBucket {
                date: day.format("%Y-%m-%d").to_string(),
                tx_count: *tx_count,
                volume_eth: *volume,
                in_count: *in_c,
                out_count: *out_c,
                unique_counterparties: *unique_cp,
            },
            None => DailyBucket {
                date: day.format("%Y-%m-%d").to_string(),
                tx_count: 0,
                volume_eth: 0.0,
                in_count: 0,
                out_count: 0,
                unique_counterparties: 0,
            },
        };
        out.push(bucket);
        day += Duration::days(1);
    }
    out
}

/// Rolling 7-day z-score against a series' own trailing window; a day more
/// than `threshold` standard deviations from its window mean is flagged.
/// The first [`ROLLING_WINDOW`] days have no trailing window and are never
/// flagged.
fn rolling_z_anomalies(buckets: &[DailyBucket], series: &[f64], threshold: f64) -> Vec<String> {
    let mut flagged = Vec::new();
    for i in ROLLING_WINDOW..series.len() {
        let window = &series[i - ROLLING_WINDOW..i];
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / window.len() as f64;
        let std = var.sqrt();
        if std < 1e-9 {
            continue;
        }
        let z = (series[i] - mean) / std;
        if z.abs() > threshold {
            flagged.push(buckets[i].date.clone());
        }
    }
    flagged
}

/// Two-sided CUSUM over standardized deviations from the series' global
/// mean, with drift `k` and decision interval `h`. Resets to zero
/// immediately after a breach so a single sustained shift doesn't
/// re-trigger every subsequent day.
fn cusum_breaches(buckets: &[DailyBucket], series: &[f64], threshold: f64) -> Vec<String> {
    if series.is_empty() {
        return Vec::new();
    }
    let mean = series.iter().sum::<f64>() / series.len() as f64;
    let std = {
        let var = series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / series.len() as f64;
        var.sqrt().max(1e-9)
    };

    let mut s_hi = 0.0;
    let mut s_lo = 0.0;
    let mut breaches = Vec::new();

    for (i, &v) in series.iter().enumerate() {
        let standardized = (v - mean) / std;
        s_hi = (s_hi + standardized - CUSUM_DRIFT).max(0.0);
        s_lo = (s_lo - standardized - CUSUM_DRIFT).max(0.0);

        if s_hi > threshold || s_lo > threshold {
            breaches.push(buckets[i].date.clone());
            s_hi = 0.0;
            s_lo = 0.0;
        }
    }
    breaches
}

/// Short-span EMA vs long-span EMA crossover on the tx-count series only,
/// evaluated solely once at least `EMA_LONG_SPAN + 2` points exist — fewer
/// points than that and the long EMA hasn't stabilized enough to trust.
fn ema_crossover(counts: &[f64]) -> Regime {
    if counts.len() < EMA_LONG_SPAN + 2 {
        return Regime::Quiet;
    }
    let short = ema(counts, EMA_SHORT_SPAN);
    let long = ema(counts, EMA_LONG_SPAN);
    let (Some(&s), Some(&l)) = (short.last(), long.last()) else {
        return Regime::Quiet;
    };
    if l.abs() < 1e-9 {
        return Regime::Quiet;
    }
    let ratio = (s - l) / l;
    if ratio > 0.10 {
        Regime::Accelerating
    } else if ratio < -0.10 {
        Regime::Decelerating
    } else {
        Regime::Quiet
    }
}

fn ema(xs: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(xs.len());
    let mut prev = xs[0];
    out.push(prev);
    for &x in &xs[1..] {
        prev = alpha * x + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Gap analysis over every transaction timestamp the wallet touched, in
/// either direction, sorted into a single union series. A gap below
/// [`BURST_GAP_SECONDS`] counts as a burst; the longest streak is the
/// longest run of consecutive burst gaps.
fn burst_analysis(timestamps: &[DateTime<Utc>]) -> (u32, u32, f64, f64) {
    let mut ts: Vec<DateTime<Utc>> = timestamps.to_vec();
    ts.sort();
    ts.dedup();

    if ts.len() < 2 {
        return (0, 0, 0.0, 0.0);
    }

    let gaps: Vec<i64> = ts.windows(2).map(|w| (w[1] - w[0]).num_seconds()).collect();
    let total_gaps = gaps.len();

    let mut burst_count = 0u32;
    let mut longest_streak = 0u32;
    let mut current_streak = 0u32;
    let mut burst_gap_sum = 0i64;

    for &gap in &gaps {
        if gap < BURST_GAP_SECONDS {
            burst_count += 1;
            burst_gap_sum += gap;
            current_streak += 1;
            longest_streak = longest_streak.max(current_streak);
        } else {
            current_streak = 0;
        }
    }

    let mean_gap = if burst_count > 0 { burst_gap_sum as f64 / burst_count as f64 } else { 0.0 };
    let percent = burst_count as f64 / total_gaps as f64 * 100.0;

    (burst_count, longest_streak, mean_gap, percent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn gaps_are_zero_filled() {
        let events = vec![
            (date("2024-01-01"), 5, 1.0, 2, 3, 2),
            (date("2024-01-04"), 3, 0.5, 1, 2, 1),
        ];
        let result = analyze(events, &[]);
        assert_eq!(result.daily_buckets.len(), 4);
        assert_eq!(result.daily_buckets[1].tx_count, 0);
        assert_eq!(result.daily_buckets[2].tx_count, 0);
    }

    #[test]
    fn empty_history_produces_zero_score() {
        let result = analyze(vec![], &[]);
        assert_eq!(result.anomaly_score, 0.0);
        assert!(result.daily_buckets.is_empty());
    }

    #[test]
    fn sudden_volume_spike_trips_cusum() {
        let mut events = Vec::new();
        let base = date("2024-01-01");
        for i in 0..20 {
            events.push((base + Duration::days(i), 2, 1.0, 1, 1, 1));
        }
        events.push((base + Duration::days(20), 50, 500.0, 1, 1, 1));
        let result = analyze(events, &[]);
        assert!(!result.cusum_breach_dates.is_empty());
    }

    #[test]
    fn tight_clustered_timestamps_flag_as_bursty() {
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let ts: Vec<DateTime<Utc>> = (0..10).map(|i| base + Duration::seconds(i * 30)).collect();
        let result = analyze(vec![], &ts);
        assert_eq!(result.burst_count, 9);
        assert_eq!(result.burst_percent, 100.0);
        assert!(result.anomaly_score >= 20.0);
    }

    #[test]
    fn sparse_timestamps_produce_no_bursts() {
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let ts = vec![base, base + Duration::days(1), base + Duration::days(2)];
        let result = analyze(vec![], &ts);
        assert_eq!(result.burst_count, 0);
        assert_eq!(result.burst_percent, 0.0);
    }
}
