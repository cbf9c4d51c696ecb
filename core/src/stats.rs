//! Statistics over the trial result set: percentile bands, tail-risk
//! measures, fan charts, histograms.
//!
//! Every function here is order-independent over its input: aggregates
//! never depend on the sequence trials completed in.

use serde::{Deserialize, Serialize};

/// Percentile bands plus moments and tail measures for one outcome
/// distribution (runway days or final balance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionStats {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub mean: f64,
    pub std_dev: f64,
    /// Worst-5% boundary (5th percentile).
    pub var95: f64,
    /// Mean of all values at or beyond the VaR95 boundary.
    pub cvar95: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceIntervals {
    pub runway_days: DistributionStats,
    pub final_balance: DistributionStats,
    /// Percent of paths whose runway fell short of the reference
    /// horizon, in [0, 100], rounded to 2 decimals.
    pub exhaustion_probability: f64,
}

/// Per-day percentile bands across all paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanChartBand {
    pub day: u32,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub bin_width: f64,
    pub counts: Vec<u32>,
}

/// Interpolated percentile over a pre-sorted ascending slice.
/// `p` is in [0, 100]. Empty input yields 0.0.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Fraction of runways shorter than the reference horizon, as a
/// percentage rounded to 2 decimals.
pub fn exhaustion_probability(runway_days: &[f64], reference_horizon: u32) -> f64 {
    if runway_days.is_empty() {
        return 0.0;
    }
    let short = runway_days
        .iter()
        .filter(|&&d| d < f64::from(reference_horizon))
        .count();
    let pct = short as f64 / runway_days.len() as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Full distribution stats over an unsorted value set.
pub fn distribution_stats(values: &[f64]) -> DistributionStats {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let var95 = percentile(&sorted, 5.0);
    // Tail values at or beyond the boundary. Sorted ascending, so the
    // tail is the leading run of values <= var95.
    let tail: Vec<f64> = sorted.iter().copied().filter(|&v| v <= var95).collect();
    let cvar95 = if tail.is_empty() { var95 } else { mean(&tail) };

    DistributionStats {
        p10: percentile(&sorted, 10.0),
        p25: percentile(&sorted, 25.0),
        p50: percentile(&sorted, 50.0),
        p75: percentile(&sorted, 75.0),
        p90: percentile(&sorted, 90.0),
        mean: mean(&sorted),
        std_dev: std_dev(&sorted),
        var95,
        cvar95,
    }
}

/// Per-day percentile bands across all paths' balance-at-day-N.
/// `paths` is one balance series per trial, all of equal length.
pub fn fan_chart(paths: &[Vec<f64>], horizon_days: u32) -> Vec<FanChartBand> {
    let mut bands = Vec::with_capacity(horizon_days as usize);
    let mut column = Vec::with_capacity(paths.len());
    for day in 0..horizon_days as usize {
        column.clear();
        column.extend(paths.iter().filter_map(|p| p.get(day).copied()));
        column.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        bands.push(FanChartBand {
            day: day as u32 + 1,
            p10: percentile(&column, 10.0),
            p25: percentile(&column, 25.0),
            p50: percentile(&column, 50.0),
            p75: percentile(&column, 75.0),
            p90: percentile(&column, 90.0),
        });
    }
    bands
}

/// Fixed-bin-count histogram. Degenerate (constant) inputs land in the
/// first bin.
pub fn histogram(values: &[f64], bins: usize) -> Histogram {
    let bins = bins.max(1);
    if values.is_empty() {
        return Histogram {
            min: 0.0,
            max: 0.0,
            bin_width: 0.0,
            counts: vec![0; bins],
        };
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    let bin_width = if span > 0.0 { span / bins as f64 } else { 0.0 };

    let mut counts = vec![0u32; bins];
    for &v in values {
        let idx = if bin_width > 0.0 {
            (((v - min) / bin_width) as usize).min(bins - 1)
        } else {
            0
        };
        counts[idx] += 1;
    }
    Histogram {
        min,
        max,
        bin_width,
        counts,
    }
}
