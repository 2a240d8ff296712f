/// Rolling-statistics helpers shared by the regime classifier and the
/// threshold engine.
///
/// Thresholds in this core are data-driven rather than hardcoded: a metric's
/// own 7/30/90-day distribution decides how far its current value has
/// drifted, so a naturally-noisy metric is not penalized by limits tuned for
/// a quiet one.

/// Mean of a data slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample standard deviation.
pub fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    let variance = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    variance.sqrt()
}

/// Z-score of `value` relative to `data`; 0.0 when the data has no variance.
pub fn z_score_of(value: f64, data: &[f64]) -> f64 {
    let sd = std_dev(data);
    if sd < f64::EPSILON {
        return 0.0;
    }
    (value - mean(data)) / sd
}

/// Percentile value from data (pct on a 0-100 scale). Clones and sorts.
pub fn percentile_value(data: &[f64], pct: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((pct / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Exponential moving average of the series, returning the final EMA value.
/// Seeds with the simple mean of the first `period` points.
pub fn ema(data: &[f64], period: usize) -> f64 {
    if data.is_empty() || period == 0 {
        return 0.0;
    }
    if data.len() <= period {
        return mean(data);
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut value = mean(&data[..period]);
    for x in &data[period..] {
        value = x * k + value * (1.0 - k);
    }
    value
}

/// Relative Strength Index over the last `period` changes (0-100).
/// Returns 50.0 (neutral) with insufficient data.
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if closes.len() < period + 1 {
        return 50.0;
    }
    let changes: Vec<f64> = closes
        .windows(2)
        .map(|w| w[1] - w[0])
        .collect();
    let recent = &changes[changes.len() - period..];
    let gains: f64 = recent.iter().filter(|&&c| c > 0.0).sum();
    let losses: f64 = recent.iter().filter(|&&c| c < 0.0).map(|c| -c).sum();
    if losses < f64::EPSILON {
        return if gains > f64::EPSILON { 100.0 } else { 50.0 };
    }
    let rs = (gains / period as f64) / (losses / period as f64);
    100.0 - (100.0 / (1.0 + rs))
}

/// Clamp helper used by the multiplier chains.
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}
