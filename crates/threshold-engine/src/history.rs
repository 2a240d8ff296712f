use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use signal_core::stats::{mean, percentile_value, std_dev, z_score_of};

/// Retention horizon for threshold history
const RETENTION_DAYS: i64 = 90;

/// Summary statistics over one rolling window
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WindowStats {
    pub mean: f64,
    pub std_dev: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub samples: usize,
}

impl WindowStats {
    fn from_values(values: &[f64]) -> Self {
        Self {
            mean: mean(values),
            std_dev: std_dev(values),
            p25: percentile_value(values, 25.0),
            p50: percentile_value(values, 50.0),
            p75: percentile_value(values, 75.0),
            samples: values.len(),
        }
    }
}

/// Stats over the 7/30/90-day windows of one guarded metric
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WindowSet {
    pub d7: WindowStats,
    pub d30: WindowStats,
    pub d90: WindowStats,
}

/// Timestamped history of computed threshold values for one metric,
/// pruned past 90 days.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollingHistory {
    entries: Vec<(DateTime<Utc>, f64)>,
}

impl RollingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, at: DateTime<Utc>, value: f64) {
        self.entries.push((at, value));
        self.prune(at);
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::days(RETENTION_DAYS);
        self.entries.retain(|(at, _)| *at >= cutoff);
    }

    fn window_values(&self, now: DateTime<Utc>, days: i64) -> Vec<f64> {
        let cutoff = now - Duration::days(days);
        self.entries
            .iter()
            .filter(|(at, _)| *at >= cutoff)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn window_set(&self, now: DateTime<Utc>) -> WindowSet {
        WindowSet {
            d7: WindowStats::from_values(&self.window_values(now, 7)),
            d30: WindowStats::from_values(&self.window_values(now, 30)),
            d90: WindowStats::from_values(&self.window_values(now, 90)),
        }
    }

    /// Z-score of `value` against the 30-day window. Requires a handful of
    /// samples before reporting anything but neutral.
    pub fn z_score_30d(&self, now: DateTime<Utc>, value: f64) -> f64 {
        let values = self.window_values(now, 30);
        if values.len() < 5 {
            return 0.0;
        }
        z_score_of(value, &values)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
