use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regime_classifier::MarketRegime;
use serde::{Deserialize, Serialize};
use signal_core::stats::clamp;

mod history;

pub use history::{RollingHistory, WindowSet, WindowStats};

/// Cap on the market-condition multiplier deviation
const MARKET_CAP: f64 = 0.20;

/// Cap on the statistical pull-back-to-mean adjustment
const STATISTICAL_CAP: f64 = 0.20;

/// Z-score sensitivity of the statistical adjustment
const STATISTICAL_GAIN: f64 = 0.08;

/// The five admission metrics guarded by adaptive thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuardedMetric {
    PatternStrength,
    Consensus,
    RiskReward,
    LiquidityFloor,
    DataQualityFloor,
}

impl GuardedMetric {
    pub const ALL: [GuardedMetric; 5] = [
        GuardedMetric::PatternStrength,
        GuardedMetric::Consensus,
        GuardedMetric::RiskReward,
        GuardedMetric::LiquidityFloor,
        GuardedMetric::DataQualityFloor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GuardedMetric::PatternStrength => "pattern_strength",
            GuardedMetric::Consensus => "consensus",
            GuardedMetric::RiskReward => "risk_reward",
            GuardedMetric::LiquidityFloor => "liquidity_floor",
            GuardedMetric::DataQualityFloor => "data_quality_floor",
        }
    }

    /// Base threshold before any adaptation
    pub fn base_value(&self) -> f64 {
        match self {
            GuardedMetric::PatternStrength => 65.0,
            GuardedMetric::Consensus => 60.0,
            GuardedMetric::RiskReward => 1.5,
            GuardedMetric::LiquidityFloor => 40.0,
            GuardedMetric::DataQualityFloor => 70.0,
        }
    }
}

/// One adapted threshold with full derivation context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptedThreshold {
    pub metric: GuardedMetric,
    pub base: f64,
    pub market_multiplier: f64,
    pub regime_multiplier: f64,
    pub progress_multiplier: f64,
    /// Pull-back-to-mean correction, applied as (1 + adjustment)
    pub statistical_adjustment: f64,
    pub value: f64,
    pub windows: WindowSet,
}

/// Fully populated set of adapted thresholds for one decision cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub thresholds: HashMap<GuardedMetric, AdaptedThreshold>,
    pub regime: MarketRegime,
    pub market_score: f64,
    pub computed_at: DateTime<Utc>,
}

impl ThresholdSet {
    pub fn value(&self, metric: GuardedMetric) -> f64 {
        self.thresholds
            .get(&metric)
            .map(|t| t.value)
            .unwrap_or_else(|| metric.base_value())
    }

    /// Neutral set used before the first computation cycle.
    pub fn defaults(regime: MarketRegime) -> Self {
        let mut thresholds = HashMap::new();
        for metric in GuardedMetric::ALL {
            thresholds.insert(
                metric,
                AdaptedThreshold {
                    metric,
                    base: metric.base_value(),
                    market_multiplier: 1.0,
                    regime_multiplier: 1.0,
                    progress_multiplier: 1.0,
                    statistical_adjustment: 0.0,
                    value: metric.base_value(),
                    windows: WindowSet::default(),
                },
            );
        }
        Self {
            thresholds,
            regime,
            market_score: 50.0,
            computed_at: Utc::now(),
        }
    }
}

/// Inputs to one threshold computation cycle
#[derive(Debug, Clone, Copy)]
pub struct ThresholdInputs {
    /// Market composite score 0-100 (50 = neutral)
    pub market_score: f64,
    pub regime: MarketRegime,
    /// Performance progress: -1 (far behind target) to +1 (far ahead).
    /// Sourced from the external account collaborator; 0 = on schedule.
    pub progress: f64,
    /// Days left in the evaluation period
    pub days_remaining: u32,
    pub now: DateTime<Utc>,
}

/// Adapts the five guarded admission thresholds to market conditions.
///
/// `compute` is pure given the inputs and the accumulated history; `record`
/// feeds a computed set back into the rolling windows once per decision
/// cycle. Keeping those separate is what makes repeated computation with
/// unchanged inputs idempotent.
pub struct ThresholdCalculator {
    histories: HashMap<GuardedMetric, RollingHistory>,
}

impl ThresholdCalculator {
    pub fn new() -> Self {
        let histories = GuardedMetric::ALL
            .iter()
            .map(|m| (*m, RollingHistory::new()))
            .collect();
        Self { histories }
    }

    pub fn compute(&self, inputs: &ThresholdInputs) -> ThresholdSet {
        let market = market_multiplier(inputs.market_score);
        let regime = regime_multiplier(inputs.regime);
        let progress = progress_multiplier(inputs.progress, inputs.days_remaining);

        let mut thresholds = HashMap::new();
        for metric in GuardedMetric::ALL {
            let base = metric.base_value();
            let unadjusted = base * market * regime * progress;

            let history = &self.histories[&metric];
            let z = history.z_score_30d(inputs.now, unadjusted);
            // Bollinger-style correction: a value sitting above its 30-day
            // mean is pulled back down, and vice versa.
            let statistical = clamp(-z * STATISTICAL_GAIN, -STATISTICAL_CAP, STATISTICAL_CAP);

            thresholds.insert(
                metric,
                AdaptedThreshold {
                    metric,
                    base,
                    market_multiplier: market,
                    regime_multiplier: regime,
                    progress_multiplier: progress,
                    statistical_adjustment: statistical,
                    value: unadjusted * (1.0 + statistical),
                    windows: history.window_set(inputs.now),
                },
            );
        }

        ThresholdSet {
            thresholds,
            regime: inputs.regime,
            market_score: inputs.market_score,
            computed_at: inputs.now,
        }
    }

    /// Store a computed set's pre-adjustment values into the rolling windows
    /// for future z-score computation. Called once per decision cycle.
    pub fn record(&mut self, set: &ThresholdSet) {
        for (metric, threshold) in &set.thresholds {
            let unadjusted = threshold.base
                * threshold.market_multiplier
                * threshold.regime_multiplier
                * threshold.progress_multiplier;
            if let Some(history) = self.histories.get_mut(metric) {
                history.push(set.computed_at, unadjusted);
            }
        }
        tracing::debug!(
            regime = set.regime.name(),
            market_score = format!("{:.0}", set.market_score),
            pattern = format!("{:.1}", set.value(GuardedMetric::PatternStrength)),
            consensus = format!("{:.1}", set.value(GuardedMetric::Consensus)),
            risk_reward = format!("{:.2}", set.value(GuardedMetric::RiskReward)),
            "Threshold set recorded"
        );
    }

    /// Convenience for the per-cycle path: compute, then record.
    pub fn compute_and_record(&mut self, inputs: &ThresholdInputs) -> ThresholdSet {
        let set = self.compute(inputs);
        self.record(&set);
        set
    }
}

impl Default for ThresholdCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear in the composite score's deviation from 50, clamped to +/-20%.
/// A strong market (score > 50) loosens thresholds.
fn market_multiplier(market_score: f64) -> f64 {
    let deviation = (clamp(market_score, 0.0, 100.0) - 50.0) / 50.0;
    clamp(1.0 - deviation * MARKET_CAP, 1.0 - MARKET_CAP, 1.0 + MARKET_CAP)
}

/// Fixed per-regime table: looser in trending and low-volatility regimes,
/// stricter in choppy and high-volatility ones.
fn regime_multiplier(regime: MarketRegime) -> f64 {
    match regime {
        MarketRegime::BullMomentum | MarketRegime::BearMomentum => 0.90,
        MarketRegime::BullRange | MarketRegime::BearRange => 1.00,
        MarketRegime::Accumulation => 0.95,
        MarketRegime::VolatileBreakout => 1.10,
        MarketRegime::Choppy => 1.20,
    }
}

/// Fixed band table on the progress scalar: lenient when behind schedule
/// with little time left, stricter when far ahead of target.
fn progress_multiplier(progress: f64, days_remaining: u32) -> f64 {
    if progress <= -0.5 && days_remaining <= 7 {
        0.80
    } else if progress <= -0.25 {
        0.90
    } else if progress >= 0.5 {
        1.20
    } else if progress >= 0.25 {
        1.10
    } else {
        1.00
    }
}
