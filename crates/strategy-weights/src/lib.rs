use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signal_core::stats::{mean, std_dev};
use signal_core::OutcomeRecord;

/// Weight bounds. Jointly satisfiable with a sum of 1.0 for 4-20 strategies.
pub const MIN_WEIGHT: f64 = 0.05;
pub const MAX_WEIGHT: f64 = 0.30;

/// Momentum coefficient
const BETA: f64 = 0.9;

/// Initial learning rate, decayed as updates accumulate
const BASE_LR: f64 = 0.05;

/// Regularizer pulling weights toward uniform
const DECAY: f64 = 0.01;

/// Profit % at which a single outcome contributes a full unit gradient
const EXPECTED_PROFIT_PERCENT: f64 = 5.0;

/// Outcomes required before a strategy's weight moves (cold start)
const MIN_OUTCOMES: usize = 5;

/// Trailing window for the simplified Sharpe ratio
const SHARPE_WINDOW: usize = 30;

/// Trailing profits retained per strategy for stats
const PROFIT_HISTORY: usize = 100;

/// Realized performance of one strategy
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StrategyStats {
    pub outcomes: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    /// Simplified Sharpe: mean/std of trailing profit percents
    pub sharpe: f64,
}

#[derive(Debug, Clone)]
struct WeightEntry {
    weight: f64,
    momentum: f64,
    stats: StrategyStats,
    profits: VecDeque<f64>,
}

impl WeightEntry {
    fn new(weight: f64) -> Self {
        Self {
            weight,
            momentum: 0.0,
            stats: StrategyStats::default(),
            profits: VecDeque::with_capacity(PROFIT_HISTORY),
        }
    }

    fn record_profit(&mut self, profit_percent: f64) {
        self.profits.push_back(profit_percent);
        if self.profits.len() > PROFIT_HISTORY {
            self.profits.pop_front();
        }
        self.stats.outcomes += 1;

        let profits: Vec<f64> = self.profits.iter().copied().collect();
        let wins: Vec<f64> = profits.iter().copied().filter(|&p| p > 0.0).collect();
        let losses: Vec<f64> = profits.iter().copied().filter(|&p| p < 0.0).collect();

        self.stats.win_rate = if profits.is_empty() {
            0.0
        } else {
            wins.len() as f64 / profits.len() as f64
        };
        self.stats.avg_win = mean(&wins);
        self.stats.avg_loss = mean(&losses).abs();

        let gross_win: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().map(|l| -l).sum();
        self.stats.profit_factor = if gross_loss > f64::EPSILON {
            gross_win / gross_loss
        } else if gross_win > f64::EPSILON {
            f64::INFINITY
        } else {
            0.0
        };

        let start = profits.len().saturating_sub(SHARPE_WINDOW);
        let trailing = &profits[start..];
        let sd = std_dev(trailing);
        self.stats.sharpe = if sd > f64::EPSILON {
            mean(trailing) / sd
        } else {
            0.0
        };
    }
}

/// Read-only snapshot of the weight vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightSnapshot {
    pub weights: HashMap<String, f64>,
    pub stats: HashMap<String, StrategyStats>,
    pub updates: u64,
    pub taken_at: DateTime<Utc>,
}

/// Learns one normalized weight per contributing strategy from realized
/// outcomes, via gradient descent with momentum. The vector always sums to
/// 1.0 and every entry stays within [MIN_WEIGHT, MAX_WEIGHT].
pub struct WeightLearner {
    entries: HashMap<String, WeightEntry>,
    updates: u64,
}

impl WeightLearner {
    /// Create with equal initial weights for the known strategies.
    pub fn new<S: AsRef<str>>(strategy_ids: &[S]) -> Self {
        let n = strategy_ids.len().max(1);
        if !(4..=20).contains(&n) {
            tracing::warn!(
                strategies = n,
                "Weight bounds [{MIN_WEIGHT}, {MAX_WEIGHT}] are not jointly satisfiable \
                 with a unit sum for this strategy count"
            );
        }
        let uniform = 1.0 / n as f64;
        let entries = strategy_ids
            .iter()
            .map(|id| (id.as_ref().to_string(), WeightEntry::new(uniform)))
            .collect();
        Self {
            entries,
            updates: 0,
        }
    }

    fn uniform(&self) -> f64 {
        1.0 / self.entries.len().max(1) as f64
    }

    /// Feed one realized outcome into the learner. Stats always update;
    /// the weight only moves once the strategy has MIN_OUTCOMES recorded.
    pub fn record_outcome(&mut self, outcome: &OutcomeRecord) {
        let uniform = self.uniform();
        let entry = self
            .entries
            .entry(outcome.strategy_id.clone())
            .or_insert_with(|| WeightEntry::new(uniform));

        entry.record_profit(outcome.profit_percent);

        if entry.stats.outcomes < MIN_OUTCOMES {
            tracing::debug!(
                strategy = %outcome.strategy_id,
                outcomes = entry.stats.outcomes,
                "Cold start: weight unchanged"
            );
            return;
        }

        // Positive trailing Sharpe earns the full gradient; a negative one
        // halves it so a lucky win inside a bad run moves the weight less.
        let sharpe_scale = if entry.stats.sharpe > 0.0 { 1.0 } else { 0.5 };
        let gradient = (outcome.profit_percent / EXPECTED_PROFIT_PERCENT) * sharpe_scale;

        entry.momentum = BETA * entry.momentum + (1.0 - BETA) * gradient;

        let lr = BASE_LR / (1.0 + self.updates as f64 / 1000.0);
        entry.weight += lr * entry.momentum - DECAY * (entry.weight - uniform);

        self.updates += 1;
        self.renormalize();

        tracing::debug!(
            strategy = %outcome.strategy_id,
            profit = format!("{:.2}%", outcome.profit_percent),
            weight = format!("{:.3}", self.weight(&outcome.strategy_id)),
            "Weight updated"
        );
    }

    /// Administrative override: set a weight directly, then renormalize.
    pub fn set_weight(&mut self, strategy_id: &str, weight: f64) {
        let uniform = self.uniform();
        let entry = self
            .entries
            .entry(strategy_id.to_string())
            .or_insert_with(|| WeightEntry::new(uniform));
        entry.weight = weight.max(MIN_WEIGHT).min(MAX_WEIGHT);
        entry.momentum = 0.0;
        self.renormalize();
    }

    /// Reset every weight to uniform and zero all momentum. Performance
    /// stats are retained.
    pub fn reset(&mut self) {
        let uniform = self.uniform();
        for entry in self.entries.values_mut() {
            entry.weight = uniform;
            entry.momentum = 0.0;
        }
        tracing::info!("Weight vector reset to uniform");
    }

    pub fn weight(&self, strategy_id: &str) -> f64 {
        self.entries
            .get(strategy_id)
            .map(|e| e.weight)
            .unwrap_or(0.0)
    }

    pub fn stats(&self, strategy_id: &str) -> Option<StrategyStats> {
        self.entries.get(strategy_id).map(|e| e.stats)
    }

    pub fn snapshot(&self) -> WeightSnapshot {
        WeightSnapshot {
            weights: self
                .entries
                .iter()
                .map(|(id, e)| (id.clone(), e.weight))
                .collect(),
            stats: self
                .entries
                .iter()
                .map(|(id, e)| (id.clone(), e.stats))
                .collect(),
            updates: self.updates,
            taken_at: Utc::now(),
        }
    }

    /// Clamp every weight into bounds and rescale to a unit sum. The scale
    /// step can push an entry back out of bounds, so iterate; a few passes
    /// settle any feasible configuration.
    fn renormalize(&mut self) {
        for _ in 0..8 {
            for entry in self.entries.values_mut() {
                entry.weight = entry.weight.max(MIN_WEIGHT).min(MAX_WEIGHT);
            }
            let sum: f64 = self.entries.values().map(|e| e.weight).sum();
            if sum <= f64::EPSILON {
                let uniform = self.uniform();
                for entry in self.entries.values_mut() {
                    entry.weight = uniform;
                }
                return;
            }
            if (sum - 1.0).abs() < 1e-9 {
                return;
            }
            for entry in self.entries.values_mut() {
                entry.weight /= sum;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use signal_core::{Direction, QualityTier, ResolutionReason};
    use uuid::Uuid;

    const STRATEGIES: [&str; 5] = ["momentum", "mean_reversion", "breakout", "volume", "pattern"];

    fn outcome(strategy_id: &str, profit_percent: f64) -> OutcomeRecord {
        OutcomeRecord {
            signal_id: Uuid::new_v4(),
            symbol: "BTC".to_string(),
            strategy_id: strategy_id.to_string(),
            direction: Direction::Long,
            exit_price: 100.0,
            profit_percent,
            max_drawdown_percent: 1.0,
            duration_minutes: 120,
            reason: if profit_percent > 0.0 {
                ResolutionReason::TargetHit
            } else {
                ResolutionReason::StopHit
            },
            predicted_confidence: 75.0,
            tier: QualityTier::High,
            resolved_at: Utc::now(),
        }
    }

    fn assert_invariants(learner: &WeightLearner) {
        let snapshot = learner.snapshot();
        let sum: f64 = snapshot.weights.values().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-6);
        for (id, w) in &snapshot.weights {
            assert!(
                (MIN_WEIGHT - 1e-9..=MAX_WEIGHT + 1e-9).contains(w),
                "{id} out of bounds: {w}"
            );
        }
    }

    #[test]
    fn test_initial_weights_uniform() {
        let learner = WeightLearner::new(&STRATEGIES);
        for id in STRATEGIES {
            assert_relative_eq!(learner.weight(id), 0.2, epsilon = 1e-9);
        }
        assert_invariants(&learner);
    }

    #[test]
    fn test_cold_start_keeps_weight() {
        let mut learner = WeightLearner::new(&STRATEGIES);
        for _ in 0..4 {
            learner.record_outcome(&outcome("momentum", 8.0));
        }
        assert_relative_eq!(learner.weight("momentum"), 0.2, epsilon = 1e-9);
        // Fifth outcome crosses the cold-start line
        learner.record_outcome(&outcome("momentum", 8.0));
        assert!(learner.weight("momentum") > 0.2);
        assert_invariants(&learner);
    }

    #[test]
    fn test_invariants_hold_over_mixed_sequence() {
        let mut learner = WeightLearner::new(&STRATEGIES);
        let profits = [4.0, -2.5, 7.0, -1.0, 3.0, -6.0, 2.0, 9.0, -3.0, 1.5];
        for (i, p) in profits.iter().cycle().take(200).enumerate() {
            let id = STRATEGIES[i % STRATEGIES.len()];
            learner.record_outcome(&outcome(id, *p));
            assert_invariants(&learner);
        }
    }

    #[test]
    fn test_losing_strategy_decays_toward_floor() {
        let mut learner = WeightLearner::new(&STRATEGIES);
        let before_idle = learner.weight("mean_reversion");
        for _ in 0..60 {
            learner.record_outcome(&outcome("momentum", -5.0));
        }
        let loser = learner.weight("momentum");
        assert!(loser < 0.2);
        assert!(loser >= MIN_WEIGHT - 1e-9);
        // Idle strategies gained only through renormalization
        assert!(learner.weight("mean_reversion") >= before_idle);
        assert_eq!(learner.stats("mean_reversion").unwrap().outcomes, 0);
        assert_invariants(&learner);
    }

    #[test]
    fn test_stats_tracking() {
        let mut learner = WeightLearner::new(&STRATEGIES);
        learner.record_outcome(&outcome("breakout", 6.0));
        learner.record_outcome(&outcome("breakout", -3.0));
        learner.record_outcome(&outcome("breakout", 6.0));

        let stats = learner.stats("breakout").unwrap();
        assert_eq!(stats.outcomes, 3);
        assert_relative_eq!(stats.win_rate, 2.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(stats.avg_win, 6.0, epsilon = 1e-9);
        assert_relative_eq!(stats.avg_loss, 3.0, epsilon = 1e-9);
        assert_relative_eq!(stats.profit_factor, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_override_and_reset() {
        let mut learner = WeightLearner::new(&STRATEGIES);
        learner.set_weight("momentum", 0.30);
        assert_invariants(&learner);
        assert!(learner.weight("momentum") > learner.weight("breakout"));

        learner.reset();
        for id in STRATEGIES {
            assert_relative_eq!(learner.weight(id), 0.2, epsilon = 1e-9);
        }
    }
}
