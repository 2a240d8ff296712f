use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use regime_classifier::RegimeSnapshot;
use serde::{Deserialize, Serialize};
use signal_core::{CandidateSignal, Priority, QualityTier};
use threshold_engine::{GuardedMetric, ThresholdSet};

use crate::dedup::DedupCache;

const MAX_REJECTION_LOG: usize = 500;

/// Runtime-adjustable gate configuration. Serialized to the snapshot store
/// by the engine so it survives restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub accept_high: bool,
    pub accept_medium: bool,
    /// Off by default in strict configurations
    pub accept_low: bool,
    /// HIGH-tier candidates can be downgraded to Medium priority
    pub high_tier_priority: Priority,
    pub dedup_window_hours: i64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            accept_high: true,
            accept_medium: true,
            accept_low: false,
            high_tier_priority: Priority::High,
            dedup_window_hours: 24,
        }
    }
}

/// Why a candidate was turned away
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RejectReason {
    /// Same (symbol, direction) admitted inside the dedup window
    Duplicate { remaining_minutes: i64 },
    /// The candidate's tier is disabled in the gate configuration
    TierDisabled { tier: QualityTier },
    /// A guarded metric fell below its adapted threshold
    BelowThreshold {
        metric: GuardedMetric,
        value: f64,
        threshold: f64,
    },
}

impl RejectReason {
    pub fn describe(&self) -> String {
        match self {
            RejectReason::Duplicate { remaining_minutes } => {
                format!("duplicate: {remaining_minutes}m cooldown remaining")
            }
            RejectReason::TierDisabled { tier } => {
                format!("tier {} disabled by configuration", tier.name())
            }
            RejectReason::BelowThreshold {
                metric,
                value,
                threshold,
            } => format!(
                "{} {:.2} below adapted threshold {:.2}",
                metric.name(),
                value,
                threshold
            ),
        }
    }
}

/// Market-context quality scores supplied by the caller. Missing fields fall
/// back to documented neutral defaults rather than failing the decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketQuality {
    /// Liquidity score 0-100
    pub liquidity: Option<f64>,
    /// Data-quality score 0-100
    pub data_quality: Option<f64>,
}

const DEFAULT_LIQUIDITY: f64 = 50.0;
const DEFAULT_DATA_QUALITY: f64 = 75.0;

/// The gate's verdict with the full context snapshot at decision time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub candidate: CandidateSignal,
    pub verdict: Verdict,
    pub regime: RegimeSnapshot,
    pub thresholds: ThresholdSet,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Verdict {
    Admitted { priority: Priority },
    Rejected { reason: RejectReason },
}

impl GateDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self.verdict, Verdict::Admitted { .. })
    }

    pub fn priority(&self) -> Option<Priority> {
        match self.verdict {
            Verdict::Admitted { priority } => Some(priority),
            Verdict::Rejected { .. } => None,
        }
    }
}

/// Compact rejection entry retained for later analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionEntry {
    pub symbol: String,
    pub tier: QualityTier,
    pub confidence: f64,
    pub reason: RejectReason,
    pub regime_name: String,
    pub atr_percent: f64,
    pub rejected_at: DateTime<Utc>,
}

/// Central admission decision point: dedup policy, tier rules, then the
/// adapted thresholds. Owns the dedup cache (single writer) and a bounded
/// rejection log. Rejections are never retried automatically.
pub struct AdmissionGate {
    config: GateConfig,
    dedup: DedupCache,
    rejections: VecDeque<RejectionEntry>,
}

impl AdmissionGate {
    pub fn new(config: GateConfig) -> Self {
        let dedup = DedupCache::new(config.dedup_window_hours);
        Self {
            config,
            dedup,
            rejections: VecDeque::with_capacity(MAX_REJECTION_LOG),
        }
    }

    /// Evaluate one candidate against the current thresholds and regime.
    pub fn evaluate(
        &mut self,
        candidate: &CandidateSignal,
        thresholds: &ThresholdSet,
        regime: &RegimeSnapshot,
        quality: MarketQuality,
    ) -> GateDecision {
        let now = Utc::now();

        // Step 1: dedup
        if let Some(remaining) = self.dedup.cooldown(&candidate.symbol, candidate.direction, now) {
            return self.reject(
                candidate,
                thresholds,
                regime,
                RejectReason::Duplicate {
                    remaining_minutes: remaining.num_minutes(),
                },
                now,
            );
        }

        // Step 2: tier rules
        let priority = match candidate.tier {
            QualityTier::High if self.config.accept_high => self.config.high_tier_priority,
            QualityTier::Medium if self.config.accept_medium => Priority::Medium,
            QualityTier::Low if self.config.accept_low => Priority::Medium,
            tier => {
                return self.reject(
                    candidate,
                    thresholds,
                    regime,
                    RejectReason::TierDisabled { tier },
                    now,
                );
            }
        };

        // Step 3: adapted thresholds
        let checks = [
            (
                GuardedMetric::PatternStrength,
                candidate.confidence,
            ),
            (GuardedMetric::Consensus, candidate.consensus()),
            (GuardedMetric::RiskReward, candidate.risk_reward_ratio()),
            (
                GuardedMetric::LiquidityFloor,
                quality.liquidity.unwrap_or(DEFAULT_LIQUIDITY),
            ),
            (
                GuardedMetric::DataQualityFloor,
                quality.data_quality.unwrap_or(DEFAULT_DATA_QUALITY),
            ),
        ];
        for (metric, value) in checks {
            let threshold = thresholds.value(metric);
            if value < threshold {
                return self.reject(
                    candidate,
                    thresholds,
                    regime,
                    RejectReason::BelowThreshold {
                        metric,
                        value,
                        threshold,
                    },
                    now,
                );
            }
        }

        // Admitted: stamp the dedup window
        self.dedup.record(&candidate.symbol, candidate.direction, now);

        tracing::info!(
            symbol = %candidate.symbol,
            direction = candidate.direction.name(),
            tier = candidate.tier.name(),
            priority = priority.name(),
            confidence = format!("{:.0}", candidate.confidence),
            regime = regime.regime.name(),
            "Candidate admitted"
        );

        GateDecision {
            candidate: candidate.clone(),
            verdict: Verdict::Admitted { priority },
            regime: regime.clone(),
            thresholds: thresholds.clone(),
            decided_at: now,
        }
    }

    fn reject(
        &mut self,
        candidate: &CandidateSignal,
        thresholds: &ThresholdSet,
        regime: &RegimeSnapshot,
        reason: RejectReason,
        now: DateTime<Utc>,
    ) -> GateDecision {
        tracing::info!(
            symbol = %candidate.symbol,
            direction = candidate.direction.name(),
            tier = candidate.tier.name(),
            reason = reason.describe(),
            regime = regime.regime.name(),
            "Candidate rejected"
        );

        self.rejections.push_back(RejectionEntry {
            symbol: candidate.symbol.clone(),
            tier: candidate.tier,
            confidence: candidate.confidence,
            reason: reason.clone(),
            regime_name: regime.regime.name().to_string(),
            atr_percent: regime.atr_percent,
            rejected_at: now,
        });
        if self.rejections.len() > MAX_REJECTION_LOG {
            self.rejections.pop_front();
        }

        GateDecision {
            candidate: candidate.clone(),
            verdict: Verdict::Rejected { reason },
            regime: regime.clone(),
            thresholds: thresholds.clone(),
            decided_at: now,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Apply a new configuration at runtime.
    pub fn update_config(&mut self, config: GateConfig) {
        self.dedup.set_window_hours(config.dedup_window_hours);
        tracing::info!(
            accept_high = config.accept_high,
            accept_medium = config.accept_medium,
            accept_low = config.accept_low,
            dedup_hours = config.dedup_window_hours,
            "Gate configuration updated"
        );
        self.config = config;
    }

    pub fn rejections(&self) -> impl Iterator<Item = &RejectionEntry> {
        self.rejections.iter()
    }

    /// Housekeeping: drop lapsed dedup entries.
    pub fn purge_dedup(&mut self) {
        self.dedup.purge_expired(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regime_classifier::{MarketRegime, VolatilityBucket, VolumeProfile};
    use signal_core::{Direction, StrategyVote};
    use uuid::Uuid;

    fn regime() -> RegimeSnapshot {
        RegimeSnapshot {
            regime: MarketRegime::BullMomentum,
            confidence: 80.0,
            trend_strength: 75.0,
            volatility: VolatilityBucket::Normal,
            atr_percent: 2.0,
            volume_profile: VolumeProfile::Normal,
            volume_ratio: 1.2,
            reasoning: String::new(),
            classified_at: Utc::now(),
        }
    }

    fn candidate(symbol: &str, direction: Direction, tier: QualityTier) -> CandidateSignal {
        CandidateSignal {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            direction,
            entry_price: 100.0,
            stop_loss: 97.0,
            targets: vec![109.0],
            confidence: 85.0,
            tier,
            strategy_id: "momentum".to_string(),
            votes: vec![StrategyVote {
                strategy_id: "momentum".to_string(),
                direction,
                strength: 90.0,
            }],
            created_at: Utc::now(),
        }
    }

    fn thresholds() -> ThresholdSet {
        ThresholdSet::defaults(MarketRegime::BullMomentum)
    }

    #[test]
    fn test_high_tier_admitted_high_priority() {
        let mut gate = AdmissionGate::new(GateConfig::default());
        let decision = gate.evaluate(
            &candidate("BTC", Direction::Long, QualityTier::High),
            &thresholds(),
            &regime(),
            MarketQuality::default(),
        );
        assert_eq!(decision.priority(), Some(Priority::High));
    }

    #[test]
    fn test_duplicate_blocked_opposite_allowed() {
        let mut gate = AdmissionGate::new(GateConfig::default());
        let ts = thresholds();
        let r = regime();

        // A: admitted
        let a = gate.evaluate(
            &candidate("BTC", Direction::Long, QualityTier::High),
            &ts,
            &r,
            MarketQuality::default(),
        );
        assert!(a.is_admitted());

        // B: same pair an hour later (same test run) is a duplicate
        let b = gate.evaluate(
            &candidate("BTC", Direction::Long, QualityTier::High),
            &ts,
            &r,
            MarketQuality::default(),
        );
        assert!(matches!(
            b.verdict,
            Verdict::Rejected {
                reason: RejectReason::Duplicate { .. }
            }
        ));

        // C: opposite direction sails through
        let c = gate.evaluate(
            &candidate("BTC", Direction::Short, QualityTier::High),
            &ts,
            &r,
            MarketQuality::default(),
        );
        assert!(c.is_admitted());
    }

    #[test]
    fn test_low_tier_rejected_by_default() {
        let mut gate = AdmissionGate::new(GateConfig::default());
        let decision = gate.evaluate(
            &candidate("ETH", Direction::Long, QualityTier::Low),
            &thresholds(),
            &regime(),
            MarketQuality::default(),
        );
        assert!(matches!(
            decision.verdict,
            Verdict::Rejected {
                reason: RejectReason::TierDisabled { .. }
            }
        ));
        assert_eq!(gate.rejections().count(), 1);
    }

    #[test]
    fn test_low_tier_toggle() {
        let mut gate = AdmissionGate::new(GateConfig {
            accept_low: true,
            ..GateConfig::default()
        });
        let decision = gate.evaluate(
            &candidate("ETH", Direction::Long, QualityTier::Low),
            &thresholds(),
            &regime(),
            MarketQuality::default(),
        );
        assert_eq!(decision.priority(), Some(Priority::Medium));
    }

    #[test]
    fn test_high_tier_priority_remap() {
        let mut gate = AdmissionGate::new(GateConfig {
            high_tier_priority: Priority::Medium,
            ..GateConfig::default()
        });
        let decision = gate.evaluate(
            &candidate("BTC", Direction::Long, QualityTier::High),
            &thresholds(),
            &regime(),
            MarketQuality::default(),
        );
        assert_eq!(decision.priority(), Some(Priority::Medium));
    }

    #[test]
    fn test_threshold_rejection_logged() {
        let mut gate = AdmissionGate::new(GateConfig::default());
        let mut weak = candidate("SOL", Direction::Long, QualityTier::High);
        weak.confidence = 10.0; // far below the pattern-strength base of 65

        let decision = gate.evaluate(&weak, &thresholds(), &regime(), MarketQuality::default());
        assert!(matches!(
            decision.verdict,
            Verdict::Rejected {
                reason: RejectReason::BelowThreshold {
                    metric: GuardedMetric::PatternStrength,
                    ..
                }
            }
        ));
        // Rejected candidates never stamp the dedup window
        let retry = gate.evaluate(
            &candidate("SOL", Direction::Long, QualityTier::High),
            &thresholds(),
            &regime(),
            MarketQuality::default(),
        );
        assert!(retry.is_admitted());
    }

    #[test]
    fn test_missing_quality_uses_defaults() {
        let mut gate = AdmissionGate::new(GateConfig::default());
        // Defaults (50 liquidity, 75 data quality) pass the base floors (40, 70)
        let decision = gate.evaluate(
            &candidate("BTC", Direction::Long, QualityTier::High),
            &thresholds(),
            &regime(),
            MarketQuality {
                liquidity: None,
                data_quality: None,
            },
        );
        assert!(decision.is_admitted());
    }
}
