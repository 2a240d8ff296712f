use std::sync::Arc;

use admission_gate::{
    AdmissionGate, GateConfig, GateDecision, MarketQuality, QueueStats, SignalQueue,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use lifecycle_monitor::{ActiveSummary, FeedHealth, LifecycleMonitor};
use position_sizer::{PositionSizer, RiskProfile, SizingInputs};
use regime_classifier::{MarketRegime, RegimeClassifier, RegimeSnapshot, RegimeTracker};
use serde::Serialize;
use signal_core::stats::clamp;
use signal_core::{
    CandidateSignal, Direction, OutcomeRecord, PriceFeed, SnapshotStore, VolumeSnapshot,
};
use strategy_weights::WeightSnapshot;
use threshold_engine::{ThresholdCalculator, ThresholdInputs, ThresholdSet};

use crate::config::EngineConfig;
use crate::feedback::FeedbackLoop;
use crate::metrics::EngineMetrics;
use crate::scheduler::{CooldownGate, EngineEvent};

const GATE_CONFIG_KEY: &str = "gate_config";
const METRICS_KEY: &str = "engine_metrics";
const RISK_PROFILE_KEY: &str = "risk_profile";

/// Candles pulled for each regime refresh
const CLASSIFY_WINDOW: usize = 200;

/// Admitted candidates sized per drain pass
const DRAIN_BATCH: usize = 16;

/// Read-only point-in-time view of the whole pipeline
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub regime: RegimeSnapshot,
    pub thresholds: ThresholdSet,
    pub weights: WeightSnapshot,
    pub queue: QueueStats,
    pub active: Vec<ActiveSummary>,
    pub taken_at: DateTime<Utc>,
}

/// The full admission-and-lifecycle pipeline wired together: regime
/// classification feeds threshold adaptation, the gate feeds the queue, the
/// queue feeds the sizer, the sizer feeds the monitor, and outcomes feed
/// back into the weight learner and account risk state.
pub struct SignalEngine {
    config: EngineConfig,
    feed: Arc<dyn PriceFeed>,
    store: Option<Arc<dyn SnapshotStore>>,

    classifier: RegimeClassifier,
    tracker: RegimeTracker,
    calculator: ThresholdCalculator,
    gate: AdmissionGate,
    queue: SignalQueue,
    monitor: LifecycleMonitor,
    feedback: FeedbackLoop,
    cooldowns: CooldownGate,
    metrics: EngineMetrics,

    regime: RegimeSnapshot,
    thresholds: ThresholdSet,
}

impl SignalEngine {
    pub fn new(
        config: EngineConfig,
        feed: Arc<dyn PriceFeed>,
        store: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        let feedback = FeedbackLoop::new(
            &config.strategies,
            config.account_size,
            config.risk_profile,
        );
        Self {
            queue: SignalQueue::new(config.queue_capacity),
            monitor: LifecycleMonitor::new(Arc::clone(&feed)),
            metrics: EngineMetrics::new(config.metrics_log_interval_cycles),
            feedback,
            classifier: RegimeClassifier::new(),
            tracker: RegimeTracker::new(),
            calculator: ThresholdCalculator::new(),
            gate: AdmissionGate::new(GateConfig::default()),
            cooldowns: CooldownGate::new(),
            regime: RegimeSnapshot::neutral(0),
            thresholds: ThresholdSet::defaults(MarketRegime::Choppy),
            feed,
            store,
            config,
        }
    }

    /// Restore gate configuration and metrics counters from the snapshot
    /// store, when one is attached. Absence is not an error: the engine
    /// starts from defaults and re-learns.
    pub async fn restore_state(&mut self) {
        let Some(store) = self.store.clone() else {
            return;
        };
        match store.load_state(GATE_CONFIG_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<GateConfig>(&raw) {
                Ok(config) => self.gate.update_config(config),
                Err(err) => tracing::warn!(error = %err, "Persisted gate config unreadable, using defaults"),
            },
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "Gate config load failed"),
        }
        match store.load_state(RISK_PROFILE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<RiskProfile>(&raw) {
                Ok(profile) => self.set_risk_profile(profile),
                Err(err) => tracing::warn!(error = %err, "Persisted risk profile unreadable, keeping configured one"),
            },
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "Risk profile load failed"),
        }
        match store.load_state(METRICS_KEY).await {
            Ok(Some(raw)) => {
                if let Ok(json) = serde_json::from_str::<serde_json::Value>(&raw) {
                    self.metrics.restore_from_json(&json);
                }
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "Metrics load failed"),
        }
    }

    /// Persist gate configuration and metrics counters. Failures degrade to
    /// a warning; the in-memory pipeline is the source of truth.
    pub async fn persist_state(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Ok(raw) = serde_json::to_string(self.gate.config()) {
            if let Err(err) = store.save_state(GATE_CONFIG_KEY, &raw).await {
                tracing::warn!(error = %err, "Gate config persist failed");
            }
        }
        if let Ok(raw) = serde_json::to_string(&self.feedback.profile()) {
            if let Err(err) = store.save_state(RISK_PROFILE_KEY, &raw).await {
                tracing::warn!(error = %err, "Risk profile persist failed");
            }
        }
        let metrics = self.metrics.to_json().to_string();
        if let Err(err) = store.save_state(METRICS_KEY, &metrics).await {
            tracing::warn!(error = %err, "Metrics persist failed");
        }
    }

    /// Medium-cadence cycle: reclassify the reference symbol's regime,
    /// fire any event reactions, and recompute the threshold set.
    pub async fn refresh_market(&mut self) {
        let timer = EngineMetrics::start_timer();
        let symbol = self.config.reference_symbol().to_string();
        let now = Utc::now();

        match self.feed.get_ohlc_window(&symbol, CLASSIFY_WINDOW).await {
            Ok(candles) => {
                let snapshot = self.classifier.classify(&candles);
                if let Some(transition) = self.tracker.record(snapshot.clone()) {
                    if self.cooldowns.try_fire(EngineEvent::RegimeChange, now) {
                        tracing::info!(
                            from = transition.from.name(),
                            to = transition.to.name(),
                            prior_minutes = transition.prior_duration_minutes,
                            "Reacting to regime change"
                        );
                    }
                }
                if snapshot.volatility.is_elevated()
                    && self.cooldowns.try_fire(EngineEvent::VolatilitySpike, now)
                {
                    tracing::info!(
                        atr_percent = format!("{:.2}", snapshot.atr_percent),
                        "Volatility spike"
                    );
                }
                if snapshot.volume_ratio >= 2.0
                    && self.cooldowns.try_fire(EngineEvent::LargeFlow, now)
                {
                    tracing::info!(
                        volume_ratio = format!("{:.2}", snapshot.volume_ratio),
                        "Large flow detected"
                    );
                }
                self.regime = snapshot;
            }
            Err(err) => {
                // Keep classifying off the last snapshot rather than stalling
                tracing::warn!(symbol = %symbol, error = %err, "Regime refresh failed, keeping last snapshot");
            }
        }

        self.thresholds = self.calculator.compute_and_record(&ThresholdInputs {
            market_score: market_score(&self.regime),
            regime: self.regime.regime,
            progress: self.config.progress,
            days_remaining: self.config.days_remaining,
            now,
        });

        self.metrics.record_refresh_duration(timer);
        self.metrics.finish_cycle();
    }

    /// Trigger a fresh classification/threshold cycle immediately. Any cycle
    /// already in flight is unaffected.
    pub async fn force_reevaluate(&mut self) {
        tracing::info!("Forced re-evaluation requested");
        self.refresh_market().await;
    }

    /// Run one candidate through the gate; admitted candidates land in the
    /// priority queue for the next sizing drain.
    pub fn submit(&mut self, candidate: &CandidateSignal, quality: MarketQuality) -> GateDecision {
        let decision = self
            .gate
            .evaluate(candidate, &self.thresholds, &self.regime, quality);
        self.metrics.record_decision(&decision);

        if let Some(priority) = decision.priority() {
            self.queue.enqueue(candidate.clone(), priority);
        }
        decision
    }

    /// Drain admitted candidates HIGH-first, size each against the current
    /// account risk state, and register them for lifecycle monitoring.
    pub async fn process_admitted(&mut self) -> usize {
        let mut registered = 0;
        for delivery in self.queue.dequeue_batch(DRAIN_BATCH) {
            let candidate = delivery.candidate;
            let correlated = self.correlated_count(&candidate.symbol);
            let account = self.feedback.account_state(correlated);

            let inputs = SizingInputs {
                symbol: candidate.symbol.clone(),
                direction: candidate.direction,
                entry_price: candidate.entry_price,
                stop_loss: candidate.stop_loss,
                confidence: candidate.confidence,
                risk_reward: candidate.risk_reward_ratio(),
                volatility: clamp(self.regime.atr_percent * 10.0, 0.0, 100.0),
                market_fit: market_fit(&candidate, &self.regime),
            };

            let sizing = match PositionSizer::size(&inputs, &account) {
                Ok(sizing) => sizing,
                Err(err) => {
                    tracing::warn!(
                        symbol = %candidate.symbol,
                        error = %err,
                        "Sizing failed, dropping admitted candidate"
                    );
                    continue;
                }
            };

            let volume = self
                .feed
                .get_volume(&candidate.symbol)
                .await
                .unwrap_or(VolumeSnapshot {
                    recent: 0.0,
                    average: 0.0,
                });
            let expiry = expiry_estimator::estimate(&expiry_estimator::ExpiryInputs {
                entry_price: candidate.entry_price,
                first_target: candidate.targets.first().copied().unwrap_or(candidate.entry_price),
                stop_loss: candidate.stop_loss,
                regime: self.regime.regime,
                atr_percent: self.regime.atr_percent,
                confidence: candidate.confidence,
                volume,
            });

            tracing::info!(
                symbol = %candidate.symbol,
                direction = candidate.direction.name(),
                risk_percent = format!("{:.2}", sizing.risk_percent),
                size_fraction = format!("{:.3}", sizing.recommended_fraction),
                expiry_minutes = format!("{:.0}", expiry.minutes),
                waited_ms = delivery.waited_ms,
                "Sized and registered"
            );

            self.monitor
                .register_with_expiry(candidate, sizing, Some(expiry.minutes));
            registered += 1;
        }
        registered
    }

    /// Short-cadence cycle: one monitoring pass plus outcome feedback.
    pub async fn tick(&mut self) -> (Vec<OutcomeRecord>, FeedHealth) {
        let timer = EngineMetrics::start_timer();
        let (outcomes, health) = self.monitor.tick().await;
        for outcome in &outcomes {
            self.feedback.apply(outcome);
            self.metrics.record_outcome(outcome);
        }
        self.gate.purge_dedup();
        self.metrics.record_tick_duration(timer);
        (outcomes, health)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let now = Utc::now();
        EngineSnapshot {
            regime: self.regime.clone(),
            thresholds: self.thresholds.clone(),
            weights: self.feedback.weights(),
            queue: self.queue.stats(),
            active: self.monitor.summaries(now),
            taken_at: now,
        }
    }

    pub fn update_gate_config(&mut self, config: GateConfig) {
        self.gate.update_config(config);
    }

    /// Switch the risk appetite at runtime; sizing from the next drain on
    /// uses the new profile.
    pub fn set_risk_profile(&mut self, profile: RiskProfile) {
        self.config.risk_profile = profile;
        self.feedback.set_profile(profile);
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn feedback(&self) -> &FeedbackLoop {
        &self.feedback
    }

    pub fn feedback_mut(&mut self) -> &mut FeedbackLoop {
        &mut self.feedback
    }

    pub fn monitor(&self) -> &LifecycleMonitor {
        &self.monitor
    }

    fn correlated_count(&self, symbol: &str) -> usize {
        self.monitor
            .summaries(Utc::now())
            .iter()
            .filter(|s| s.symbol == symbol)
            .count()
    }
}

/// Composite market score (0-100, 50 neutral) from the regime snapshot:
/// trending bull regimes score above 50, bear regimes below.
fn market_score(regime: &RegimeSnapshot) -> f64 {
    match regime.regime {
        MarketRegime::BullMomentum | MarketRegime::BullRange => {
            clamp(50.0 + regime.trend_strength / 2.0, 0.0, 100.0)
        }
        MarketRegime::BearMomentum | MarketRegime::BearRange => {
            clamp(50.0 - regime.trend_strength / 2.0, 0.0, 100.0)
        }
        MarketRegime::Accumulation | MarketRegime::Choppy | MarketRegime::VolatileBreakout => 50.0,
    }
}

/// Regime-fit score for the sizer: defined only in trending regimes, high
/// when the candidate trades with the trend.
fn market_fit(candidate: &CandidateSignal, regime: &RegimeSnapshot) -> Option<f64> {
    let bullish = match regime.regime {
        MarketRegime::BullMomentum | MarketRegime::BullRange => true,
        MarketRegime::BearMomentum | MarketRegime::BearRange => false,
        _ => return None,
    };
    let with_trend = (candidate.direction == Direction::Long) == bullish;
    Some(if with_trend {
        regime.confidence
    } else {
        100.0 - regime.confidence
    })
}

/// Standalone helper so callers can validate a serialized gate config before
/// applying it at runtime.
pub fn parse_gate_config(raw: &str) -> Result<GateConfig> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regime_classifier::{VolatilityBucket, VolumeProfile};
    use signal_core::QualityTier;

    fn snapshot(regime: MarketRegime, confidence: f64, trend: f64) -> RegimeSnapshot {
        RegimeSnapshot {
            regime,
            confidence,
            trend_strength: trend,
            volatility: VolatilityBucket::Normal,
            atr_percent: 2.0,
            volume_profile: VolumeProfile::Normal,
            volume_ratio: 1.0,
            reasoning: String::new(),
            classified_at: Utc::now(),
        }
    }

    fn candidate(direction: Direction) -> CandidateSignal {
        CandidateSignal {
            id: uuid::Uuid::new_v4(),
            symbol: "BTC".to_string(),
            direction,
            entry_price: 100.0,
            stop_loss: 97.0,
            targets: vec![109.0],
            confidence: 85.0,
            tier: QualityTier::High,
            strategy_id: "momentum".to_string(),
            votes: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_market_score_directional() {
        let bull = snapshot(MarketRegime::BullMomentum, 80.0, 80.0);
        let bear = snapshot(MarketRegime::BearMomentum, 80.0, 80.0);
        let chop = snapshot(MarketRegime::Choppy, 50.0, 30.0);
        assert!(market_score(&bull) > 50.0);
        assert!(market_score(&bear) < 50.0);
        assert!((market_score(&chop) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_market_fit_with_and_against_trend() {
        let bull = snapshot(MarketRegime::BullMomentum, 80.0, 80.0);
        assert_eq!(market_fit(&candidate(Direction::Long), &bull), Some(80.0));
        assert_eq!(market_fit(&candidate(Direction::Short), &bull), Some(20.0));

        let chop = snapshot(MarketRegime::Choppy, 50.0, 30.0);
        assert_eq!(market_fit(&candidate(Direction::Long), &chop), None);
    }
}
