use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MarketRegime, RegimeSnapshot};

const MAX_TRANSITIONS: usize = 200;

/// A discrete regime change, with the prior regime's duration for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeTransition {
    pub from: MarketRegime,
    pub to: MarketRegime,
    pub at: DateTime<Utc>,
    pub prior_duration_minutes: i64,
}

/// Tracks the current regime and logs transitions as they happen.
pub struct RegimeTracker {
    current: Option<RegimeSnapshot>,
    current_since: Option<DateTime<Utc>>,
    transitions: Vec<RegimeTransition>,
}

impl RegimeTracker {
    pub fn new() -> Self {
        Self {
            current: None,
            current_since: None,
            transitions: Vec::new(),
        }
    }

    /// Record a fresh classification. Returns the transition if the regime
    /// label changed.
    pub fn record(&mut self, snapshot: RegimeSnapshot) -> Option<RegimeTransition> {
        let now = snapshot.classified_at;
        let transition = match &self.current {
            Some(prev) if prev.regime != snapshot.regime => {
                let since = self.current_since.unwrap_or(now);
                let transition = RegimeTransition {
                    from: prev.regime,
                    to: snapshot.regime,
                    at: now,
                    prior_duration_minutes: (now - since).num_minutes(),
                };
                tracing::info!(
                    from = prev.regime.name(),
                    to = snapshot.regime.name(),
                    prior_duration_min = transition.prior_duration_minutes,
                    confidence = format!("{:.0}", snapshot.confidence),
                    "Regime transition"
                );
                self.transitions.push(transition.clone());
                if self.transitions.len() > MAX_TRANSITIONS {
                    self.transitions.remove(0);
                }
                self.current_since = Some(now);
                Some(transition)
            }
            None => {
                self.current_since = Some(now);
                None
            }
            _ => None,
        };
        self.current = Some(snapshot);
        transition
    }

    /// Point-in-time view of the current classification.
    pub fn current(&self) -> Option<&RegimeSnapshot> {
        self.current.as_ref()
    }

    pub fn transitions(&self) -> &[RegimeTransition] {
        &self.transitions
    }
}

impl Default for RegimeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn snapshot(regime: MarketRegime, at: DateTime<Utc>) -> RegimeSnapshot {
        RegimeSnapshot {
            regime,
            confidence: 80.0,
            trend_strength: 75.0,
            volatility: crate::VolatilityBucket::Normal,
            atr_percent: 2.0,
            volume_profile: crate::VolumeProfile::Normal,
            volume_ratio: 1.0,
            reasoning: String::new(),
            classified_at: at,
        }
    }

    #[test]
    fn test_transition_recorded_with_duration() {
        let mut tracker = RegimeTracker::new();
        let t0 = Utc::now();

        assert!(tracker.record(snapshot(MarketRegime::Choppy, t0)).is_none());
        // Same regime: no transition
        assert!(tracker
            .record(snapshot(MarketRegime::Choppy, t0 + Duration::minutes(30)))
            .is_none());

        let transition = tracker
            .record(snapshot(MarketRegime::BullMomentum, t0 + Duration::minutes(90)))
            .expect("transition expected");
        assert_eq!(transition.from, MarketRegime::Choppy);
        assert_eq!(transition.to, MarketRegime::BullMomentum);
        assert_eq!(transition.prior_duration_minutes, 90);
        assert_eq!(tracker.transitions().len(), 1);
    }
}
