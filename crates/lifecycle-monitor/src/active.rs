use chrono::{DateTime, Utc};
use position_sizer::SizeRecommendation;
use serde::{Deserialize, Serialize};
use signal_core::{CandidateSignal, Direction, ResolutionReason};

/// Fraction of price treated as feed noise around stop/target levels
pub const PRICE_TOLERANCE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStatus {
    Pending,
    Monitoring,
    Exited,
}

/// One admitted, sized signal under watch. Lives in the active table from
/// registration until exactly one resolution is recorded.
#[derive(Debug, Clone)]
pub struct ActiveSignal {
    pub candidate: CandidateSignal,
    pub sizing: SizeRecommendation,
    pub registered_at: DateTime<Utc>,
    /// Forced close past this instant, at the last known price
    pub expires_at: DateTime<Utc>,
    pub status: SignalStatus,
    pub running_high: f64,
    pub running_low: f64,
    pub last_price: f64,
    /// Worst adverse excursion from entry, percent
    pub max_drawdown_percent: f64,
}

impl ActiveSignal {
    pub fn new(
        candidate: CandidateSignal,
        sizing: SizeRecommendation,
        registered_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let entry = candidate.entry_price;
        Self {
            candidate,
            sizing,
            registered_at,
            expires_at,
            status: SignalStatus::Pending,
            running_high: entry,
            running_low: entry,
            last_price: entry,
            max_drawdown_percent: 0.0,
        }
    }

    /// Fold a fresh price into the running extremes and drawdown.
    pub fn observe_price(&mut self, price: f64) {
        self.status = SignalStatus::Monitoring;
        self.last_price = price;
        self.running_high = self.running_high.max(price);
        self.running_low = self.running_low.min(price);

        let entry = self.candidate.entry_price;
        if entry > f64::EPSILON {
            let adverse = match self.candidate.direction {
                Direction::Long => (entry - self.running_low) / entry,
                Direction::Short => (self.running_high - entry) / entry,
            };
            self.max_drawdown_percent = self.max_drawdown_percent.max(adverse.max(0.0) * 100.0);
        }
    }

    /// Stop requires a decisive break past the level: a touch inside the
    /// tolerance band is treated as noise.
    pub fn stop_hit(&self, price: f64) -> bool {
        let stop = self.candidate.stop_loss;
        match self.candidate.direction {
            Direction::Long => price <= stop * (1.0 - PRICE_TOLERANCE),
            Direction::Short => price >= stop * (1.0 + PRICE_TOLERANCE),
        }
    }

    /// First target fills once price is within the tolerance band of it.
    pub fn target_hit(&self, price: f64) -> bool {
        let Some(target) = self.candidate.targets.first() else {
            return false;
        };
        match self.candidate.direction {
            Direction::Long => price >= target * (1.0 - PRICE_TOLERANCE),
            Direction::Short => price <= target * (1.0 + PRICE_TOLERANCE),
        }
    }

    /// Realized profit at `exit_price`, direction-aware.
    pub fn profit_percent(&self, exit_price: f64) -> f64 {
        let entry = self.candidate.entry_price;
        if entry <= f64::EPSILON {
            return 0.0;
        }
        let raw = (exit_price - entry) / entry * 100.0;
        match self.candidate.direction {
            Direction::Long => raw,
            Direction::Short => -raw,
        }
    }

    /// Which resolution, if any, the latest price triggers. Stop wins over
    /// target when a single tick gaps through both.
    pub fn resolution_at(&self, price: f64) -> Option<ResolutionReason> {
        if self.stop_hit(price) {
            Some(ResolutionReason::StopHit)
        } else if self.target_hit(price) {
            Some(ResolutionReason::TargetHit)
        } else {
            None
        }
    }
}

/// Read-only view for reporting surfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSummary {
    pub signal_id: uuid::Uuid,
    pub symbol: String,
    pub direction: String,
    pub entry_price: f64,
    pub last_price: f64,
    pub unrealized_percent: f64,
    pub max_drawdown_percent: f64,
    pub status: SignalStatus,
    pub age_minutes: i64,
    pub expires_at: DateTime<Utc>,
}

impl ActiveSignal {
    pub fn summary(&self, now: DateTime<Utc>) -> ActiveSummary {
        ActiveSummary {
            signal_id: self.candidate.id,
            symbol: self.candidate.symbol.clone(),
            direction: self.candidate.direction.name().to_string(),
            entry_price: self.candidate.entry_price,
            last_price: self.last_price,
            unrealized_percent: self.profit_percent(self.last_price),
            max_drawdown_percent: self.max_drawdown_percent,
            status: self.status,
            age_minutes: (now - self.registered_at).num_minutes(),
            expires_at: self.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use position_sizer::{AccountRiskState, PositionSizer, SizingInputs};
    use signal_core::QualityTier;
    use uuid::Uuid;

    fn active(direction: Direction, entry: f64, stop: f64, target: f64) -> ActiveSignal {
        let candidate = CandidateSignal {
            id: Uuid::new_v4(),
            symbol: "BTC".to_string(),
            direction,
            entry_price: entry,
            stop_loss: stop,
            targets: vec![target],
            confidence: 75.0,
            tier: QualityTier::High,
            strategy_id: "momentum".to_string(),
            votes: vec![],
            created_at: Utc::now(),
        };
        let sizing = PositionSizer::size(
            &SizingInputs {
                symbol: "BTC".to_string(),
                direction,
                entry_price: entry,
                stop_loss: stop,
                confidence: 75.0,
                risk_reward: 2.0,
                volatility: 50.0,
                market_fit: None,
            },
            &AccountRiskState::default(),
        )
        .unwrap();
        let now = Utc::now();
        ActiveSignal::new(candidate, sizing, now, now + chrono::Duration::hours(48))
    }

    #[test]
    fn test_long_stop_needs_decisive_break() {
        let sig = active(Direction::Long, 100.0, 95.0, 110.0);
        // Inside the tolerance band: noise, not a stop
        assert!(!sig.stop_hit(94.999));
        assert!(sig.stop_hit(94.80));
    }

    #[test]
    fn test_long_target_fills_inside_band() {
        let sig = active(Direction::Long, 100.0, 95.0, 110.0);
        assert!(sig.target_hit(109.90));
        assert!(!sig.target_hit(109.50));
    }

    #[test]
    fn test_short_checks_inverted() {
        let sig = active(Direction::Short, 100.0, 105.0, 90.0);
        assert!(sig.stop_hit(105.20));
        assert!(!sig.stop_hit(104.90));
        assert!(sig.target_hit(90.05));
    }

    #[test]
    fn test_profit_direction_aware() {
        let long = active(Direction::Long, 100.0, 95.0, 110.0);
        let short = active(Direction::Short, 100.0, 105.0, 90.0);
        assert_relative_eq!(long.profit_percent(110.0), 10.0);
        assert_relative_eq!(short.profit_percent(110.0), -10.0);
        assert_relative_eq!(short.profit_percent(90.0), 10.0);
    }

    #[test]
    fn test_drawdown_tracks_adverse_extreme() {
        let mut sig = active(Direction::Long, 100.0, 90.0, 110.0);
        sig.observe_price(97.0);
        sig.observe_price(103.0);
        sig.observe_price(95.0);
        sig.observe_price(108.0);
        assert_relative_eq!(sig.max_drawdown_percent, 5.0);
        assert_relative_eq!(sig.running_high, 108.0);
        assert_relative_eq!(sig.running_low, 95.0);
    }

    #[test]
    fn test_stop_wins_on_gap_through_both() {
        // Short where one print gaps above stop; stop takes precedence
        let sig = active(Direction::Short, 100.0, 105.0, 90.0);
        assert_eq!(sig.resolution_at(106.0), Some(ResolutionReason::StopHit));
    }
}
