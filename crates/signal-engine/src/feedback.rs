use position_sizer::{AccountRiskState, RiskProfile};
use signal_core::OutcomeRecord;
use strategy_weights::{WeightLearner, WeightSnapshot};

/// Closes the loop: realized outcomes flow into the weight learner and into
/// the aggregate account risk picture (equity curve, drawdown, streak) that
/// the sizer consumes for future admissions.
pub struct FeedbackLoop {
    learner: WeightLearner,
    profile: RiskProfile,
    account_size: f64,
    /// Nominal equity index starting at 100
    equity: f64,
    peak_equity: f64,
    streak: i32,
}

impl FeedbackLoop {
    pub fn new<S: AsRef<str>>(strategies: &[S], account_size: f64, profile: RiskProfile) -> Self {
        Self {
            learner: WeightLearner::new(strategies),
            profile,
            account_size,
            equity: 100.0,
            peak_equity: 100.0,
            streak: 0,
        }
    }

    /// Fold one realized outcome into the learner and the risk state.
    pub fn apply(&mut self, outcome: &OutcomeRecord) {
        self.learner.record_outcome(outcome);

        // Equity compounds on realized profit %, scaled by the profile's
        // base risk so one outcome moves the curve in proportion to what
        // was actually at stake
        let exposure = self.profile.base_risk_percent();
        self.equity *= 1.0 + (outcome.profit_percent / 100.0) * exposure;
        self.peak_equity = self.peak_equity.max(self.equity);

        self.streak = if outcome.is_win() {
            self.streak.max(0) + 1
        } else {
            self.streak.min(0) - 1
        };

        tracing::debug!(
            strategy = %outcome.strategy_id,
            profit = format!("{:.2}%", outcome.profit_percent),
            streak = self.streak,
            drawdown = format!("{:.2}%", self.drawdown_percent()),
            "Feedback applied"
        );
    }

    pub fn drawdown_percent(&self) -> f64 {
        if self.peak_equity <= f64::EPSILON {
            return 0.0;
        }
        ((self.peak_equity - self.equity) / self.peak_equity * 100.0).max(0.0)
    }

    pub fn streak(&self) -> i32 {
        self.streak
    }

    pub fn profile(&self) -> RiskProfile {
        self.profile
    }

    /// Change the risk appetite mid-run; the equity curve and streak carry
    /// over untouched.
    pub fn set_profile(&mut self, profile: RiskProfile) {
        self.profile = profile;
        tracing::info!(profile = profile.name(), "Risk profile updated");
    }

    /// Account risk state for the sizer; the caller supplies the count of
    /// correlated open positions since only it sees the active table.
    pub fn account_state(&self, correlated_positions: usize) -> AccountRiskState {
        AccountRiskState {
            account_size: self.account_size,
            profile: self.profile,
            drawdown_percent: self.drawdown_percent(),
            streak: self.streak,
            correlated_positions,
        }
    }

    /// Overwrite the account picture with authoritative figures from an
    /// external portfolio service. The internal equity curve is rebased so
    /// subsequent outcomes compound from the supplied drawdown.
    pub fn set_account_state(&mut self, account_size: f64, drawdown_percent: f64, streak: i32) {
        self.account_size = account_size;
        self.streak = streak;
        self.peak_equity = 100.0;
        self.equity = 100.0 * (1.0 - drawdown_percent.clamp(0.0, 100.0) / 100.0);
        tracing::info!(
            account_size,
            drawdown = format!("{:.2}%", drawdown_percent),
            streak,
            "Account state overridden"
        );
    }

    pub fn weight(&self, strategy_id: &str) -> f64 {
        self.learner.weight(strategy_id)
    }

    pub fn weights(&self) -> WeightSnapshot {
        self.learner.snapshot()
    }

    pub fn learner_mut(&mut self) -> &mut WeightLearner {
        &mut self.learner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Utc;
    use signal_core::{Direction, QualityTier, ResolutionReason};
    use uuid::Uuid;

    const STRATEGIES: [&str; 5] = ["momentum", "mean_reversion", "breakout", "volume", "pattern"];

    fn outcome(strategy_id: &str, profit: f64) -> OutcomeRecord {
        OutcomeRecord {
            signal_id: Uuid::new_v4(),
            symbol: "BTC".to_string(),
            strategy_id: strategy_id.to_string(),
            direction: Direction::Long,
            exit_price: 100.0,
            profit_percent: profit,
            max_drawdown_percent: 1.0,
            duration_minutes: 60,
            reason: if profit > 0.0 {
                ResolutionReason::TargetHit
            } else {
                ResolutionReason::StopHit
            },
            predicted_confidence: 75.0,
            tier: QualityTier::High,
            resolved_at: Utc::now(),
        }
    }

    #[test]
    fn test_streak_tracking() {
        let mut fb = FeedbackLoop::new(&STRATEGIES, 10_000.0, RiskProfile::Moderate);
        fb.apply(&outcome("momentum", 3.0));
        fb.apply(&outcome("momentum", 2.0));
        assert_eq!(fb.streak(), 2);

        fb.apply(&outcome("momentum", -2.0));
        assert_eq!(fb.streak(), -1);
        fb.apply(&outcome("momentum", -1.0));
        assert_eq!(fb.streak(), -2);
    }

    #[test]
    fn test_drawdown_from_equity_curve() {
        let mut fb = FeedbackLoop::new(&STRATEGIES, 10_000.0, RiskProfile::Moderate);
        assert_relative_eq!(fb.drawdown_percent(), 0.0);

        fb.apply(&outcome("momentum", 5.0));
        assert_relative_eq!(fb.drawdown_percent(), 0.0);

        fb.apply(&outcome("momentum", -4.0));
        assert!(fb.drawdown_percent() > 0.0);

        let state = fb.account_state(1);
        assert_eq!(state.correlated_positions, 1);
        assert_eq!(state.streak, -1);
    }

    #[test]
    fn test_profile_change_flows_into_account_state() {
        let mut fb = FeedbackLoop::new(&STRATEGIES, 10_000.0, RiskProfile::Moderate);
        fb.apply(&outcome("momentum", -2.0));

        fb.set_profile(RiskProfile::Conservative);
        let state = fb.account_state(0);
        assert_eq!(state.profile, RiskProfile::Conservative);
        assert_eq!(state.streak, -1);
    }

    #[test]
    fn test_outcomes_reach_learner() {
        let mut fb = FeedbackLoop::new(&STRATEGIES, 10_000.0, RiskProfile::Moderate);
        for _ in 0..6 {
            fb.apply(&outcome("breakout", 6.0));
        }
        assert!(fb.weight("breakout") > 0.2);
    }
}
