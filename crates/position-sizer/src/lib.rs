use serde::{Deserialize, Serialize};
use signal_core::stats::clamp;
use signal_core::{CoreError, Direction};

/// Hard risk ceiling, applied after every profile cap
pub const ABSOLUTE_MAX_RISK_PERCENT: f64 = 10.0;

/// Methodology tag carried on every recommendation
pub const METHODOLOGY: &str = "fixed-fractional with Kelly cross-check";

/// Named risk appetite. Each profile carries its base risk per trade, its
/// own risk cap, and the fraction of full Kelly used for the cross-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskProfile {
    Conservative,
    Moderate,
    Aggressive,
    VeryAggressive,
}

impl RiskProfile {
    pub fn name(&self) -> &'static str {
        match self {
            RiskProfile::Conservative => "CONSERVATIVE",
            RiskProfile::Moderate => "MODERATE",
            RiskProfile::Aggressive => "AGGRESSIVE",
            RiskProfile::VeryAggressive => "VERY_AGGRESSIVE",
        }
    }

    /// Starting risk % of account per trade
    pub fn base_risk_percent(&self) -> f64 {
        match self {
            RiskProfile::Conservative => 0.5,
            RiskProfile::Moderate => 1.0,
            RiskProfile::Aggressive => 2.0,
            RiskProfile::VeryAggressive => 3.0,
        }
    }

    /// Per-profile risk cap, before the absolute ceiling
    pub fn max_risk_percent(&self) -> f64 {
        match self {
            RiskProfile::Conservative => 2.0,
            RiskProfile::Moderate => 5.0,
            RiskProfile::Aggressive => 8.0,
            RiskProfile::VeryAggressive => 10.0,
        }
    }

    /// Fraction of full Kelly used for the advisory figure
    pub fn kelly_fraction(&self) -> f64 {
        match self {
            RiskProfile::Conservative => 0.25,
            RiskProfile::Moderate => 0.50,
            RiskProfile::Aggressive => 0.60,
            RiskProfile::VeryAggressive => 0.75,
        }
    }
}

impl Default for RiskProfile {
    fn default() -> Self {
        RiskProfile::Moderate
    }
}

/// Candidate-side sizing inputs
#[derive(Debug, Clone)]
pub struct SizingInputs {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    /// Signal confidence 0-100
    pub confidence: f64,
    /// Risk/reward ratio (first target distance over stop distance)
    pub risk_reward: f64,
    /// Volatility score 0-100; higher means choppier
    pub volatility: f64,
    /// Optional regime-fit score 0-100
    pub market_fit: Option<f64>,
}

/// Account-side sizing inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRiskState {
    pub account_size: f64,
    pub profile: RiskProfile,
    /// Current drawdown from peak, as a positive %
    pub drawdown_percent: f64,
    /// Positive for consecutive wins, negative for consecutive losses
    pub streak: i32,
    /// Open positions correlated with this candidate's symbol
    pub correlated_positions: usize,
}

impl Default for AccountRiskState {
    fn default() -> Self {
        Self {
            account_size: 10_000.0,
            profile: RiskProfile::Moderate,
            drawdown_percent: 0.0,
            streak: 0,
            correlated_positions: 0,
        }
    }
}

/// One applied adjustment, for the human-readable breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adjustment {
    pub label: String,
    pub multiplier: f64,
}

/// Sizing recommendation: risk % of account plus min/recommended/max
/// position sizes, both as fractions of the account and in currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeRecommendation {
    pub symbol: String,
    /// Final risk % after all adjustments and caps
    pub risk_percent: f64,
    /// Currency at risk if the stop fills (account x risk %)
    pub risk_amount: f64,
    /// Currency gained if the first target fills (risk amount x R)
    pub expected_return: f64,
    /// Position size as fraction of account (risk % / stop distance %)
    pub recommended_fraction: f64,
    pub min_fraction: f64,
    pub max_fraction: f64,
    pub recommended_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    /// Advisory fractional-Kelly figure, never drives the size
    pub kelly_suggestion: f64,
    pub adjustments: Vec<Adjustment>,
    /// Confidence in this recommendation, 0-100
    pub confidence: f64,
    pub methodology: String,
    pub reasoning: String,
}

pub struct PositionSizer;

impl PositionSizer {
    /// Size an admitted candidate against the account's risk state.
    pub fn size(
        inputs: &SizingInputs,
        account: &AccountRiskState,
    ) -> Result<SizeRecommendation, CoreError> {
        if inputs.entry_price <= 0.0 {
            return Err(CoreError::InvalidParameter(format!(
                "entry_price must be positive, got {}",
                inputs.entry_price
            )));
        }
        if account.account_size <= 0.0 {
            return Err(CoreError::InvalidParameter(format!(
                "account_size must be positive, got {}",
                account.account_size
            )));
        }
        let stop_distance_percent =
            ((inputs.entry_price - inputs.stop_loss).abs() / inputs.entry_price) * 100.0;
        if stop_distance_percent < 1e-9 {
            return Err(CoreError::DegenerateInput(
                "stop loss coincides with entry price".to_string(),
            ));
        }

        let kelly_suggestion = Self::kelly_cross_check(
            inputs.confidence,
            inputs.risk_reward,
            account.profile.kelly_fraction(),
        );

        let mut risk = account.profile.base_risk_percent();
        let mut adjustments = Vec::new();

        for (label, multiplier) in [
            (
                format!("confidence({:.0})", inputs.confidence),
                confidence_multiplier(inputs.confidence),
            ),
            (
                format!("volatility({:.0})", inputs.volatility),
                volatility_multiplier(inputs.volatility),
            ),
        ] {
            risk *= multiplier;
            adjustments.push(Adjustment { label, multiplier });
        }

        if let Some(fit) = inputs.market_fit {
            let multiplier = market_fit_multiplier(fit);
            risk *= multiplier;
            adjustments.push(Adjustment {
                label: format!("market_fit({fit:.0})"),
                multiplier,
            });
        }

        let dd_mult = drawdown_multiplier(account.drawdown_percent);
        if dd_mult < 1.0 {
            risk *= dd_mult;
            adjustments.push(Adjustment {
                label: format!("drawdown({:.1}%)", account.drawdown_percent),
                multiplier: dd_mult,
            });
        }

        let streak_mult = streak_multiplier(account.streak);
        if (streak_mult - 1.0).abs() > 1e-9 {
            risk *= streak_mult;
            adjustments.push(Adjustment {
                label: format!("streak({:+})", account.streak),
                multiplier: streak_mult,
            });
        }

        let corr_mult = correlation_multiplier(account.correlated_positions);
        if corr_mult < 1.0 {
            risk *= corr_mult;
            adjustments.push(Adjustment {
                label: format!("correlated_positions({})", account.correlated_positions),
                multiplier: corr_mult,
            });
        }

        let capped = risk
            .min(account.profile.max_risk_percent())
            .min(ABSOLUTE_MAX_RISK_PERCENT);
        if capped < risk {
            tracing::debug!(
                symbol = %inputs.symbol,
                raw = risk,
                capped,
                profile = account.profile.name(),
                "Risk capped"
            );
        }

        let recommended_fraction = capped / stop_distance_percent;
        let ceiling_fraction = ABSOLUTE_MAX_RISK_PERCENT / stop_distance_percent;
        let min_fraction = recommended_fraction * 0.5;
        let max_fraction = (recommended_fraction * 1.5).min(ceiling_fraction);

        let confidence = recommendation_confidence(
            &adjustments,
            inputs.confidence,
            inputs.risk_reward,
            account.drawdown_percent,
        );

        let reasoning = format!(
            "{} {} risk {:.2}% of account ({} profile, stop {:.2}% away), kelly advisory {:.2}%",
            inputs.symbol,
            inputs.direction.name(),
            capped,
            account.profile.name(),
            stop_distance_percent,
            kelly_suggestion * 100.0
        );

        let risk_amount = account.account_size * capped / 100.0;
        Ok(SizeRecommendation {
            symbol: inputs.symbol.clone(),
            risk_percent: capped,
            risk_amount,
            expected_return: risk_amount * inputs.risk_reward.max(0.0),
            recommended_fraction,
            min_fraction,
            max_fraction,
            recommended_value: account.account_size * recommended_fraction,
            min_value: account.account_size * min_fraction,
            max_value: account.account_size * max_fraction,
            kelly_suggestion,
            adjustments,
            confidence,
            methodology: METHODOLOGY.to_string(),
            reasoning,
        })
    }

    /// f* = (p*R - (1-p)) / R, scaled by the profile's Kelly fraction.
    /// Negative edge floors at zero.
    fn kelly_cross_check(confidence: f64, risk_reward: f64, fraction: f64) -> f64 {
        if risk_reward <= 0.0 {
            return 0.0;
        }
        let p = clamp(confidence / 100.0, 0.0, 1.0);
        let raw = (p * risk_reward - (1.0 - p)) / risk_reward;
        (raw * fraction).max(0.0)
    }
}

/// 0.5x at zero confidence, 1.0x at 50, 1.5x at 100
fn confidence_multiplier(confidence: f64) -> f64 {
    clamp(0.5 + confidence / 100.0, 0.5, 1.5)
}

/// Inverse: calm markets size up slightly, violent ones size down
fn volatility_multiplier(volatility: f64) -> f64 {
    clamp(1.2 - (volatility / 100.0) * 0.6, 0.6, 1.2)
}

fn market_fit_multiplier(fit: f64) -> f64 {
    clamp(0.5 + fit / 100.0, 0.5, 1.5)
}

/// Stepped de-risking as account drawdown deepens
fn drawdown_multiplier(drawdown_percent: f64) -> f64 {
    if drawdown_percent >= 40.0 {
        0.2
    } else if drawdown_percent >= 30.0 {
        0.4
    } else if drawdown_percent >= 20.0 {
        0.6
    } else if drawdown_percent >= 10.0 {
        0.8
    } else {
        1.0
    }
}

/// +6% per consecutive win up to 1.3x, -10% per consecutive loss down to 0.5x
fn streak_multiplier(streak: i32) -> f64 {
    if streak > 0 {
        1.0 + (streak.min(5) as f64) * 0.06
    } else if streak < 0 {
        1.0 - ((-streak).min(5) as f64) * 0.10
    } else {
        1.0
    }
}

/// -15% per correlated open position, capped at -50%
fn correlation_multiplier(correlated: usize) -> f64 {
    (1.0 - 0.15 * correlated as f64).max(0.5)
}

fn recommendation_confidence(
    adjustments: &[Adjustment],
    signal_confidence: f64,
    risk_reward: f64,
    drawdown_percent: f64,
) -> f64 {
    let mut score = 100.0;
    // Every deviation from the base risk costs a little certainty
    score -= adjustments
        .iter()
        .filter(|a| (a.multiplier - 1.0).abs() > 1e-9)
        .count() as f64
        * 5.0;
    if signal_confidence < 60.0 {
        score -= 10.0;
    }
    if risk_reward < 1.5 {
        score -= 10.0;
    }
    if drawdown_percent >= 20.0 {
        score -= 15.0;
    }
    clamp(score, 10.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn inputs() -> SizingInputs {
        SizingInputs {
            symbol: "BTC".to_string(),
            direction: Direction::Long,
            entry_price: 100.0,
            stop_loss: 96.0,
            confidence: 75.0,
            risk_reward: 2.0,
            volatility: 50.0,
            market_fit: None,
        }
    }

    fn account(profile: RiskProfile) -> AccountRiskState {
        AccountRiskState {
            account_size: 10_000.0,
            profile,
            drawdown_percent: 0.0,
            streak: 0,
            correlated_positions: 0,
        }
    }

    #[test]
    fn test_baseline_moderate_sizing() {
        let rec = PositionSizer::size(&inputs(), &account(RiskProfile::Moderate)).unwrap();

        // base 1.0% * confidence(75 -> 1.25) * volatility(50 -> 0.9) = 1.125%
        assert_relative_eq!(rec.risk_percent, 1.125, epsilon = 1e-9);
        // stop is 4% away: 1.125 / 4
        assert_relative_eq!(rec.recommended_fraction, 0.28125, epsilon = 1e-9);
        assert_relative_eq!(rec.min_fraction, rec.recommended_fraction * 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_currency_figures_follow_fractions() {
        let rec = PositionSizer::size(&inputs(), &account(RiskProfile::Moderate)).unwrap();

        // 1.125% of a 10k account at stake, 2R expected if the target fills
        assert_relative_eq!(rec.risk_amount, 112.5, epsilon = 1e-9);
        assert_relative_eq!(rec.expected_return, 225.0, epsilon = 1e-9);
        assert_relative_eq!(rec.recommended_value, 2812.5, epsilon = 1e-9);
        assert_relative_eq!(rec.min_value, 1406.25, epsilon = 1e-9);
        assert_relative_eq!(rec.max_value, 4218.75, epsilon = 1e-9);
        assert_eq!(rec.methodology, METHODOLOGY);
    }

    #[test]
    fn test_drawdown_band_reduces_risk() {
        let mut acct = account(RiskProfile::Moderate);
        acct.drawdown_percent = 12.0;
        let rec = PositionSizer::size(&inputs(), &acct).unwrap();

        // 12% drawdown lands in the 10-20% band: 0.8x on top of baseline
        assert_relative_eq!(rec.risk_percent, 1.125 * 0.8, epsilon = 1e-9);
        assert!(rec
            .adjustments
            .iter()
            .any(|a| a.label.starts_with("drawdown(")));
        assert!(rec.risk_percent <= RiskProfile::Moderate.max_risk_percent());
    }

    #[test]
    fn test_profile_cap_binds() {
        let mut i = inputs();
        i.confidence = 100.0;
        i.volatility = 0.0;
        let mut acct = account(RiskProfile::VeryAggressive);
        acct.streak = 5;
        let rec = PositionSizer::size(&i, &acct).unwrap();

        // 3.0 * 1.5 * 1.2 * 1.3 = 7.02 < 10, uncapped; push harder via fit
        i.market_fit = Some(100.0);
        let rec2 = PositionSizer::size(&i, &acct).unwrap();
        assert!(rec.risk_percent < ABSOLUTE_MAX_RISK_PERCENT);
        assert_relative_eq!(rec2.risk_percent, ABSOLUTE_MAX_RISK_PERCENT, epsilon = 1e-9);
    }

    #[test]
    fn test_loss_streak_and_correlation_compound() {
        let mut acct = account(RiskProfile::Aggressive);
        acct.streak = -5;
        acct.correlated_positions = 2;
        let rec = PositionSizer::size(&inputs(), &acct).unwrap();

        // base 2.0 * 1.25 * 0.9 * 0.5 (streak) * 0.7 (correlation)
        assert_relative_eq!(rec.risk_percent, 2.0 * 1.25 * 0.9 * 0.5 * 0.7, epsilon = 1e-9);
    }

    #[test]
    fn test_correlation_cap_at_half() {
        assert_relative_eq!(correlation_multiplier(4), 0.5);
        assert_relative_eq!(correlation_multiplier(10), 0.5);
    }

    #[test]
    fn test_kelly_positive_edge() {
        // p=0.75, R=2: (0.75*2 - 0.25)/2 = 0.625, half-Kelly = 0.3125
        let rec = PositionSizer::size(&inputs(), &account(RiskProfile::Moderate)).unwrap();
        assert_relative_eq!(rec.kelly_suggestion, 0.3125, epsilon = 1e-9);
    }

    #[test]
    fn test_kelly_negative_edge_floors_at_zero() {
        let mut i = inputs();
        i.confidence = 20.0;
        i.risk_reward = 1.0;
        let rec = PositionSizer::size(&i, &account(RiskProfile::Conservative)).unwrap();
        assert_eq!(rec.kelly_suggestion, 0.0);
    }

    #[test]
    fn test_max_fraction_respects_ceiling() {
        let mut i = inputs();
        i.stop_loss = 99.5; // 0.5% stop -> large fractions
        let rec = PositionSizer::size(&i, &account(RiskProfile::VeryAggressive)).unwrap();
        let ceiling = ABSOLUTE_MAX_RISK_PERCENT / 0.5;
        assert!(rec.max_fraction <= ceiling + 1e-9);
    }

    #[test]
    fn test_degenerate_stop_rejected() {
        let mut i = inputs();
        i.stop_loss = 100.0;
        assert!(PositionSizer::size(&i, &account(RiskProfile::Moderate)).is_err());
    }

    #[test]
    fn test_recommendation_confidence_degrades() {
        let clean = PositionSizer::size(&inputs(), &account(RiskProfile::Moderate)).unwrap();

        let mut i = inputs();
        i.confidence = 40.0;
        i.risk_reward = 1.0;
        let mut acct = account(RiskProfile::Moderate);
        acct.drawdown_percent = 25.0;
        acct.streak = -3;
        let stressed = PositionSizer::size(&i, &acct).unwrap();

        assert!(stressed.confidence < clean.confidence);
        assert!(stressed.confidence >= 10.0);
    }
}
