use regime_classifier::MarketRegime;
use serde::{Deserialize, Serialize};
use signal_core::stats::clamp;
use signal_core::VolumeSnapshot;

/// Validity window bounds
pub const MIN_EXPIRY_MINUTES: f64 = 240.0; // 4 hours
pub const MAX_EXPIRY_MINUTES: f64 = 1440.0; // 24 hours

const MINUTES_PER_DAY: f64 = 1440.0;

/// ATR% below this is treated as degenerate and routed to the fallback table
const DEGENERATE_ATR: f64 = 0.05;

/// Inputs to one expiry estimate
#[derive(Debug, Clone, Copy)]
pub struct ExpiryInputs {
    pub entry_price: f64,
    pub first_target: f64,
    pub stop_loss: f64,
    pub regime: MarketRegime,
    /// ATR as % of price
    pub atr_percent: f64,
    /// Candidate confidence 0-100
    pub confidence: f64,
    pub volume: VolumeSnapshot,
}

/// One named multiplier in the estimate, for observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryFactor {
    pub label: String,
    pub multiplier: f64,
}

/// Bounded validity window with its derivation breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryEstimate {
    pub minutes: f64,
    /// Pre-clamp base estimate ("time to cover the target distance at the
    /// average per-minute move")
    pub base_minutes: f64,
    pub factors: Vec<ExpiryFactor>,
    /// True when a degenerate ATR forced the per-regime fallback
    pub used_fallback: bool,
}

/// Estimate how long a candidate stays actionable.
pub fn estimate(inputs: &ExpiryInputs) -> ExpiryEstimate {
    if inputs.atr_percent < DEGENERATE_ATR {
        let minutes = fallback_minutes(inputs.regime);
        tracing::debug!(
            regime = inputs.regime.name(),
            minutes,
            "Degenerate ATR, using fallback expiry"
        );
        return ExpiryEstimate {
            minutes,
            base_minutes: minutes,
            factors: vec![ExpiryFactor {
                label: format!("degenerate_atr_fallback({})", inputs.regime.name()),
                multiplier: 1.0,
            }],
            used_fallback: true,
        };
    }

    let target_distance = if inputs.entry_price > f64::EPSILON {
        ((inputs.first_target - inputs.entry_price).abs() / inputs.entry_price) * 100.0
    } else {
        0.0
    };

    // Minutes to cover the distance at the average per-minute move,
    // scaled for how efficiently the regime tends to travel.
    let per_minute_move = inputs.atr_percent / MINUTES_PER_DAY;
    let base_minutes = (target_distance / per_minute_move) * regime_base_adjustment(inputs.regime);

    let factors = vec![
        ExpiryFactor {
            label: format!("regime({})", inputs.regime.name()),
            multiplier: regime_multiplier(inputs.regime),
        },
        ExpiryFactor {
            label: format!("volatility(atr={:.1}%)", inputs.atr_percent),
            multiplier: volatility_multiplier(inputs.atr_percent),
        },
        ExpiryFactor {
            label: format!("confidence({:.0})", inputs.confidence),
            multiplier: confidence_multiplier(inputs.confidence),
        },
        ExpiryFactor {
            label: format!("liquidity({:.2}x)", inputs.volume.ratio()),
            multiplier: liquidity_multiplier(inputs.volume.ratio()),
        },
    ];

    // The per-regime fallback is also the formula ceiling, so the estimate
    // is non-increasing in ATR across the degenerate boundary.
    let ceiling = fallback_minutes(inputs.regime).min(MAX_EXPIRY_MINUTES);
    let combined: f64 = factors.iter().map(|f| f.multiplier).product();
    let minutes = clamp(base_minutes * combined, MIN_EXPIRY_MINUTES, ceiling);

    ExpiryEstimate {
        minutes,
        base_minutes,
        factors,
        used_fallback: false,
    }
}

/// Momentum and breakout regimes cover distance more efficiently, so the
/// base estimate shrinks; choppy regimes wander and get more time.
fn regime_base_adjustment(regime: MarketRegime) -> f64 {
    match regime {
        MarketRegime::VolatileBreakout => 0.60,
        MarketRegime::BullMomentum | MarketRegime::BearMomentum => 0.70,
        MarketRegime::BullRange | MarketRegime::BearRange => 1.00,
        MarketRegime::Accumulation => 1.25,
        MarketRegime::Choppy => 1.40,
    }
}

/// Coarser second pass in the same spirit as the base adjustment
fn regime_multiplier(regime: MarketRegime) -> f64 {
    if regime.is_trending() {
        0.85
    } else {
        1.10
    }
}

/// Higher volatility resolves faster: never lengthens the window
fn volatility_multiplier(atr_percent: f64) -> f64 {
    clamp(1.2 - atr_percent * 0.10, 0.5, 1.2)
}

/// Higher confidence shortens the window modestly
fn confidence_multiplier(confidence: f64) -> f64 {
    clamp(1.1 - (confidence / 100.0) * 0.2, 0.9, 1.1)
}

/// Busy symbols move sooner
fn liquidity_multiplier(volume_ratio: f64) -> f64 {
    clamp(1.15 - volume_ratio * 0.15, 0.7, 1.15)
}

/// Fixed per-regime durations for degenerate ATR inputs; also the upper
/// clamp for the formula path
fn fallback_minutes(regime: MarketRegime) -> f64 {
    match regime {
        MarketRegime::VolatileBreakout => 360.0,
        MarketRegime::BullMomentum | MarketRegime::BearMomentum => 480.0,
        MarketRegime::BullRange | MarketRegime::BearRange => 720.0,
        MarketRegime::Accumulation => 960.0,
        MarketRegime::Choppy => 720.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(regime: MarketRegime, atr_percent: f64, confidence: f64) -> ExpiryInputs {
        ExpiryInputs {
            entry_price: 100.0,
            first_target: 103.0,
            stop_loss: 98.0,
            regime,
            atr_percent,
            confidence,
            volume: VolumeSnapshot {
                recent: 1000.0,
                average: 1000.0,
            },
        }
    }

    #[test]
    fn test_expiry_within_bounds() {
        for atr in [0.1, 0.5, 1.0, 3.0, 6.0, 12.0] {
            for regime in [
                MarketRegime::BullMomentum,
                MarketRegime::Choppy,
                MarketRegime::Accumulation,
                MarketRegime::VolatileBreakout,
            ] {
                let e = estimate(&inputs(regime, atr, 70.0));
                assert!(e.minutes >= MIN_EXPIRY_MINUTES, "too short: {}", e.minutes);
                assert!(e.minutes <= MAX_EXPIRY_MINUTES, "too long: {}", e.minutes);
            }
        }
    }

    #[test]
    fn test_monotone_non_increasing_in_atr() {
        // 0.04 -> 0.06 straddles the degenerate-ATR boundary
        let mut last = f64::INFINITY;
        for atr in [0.04, 0.06, 0.1, 0.3, 0.8, 1.5, 3.0, 5.0, 8.0] {
            let e = estimate(&inputs(MarketRegime::BullRange, atr, 70.0));
            assert!(
                e.minutes <= last + 1e-9,
                "expiry grew with volatility at atr={atr}"
            );
            last = e.minutes;
        }
    }

    #[test]
    fn test_fallback_is_formula_ceiling() {
        let below = estimate(&inputs(MarketRegime::Accumulation, 0.04, 70.0));
        let above = estimate(&inputs(MarketRegime::Accumulation, 0.06, 70.0));
        assert!(below.used_fallback);
        assert!(!above.used_fallback);
        assert!(above.minutes <= below.minutes);
    }

    #[test]
    fn test_breakout_much_shorter_than_accumulation() {
        // High-octane breakout vs. sleepy accumulation at equal target distance
        let fast = estimate(&inputs(MarketRegime::VolatileBreakout, 6.0, 90.0));
        let slow = estimate(&inputs(MarketRegime::Accumulation, 1.0, 60.0));
        assert!(
            fast.minutes < slow.minutes * 0.5,
            "expected materially shorter expiry: {} vs {}",
            fast.minutes,
            slow.minutes
        );
    }

    #[test]
    fn test_degenerate_atr_uses_fallback() {
        let e = estimate(&inputs(MarketRegime::Choppy, 0.0, 70.0));
        assert!(e.used_fallback);
        assert_eq!(e.minutes, 720.0);
    }

    #[test]
    fn test_breakdown_emitted() {
        let e = estimate(&inputs(MarketRegime::BullMomentum, 2.0, 80.0));
        assert_eq!(e.factors.len(), 4);
        assert!(e.factors.iter().any(|f| f.label.starts_with("regime(")));
        assert!(e.factors.iter().any(|f| f.label.starts_with("liquidity(")));
    }
}
