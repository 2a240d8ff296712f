use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signal_core::stats::{ema, mean, rsi, std_dev};
use signal_core::Candle;

mod tracker;

pub use tracker::{RegimeTracker, RegimeTransition};

/// Minimum price points before classification is attempted
pub const MIN_POINTS: usize = 50;

/// Discrete market-phase label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketRegime {
    /// Strong upward trend with aligned EMAs
    BullMomentum,

    /// Strong downward trend with aligned EMAs
    BearMomentum,

    /// Upward bias inside a range
    BullRange,

    /// Downward bias inside a range
    BearRange,

    /// No exploitable direction
    Choppy,

    /// High volatility with a volume surge and skewed RSI
    VolatileBreakout,

    /// Low volatility, tight bands, quiet volume
    Accumulation,
}

impl MarketRegime {
    pub fn name(&self) -> &'static str {
        match self {
            MarketRegime::BullMomentum => "BULL_MOMENTUM",
            MarketRegime::BearMomentum => "BEAR_MOMENTUM",
            MarketRegime::BullRange => "BULL_RANGE",
            MarketRegime::BearRange => "BEAR_RANGE",
            MarketRegime::Choppy => "CHOPPY",
            MarketRegime::VolatileBreakout => "VOLATILE_BREAKOUT",
            MarketRegime::Accumulation => "ACCUMULATION",
        }
    }

    /// Momentum/breakout regimes resolve trades faster than ranging ones
    pub fn is_trending(&self) -> bool {
        matches!(
            self,
            MarketRegime::BullMomentum | MarketRegime::BearMomentum | MarketRegime::VolatileBreakout
        )
    }
}

/// Volatility bucket derived from ATR as % of price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolatilityBucket {
    Low,
    Normal,
    High,
    Extreme,
}

impl VolatilityBucket {
    pub fn from_atr_percent(atr_percent: f64) -> Self {
        if atr_percent >= 5.0 {
            VolatilityBucket::Extreme
        } else if atr_percent >= 3.0 {
            VolatilityBucket::High
        } else if atr_percent >= 1.0 {
            VolatilityBucket::Normal
        } else {
            VolatilityBucket::Low
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, VolatilityBucket::High | VolatilityBucket::Extreme)
    }
}

/// Volume profile relative to the historical average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeProfile {
    Quiet,
    Normal,
    Surge,
}

impl VolumeProfile {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 2.0 {
            VolumeProfile::Surge
        } else if ratio <= 0.5 {
            VolumeProfile::Quiet
        } else {
            VolumeProfile::Normal
        }
    }
}

/// Point-in-time regime classification. Recomputed on each analysis tick;
/// superseded, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeSnapshot {
    pub regime: MarketRegime,
    /// Confidence 0-100, scaled by the magnitude of the deciding signal
    pub confidence: f64,
    /// Trend strength 0-100
    pub trend_strength: f64,
    pub volatility: VolatilityBucket,
    pub atr_percent: f64,
    pub volume_profile: VolumeProfile,
    pub volume_ratio: f64,
    pub reasoning: String,
    pub classified_at: DateTime<Utc>,
}

impl RegimeSnapshot {
    /// Fixed neutral default used when history is too short
    pub fn neutral(points: usize) -> Self {
        Self {
            regime: MarketRegime::Choppy,
            confidence: 50.0,
            trend_strength: 0.0,
            volatility: VolatilityBucket::Normal,
            atr_percent: 0.0,
            volume_profile: VolumeProfile::Normal,
            volume_ratio: 1.0,
            reasoning: format!("Insufficient data: {points} points (need {MIN_POINTS})"),
            classified_at: Utc::now(),
        }
    }
}

/// Intermediate features computed from the candle window
#[derive(Debug, Clone, Copy)]
struct RegimeFeatures {
    trend_strength: f64,
    trend_up: bool,
    atr_percent: f64,
    band_width: f64,
    volume_ratio: f64,
    rsi: f64,
}

/// Rule-based market regime classifier
pub struct RegimeClassifier {
    ema_short: usize,
    ema_medium: usize,
    ema_long: usize,
    rsi_period: usize,
    atr_period: usize,
    bollinger_period: usize,
}

impl RegimeClassifier {
    pub fn new() -> Self {
        Self {
            ema_short: 9,
            ema_medium: 21,
            ema_long: 50,
            rsi_period: 14,
            atr_period: 14,
            bollinger_period: 20,
        }
    }

    /// Classify the current regime from an ordered price/volume window.
    /// Short windows return the neutral default rather than failing.
    pub fn classify(&self, candles: &[Candle]) -> RegimeSnapshot {
        if candles.len() < MIN_POINTS {
            return RegimeSnapshot::neutral(candles.len());
        }

        let features = self.compute_features(candles);
        let (regime, confidence, reasoning) = self.decide(&features);

        RegimeSnapshot {
            regime,
            confidence,
            trend_strength: features.trend_strength,
            volatility: VolatilityBucket::from_atr_percent(features.atr_percent),
            atr_percent: features.atr_percent,
            volume_profile: VolumeProfile::from_ratio(features.volume_ratio),
            volume_ratio: features.volume_ratio,
            reasoning,
            classified_at: Utc::now(),
        }
    }

    fn compute_features(&self, candles: &[Candle]) -> RegimeFeatures {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let price = *closes.last().unwrap_or(&0.0);

        let ema_s = ema(&closes, self.ema_short);
        let ema_m = ema(&closes, self.ema_medium);
        let ema_l = ema(&closes, self.ema_long);
        let rsi_value = rsi(&closes, self.rsi_period);
        let macd = ema(&closes, 12) - ema(&closes, 26);

        let (trend_strength, trend_up) =
            trend_score(price, ema_s, ema_m, ema_l, rsi_value, macd);

        RegimeFeatures {
            trend_strength,
            trend_up,
            atr_percent: atr_percent(candles, self.atr_period),
            band_width: band_width(&closes, self.bollinger_period),
            volume_ratio: volume_ratio(candles),
            rsi: rsi_value,
        }
    }

    /// Priority-ordered decision tree over the computed features.
    fn decide(&self, f: &RegimeFeatures) -> (MarketRegime, f64, String) {
        let volatility = VolatilityBucket::from_atr_percent(f.atr_percent);
        let volume = VolumeProfile::from_ratio(f.volume_ratio);
        let rsi_skew = (f.rsi - 50.0).abs();

        // 1. Volume-backed breakout: elevated volatility + surge + skewed RSI
        if volatility.is_elevated() && volume == VolumeProfile::Surge && rsi_skew > 15.0 {
            let confidence = (55.0 + rsi_skew).min(95.0);
            return (
                MarketRegime::VolatileBreakout,
                confidence,
                format!(
                    "Volatility {:.1}% with volume surge ({:.1}x) and RSI skew {:.0}",
                    f.atr_percent, f.volume_ratio, rsi_skew
                ),
            );
        }

        // 2. Elevated volatility without direction
        if volatility.is_elevated() && f.trend_strength < 45.0 {
            let confidence = (50.0 + f.atr_percent * 4.0).min(90.0);
            return (
                MarketRegime::Choppy,
                confidence,
                format!(
                    "High volatility ({:.1}% ATR) with weak trend ({:.0})",
                    f.atr_percent, f.trend_strength
                ),
            );
        }

        // 3. Elevated volatility riding a strong trend
        if volatility.is_elevated() && f.trend_strength >= 70.0 {
            let regime = if f.trend_up {
                MarketRegime::BullMomentum
            } else {
                MarketRegime::BearMomentum
            };
            return (
                regime,
                f.trend_strength.min(95.0),
                format!(
                    "Strong {} trend ({:.0}) in elevated volatility",
                    if f.trend_up { "up" } else { "down" },
                    f.trend_strength
                ),
            );
        }

        // 4. Quiet accumulation: low volatility, tight bands, no surge
        if volatility == VolatilityBucket::Low
            && f.band_width < 0.04
            && volume != VolumeProfile::Surge
        {
            let confidence = (85.0 - f.band_width * 500.0).max(55.0);
            return (
                MarketRegime::Accumulation,
                confidence,
                format!(
                    "Low volatility ({:.2}% ATR), tight bands ({:.3})",
                    f.atr_percent, f.band_width
                ),
            );
        }

        // 5. Partition by trend strength
        if f.trend_strength >= 70.0 {
            let regime = if f.trend_up {
                MarketRegime::BullMomentum
            } else {
                MarketRegime::BearMomentum
            };
            (
                regime,
                f.trend_strength.min(95.0),
                format!("Strong trend ({:.0}) with aligned EMAs", f.trend_strength),
            )
        } else if f.trend_strength >= 45.0 {
            let regime = if f.trend_up {
                MarketRegime::BullRange
            } else {
                MarketRegime::BearRange
            };
            (
                regime,
                45.0 + (f.trend_strength - 45.0),
                format!("Directional range (trend {:.0})", f.trend_strength),
            )
        } else {
            (
                MarketRegime::Choppy,
                (65.0 - f.trend_strength).max(50.0),
                format!("No exploitable trend ({:.0})", f.trend_strength),
            )
        }
    }
}

impl Default for RegimeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Trend strength 0-100 plus direction, from EMA alignment, price position,
/// RSI deviation from 50, and MACD sign.
fn trend_score(
    price: f64,
    ema_short: f64,
    ema_medium: f64,
    ema_long: f64,
    rsi: f64,
    macd: f64,
) -> (f64, bool) {
    let mut bull = 0.0;
    let mut bear = 0.0;

    // EMA alignment (30 points)
    if ema_short > ema_medium && ema_medium > ema_long {
        bull += 30.0;
    } else if ema_short < ema_medium && ema_medium < ema_long {
        bear += 30.0;
    } else if ema_short > ema_medium {
        bull += 15.0;
    } else {
        bear += 15.0;
    }

    // Price relative to the EMA stack (25 points)
    let above = [ema_short, ema_medium, ema_long]
        .iter()
        .filter(|&&e| price > e)
        .count();
    bull += above as f64 / 3.0 * 25.0;
    bear += (3 - above) as f64 / 3.0 * 25.0;

    // RSI deviation from neutral (25 points)
    let deviation = ((rsi - 50.0).abs() / 50.0 * 25.0).min(25.0);
    if rsi >= 50.0 {
        bull += deviation;
    } else {
        bear += deviation;
    }

    // Momentum crossover (20 points)
    if macd > 0.0 {
        bull += 20.0;
    } else if macd < 0.0 {
        bear += 20.0;
    }

    if bull >= bear {
        (bull, true)
    } else {
        (bear, false)
    }
}

/// Average True Range over the last `period` candles, as % of the last close.
fn atr_percent(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < 2 {
        return 0.0;
    }
    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|w| {
            let high = w[1].high;
            let low = w[1].low;
            let prev_close = w[0].close;
            (high - low)
                .max((high - prev_close).abs())
                .max((low - prev_close).abs())
        })
        .collect();
    let recent = &true_ranges[true_ranges.len().saturating_sub(period)..];
    let atr = mean(recent);
    let price = candles.last().map(|c| c.close).unwrap_or(0.0);
    if price <= f64::EPSILON {
        return 0.0;
    }
    (atr / price) * 100.0
}

/// Normalized Bollinger-Band width: (upper - lower) / middle over `period` closes.
fn band_width(closes: &[f64], period: usize) -> f64 {
    if closes.len() < period {
        return 0.0;
    }
    let window = &closes[closes.len() - period..];
    let middle = mean(window);
    if middle <= f64::EPSILON {
        return 0.0;
    }
    let sd = std_dev(window);
    (4.0 * sd) / middle
}

/// Recent (last 10 candles) vs. whole-window average volume.
fn volume_ratio(candles: &[Candle]) -> f64 {
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    let overall = mean(&volumes);
    if overall <= f64::EPSILON {
        return 1.0;
    }
    let recent = &volumes[volumes.len().saturating_sub(10)..];
    mean(recent) / overall
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_candles(count: usize, step: f64, range: f64, volume: f64) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let base = 100.0 + i as f64 * step;
                Candle {
                    timestamp: Utc::now(),
                    open: base,
                    high: base + range,
                    low: base - range,
                    close: base,
                    volume,
                }
            })
            .collect()
    }

    #[test]
    fn test_insufficient_data_neutral_default() {
        let classifier = RegimeClassifier::new();
        let snapshot = classifier.classify(&make_candles(20, 0.0, 1.0, 1000.0));
        assert_eq!(snapshot.regime, MarketRegime::Choppy);
        assert_eq!(snapshot.confidence, 50.0);
    }

    #[test]
    fn test_uptrend_is_bullish() {
        let classifier = RegimeClassifier::new();
        let snapshot = classifier.classify(&make_candles(100, 0.5, 0.5, 1000.0));
        assert!(matches!(
            snapshot.regime,
            MarketRegime::BullMomentum | MarketRegime::BullRange
        ));
        assert!(snapshot.trend_strength >= 45.0);
    }

    #[test]
    fn test_downtrend_is_bearish() {
        let classifier = RegimeClassifier::new();
        let candles: Vec<Candle> = (0..100)
            .map(|i| {
                let base = 200.0 - i as f64 * 0.5;
                Candle {
                    timestamp: Utc::now(),
                    open: base,
                    high: base + 0.5,
                    low: base - 0.5,
                    close: base,
                    volume: 1000.0,
                }
            })
            .collect();
        let snapshot = classifier.classify(&candles);
        assert!(matches!(
            snapshot.regime,
            MarketRegime::BearMomentum | MarketRegime::BearRange
        ));
    }

    #[test]
    fn test_flat_tight_market_accumulates() {
        let classifier = RegimeClassifier::new();
        // Flat prices, tiny ranges, steady volume
        let snapshot = classifier.classify(&make_candles(100, 0.0, 0.05, 1000.0));
        assert!(matches!(
            snapshot.regime,
            MarketRegime::Accumulation | MarketRegime::Choppy
        ));
        assert_eq!(snapshot.volatility, VolatilityBucket::Low);
    }

    #[test]
    fn test_breakout_on_surge() {
        let classifier = RegimeClassifier::new();
        // Strong uptrend, wide ranges, volume surging at the end
        let candles: Vec<Candle> = (0..100)
            .map(|i| {
                let base = 100.0 + i as f64 * 1.5;
                let volume = if i >= 90 { 9000.0 } else { 1000.0 };
                Candle {
                    timestamp: Utc::now(),
                    open: base,
                    high: base + 6.0,
                    low: base - 6.0,
                    close: base,
                    volume,
                }
            })
            .collect();
        let snapshot = classifier.classify(&candles);
        assert_eq!(snapshot.regime, MarketRegime::VolatileBreakout);
        assert!(snapshot.confidence > 55.0);
        assert_eq!(snapshot.volume_profile, VolumeProfile::Surge);
    }

    #[test]
    fn test_volatility_buckets() {
        assert_eq!(
            VolatilityBucket::from_atr_percent(0.5),
            VolatilityBucket::Low
        );
        assert_eq!(
            VolatilityBucket::from_atr_percent(2.0),
            VolatilityBucket::Normal
        );
        assert_eq!(
            VolatilityBucket::from_atr_percent(4.0),
            VolatilityBucket::High
        );
        assert_eq!(
            VolatilityBucket::from_atr_percent(6.0),
            VolatilityBucket::Extreme
        );
    }
}
