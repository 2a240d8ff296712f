use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OHLCV candle data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Recent vs. historical average volume for a symbol
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    pub recent: f64,
    pub average: f64,
}

impl VolumeSnapshot {
    /// Ratio of recent to average volume (1.0 when average is degenerate)
    pub fn ratio(&self) -> f64 {
        if self.average <= f64::EPSILON {
            return 1.0;
        }
        self.recent / self.average
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

/// Coarse admission-worthiness bucket assigned upstream by the signal producers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityTier {
    High,
    Medium,
    Low,
}

impl QualityTier {
    pub fn name(&self) -> &'static str {
        match self {
            QualityTier::High => "HIGH",
            QualityTier::Medium => "MEDIUM",
            QualityTier::Low => "LOW",
        }
    }

    /// Parse a producer-supplied tier label. Unknown labels are `None`
    /// and get rejected at the gate.
    pub fn parse(label: &str) -> Option<Self> {
        match label.to_ascii_uppercase().as_str() {
            "HIGH" => Some(QualityTier::High),
            "MEDIUM" => Some(QualityTier::Medium),
            "LOW" => Some(QualityTier::Low),
            _ => None,
        }
    }
}

/// Queue priority class for admitted signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
}

impl Priority {
    pub fn name(&self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
        }
    }
}

/// One contributing strategy's vote on a candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyVote {
    pub strategy_id: String,
    pub direction: Direction,
    /// Vote strength 0-100
    pub strength: f64,
}

/// Candidate trading signal produced by strategies outside this core.
/// Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSignal {
    pub id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    /// Ordered price targets, nearest first
    pub targets: Vec<f64>,
    /// Confidence 0-100
    pub confidence: f64,
    pub tier: QualityTier,
    pub strategy_id: String,
    pub votes: Vec<StrategyVote>,
    pub created_at: DateTime<Utc>,
}

impl CandidateSignal {
    /// Distance from entry to stop as a percentage of entry price
    pub fn stop_distance_percent(&self) -> f64 {
        if self.entry_price <= f64::EPSILON {
            return 0.0;
        }
        ((self.entry_price - self.stop_loss).abs() / self.entry_price) * 100.0
    }

    /// Distance from entry to first target as a percentage of entry price
    pub fn target_distance_percent(&self) -> f64 {
        let Some(first) = self.targets.first() else {
            return 0.0;
        };
        if self.entry_price <= f64::EPSILON {
            return 0.0;
        }
        ((first - self.entry_price).abs() / self.entry_price) * 100.0
    }

    /// Reward-to-risk ratio using the first target
    pub fn risk_reward_ratio(&self) -> f64 {
        let risk = self.stop_distance_percent();
        if risk <= f64::EPSILON {
            return 0.0;
        }
        self.target_distance_percent() / risk
    }

    /// Agreement level across contributing strategy votes (0-100):
    /// the strength-weighted share of votes agreeing with the candidate direction.
    pub fn consensus(&self) -> f64 {
        if self.votes.is_empty() {
            return 0.0;
        }
        let total: f64 = self.votes.iter().map(|v| v.strength).sum();
        if total <= f64::EPSILON {
            return 0.0;
        }
        let agreeing: f64 = self
            .votes
            .iter()
            .filter(|v| v.direction == self.direction)
            .map(|v| v.strength)
            .sum();
        (agreeing / total) * 100.0
    }
}

/// Why an active signal resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionReason {
    TargetHit,
    StopHit,
    Timeout,
}

impl ResolutionReason {
    pub fn name(&self) -> &'static str {
        match self {
            ResolutionReason::TargetHit => "TARGET_HIT",
            ResolutionReason::StopHit => "STOP_HIT",
            ResolutionReason::Timeout => "TIMEOUT",
        }
    }
}

/// Realized result of one admitted, sized, monitored signal.
/// Append-only; the payload delivered to the feedback loop and listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub signal_id: Uuid,
    pub symbol: String,
    pub strategy_id: String,
    pub direction: Direction,
    pub exit_price: f64,
    /// Realized profit percent, direction-aware (positive = win)
    pub profit_percent: f64,
    /// Worst adverse excursion during the trade, percent
    pub max_drawdown_percent: f64,
    pub duration_minutes: i64,
    pub reason: ResolutionReason,
    /// Prediction metadata carried for learning attribution
    pub predicted_confidence: f64,
    pub tier: QualityTier,
    pub resolved_at: DateTime<Utc>,
}

impl OutcomeRecord {
    pub fn is_win(&self) -> bool {
        self.profit_percent > 0.0
    }
}
