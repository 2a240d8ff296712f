use std::collections::VecDeque;
use std::time::Instant;

use admission_gate::{GateDecision, RejectReason, Verdict};
use signal_core::{OutcomeRecord, ResolutionReason};

/// Structured telemetry for the signal engine.
/// Tracks per-cycle timing, admission counters, and a rolling outcome window.
pub struct EngineMetrics {
    pub cycles_run: u64,
    pub candidates_seen: u64,
    pub admitted: u64,
    pub rejected_duplicate: u64,
    pub rejected_tier: u64,
    pub rejected_threshold: u64,
    pub outcomes_target: u64,
    pub outcomes_stop: u64,
    pub outcomes_timeout: u64,
    pub total_profit_percent: f64,

    pub last_tick_duration_ms: u64,
    pub last_refresh_duration_ms: u64,

    // Rolling 20-outcome window
    recent: VecDeque<RecentOutcome>,
    log_interval_cycles: u64,
}

struct RecentOutcome {
    profit_percent: f64,
    won: bool,
}

impl EngineMetrics {
    pub fn new(log_interval_cycles: u64) -> Self {
        Self {
            cycles_run: 0,
            candidates_seen: 0,
            admitted: 0,
            rejected_duplicate: 0,
            rejected_tier: 0,
            rejected_threshold: 0,
            outcomes_target: 0,
            outcomes_stop: 0,
            outcomes_timeout: 0,
            total_profit_percent: 0.0,
            last_tick_duration_ms: 0,
            last_refresh_duration_ms: 0,
            recent: VecDeque::with_capacity(20),
            log_interval_cycles,
        }
    }

    pub fn start_timer() -> Instant {
        Instant::now()
    }

    pub fn record_tick_duration(&mut self, start: Instant) {
        self.last_tick_duration_ms = start.elapsed().as_millis() as u64;
    }

    pub fn record_refresh_duration(&mut self, start: Instant) {
        self.last_refresh_duration_ms = start.elapsed().as_millis() as u64;
    }

    pub fn record_decision(&mut self, decision: &GateDecision) {
        self.candidates_seen += 1;
        match &decision.verdict {
            Verdict::Admitted { .. } => self.admitted += 1,
            Verdict::Rejected { reason } => match reason {
                RejectReason::Duplicate { .. } => self.rejected_duplicate += 1,
                RejectReason::TierDisabled { .. } => self.rejected_tier += 1,
                RejectReason::BelowThreshold { .. } => self.rejected_threshold += 1,
            },
        }
    }

    pub fn record_outcome(&mut self, outcome: &OutcomeRecord) {
        match outcome.reason {
            ResolutionReason::TargetHit => self.outcomes_target += 1,
            ResolutionReason::StopHit => self.outcomes_stop += 1,
            ResolutionReason::Timeout => self.outcomes_timeout += 1,
        }
        self.total_profit_percent += outcome.profit_percent;

        self.recent.push_back(RecentOutcome {
            profit_percent: outcome.profit_percent,
            won: outcome.is_win(),
        });
        if self.recent.len() > 20 {
            self.recent.pop_front();
        }
    }

    pub fn finish_cycle(&mut self) {
        self.cycles_run += 1;
        if self.log_interval_cycles > 0 && self.cycles_run % self.log_interval_cycles == 0 {
            self.log_metrics();
        }
    }

    /// Rolling win rate from the last 20 outcomes (0-100%)
    pub fn recent_win_rate(&self) -> f64 {
        if self.recent.is_empty() {
            return 0.0;
        }
        let wins = self.recent.iter().filter(|o| o.won).count() as f64;
        (wins / self.recent.len() as f64) * 100.0
    }

    /// Rolling average profit % from the last 20 outcomes
    pub fn recent_avg_profit(&self) -> f64 {
        if self.recent.is_empty() {
            return 0.0;
        }
        self.recent.iter().map(|o| o.profit_percent).sum::<f64>() / self.recent.len() as f64
    }

    pub fn admission_rate(&self) -> f64 {
        if self.candidates_seen == 0 {
            return 0.0;
        }
        (self.admitted as f64 / self.candidates_seen as f64) * 100.0
    }

    /// Emit structured telemetry via tracing
    pub fn log_metrics(&self) {
        tracing::info!(
            cycles = self.cycles_run,
            candidates = self.candidates_seen,
            admitted = self.admitted,
            rejected_duplicate = self.rejected_duplicate,
            rejected_tier = self.rejected_tier,
            rejected_threshold = self.rejected_threshold,
            admission_rate = format!("{:.1}%", self.admission_rate()),
            outcomes_target = self.outcomes_target,
            outcomes_stop = self.outcomes_stop,
            outcomes_timeout = self.outcomes_timeout,
            total_profit = format!("{:.2}%", self.total_profit_percent),
            recent_win_rate = format!("{:.1}%", self.recent_win_rate()),
            recent_avg_profit = format!("{:.2}%", self.recent_avg_profit()),
            last_tick_ms = self.last_tick_duration_ms,
            last_refresh_ms = self.last_refresh_duration_ms,
            "Engine metrics summary"
        );
    }

    /// Serialize counters to JSON for state persistence
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "cycles_run": self.cycles_run,
            "candidates_seen": self.candidates_seen,
            "admitted": self.admitted,
            "rejected_duplicate": self.rejected_duplicate,
            "rejected_tier": self.rejected_tier,
            "rejected_threshold": self.rejected_threshold,
            "outcomes_target": self.outcomes_target,
            "outcomes_stop": self.outcomes_stop,
            "outcomes_timeout": self.outcomes_timeout,
            "total_profit_percent": self.total_profit_percent,
        })
    }

    /// Restore counters from persisted JSON
    pub fn restore_from_json(&mut self, json: &serde_json::Value) {
        if let Some(v) = json.get("cycles_run").and_then(|v| v.as_u64()) {
            self.cycles_run = v;
        }
        if let Some(v) = json.get("candidates_seen").and_then(|v| v.as_u64()) {
            self.candidates_seen = v;
        }
        if let Some(v) = json.get("admitted").and_then(|v| v.as_u64()) {
            self.admitted = v;
        }
        if let Some(v) = json.get("rejected_duplicate").and_then(|v| v.as_u64()) {
            self.rejected_duplicate = v;
        }
        if let Some(v) = json.get("rejected_tier").and_then(|v| v.as_u64()) {
            self.rejected_tier = v;
        }
        if let Some(v) = json.get("rejected_threshold").and_then(|v| v.as_u64()) {
            self.rejected_threshold = v;
        }
        if let Some(v) = json.get("outcomes_target").and_then(|v| v.as_u64()) {
            self.outcomes_target = v;
        }
        if let Some(v) = json.get("outcomes_stop").and_then(|v| v.as_u64()) {
            self.outcomes_stop = v;
        }
        if let Some(v) = json.get("outcomes_timeout").and_then(|v| v.as_u64()) {
            self.outcomes_timeout = v;
        }
        if let Some(v) = json.get("total_profit_percent").and_then(|v| v.as_f64()) {
            self.total_profit_percent = v;
        }
        tracing::info!(
            "Restored metrics from persisted state (cycles={})",
            self.cycles_run
        );
    }
}
