use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use position_sizer::SizeRecommendation;
use signal_core::{
    CandidateSignal, OutcomeListener, OutcomeRecord, PriceFeed, ResolutionReason,
};
use uuid::Uuid;

use crate::active::{ActiveSignal, ActiveSummary, SignalStatus};

/// Monitoring cadence
pub const TICK_SECONDS: u64 = 5;

/// Maximum signal age before a forced close at last known price
pub const TIMEOUT_HOURS: i64 = 48;

/// Budget for one symbol's price lookup; slower lookups are treated the
/// same as a failed one and skipped for the tick
pub const LOOKUP_TIMEOUT_MS: u64 = 1500;

/// Bounded outcome history length
pub const MAX_OUTCOME_HISTORY: usize = 1000;

const BACKOFF_BASE_SECS: i64 = 30;
const BACKOFF_MAX_SECS: i64 = 480;

#[derive(Debug, Clone)]
struct SymbolHealth {
    consecutive_failures: u32,
    retry_after: DateTime<Utc>,
}

/// Healthy/total symbol counts for the current tick
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedHealth {
    pub healthy: usize,
    pub total: usize,
}

/// Watches every active signal: updates extremes and drawdown each tick,
/// resolves stop/target/timeout, and fans each outcome out to listeners.
/// Exactly one outcome is ever produced per signal.
pub struct LifecycleMonitor {
    feed: Arc<dyn PriceFeed>,
    table: DashMap<Uuid, ActiveSignal>,
    history: Mutex<VecDeque<OutcomeRecord>>,
    health: Mutex<HashMap<String, SymbolHealth>>,
    listeners: Vec<Arc<dyn OutcomeListener>>,
    timeout: Duration,
}

impl LifecycleMonitor {
    pub fn new(feed: Arc<dyn PriceFeed>) -> Self {
        Self {
            feed,
            table: DashMap::new(),
            history: Mutex::new(VecDeque::with_capacity(MAX_OUTCOME_HISTORY)),
            health: Mutex::new(HashMap::new()),
            listeners: Vec::new(),
            timeout: Duration::hours(TIMEOUT_HOURS),
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn OutcomeListener>) {
        self.listeners.push(listener);
    }

    /// Register an admitted, sized signal for monitoring with the default
    /// timeout window.
    pub fn register(&self, candidate: CandidateSignal, sizing: SizeRecommendation) {
        self.register_with_expiry(candidate, sizing, None);
    }

    /// Register with an estimated validity window in minutes. The signal is
    /// force-closed at `min(expiry, default timeout)`.
    pub fn register_with_expiry(
        &self,
        candidate: CandidateSignal,
        sizing: SizeRecommendation,
        expiry_minutes: Option<f64>,
    ) {
        let now = Utc::now();
        let window = expiry_minutes
            .map(|m| Duration::seconds((m.max(0.0) * 60.0) as i64))
            .map(|d| d.min(self.timeout))
            .unwrap_or(self.timeout);
        let id = candidate.id;
        let symbol = candidate.symbol.clone();
        self.table
            .insert(id, ActiveSignal::new(candidate, sizing, now, now + window));
        tracing::info!(
            signal_id = %id,
            symbol = %symbol,
            expires_minutes = window.num_minutes(),
            "Signal registered for monitoring"
        );
    }

    pub fn active_count(&self) -> usize {
        self.table.len()
    }

    pub fn summaries(&self, now: DateTime<Utc>) -> Vec<ActiveSummary> {
        self.table.iter().map(|e| e.value().summary(now)).collect()
    }

    pub fn outcomes(&self) -> Vec<OutcomeRecord> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    /// One monitoring pass at the current wall clock.
    pub async fn tick(&self) -> (Vec<OutcomeRecord>, FeedHealth) {
        self.tick_at(Utc::now()).await
    }

    /// One monitoring pass: per-symbol price fan-out with failure isolation,
    /// then stop/target resolution, then the symbol-agnostic timeout sweep.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> (Vec<OutcomeRecord>, FeedHealth) {
        let mut symbols: Vec<String> = self
            .table
            .iter()
            .map(|e| e.value().candidate.symbol.clone())
            .collect();
        symbols.sort();
        symbols.dedup();

        // Concurrent fan-out with a per-lookup budget: one dark or slow
        // symbol never stalls the rest of the tick
        let mut lookups = tokio::task::JoinSet::new();
        for symbol in &symbols {
            if self.in_backoff(symbol, now) {
                continue;
            }
            let feed = Arc::clone(&self.feed);
            let symbol = symbol.clone();
            lookups.spawn(async move {
                let result = tokio::time::timeout(
                    std::time::Duration::from_millis(LOOKUP_TIMEOUT_MS),
                    feed.get_price(&symbol),
                )
                .await;
                (symbol, result)
            });
        }

        let mut prices: HashMap<String, f64> = HashMap::new();
        let mut healthy = 0;
        while let Some(joined) = lookups.join_next().await {
            let Ok((symbol, result)) = joined else {
                continue;
            };
            match result {
                Ok(Ok(price)) => {
                    self.mark_healthy(&symbol);
                    prices.insert(symbol, price);
                    healthy += 1;
                }
                Ok(Err(err)) => {
                    self.mark_failed(&symbol, now);
                    tracing::warn!(symbol = %symbol, error = %err, "Price lookup failed, skipping for this tick");
                }
                Err(_) => {
                    self.mark_failed(&symbol, now);
                    tracing::warn!(
                        symbol = %symbol,
                        budget_ms = LOOKUP_TIMEOUT_MS,
                        "Price lookup timed out, skipping for this tick"
                    );
                }
            }
        }
        let health = FeedHealth {
            healthy,
            total: symbols.len(),
        };

        let mut resolved = Vec::new();

        let ids: Vec<Uuid> = self.table.iter().map(|e| *e.key()).collect();
        for id in ids {
            let Some(mut entry) = self.table.get_mut(&id) else {
                continue;
            };
            let reason = if let Some(&price) = prices.get(&entry.candidate.symbol) {
                entry.observe_price(price);
                entry.resolution_at(price)
            } else {
                None
            };
            // Expiry closes at last known price even when the feed is dark
            let reason = reason
                .or_else(|| (now >= entry.expires_at).then_some(ResolutionReason::Timeout));
            drop(entry);

            if let Some(reason) = reason {
                if let Some((_, signal)) = self.table.remove(&id) {
                    resolved.push(self.close(signal, reason, now));
                }
            }
        }

        (resolved, health)
    }

    fn close(
        &self,
        mut signal: ActiveSignal,
        reason: ResolutionReason,
        now: DateTime<Utc>,
    ) -> OutcomeRecord {
        signal.status = SignalStatus::Exited;
        let exit_price = signal.last_price;
        let outcome = OutcomeRecord {
            signal_id: signal.candidate.id,
            symbol: signal.candidate.symbol.clone(),
            strategy_id: signal.candidate.strategy_id.clone(),
            direction: signal.candidate.direction,
            exit_price,
            profit_percent: signal.profit_percent(exit_price),
            max_drawdown_percent: signal.max_drawdown_percent,
            duration_minutes: (now - signal.registered_at).num_minutes(),
            reason,
            predicted_confidence: signal.candidate.confidence,
            tier: signal.candidate.tier,
            resolved_at: now,
        };

        tracing::info!(
            signal_id = %outcome.signal_id,
            symbol = %outcome.symbol,
            reason = reason.name(),
            profit_percent = outcome.profit_percent,
            "Signal resolved"
        );

        {
            let mut history = self.history.lock().unwrap();
            if history.len() >= MAX_OUTCOME_HISTORY {
                history.pop_front();
            }
            history.push_back(outcome.clone());
        }

        for listener in &self.listeners {
            listener.on_outcome(&outcome);
        }

        outcome
    }

    fn in_backoff(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        let health = self.health.lock().unwrap();
        health
            .get(symbol)
            .map(|h| now < h.retry_after)
            .unwrap_or(false)
    }

    fn mark_healthy(&self, symbol: &str) {
        self.health.lock().unwrap().remove(symbol);
    }

    fn mark_failed(&self, symbol: &str, now: DateTime<Utc>) {
        let mut health = self.health.lock().unwrap();
        let entry = health
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolHealth {
                consecutive_failures: 0,
                retry_after: now,
            });
        entry.consecutive_failures += 1;
        let backoff = (BACKOFF_BASE_SECS << (entry.consecutive_failures - 1).min(4))
            .min(BACKOFF_MAX_SECS);
        entry.retry_after = now + Duration::seconds(backoff);
    }
}
