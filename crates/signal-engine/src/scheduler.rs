use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// Event classes that can trigger an off-cadence evaluation cycle.
/// Each carries its own cooldown so a thrashing market cannot re-trigger
/// the same reaction in a tight loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineEvent {
    RegimeChange,
    VolatilitySpike,
    LargeFlow,
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::RegimeChange => "regime_change",
            EngineEvent::VolatilitySpike => "volatility_spike",
            EngineEvent::LargeFlow => "large_flow",
        }
    }

    fn default_cooldown(&self) -> Duration {
        match self {
            EngineEvent::RegimeChange => Duration::minutes(2),
            EngineEvent::VolatilitySpike => Duration::minutes(1),
            EngineEvent::LargeFlow => Duration::minutes(5),
        }
    }
}

/// Per-event-type rate limiter keyed on last-fired timestamps.
pub struct CooldownGate {
    cooldowns: HashMap<EngineEvent, Duration>,
    last_fired: HashMap<EngineEvent, DateTime<Utc>>,
}

impl CooldownGate {
    pub fn new() -> Self {
        let events = [
            EngineEvent::RegimeChange,
            EngineEvent::VolatilitySpike,
            EngineEvent::LargeFlow,
        ];
        Self {
            cooldowns: events
                .iter()
                .map(|e| (*e, e.default_cooldown()))
                .collect(),
            last_fired: HashMap::new(),
        }
    }

    pub fn with_cooldown(mut self, event: EngineEvent, cooldown: Duration) -> Self {
        self.cooldowns.insert(event, cooldown);
        self
    }

    /// Returns true and stamps the event when its cooldown has lapsed.
    pub fn try_fire(&mut self, event: EngineEvent, now: DateTime<Utc>) -> bool {
        let cooldown = self
            .cooldowns
            .get(&event)
            .copied()
            .unwrap_or_else(|| event.default_cooldown());
        if let Some(last) = self.last_fired.get(&event) {
            if now - *last < cooldown {
                tracing::debug!(
                    event = event.name(),
                    remaining_secs = (cooldown - (now - *last)).num_seconds(),
                    "Event suppressed by cooldown"
                );
                return false;
            }
        }
        self.last_fired.insert(event, now);
        true
    }
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new()
    }
}
