use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use signal_core::Direction;

/// Blocks repeat admissions of the same (symbol, direction) inside a fixed
/// validity window. Directions are independent: a SHORT is never blocked by
/// a LONG's entry.
pub struct DedupCache {
    window: Duration,
    entries: HashMap<(String, Direction), DateTime<Utc>>,
}

impl DedupCache {
    pub fn new(window_hours: i64) -> Self {
        Self {
            window: Duration::hours(window_hours),
            entries: HashMap::new(),
        }
    }

    /// Remaining cooldown if the pair was admitted inside the window.
    pub fn cooldown(
        &self,
        symbol: &str,
        direction: Direction,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        let admitted_at = self.entries.get(&(symbol.to_string(), direction))?;
        let expires_at = *admitted_at + self.window;
        if now < expires_at {
            Some(expires_at - now)
        } else {
            None
        }
    }

    /// Record an admission, stamping the window from `now`.
    pub fn record(&mut self, symbol: &str, direction: Direction, now: DateTime<Utc>) {
        self.entries.insert((symbol.to_string(), direction), now);
    }

    /// Drop entries whose window has lapsed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) {
        let window = self.window;
        self.entries
            .retain(|_, admitted_at| now < *admitted_at + window);
    }

    /// Runtime-adjustable window length. Applies to existing entries too.
    pub fn set_window_hours(&mut self, hours: i64) {
        self.window = Duration::hours(hours);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
