//! Active-signal lifecycle tracking: registration, per-tick price fan-out,
//! stop/target/timeout resolution, and outcome delivery.

pub mod active;
pub mod monitor;

pub use active::{ActiveSignal, ActiveSummary, SignalStatus, PRICE_TOLERANCE};
pub use monitor::{
    FeedHealth, LifecycleMonitor, LOOKUP_TIMEOUT_MS, MAX_OUTCOME_HISTORY, TICK_SECONDS,
    TIMEOUT_HOURS,
};
