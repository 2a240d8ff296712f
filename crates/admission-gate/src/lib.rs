//! Admission control for candidate signals: duplicate suppression, tier
//! filtering, threshold checks, and the bounded priority queue feeding the
//! downstream consumer.

pub mod dedup;
pub mod gate;
pub mod queue;

pub use dedup::DedupCache;
pub use gate::{
    AdmissionGate, GateConfig, GateDecision, MarketQuality, RejectReason, RejectionEntry, Verdict,
};
pub use queue::{Delivery, QueueStats, SignalQueue};
