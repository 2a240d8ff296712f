//! Engine binary internals, exposed as a library so integration tests can
//! drive the full pipeline in-process.

pub mod config;
pub mod engine;
pub mod feedback;
pub mod metrics;
pub mod scheduler;

pub use config::EngineConfig;
pub use engine::{EngineSnapshot, SignalEngine};
pub use feedback::FeedbackLoop;
pub use metrics::EngineMetrics;
pub use scheduler::{CooldownGate, EngineEvent};
