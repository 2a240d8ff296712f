pub mod error;
pub mod feed;
pub mod stats;
pub mod types;

pub use error::CoreError;
pub use feed::{InMemoryFeed, InMemoryStore, OutcomeListener, PriceFeed, SnapshotStore};
pub use types::{
    Candle, CandidateSignal, Direction, OutcomeRecord, Priority, QualityTier, ResolutionReason,
    StrategyVote, VolumeSnapshot,
};
