use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CoreError;
use crate::types::{Candle, OutcomeRecord, VolumeSnapshot};

/// Price/volume feed owned by an external collaborator. A failed lookup for
/// one symbol must never stall the callers' handling of other symbols.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn get_price(&self, symbol: &str) -> Result<f64, CoreError>;

    async fn get_ohlc_window(&self, symbol: &str, n: usize) -> Result<Vec<Candle>, CoreError>;

    async fn get_volume(&self, symbol: &str) -> Result<VolumeSnapshot, CoreError>;
}

/// Key-value persistence seam. The core functions fully in-memory when the
/// store is unavailable and re-learns from zero on restart.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_state(&self, key: &str, value: &str) -> Result<(), CoreError>;

    async fn load_state(&self, key: &str) -> Result<Option<String>, CoreError>;
}

/// Downstream consumer of outcome events (UI, notification layers).
/// Delivery is best-effort; implementations must not block the caller.
pub trait OutcomeListener: Send + Sync {
    fn on_outcome(&self, outcome: &OutcomeRecord);
}

#[derive(Default)]
struct SymbolData {
    price: Option<f64>,
    candles: Vec<Candle>,
    volume: Option<VolumeSnapshot>,
}

/// In-memory feed for tests and paper runs. Symbols without data report
/// `DataUnavailable`, same as a real feed outage.
#[derive(Default, Clone)]
pub struct InMemoryFeed {
    data: Arc<RwLock<HashMap<String, SymbolData>>>,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_price(&self, symbol: &str, price: f64) {
        let mut data = self.data.write().await;
        data.entry(symbol.to_string()).or_default().price = Some(price);
    }

    pub async fn set_candles(&self, symbol: &str, candles: Vec<Candle>) {
        let mut data = self.data.write().await;
        data.entry(symbol.to_string()).or_default().candles = candles;
    }

    pub async fn set_volume(&self, symbol: &str, volume: VolumeSnapshot) {
        let mut data = self.data.write().await;
        data.entry(symbol.to_string()).or_default().volume = Some(volume);
    }

    /// Simulate a feed outage for a symbol.
    pub async fn clear_price(&self, symbol: &str) {
        let mut data = self.data.write().await;
        if let Some(entry) = data.get_mut(symbol) {
            entry.price = None;
        }
    }
}

#[async_trait]
impl PriceFeed for InMemoryFeed {
    async fn get_price(&self, symbol: &str) -> Result<f64, CoreError> {
        let data = self.data.read().await;
        data.get(symbol)
            .and_then(|d| d.price)
            .ok_or_else(|| CoreError::DataUnavailable(format!("no price for {symbol}")))
    }

    async fn get_ohlc_window(&self, symbol: &str, n: usize) -> Result<Vec<Candle>, CoreError> {
        let data = self.data.read().await;
        let candles = data
            .get(symbol)
            .map(|d| d.candles.clone())
            .ok_or_else(|| CoreError::DataUnavailable(format!("no candles for {symbol}")))?;
        let start = candles.len().saturating_sub(n);
        Ok(candles[start..].to_vec())
    }

    async fn get_volume(&self, symbol: &str) -> Result<VolumeSnapshot, CoreError> {
        let data = self.data.read().await;
        data.get(symbol)
            .and_then(|d| d.volume)
            .ok_or_else(|| CoreError::DataUnavailable(format!("no volume for {symbol}")))
    }
}

/// In-memory snapshot store for tests and persistence-less deployments.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    async fn save_state(&self, key: &str, value: &str) -> Result<(), CoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn load_state(&self, key: &str) -> Result<Option<String>, CoreError> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }
}
