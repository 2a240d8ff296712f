use std::env;

use anyhow::{bail, Result};
use position_sizer::RiskProfile;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Symbols eligible for monitoring; the first one anchors the
    /// regime classification
    pub watchlist: Vec<String>,

    /// Strategy ids contributing candidates (seeds the weight vector)
    pub strategies: Vec<String>,

    // Cadences
    pub monitor_tick_seconds: u64,  // 5
    pub refresh_interval_seconds: u64, // 45

    // Admission
    pub queue_capacity: usize,      // 50 per priority list

    // Account
    pub account_size: f64,
    pub risk_profile: RiskProfile,

    /// Performance progress scalar -1..+1 fed to threshold adaptation;
    /// supplied by the account collaborator, neutral when absent
    pub progress: f64,
    pub days_remaining: u32,

    pub metrics_log_interval_cycles: u64,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let watchlist: Vec<String> = env::var("WATCHLIST")
            .unwrap_or_else(|_| "BTC,ETH,SOL".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if watchlist.is_empty() {
            bail!("WATCHLIST must name at least one symbol");
        }

        let strategies: Vec<String> = env::var("STRATEGIES")
            .unwrap_or_else(|_| "momentum,mean_reversion,breakout,volume,pattern".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let profile_label = env::var("RISK_PROFILE").unwrap_or_else(|_| "moderate".to_string());
        let risk_profile = parse_profile(&profile_label)?;

        let config = Self {
            watchlist,
            strategies,
            monitor_tick_seconds: env::var("MONITOR_TICK_SECONDS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            refresh_interval_seconds: env::var("REFRESH_INTERVAL")
                .unwrap_or_else(|_| "45".to_string())
                .parse()?,
            queue_capacity: env::var("QUEUE_CAPACITY")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
            account_size: env::var("ACCOUNT_SIZE")
                .unwrap_or_else(|_| "10000.0".to_string())
                .parse()?,
            risk_profile,
            progress: env::var("PROGRESS")
                .unwrap_or_else(|_| "0.0".to_string())
                .parse()?,
            days_remaining: env::var("DAYS_REMAINING")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            metrics_log_interval_cycles: env::var("METRICS_LOG_INTERVAL_CYCLES")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
        };

        if config.account_size <= 0.0 {
            bail!("ACCOUNT_SIZE must be positive");
        }
        if !(-1.0..=1.0).contains(&config.progress) {
            bail!("PROGRESS must be within [-1, 1]");
        }

        Ok(config)
    }

    pub fn reference_symbol(&self) -> &str {
        &self.watchlist[0]
    }
}

fn parse_profile(label: &str) -> Result<RiskProfile> {
    match label.to_ascii_lowercase().as_str() {
        "conservative" => Ok(RiskProfile::Conservative),
        "moderate" => Ok(RiskProfile::Moderate),
        "aggressive" => Ok(RiskProfile::Aggressive),
        "very_aggressive" | "very-aggressive" => Ok(RiskProfile::VeryAggressive),
        other => bail!("Unknown RISK_PROFILE: {other}"),
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watchlist: vec!["BTC".to_string(), "ETH".to_string(), "SOL".to_string()],
            strategies: ["momentum", "mean_reversion", "breakout", "volume", "pattern"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            monitor_tick_seconds: 5,
            refresh_interval_seconds: 45,
            queue_capacity: 50,
            account_size: 10_000.0,
            risk_profile: RiskProfile::Moderate,
            progress: 0.0,
            days_remaining: 30,
            metrics_log_interval_cycles: 10,
        }
    }
}
