use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use signal_core::{InMemoryFeed, InMemoryStore};
use tokio::signal::unix::SignalKind;
use tokio::time;

use signal_engine::{EngineConfig, SignalEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    // Panic hook: log panic info before crashing
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting SignalFlow engine");

    // 2. Load configuration
    let config = EngineConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Watchlist: {}", config.watchlist.join(", "));
    tracing::info!("  Strategies: {}", config.strategies.join(", "));
    tracing::info!("  Risk profile: {}", config.risk_profile.name());
    tracing::info!("  Monitor tick: {}s", config.monitor_tick_seconds);
    tracing::info!("  Market refresh: {}s", config.refresh_interval_seconds);
    tracing::info!("  Queue capacity: {} per priority", config.queue_capacity);

    // 3. Wire the collaborators. The in-memory feed/store stand in until an
    // exchange adapter is attached; the engine runs fully without them.
    let feed = Arc::new(InMemoryFeed::new());
    let store = Arc::new(InMemoryStore::new());

    let mut engine = SignalEngine::new(config.clone(), feed, Some(store));
    engine.restore_state().await;
    tracing::info!("Engine initialized");

    // Prime the regime/threshold state before accepting candidates
    engine.refresh_market().await;

    // Main loop with graceful shutdown (SIGINT + SIGTERM)
    let mut tick_interval = time::interval(Duration::from_secs(config.monitor_tick_seconds));
    let mut refresh_interval = time::interval(Duration::from_secs(config.refresh_interval_seconds));
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                let (outcomes, health) = engine.tick().await;
                if health.total > 0 && health.healthy < health.total {
                    tracing::warn!(
                        healthy = health.healthy,
                        total = health.total,
                        "{}/{} symbols healthy", health.healthy, health.total
                    );
                }
                if !outcomes.is_empty() {
                    engine.persist_state().await;
                }
                engine.process_admitted().await;
            }
            _ = refresh_interval.tick() => {
                engine.refresh_market().await;
                engine.persist_state().await;
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, exiting gracefully...");
                engine.persist_state().await;
                engine.metrics().log_metrics();
                break;
            }
        }
    }

    tracing::info!("Signal engine shut down.");
    Ok(())
}
