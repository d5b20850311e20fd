//! Multi-strategy FX/crypto/metals/index trading-signal decision engine.
//!
//! Wires the singletons (cache, rate limiter, circuit breaker, market-data
//! client, strategy registry, detection store, grade tracker, broadcaster)
//! together, starts the auto-scanner and detection-store sweeper, and
//! serves the thin read-only status API.

use anyhow::{Context, Result};
use signal_engine::api::{router, ApiState};
use signal_engine::broadcaster::Broadcaster;
use signal_engine::cache::{self, TtlCache};
use signal_engine::circuit::{CircuitBreaker, CircuitBreakerConfig};
use signal_engine::detection_store::DetectionStore;
use signal_engine::grade_tracker::GradeTracker;
use signal_engine::marketdata::MarketDataClient;
use signal_engine::persistence::{Backend, DetectionDb, FileDetectionStore};
use signal_engine::ratelimit::{RateLimiter, RateLimiterConfig};
use signal_engine::scanner::{Scanner, ScannerConfig};
use signal_engine::strategy::{default_registry, UserSettings};
use signal_engine::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("invalid configuration")?;
    info!(symbols = ?config.symbols, strategies = ?config.enabled_strategies, "starting signal engine");

    let cache = Arc::new(TtlCache::new());
    let rate_limiter = RateLimiter::new(RateLimiterConfig {
        max_tokens: config.rate_limit.max_tokens,
        refill_rate_per_sec: config.rate_limit.refill_rate_per_sec,
        min_delay_between_acquires: Duration::from_millis(config.rate_limit.min_delay_between_acquires_ms),
        max_queue_size: config.rate_limit.max_queue_size,
        backpressure_threshold: config.rate_limit.backpressure_threshold,
    });
    let circuit = CircuitBreaker::new(
        "market-data",
        CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker.failure_threshold,
            success_threshold: config.circuit_breaker.success_threshold,
            reset_timeout: config.circuit_breaker.reset_timeout,
        },
    );

    let client = Arc::new(MarketDataClient::new(
        config.data_provider_base_url.clone(),
        config.data_provider_api_key.clone(),
        config.crypto_exchange.clone(),
        Arc::clone(&cache),
        rate_limiter,
        circuit,
    ));

    let full_registry = default_registry();
    let enabled_ids: Vec<&str> = config.enabled_strategies.iter().map(String::as_str).collect();
    let registry = Arc::new(signal_engine::strategy::Registry::new(
        full_registry.filter_by_ids(enabled_ids),
    ));
    info!(count = registry.len(), "strategy registry ready");

    let backend = match &config.database_url {
        Some(db_path) => {
            info!(db_path, "using sqlite detection store");
            Backend::Sqlite(DetectionDb::open(db_path).context("failed to open detection database")?)
        }
        None => {
            let path = format!("{}/detections.json", config.drawdown_state_dir);
            info!(%path, "using file-backed detection store (no DATABASE_URL set)");
            Backend::File(FileDetectionStore::open(&path).context("failed to open detection file store")?)
        }
    };
    let detection_store = Arc::new(DetectionStore::new(backend));
    let detection_sweeper = detection_store.spawn_sweeper();

    let cache_sweeper = cache::spawn_sweeper(Arc::clone(&cache));

    let grade_tracker = Arc::new(GradeTracker::new());
    let broadcaster = Arc::new(Broadcaster::new());

    let scanner = Arc::new(Scanner::new(
        Arc::clone(&client),
        Arc::clone(&registry),
        Arc::clone(&detection_store),
        Arc::clone(&grade_tracker),
        Arc::clone(&broadcaster),
        ScannerConfig {
            symbols: config.symbols.clone(),
            tick_interval: Duration::from_millis(config.scan_interval_ms),
            min_grade: config.min_grade,
            settings: UserSettings::default(),
        },
    ));
    let scan_handle = scanner.start();
    info!("auto-scanner started");

    let api_state = ApiState {
        detection_store: Arc::clone(&detection_store),
        grade_tracker: Arc::clone(&grade_tracker),
        scanner: Arc::clone(&scanner),
    };
    let app = router(api_state).layer(CorsLayer::permissive()).layer(TraceLayer::new_for_http());

    let addr = "0.0.0.0:3000";
    let listener = TcpListener::bind(addr).await.context("failed to bind API listener")?;
    info!(addr, "status API listening");

    axum::serve(listener, app).await.context("server error")?;

    scanner.stop();
    detection_store.stop();
    if let Some(handle) = scan_handle {
        let _ = handle.await;
    }
    detection_sweeper.abort();
    cache_sweeper.abort();

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signal_engine=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
