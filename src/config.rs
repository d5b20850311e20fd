//! Validated startup configuration.
//!
//! Built once from the environment (ground: `models::Config::from_env` in
//! the teacher). Any missing required value or out-of-range tunable aborts
//! the process before the scheduler starts rather than failing lazily.

use crate::error::EngineError;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_provider_base_url: String,
    pub data_provider_api_key: String,
    pub crypto_exchange: String,
    pub database_url: Option<String>,
    pub drawdown_state_dir: String,

    pub symbols: Vec<String>,
    pub enabled_strategies: Vec<String>,
    pub min_grade: crate::models::Grade,
    pub scan_interval_ms: u64,

    pub rate_limit: RateLimitSettings,
    pub circuit_breaker: CircuitBreakerSettings,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub max_tokens: f64,
    pub refill_rate_per_sec: f64,
    pub min_delay_between_acquires_ms: u64,
    pub max_queue_size: usize,
    pub backpressure_threshold: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_tokens: 8.0,
            refill_rate_per_sec: 2.0,
            min_delay_between_acquires_ms: 50,
            max_queue_size: 200,
            backpressure_threshold: 150,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, EngineError> {
        dotenv::dotenv().ok();

        let data_provider_base_url = std::env::var("DATA_PROVIDER_BASE_URL")
            .unwrap_or_else(|_| "https://api.twelvedata.com".to_string());

        let data_provider_api_key = std::env::var("DATA_PROVIDER_API_KEY")
            .map_err(|_| EngineError::ConfigInvalid("DATA_PROVIDER_API_KEY is required".into()))?;

        let crypto_exchange =
            std::env::var("CRYPTO_EXCHANGE").unwrap_or_else(|_| "Binance".to_string());

        let database_url = std::env::var("DATABASE_URL").ok();

        let drawdown_state_dir =
            std::env::var("DRAWDOWN_STATE_DIR").unwrap_or_else(|_| "./data/drawdown".to_string());

        let symbols = std::env::var("SCAN_SYMBOLS")
            .unwrap_or_else(|_| "EURUSD,GBPUSD,USDJPY,BTCUSD,XAUUSD".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        if symbols.is_empty() {
            return Err(EngineError::ConfigInvalid(
                "SCAN_SYMBOLS resolved to an empty list".into(),
            ));
        }

        let enabled_strategies = std::env::var("ENABLED_STRATEGIES")
            .unwrap_or_else(|_| "bollinger-mr,ema-trend,macd-momentum".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        let min_grade_str = std::env::var("MIN_GRADE").unwrap_or_else(|_| "B".to_string());
        let min_grade = min_grade_str
            .parse::<crate::models::Grade>()
            .map_err(|e| EngineError::ConfigInvalid(format!("MIN_GRADE invalid: {e}")))?;

        let scan_interval_ms = std::env::var("SCAN_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300_000);

        if scan_interval_ms == 0 {
            return Err(EngineError::ConfigInvalid(
                "SCAN_INTERVAL_MS must be positive".into(),
            ));
        }

        Ok(Self {
            data_provider_base_url,
            data_provider_api_key,
            crypto_exchange,
            database_url,
            drawdown_state_dir,
            symbols,
            enabled_strategies,
            min_grade,
            scan_interval_ms,
            rate_limit: RateLimitSettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
        })
    }
}
