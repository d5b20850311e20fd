//! Strategy kernel (§4.G).
//!
//! Uniform contract each strategy implements, a process-wide immutable
//! registry, and shared utilities (signal-bar/entry-bar convention,
//! confidence scoring helpers). Grounded on the `other_examples`
//! strategy-trait/registry files (`9bea2ae2_...traits.rs`,
//! `ab068608_...registry.rs`), adapted to a synchronous, I/O-free contract.

pub mod bollinger_mr;
pub mod ema_trend;
pub mod macd_momentum;
pub mod quality_gate;
pub mod scoring;

use crate::models::{Decision, IndicatorBundle, Style};
use std::collections::HashMap;
use std::sync::Arc;

/// Broad behavioral class a strategy belongs to — drives which pre-flight
/// trend rule applies (§4.F point 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    TrendFollowing,
    Momentum,
    MeanReversion,
}

#[derive(Debug, Clone)]
pub struct TimeframePair {
    pub trend: crate::models::Timeframe,
    pub entry: crate::models::Timeframe,
}

#[derive(Debug, Clone)]
pub struct StrategyMeta {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub style: Style,
    pub kind: StrategyKind,
    pub win_rate: f64,
    pub avg_rr: f64,
    pub signals_per_week: f64,
    pub required_indicators: &'static [&'static str],
    pub timeframes: TimeframePair,
    pub version: &'static str,
    pub min_bars: usize,
}

/// Per-call tunables a caller may override; strategies must not read
/// ambient/global configuration (§9 — strategy config lives on the
/// instance, never a global).
#[derive(Debug, Clone)]
pub struct UserSettings {
    pub account_size: f64,
    pub risk_percent: f64,
    pub max_position_percent: f64,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            account_size: 10_000.0,
            risk_percent: 1.0,
            max_position_percent: 10.0,
        }
    }
}

/// Uniform strategy contract. Implementations are pure over
/// `(bundle, settings)` — no I/O, no suspension.
pub trait Strategy: Send + Sync {
    fn meta(&self) -> &StrategyMeta;

    fn analyze(
        &self,
        bundle: &IndicatorBundle,
        settings: &UserSettings,
        instrument: &crate::models::InstrumentSpec,
    ) -> Option<Decision>;
}

/// Process-wide immutable map of strategies, built once at startup.
pub struct Registry {
    strategies: HashMap<&'static str, Arc<dyn Strategy>>,
}

impl Registry {
    pub fn new(strategies: Vec<Arc<dyn Strategy>>) -> Self {
        let mut map = HashMap::with_capacity(strategies.len());
        for strategy in strategies {
            map.insert(strategy.meta().id, strategy);
        }
        Self { strategies: map }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.get(id).cloned()
    }

    pub fn all(&self) -> Vec<Arc<dyn Strategy>> {
        self.strategies.values().cloned().collect()
    }

    pub fn filter_by_style(&self, style: Style) -> Vec<Arc<dyn Strategy>> {
        self.strategies
            .values()
            .filter(|s| s.meta().style == style)
            .cloned()
            .collect()
    }

    pub fn filter_by_ids<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Vec<Arc<dyn Strategy>> {
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Default registry wired up with the bundled strategies.
pub fn default_registry() -> Registry {
    Registry::new(vec![
        Arc::new(bollinger_mr::BollingerMeanReversion::default()),
        Arc::new(ema_trend::EmaTrendFollowing::default()),
        Arc::new(macd_momentum::MacdMomentum::default()),
    ])
}
