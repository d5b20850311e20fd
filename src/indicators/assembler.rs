//! Indicator assembler (§4.E).
//!
//! Produces a per-symbol `IndicatorBundle`: entry-timeframe bars plus the
//! full indicator suite, and higher-timeframe trend bars plus EMA-200/ADX
//! with H4-with-D1-fallback. Indicators are computed locally (§ta.rs) over
//! the fetched OHLCV bars rather than via separate provider endpoints per
//! indicator — this makes the alignment invariant structural (every series
//! is produced by iterating the same bar array) instead of a timestamp-join
//! reconciliation step. See DESIGN.md for the grounding/trade-off note.

use super::ta;
use crate::marketdata::MarketDataClient;
use crate::models::{IndicatorBundle, Style, Timeframe};

pub(crate) const ENTRY_BARS_INTRADAY: u32 = 500;
pub(crate) const ENTRY_BARS_SWING: u32 = 500;
pub(crate) const TREND_BARS: u32 = 250;

/// Entry-timeframe bars required for `style`. Shared with the scanner's
/// batch prefetch so both sides request the same timeframe/size pair and
/// share a cache hit.
pub(crate) fn entry_timeframe(style: Style) -> Timeframe {
    match style {
        Style::Intraday => Timeframe::H1,
        Style::Swing => Timeframe::H4,
    }
}

pub(crate) fn entry_bar_count(style: Style) -> u32 {
    match style {
        Style::Intraday => ENTRY_BARS_INTRADAY,
        Style::Swing => ENTRY_BARS_SWING,
    }
}

/// Preferred higher-timeframe trend read for `style`, before the D1
/// fallback kicks in.
pub(crate) fn preferred_trend_timeframe(style: Style) -> Timeframe {
    match style {
        Style::Intraday => Timeframe::H4,
        Style::Swing => Timeframe::D1,
    }
}

pub struct IndicatorAssembler<'a> {
    client: &'a MarketDataClient,
}

impl<'a> IndicatorAssembler<'a> {
    pub fn new(client: &'a MarketDataClient) -> Self {
        Self { client }
    }

    pub async fn assemble(&self, symbol: &str, style: Style) -> IndicatorBundle {
        let mut bundle = IndicatorBundle {
            symbol: symbol.to_string(),
            ..Default::default()
        };

        let entry_tf = entry_timeframe(style);
        let entry_size = entry_bar_count(style);

        match self.client.fetch_ohlcv(symbol, entry_tf, entry_size).await {
            Ok(bars) => {
                self.populate_entry_indicators(&mut bundle, bars, entry_tf);
            }
            Err(err) => {
                bundle.errors.push(format!("entry bars ({entry_tf:?}): {err}"));
            }
        }

        self.assemble_trend(&mut bundle, symbol, style).await;

        bundle
    }

    fn populate_entry_indicators(
        &self,
        bundle: &mut IndicatorBundle,
        bars: Vec<crate::models::Bar>,
        tf: Timeframe,
    ) {
        bundle.ema8 = ta::ema(&closes(&bars), 8);
        bundle.ema20 = ta::ema(&closes(&bars), 20);
        bundle.ema21 = ta::ema(&closes(&bars), 21);
        bundle.ema50 = ta::ema(&closes(&bars), 50);
        bundle.ema55 = ta::ema(&closes(&bars), 55);
        bundle.ema200 = ta::ema(&closes(&bars), 200);
        bundle.sma20 = ta::sma(&closes(&bars), 20);
        bundle.rsi = ta::rsi(&bars, 14);
        bundle.stoch = ta::stoch(&bars, 14, 3);
        bundle.williams_r = ta::williams_r(&bars, 14);
        bundle.cci = ta::cci(&bars, 20);
        bundle.bollinger = ta::bollinger(&bars, 20, 2.0);
        bundle.atr = ta::atr(&bars, 14);
        bundle.adx = ta::adx(&bars, 14);
        bundle.macd = ta::macd(&bars, 12, 26, 9);
        bundle.obv = ta::obv(&bars);
        bundle.entry_timeframe = Some(tf);
        bundle.entry_bars = bars;
    }

    /// H4-trend with D1 fallback: if entry for the `preferred` timeframe
    /// fails, retry on D1 and flag the fallback.
    async fn assemble_trend(&self, bundle: &mut IndicatorBundle, symbol: &str, style: Style) {
        let preferred = preferred_trend_timeframe(style);

        if let Some((bars, ema200, adx)) = self.try_trend_timeframe(symbol, preferred).await {
            bundle.trend_bars = bars;
            bundle.trend_ema200 = ema200;
            bundle.trend_adx = adx;
            bundle.trend_timeframe_used = Some(preferred);
            bundle.trend_fallback_used = false;
            return;
        }

        bundle
            .errors
            .push(format!("trend bars/ema200/adx on {preferred:?} unavailable, falling back to D1"));

        if preferred != Timeframe::D1 {
            if let Some((bars, ema200, adx)) = self.try_trend_timeframe(symbol, Timeframe::D1).await {
                bundle.trend_bars = bars;
                bundle.trend_ema200 = ema200;
                bundle.trend_adx = adx;
                bundle.trend_timeframe_used = Some(Timeframe::D1);
                bundle.trend_fallback_used = true;
                return;
            }
            bundle.errors.push("trend bars/ema200/adx unavailable on D1 fallback too".to_string());
        }
    }

    async fn try_trend_timeframe(
        &self,
        symbol: &str,
        tf: Timeframe,
    ) -> Option<(Vec<crate::models::Bar>, crate::models::ScalarSeries, crate::models::ScalarSeries)> {
        let bars = self.client.fetch_ohlcv(symbol, tf, TREND_BARS).await.ok()?;
        if bars.len() < 200 {
            return None;
        }
        let ema200 = ta::ema(&closes(&bars), 200);
        let adx = ta::adx(&bars, 14);
        match ema200.last() {
            Some(v) if v.is_finite() => {}
            _ => return None,
        }
        Some((bars, ema200, adx))
    }
}

fn closes(bars: &[crate::models::Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::circuit::{CircuitBreaker, CircuitBreakerConfig};
    use crate::ratelimit::{RateLimiter, RateLimiterConfig};
    use std::sync::Arc;

    fn test_client() -> MarketDataClient {
        MarketDataClient::new(
            "http://localhost:0",
            "test-key",
            "Binance",
            Arc::new(TtlCache::new()),
            RateLimiter::new(RateLimiterConfig::default()),
            CircuitBreaker::new("market-data-test", CircuitBreakerConfig::default()),
        )
    }

    #[tokio::test]
    async fn assembly_against_unreachable_provider_records_errors_not_panics() {
        let client = test_client();
        let assembler = IndicatorAssembler::new(&client);
        let bundle = assembler.assemble("EURUSD", Style::Intraday).await;
        assert!(!bundle.errors.is_empty());
        assert!(bundle.entry_bars.is_empty());
    }
}
