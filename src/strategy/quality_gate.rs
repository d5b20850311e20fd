//! Signal Quality Gate (§4.F) — the pre-flight validator every strategy
//! runs before scoring. Rejects bundles that are too short, have a dead
//! ATR, or have warmup-undefined required indicators; classifies the H4/D1
//! trend and the volatility regime so strategies can apply the
//! counter-trend and regime rules without recomputing them.

use crate::gates::volatility::{self, PercentileRegime, VolatilityRegime};
use crate::models::{AssetClass, Direction, IndicatorBundle};
use crate::strategy::StrategyKind;

const REQUIRED_TAIL: usize = 5;
const STRONG_ADX: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl TrendDirection {
    fn opposes(&self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (TrendDirection::Bullish, Direction::Short) | (TrendDirection::Bearish, Direction::Long)
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    pub strong: bool,
}

/// Read the higher-timeframe trend off the bundle's trend series.
pub fn h4_trend(bundle: &IndicatorBundle) -> Option<TrendAnalysis> {
    let close = bundle.trend_bars.last()?.close;
    let ema200 = bundle.trend_ema200.last()?;
    let adx = bundle.trend_adx.last()?;
    if !ema200.is_finite() || !adx.is_finite() {
        return None;
    }
    let direction = if close > ema200 {
        TrendDirection::Bullish
    } else if close < ema200 {
        TrendDirection::Bearish
    } else {
        TrendDirection::Neutral
    };
    Some(TrendAnalysis { direction, strong: adx >= STRONG_ADX })
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateRejection {
    InsufficientBars { have: usize, need: usize },
    AtrUnavailable,
    IndicatorNotReady(&'static str),
    TrendUnavailable,
    HardCounterTrend,
    VolatilityRegimeBlocked,
    VolatilityPercentileBlocked,
}

impl std::fmt::Display for GateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateRejection::InsufficientBars { have, need } => {
                write!(f, "insufficient bars: have {have}, need {need}")
            }
            GateRejection::AtrUnavailable => write!(f, "ATR undefined or non-positive at signal bar"),
            GateRejection::IndicatorNotReady(name) => write!(f, "indicator '{name}' not warmed up"),
            GateRejection::TrendUnavailable => write!(f, "H4/D1 trend data unavailable"),
            GateRejection::HardCounterTrend => write!(f, "strong counter-trend, hard reject"),
            GateRejection::VolatilityRegimeBlocked => write!(f, "volatility regime vetoes this strategy kind"),
            GateRejection::VolatilityPercentileBlocked => write!(f, "volatility percentile regime vetoes this strategy kind"),
        }
    }
}

/// Outcome of a passing gate evaluation: context the strategy's scoring
/// step consumes.
#[derive(Debug, Clone, Copy)]
pub struct GateOutcome {
    pub trend: TrendAnalysis,
    pub regime: VolatilityRegime,
    pub percentile_regime: PercentileRegime,
    /// Multiplier applied to confidence for soft counter-trend cases
    /// (mean-reversion strategies trading against a weak H4 trend).
    pub confidence_multiplier: f64,
    pub counter_trend: bool,
}

/// Evaluate the gate for a candidate `direction` on `bundle`.
///
/// `required` lists the indicator-series names (as used in
/// `StrategyMeta::required_indicators`) that must have their last
/// [`REQUIRED_TAIL`] values defined.
pub fn evaluate(
    bundle: &IndicatorBundle,
    kind: StrategyKind,
    min_bars: usize,
    direction: Direction,
    required: &[&'static str],
    asset_class: AssetClass,
) -> Result<GateOutcome, GateRejection> {
    if bundle.entry_bars.len() < min_bars {
        return Err(GateRejection::InsufficientBars { have: bundle.entry_bars.len(), need: min_bars });
    }

    match bundle.atr.last() {
        Some(v) if v.is_finite() && v > 0.0 => {}
        _ => return Err(GateRejection::AtrUnavailable),
    }

    for name in required {
        if !indicator_tail_finite(bundle, name) {
            return Err(GateRejection::IndicatorNotReady(name));
        }
    }

    let trend = h4_trend(bundle).ok_or(GateRejection::TrendUnavailable)?;
    let regime = volatility::classify_ratio(&bundle.atr, asset_class).unwrap_or(VolatilityRegime::Normal);
    let percentile_regime = volatility::classify_percentile(&bundle.atr).unwrap_or(PercentileRegime::Normal);

    if regime.vetoes(kind) {
        return Err(GateRejection::VolatilityRegimeBlocked);
    }
    if percentile_regime.vetoes(kind) {
        return Err(GateRejection::VolatilityPercentileBlocked);
    }

    let counter_trend = trend.direction.opposes(direction);
    let confidence_multiplier = if counter_trend {
        match kind {
            // Trend/momentum strategies never trade against a strong H4
            // trend; against a weak one they are simply not this
            // strategy's setup, so the gate still allows it through
            // unscaled and lets confidence scoring do the rest.
            StrategyKind::TrendFollowing | StrategyKind::Momentum if trend.strong => {
                return Err(GateRejection::HardCounterTrend);
            }
            // Mean-reversion against a strong trend is a low-probability
            // fade: halve confidence rather than reject outright.
            StrategyKind::MeanReversion if trend.strong => 0.5,
            _ => 1.0,
        }
    } else {
        1.0
    };

    Ok(GateOutcome { trend, regime, percentile_regime, confidence_multiplier, counter_trend })
}

fn indicator_tail_finite(bundle: &IndicatorBundle, name: &str) -> bool {
    match name {
        "ema8" => bundle.ema8.last_n_finite(REQUIRED_TAIL),
        "ema20" => bundle.ema20.last_n_finite(REQUIRED_TAIL),
        "ema21" => bundle.ema21.last_n_finite(REQUIRED_TAIL),
        "ema50" => bundle.ema50.last_n_finite(REQUIRED_TAIL),
        "ema55" => bundle.ema55.last_n_finite(REQUIRED_TAIL),
        "ema200" => bundle.ema200.last_n_finite(REQUIRED_TAIL),
        "sma20" => bundle.sma20.last_n_finite(REQUIRED_TAIL),
        "rsi" => bundle.rsi.last_n_finite(REQUIRED_TAIL),
        "williams_r" => bundle.williams_r.last_n_finite(REQUIRED_TAIL),
        "cci" => bundle.cci.last_n_finite(REQUIRED_TAIL),
        "atr" => bundle.atr.last_n_finite(REQUIRED_TAIL),
        "adx" => bundle.adx.last_n_finite(REQUIRED_TAIL),
        "obv" => bundle.obv.last_n_finite(REQUIRED_TAIL),
        "stoch" => bundle.stoch.len() >= REQUIRED_TAIL
            && bundle.stoch[bundle.stoch.len() - REQUIRED_TAIL..]
                .iter()
                .all(|s| s.k.is_finite() && s.d.is_finite()),
        "bollinger" => bundle.bollinger.len() >= REQUIRED_TAIL
            && bundle.bollinger[bundle.bollinger.len() - REQUIRED_TAIL..]
                .iter()
                .all(|b| b.upper.is_finite() && b.middle.is_finite() && b.lower.is_finite()),
        "macd" => bundle.macd.len() >= REQUIRED_TAIL
            && bundle.macd[bundle.macd.len() - REQUIRED_TAIL..]
                .iter()
                .all(|m| m.macd.is_finite() && m.signal.is_finite() && m.histogram.is_finite()),
        _ => true,
    }
}
