//! MACD momentum strategy.
//!
//! Confirms a MACD/signal-line crossover with a rising histogram and OBV
//! agreement. Grounded the same way as [`super::bollinger_mr`].

use crate::decision::{self, RawSignal};
use crate::models::{Decision, Direction, Gating, IndicatorBundle, InstrumentSpec, ReasonCode, Style};
use crate::strategy::quality_gate;
use crate::strategy::scoring::{grade_for_confidence, score, Factor, MIN_EMIT_CONFIDENCE};
use crate::strategy::{Strategy, StrategyKind, StrategyMeta, TimeframePair, UserSettings};
use chrono::Utc;

const STOP_ATR_MULTIPLIER: f64 = 1.8;

pub struct MacdMomentum {
    meta: StrategyMeta,
}

impl Default for MacdMomentum {
    fn default() -> Self {
        Self {
            meta: StrategyMeta {
                id: "macd-momentum",
                name: "MACD Momentum",
                description: "Trades a MACD/signal crossover confirmed by a rising histogram and OBV agreement.",
                style: Style::Intraday,
                kind: StrategyKind::Momentum,
                win_rate: 0.51,
                avg_rr: 1.7,
                signals_per_week: 5.0,
                required_indicators: &["macd", "obv", "atr"],
                timeframes: TimeframePair { trend: crate::models::Timeframe::H4, entry: crate::models::Timeframe::H1 },
                version: "1.0.0",
                min_bars: 60,
            },
        }
    }
}

impl Strategy for MacdMomentum {
    fn meta(&self) -> &StrategyMeta {
        &self.meta
    }

    fn analyze(&self, bundle: &IndicatorBundle, settings: &UserSettings, instrument: &InstrumentSpec) -> Option<Decision> {
        if bundle.macd.len() < 2 || bundle.obv.len() < 2 {
            return None;
        }
        let prev = bundle.macd[bundle.macd.len() - 2];
        let current = *bundle.macd.last()?;

        let crossed_up = prev.macd <= prev.signal && current.macd > current.signal;
        let crossed_down = prev.macd >= prev.signal && current.macd < current.signal;

        let direction = if crossed_up {
            Direction::Long
        } else if crossed_down {
            Direction::Short
        } else {
            return None;
        };

        let gate = quality_gate::evaluate(bundle, self.meta.kind, self.meta.min_bars, direction, self.meta.required_indicators, instrument.asset_class).ok()?;

        let histogram_rising = current.histogram.abs() > prev.histogram.abs();

        let obv_prev = bundle.obv.at_back(2)?;
        let obv_now = bundle.obv.last()?;
        let obv_agrees = match direction {
            Direction::Long => obv_now > obv_prev,
            Direction::Short => obv_now < obv_prev,
        };

        let factors = [
            Factor::new(25.0, true), // crossover, already gated
            Factor::new(20.0, histogram_rising),
            Factor::new(15.0, obv_agrees),
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

        let entry_price = bundle.entry_bars.last()?.open;
        let stop_distance = atr * STOP_ATR_MULTIPLIER;
        let grade = grade_for_confidence(confidence, gate.trend.strong, !gate.counter_trend);

        let mut reason_codes = vec![ReasonCode::MacdCrossover];
        if obv_agrees {
            reason_codes.push(ReasonCode::VolumeConfirmation);
        }
        reason_codes.push(if gate.counter_trend { ReasonCode::H4TrendCounter } else { ReasonCode::H4TrendAligned });

        let triggers = vec![format!("MACD {:?} crossover, histogram {}", direction, if histogram_rising { "rising" } else { "flat" })];

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
            take_profit_source: "momentum target: ATR-multiple stop, fixed R multiple".to_string(),
            triggers,
            reason_codes,
            warnings: vec![],
            gating: Gating::default(),
        };

        Some(decision::build(signal, instrument, settings, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetClass, Bar, Bollinger, ScalarSeries, Stoch, Timeframe};

    fn instrument() -> InstrumentSpec {
        InstrumentSpec {
            symbol: "EURUSD".into(),
            pip_size: 0.0001,
            pip_value: 10.0,
            digits: 5,
            contract_size: 100_000.0,
            asset_class: AssetClass::Forex,
        }
    }

    fn momentum_bundle() -> IndicatorBundle {
        let n = 70;
        let bar = |close: f64| Bar { timestamp: Utc::now(), open: close, high: close + 0.001, low: close - 0.001, close, volume: 1000.0 };

        let mut macd = vec![crate::models::Macd { macd: -0.001, signal: 0.0, histogram: -0.001 }; n];
        macd[n - 2] = crate::models::Macd { macd: -0.0005, signal: 0.0, histogram: -0.0005 };
        macd[n - 1] = crate::models::Macd { macd: 0.0008, signal: 0.0002, histogram: 0.0006 };

        let mut obv = vec![1000.0; n];
        obv[n - 2] = 1000.0;
        obv[n - 1] = 1500.0;

        IndicatorBundle {
            symbol: "EURUSD".into(),
            entry_timeframe: Some(Timeframe::H1),
            entry_bars: vec![bar(1.10); n],
            ema8: ScalarSeries(vec![1.10; n]),
            ema20: ScalarSeries(vec![1.10; n]),
            ema21: ScalarSeries(vec![1.10; n]),
            ema50: ScalarSeries(vec![1.095; n]),
            ema55: ScalarSeries(vec![1.095; n]),
            ema200: ScalarSeries(vec![1.09; n]),
            sma20: ScalarSeries(vec![1.10; n]),
            rsi: ScalarSeries(vec![55.0; n]),
            stoch: vec![Stoch { k: 55.0, d: 50.0 }; n],
            williams_r: ScalarSeries(vec![-45.0; n]),
            cci: ScalarSeries(vec![30.0; n]),
            bollinger: vec![Bollinger { upper: 1.12, middle: 1.10, lower: 1.08 }; n],
            atr: ScalarSeries(vec![0.0015; n]),
            adx: ScalarSeries(vec![27.0; n]),
            macd,
            obv: ScalarSeries(obv),
            trend_bars: vec![bar(1.105); 60],
            trend_ema200: ScalarSeries(vec![1.10; 60]),
            trend_adx: ScalarSeries(vec![26.0; 60]),
            trend_timeframe_used: Some(Timeframe::H4),
            trend_fallback_used: false,
            errors: vec![],
        }
    }

    #[test]
    fn emits_long_on_bullish_macd_cross_with_obv_confirmation() {
        let strategy = MacdMomentum::default();
        let bundle = momentum_bundle();
        let settings = UserSettings::default();
        let instrument = instrument();
        let decision = strategy.analyze(&bundle, &settings, &instrument).expect("should emit");
        assert_eq!(decision.direction, Direction::Long);
        assert!(decision.order_is_valid());
    }

    #[test]
    fn no_crossover_emits_nothing() {
        let strategy = MacdMomentum::default();
        let mut bundle = momentum_bundle();
        bundle.macd = vec![crate::models::Macd { macd: 0.0, signal: 0.0, histogram: 0.0 }; 70];
        let settings = UserSettings::default();
        let instrument = instrument();
        assert!(strategy.analyze(&bundle, &settings, &instrument).is_none());
    }
}
