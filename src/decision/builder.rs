//! Decision builder (§4.H): turns a strategy's raw
//! `(direction, entry, stop distance, confidence, grade)` into the full
//! `Decision` record — formatted price levels, tiered exits, position
//! size, and the validity window. Grounded on `risk.rs`'s guardrail/clamp
//! constants from the teacher, generalized from fixed Polymarket position
//! caps to the per-instrument sizing algorithm in `position.rs`.

use crate::decision::position::size_position;
use crate::models::{
    Decision, Direction, Gating, Grade, InstrumentSpec, PriceLevel, ReasonCode, SignalState,
    Style, TieredExit, TieredExitAction,
};
use crate::strategy::UserSettings;
use chrono::{DateTime, Duration, Utc};

/// Target reward multiple (in R) for the final take-profit leg, by style.
fn target_rr(style: Style) -> f64 {
    match style {
        Style::Intraday => 1.5,
        Style::Swing => 2.5,
    }
}

/// Validity window lengths (§4.H): intraday signals go stale fast, swing
/// signals tolerate a slower entry.
fn validity_window(style: Style) -> (Duration, Duration) {
    match style {
        Style::Intraday => (Duration::minutes(30), Duration::minutes(60)),
        Style::Swing => (Duration::minutes(120), Duration::minutes(240)),
    }
}

pub struct RawSignal {
    pub symbol: String,
    pub strategy_id: String,
    pub strategy_name: String,
    pub style: Style,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_distance: f64,
    pub confidence: f64,
    pub grade: Grade,
    pub take_profit_source: String,
    pub triggers: Vec<String>,
    pub reason_codes: Vec<ReasonCode>,
    pub warnings: Vec<String>,
    pub gating: Gating,
}

fn level(price: f64, entry: f64, instrument: &InstrumentSpec, rr: f64) -> PriceLevel {
    PriceLevel {
        price,
        formatted: format!("{:.*}", instrument.digits as usize, price),
        pips: instrument.pips_between(entry, price),
        rr,
    }
}

pub fn build(signal: RawSignal, instrument: &InstrumentSpec, settings: &UserSettings, now: DateTime<Utc>) -> Decision {
    let RawSignal {
        symbol,
        strategy_id,
        strategy_name,
        style,
        direction,
        entry_price,
        stop_distance,
        confidence,
        grade,
        take_profit_source,
        triggers,
        reason_codes,
        mut warnings,
        gating,
    } = signal;

    let stop_price = match direction {
        Direction::Long => entry_price - stop_distance,
        Direction::Short => entry_price + stop_distance,
    };

    let rr_target = target_rr(style);
    let take_profit_price = match direction {
        Direction::Long => entry_price + stop_distance * rr_target,
        Direction::Short => entry_price - stop_distance * rr_target,
    };

    let entry = level(entry_price, entry_price, instrument, 0.0);
    let stop_loss = level(stop_price, entry_price, instrument, -1.0);
    let take_profit = level(take_profit_price, entry_price, instrument, rr_target);

    let tiered_exits = build_tiered_exits(direction, entry_price, stop_distance, rr_target, instrument);
    let break_even_trigger = match direction {
        Direction::Long => entry_price + stop_distance,
        Direction::Short => entry_price - stop_distance,
    };

    let (position, sizing_warnings) = size_position(entry_price, stop_price, instrument, settings);
    warnings.extend(sizing_warnings);

    let (optimal_offset, valid_offset) = validity_window(style);
    let decision = Decision {
        symbol,
        strategy_id,
        strategy_name,
        timestamp: now,
        direction,
        grade,
        confidence,
        entry,
        stop_loss,
        take_profit,
        take_profit_source,
        position,
        tiered_exits,
        break_even_trigger,
        trailing_stop_distance: Some(stop_distance),
        first_detected: now,
        valid_until: now + valid_offset,
        optimal_entry_window: now + optimal_offset,
        state: SignalState::Optimal,
        triggers,
        reason_codes,
        warnings,
        gating,
    };

    debug_assert!(decision.order_is_valid(), "decision builder produced an invalid order");
    decision
}

fn build_tiered_exits(
    direction: Direction,
    entry: f64,
    stop_distance: f64,
    rr_target: f64,
    instrument: &InstrumentSpec,
) -> Vec<TieredExit> {
    let sign = match direction {
        Direction::Long => 1.0,
        Direction::Short => -1.0,
    };

    let tp1_price = entry + sign * stop_distance * 1.0;
    let tp2_price = entry + sign * stop_distance * rr_target;

    vec![
        TieredExit {
            label: "TP1".to_string(),
            price: tp1_price,
            rr: 1.0,
            percent: 50.0,
            action: TieredExitAction::CloseHalf,
        },
        TieredExit {
            label: "breakeven".to_string(),
            price: entry,
            rr: 1.0,
            percent: 0.0,
            action: TieredExitAction::MoveStopToBreakeven,
        },
        TieredExit {
            label: "runner".to_string(),
            price: tp2_price,
            rr: rr_target,
            percent: 50.0,
            action: TieredExitAction::TrailStop,
        },
    ]
    .into_iter()
    .map(|mut exit| {
        exit.price = round_to(exit.price, instrument.digits);
        exit
    })
    .collect()
}

fn round_to(value: f64, digits: u8) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}
