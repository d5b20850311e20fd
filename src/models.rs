//! Core data model: bars, indicator series/bundles, instrument metadata,
//! decisions and detections (§3 of the design).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A single OHLCV sample for a timeframe. Invariant: `low <= open, close <=
/// high`, `volume >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn is_valid(&self) -> bool {
        self.low <= self.open
            && self.open <= self.high
            && self.low <= self.close
            && self.close <= self.high
            && self.volume >= 0.0
            && self.low.is_finite()
            && self.high.is_finite()
            && self.open.is_finite()
            && self.close.is_finite()
    }
}

/// Timeframe code used across the data and indicator layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn as_provider_interval(&self) -> &'static str {
        match self {
            Timeframe::H1 => "60min",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "daily",
        }
    }
}

/// Stochastic oscillator composite value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Stoch {
    pub k: f64,
    pub d: f64,
}

/// Bollinger Bands composite value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// MACD composite value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// A scalar series parallel to a bar series. Warmup positions carry
/// `f64::NAN` rather than zero (decided in SPEC_FULL.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScalarSeries(pub Vec<f64>);

impl ScalarSeries {
    pub fn undefined(len: usize) -> Self {
        Self(vec![f64::NAN; len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.0.last().copied()
    }

    /// Index from the end: `at_back(1)` is the last element, `at_back(2)`
    /// the second-to-last, matching the `bars[len-2]` convention.
    pub fn at_back(&self, from_end: usize) -> Option<f64> {
        if from_end == 0 || from_end > self.0.len() {
            return None;
        }
        self.0.get(self.0.len() - from_end).copied()
    }

    /// True if the last `n` values are all finite (defined).
    pub fn last_n_finite(&self, n: usize) -> bool {
        if self.0.len() < n {
            return false;
        }
        self.0[self.0.len() - n..].iter().all(|v| v.is_finite())
    }
}

/// Per-symbol indicator aggregate for both the entry timeframe and the
/// higher trend timeframe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorBundle {
    pub symbol: String,
    pub entry_timeframe: Option<Timeframe>,

    pub entry_bars: Vec<Bar>,
    pub ema8: ScalarSeries,
    pub ema20: ScalarSeries,
    pub ema21: ScalarSeries,
    pub ema50: ScalarSeries,
    pub ema55: ScalarSeries,
    pub ema200: ScalarSeries,
    pub sma20: ScalarSeries,
    pub rsi: ScalarSeries,
    pub stoch: Vec<Stoch>,
    pub williams_r: ScalarSeries,
    pub cci: ScalarSeries,
    pub bollinger: Vec<Bollinger>,
    pub atr: ScalarSeries,
    pub adx: ScalarSeries,
    pub macd: Vec<Macd>,
    pub obv: ScalarSeries,

    pub trend_bars: Vec<Bar>,
    pub trend_ema200: ScalarSeries,
    pub trend_adx: ScalarSeries,
    pub trend_timeframe_used: Option<Timeframe>,
    pub trend_fallback_used: bool,

    pub errors: Vec<String>,
}

impl IndicatorBundle {
    /// Alignment invariant check: every scalar series parallel to
    /// `entry_bars` must have the same length.
    pub fn is_aligned(&self) -> bool {
        let n = self.entry_bars.len();
        [
            self.ema8.len(),
            self.ema20.len(),
            self.ema21.len(),
            self.ema50.len(),
            self.ema55.len(),
            self.ema200.len(),
            self.sma20.len(),
            self.rsi.len(),
            self.stoch.len(),
            self.williams_r.len(),
            self.cci.len(),
            self.bollinger.len(),
            self.atr.len(),
            self.adx.len(),
            self.macd.len(),
            self.obv.len(),
        ]
        .iter()
        .all(|&len| len == n)
    }
}

/// Asset class, drives pip calculation and P&L.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Forex,
    JpyForex,
    Crypto,
    Metal,
    Index,
    Energy,
}

/// Static per-symbol metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: String,
    pub pip_size: f64,
    pub pip_value: f64,
    pub digits: u8,
    pub contract_size: f64,
    pub asset_class: AssetClass,
}

impl InstrumentSpec {
    pub fn pips_between(&self, a: f64, b: f64) -> f64 {
        (a - b).abs() / self.pip_size
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn flipped(&self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

/// Discrete decision quality grade, monotonic in confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    NoTrade,
    C,
    B,
    BPlus,
    A,
    APlus,
}

impl Grade {
    pub fn is_trade_grade(&self) -> bool {
        !matches!(self, Grade::NoTrade)
    }

    pub fn rank(&self) -> u8 {
        match self {
            Grade::NoTrade => 0,
            Grade::C => 1,
            Grade::B => 2,
            Grade::BPlus => 3,
            Grade::A => 4,
            Grade::APlus => 5,
        }
    }
}

impl FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A+" | "APLUS" => Ok(Grade::APlus),
            "A" => Ok(Grade::A),
            "B+" | "BPLUS" => Ok(Grade::BPlus),
            "B" => Ok(Grade::B),
            "C" => Ok(Grade::C),
            "NO-TRADE" | "NO_TRADE" | "NOTRADE" => Ok(Grade::NoTrade),
            other => Err(format!("unrecognized grade: {other}")),
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::C => "C",
            Grade::NoTrade => "no-trade",
        };
        write!(f, "{s}")
    }
}

/// Style the strategy was built for; drives timeframe selection and
/// validity windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    Intraday,
    Swing,
}

/// Closed reason-code enum (§9 design note — never a free string).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    BollingerBandTouch,
    RejectionCandle,
    RsiExtreme,
    H4TrendAligned,
    H4TrendCounter,
    FavorableRiskReward,
    EmaCrossover,
    MacdCrossover,
    AdxStrongTrend,
    StochExtreme,
    CciExtreme,
    WilliamsExtreme,
    VolumeConfirmation,
    BreakoutStructure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalState {
    Optimal,
    Degrading,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub formatted: String,
    pub pips: f64,
    pub rr: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSize {
    pub lots: f64,
    pub units: f64,
    pub risk_amount: f64,
    pub is_approximate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieredExitAction {
    CloseHalf,
    MoveStopToBreakeven,
    CloseRemainder,
    TrailStop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TieredExit {
    pub label: String,
    pub price: f64,
    pub rr: f64,
    pub percent: f64,
    pub action: TieredExitAction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gating {
    pub cooldown_blocked: bool,
    pub volatility_blocked: bool,
    pub cooldown_reason: Option<String>,
    pub volatility_reason: Option<String>,
}

/// Immutable result of a strategy run on one bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub symbol: String,
    pub strategy_id: String,
    pub strategy_name: String,
    pub timestamp: DateTime<Utc>,

    pub direction: Direction,
    pub grade: Grade,
    pub confidence: f64,

    pub entry: PriceLevel,
    pub stop_loss: PriceLevel,
    pub take_profit: PriceLevel,
    pub take_profit_source: String,

    pub position: PositionSize,
    pub tiered_exits: Vec<TieredExit>,
    pub break_even_trigger: f64,
    pub trailing_stop_distance: Option<f64>,

    pub first_detected: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub optimal_entry_window: DateTime<Utc>,
    pub state: SignalState,

    pub triggers: Vec<String>,
    pub reason_codes: Vec<ReasonCode>,
    pub warnings: Vec<String>,
    pub gating: Gating,
}

impl Decision {
    /// §4.G order-validation invariant.
    pub fn order_is_valid(&self) -> bool {
        match self.direction {
            Direction::Long => {
                self.stop_loss.price < self.entry.price && self.entry.price < self.take_profit.price
            }
            Direction::Short => {
                self.stop_loss.price > self.entry.price && self.entry.price > self.take_profit.price
            }
        }
    }

    /// Refresh `state` against `now` per the validity window.
    pub fn refresh_state(&mut self, now: DateTime<Utc>) {
        self.state = if now >= self.valid_until {
            SignalState::Expired
        } else if now >= self.optimal_entry_window {
            SignalState::Degrading
        } else {
            SignalState::Optimal
        };
    }
}

/// Active lifecycle statuses for a `Detection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    CoolingDown,
    Eligible,
    Executed,
    Dismissed,
    Expired,
    Invalidated,
}

impl DetectionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, DetectionStatus::CoolingDown | DetectionStatus::Eligible)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// Persistent lifecycle record for a `(strategyId, symbol, direction)` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub strategy_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub status: DetectionStatus,
    pub grade: Grade,
    pub confidence: f64,
    pub first_detected_at: DateTime<Utc>,
    pub last_detected_at: DateTime<Utc>,
    pub detection_count: u32,
    pub cooldown_ends_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl Detection {
    pub fn key(&self) -> (String, String, Direction) {
        (self.strategy_id.clone(), self.symbol.clone(), self.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_rank_is_monotonic_with_declared_order() {
        let order = [
            Grade::NoTrade,
            Grade::C,
            Grade::B,
            Grade::BPlus,
            Grade::A,
            Grade::APlus,
        ];
        for w in order.windows(2) {
            assert!(w[0] < w[1]);
            assert!(w[0].rank() < w[1].rank());
        }
    }

    #[test]
    fn grade_round_trips_through_display_and_from_str() {
        for g in [Grade::APlus, Grade::A, Grade::BPlus, Grade::B, Grade::C, Grade::NoTrade] {
            let s = g.to_string();
            assert_eq!(s.parse::<Grade>().unwrap(), g);
        }
    }

    #[test]
    fn bar_validity_rejects_inverted_range() {
        let bad = Bar {
            timestamp: Utc::now(),
            open: 1.0,
            high: 0.5,
            low: 0.9,
            close: 1.0,
            volume: 10.0,
        };
        assert!(!bad.is_valid());
    }

    #[test]
    fn scalar_series_back_indexing_matches_signal_bar_convention() {
        let s = ScalarSeries(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(s.at_back(1), Some(4.0));
        assert_eq!(s.at_back(2), Some(3.0));
        assert_eq!(s.at_back(5), None);
    }

    #[test]
    fn decision_order_validity_for_long_and_short() {
        let base = Decision {
            symbol: "EURUSD".into(),
            strategy_id: "s".into(),
            strategy_name: "s".into(),
            timestamp: Utc::now(),
            direction: Direction::Long,
            grade: Grade::A,
            confidence: 80.0,
            entry: PriceLevel { price: 1.10, formatted: String::new(), pips: 0.0, rr: 0.0 },
            stop_loss: PriceLevel { price: 1.095, formatted: String::new(), pips: 0.0, rr: 0.0 },
            take_profit: PriceLevel { price: 1.11, formatted: String::new(), pips: 0.0, rr: 0.0 },
            take_profit_source: String::new(),
            position: PositionSize { lots: 0.1, units: 10000.0, risk_amount: 20.0, is_approximate: false },
            tiered_exits: vec![],
            break_even_trigger: 1.101,
            trailing_stop_distance: None,
            first_detected: Utc::now(),
            valid_until: Utc::now(),
            optimal_entry_window: Utc::now(),
            state: SignalState::Optimal,
            triggers: vec![],
            reason_codes: vec![],
            warnings: vec![],
            gating: Gating::default(),
        };
        assert!(base.order_is_valid());

        let mut short = base.clone();
        short.direction = Direction::Short;
        short.stop_loss.price = 1.11;
        short.take_profit.price = 1.09;
        assert!(short.order_is_valid());

        let mut broken = base.clone();
        broken.stop_loss.price = 1.105; // >= entry, invalid for long
        assert!(!broken.order_is_valid());
    }
}
