//! Technical indicator math (§4.E / §3 "Indicator series").
//!
//! Grounded on `jackbot-ta/src/indicators.rs` (SMA/EMA accumulator shape,
//! from the `barter-rs-barter-rs` pack repo), extended to the full
//! indicator set the bundle needs. Every function here returns a series
//! whose length equals the input bar series, with warmup positions carrying
//! `f64::NAN` (the alignment invariant is structural, not a post-hoc pad).

use crate::models::{Bar, Bollinger, Macd, ScalarSeries, Stoch};

pub fn sma(values: &[f64], period: usize) -> ScalarSeries {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return ScalarSeries(out);
    }
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = sum / period as f64;
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = sum / period as f64;
    }
    ScalarSeries(out)
}

pub fn ema(values: &[f64], period: usize) -> ScalarSeries {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return ScalarSeries(out);
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = seed;
    let mut prev = seed;
    for (i, &v) in values.iter().enumerate().skip(period) {
        let next = (v - prev) * multiplier + prev;
        out[i] = next;
        prev = next;
    }
    ScalarSeries(out)
}

fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

pub fn rsi(bars: &[Bar], period: usize) -> ScalarSeries {
    let n = bars.len();
    let mut out = vec![f64::NAN; n];
    if n <= period || period == 0 {
        return ScalarSeries(out);
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let change = bars[i].close - bars[i - 1].close;
        if change >= 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;
    out[period] = rsi_from_averages(avg_gain, avg_loss);

    for i in (period + 1)..n {
        let change = bars[i].close - bars[i - 1].close;
        let (gain, loss) = if change >= 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out[i] = rsi_from_averages(avg_gain, avg_loss);
    }

    ScalarSeries(out)
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Average True Range (Wilder smoothing).
pub fn atr(bars: &[Bar], period: usize) -> ScalarSeries {
    let n = bars.len();
    let mut out = vec![f64::NAN; n];
    if n <= period || period == 0 {
        return ScalarSeries(out);
    }

    let true_range = |i: usize| -> f64 {
        if i == 0 {
            bars[i].high - bars[i].low
        } else {
            let hl = bars[i].high - bars[i].low;
            let hc = (bars[i].high - bars[i - 1].close).abs();
            let lc = (bars[i].low - bars[i - 1].close).abs();
            hl.max(hc).max(lc)
        }
    };

    let mut sum: f64 = (1..=period).map(true_range).sum();
    let mut prev_atr = sum / period as f64;
    out[period] = prev_atr;
    sum = 0.0;
    let _ = sum;

    for i in (period + 1)..n {
        let tr = true_range(i);
        prev_atr = (prev_atr * (period as f64 - 1.0) + tr) / period as f64;
        out[i] = prev_atr;
    }

    ScalarSeries(out)
}

/// Average Directional Index (Wilder), derived from +DI/-DI smoothing.
pub fn adx(bars: &[Bar], period: usize) -> ScalarSeries {
    let n = bars.len();
    let mut out = vec![f64::NAN; n];
    if n <= 2 * period || period == 0 {
        return ScalarSeries(out);
    }

    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    let mut tr = vec![0.0; n];

    for i in 1..n {
        let up_move = bars[i].high - bars[i - 1].high;
        let down_move = bars[i - 1].low - bars[i].low;
        plus_dm[i] = if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 };
        minus_dm[i] = if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 };

        let hl = bars[i].high - bars[i].low;
        let hc = (bars[i].high - bars[i - 1].close).abs();
        let lc = (bars[i].low - bars[i - 1].close).abs();
        tr[i] = hl.max(hc).max(lc);
    }

    let smooth = |series: &[f64], period: usize| -> Vec<f64> {
        let mut smoothed = vec![0.0; series.len()];
        if series.len() <= period {
            return smoothed;
        }
        let mut sum: f64 = series[1..=period].iter().sum();
        smoothed[period] = sum;
        for i in (period + 1)..series.len() {
            sum = sum - (sum / period as f64) + series[i];
            smoothed[i] = sum;
        }
        smoothed
    };

    let tr_smooth = smooth(&tr, period);
    let plus_smooth = smooth(&plus_dm, period);
    let minus_smooth = smooth(&minus_dm, period);

    let mut dx = vec![f64::NAN; n];
    for i in period..n {
        if tr_smooth[i] == 0.0 {
            continue;
        }
        let plus_di = 100.0 * plus_smooth[i] / tr_smooth[i];
        let minus_di = 100.0 * minus_smooth[i] / tr_smooth[i];
        let denom = plus_di + minus_di;
        if denom > 0.0 {
            dx[i] = 100.0 * (plus_di - minus_di).abs() / denom;
        } else {
            dx[i] = 0.0;
        }
    }

    let start = 2 * period;
    if start >= n {
        return ScalarSeries(out);
    }
    let seed: f64 = dx[period..start].iter().filter(|v| v.is_finite()).sum::<f64>() / period as f64;
    out[start - 1] = seed;
    let mut prev = seed;
    for i in start..n {
        if dx[i].is_finite() {
            prev = (prev * (period as f64 - 1.0) + dx[i]) / period as f64;
            out[i] = prev;
        }
    }

    ScalarSeries(out)
}

pub fn macd(bars: &[Bar], fast: usize, slow: usize, signal_period: usize) -> Vec<Macd> {
    let close = closes(bars);
    let ema_fast = ema(&close, fast);
    let ema_slow = ema(&close, slow);
    let n = bars.len();

    let mut macd_line = vec![f64::NAN; n];
    for i in 0..n {
        if ema_fast.0[i].is_finite() && ema_slow.0[i].is_finite() {
            macd_line[i] = ema_fast.0[i] - ema_slow.0[i];
        }
    }

    let signal_line = ema(&macd_line, signal_period);

    (0..n)
        .map(|i| Macd {
            macd: macd_line[i],
            signal: signal_line.0[i],
            histogram: if macd_line[i].is_finite() && signal_line.0[i].is_finite() {
                macd_line[i] - signal_line.0[i]
            } else {
                f64::NAN
            },
        })
        .collect()
}

pub fn bollinger(bars: &[Bar], period: usize, std_mult: f64) -> Vec<Bollinger> {
    let close = closes(bars);
    let n = bars.len();
    let mid = sma(&close, period);
    let mut out = Vec::with_capacity(n);

    for i in 0..n {
        if !mid.0[i].is_finite() {
            out.push(Bollinger { upper: f64::NAN, middle: f64::NAN, lower: f64::NAN });
            continue;
        }
        let window = &close[i + 1 - period..=i];
        let mean = mid.0[i];
        let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        let std_dev = variance.sqrt();
        out.push(Bollinger {
            upper: mean + std_mult * std_dev,
            middle: mean,
            lower: mean - std_mult * std_dev,
        });
    }
    out
}

pub fn stoch(bars: &[Bar], k_period: usize, d_period: usize) -> Vec<Stoch> {
    let n = bars.len();
    let mut k_values = vec![f64::NAN; n];
    for i in 0..n {
        if i + 1 < k_period {
            continue;
        }
        let window = &bars[i + 1 - k_period..=i];
        let highest = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let lowest = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let range = highest - lowest;
        k_values[i] = if range > 0.0 {
            100.0 * (bars[i].close - lowest) / range
        } else {
            50.0
        };
    }
    let d_values = sma(&k_values, d_period);

    (0..n)
        .map(|i| Stoch { k: k_values[i], d: d_values.0[i] })
        .collect()
}

pub fn williams_r(bars: &[Bar], period: usize) -> ScalarSeries {
    let n = bars.len();
    let mut out = vec![f64::NAN; n];
    for i in 0..n {
        if i + 1 < period {
            continue;
        }
        let window = &bars[i + 1 - period..=i];
        let highest = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let lowest = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let range = highest - lowest;
        out[i] = if range > 0.0 {
            -100.0 * (highest - bars[i].close) / range
        } else {
            -50.0
        };
    }
    ScalarSeries(out)
}

pub fn cci(bars: &[Bar], period: usize) -> ScalarSeries {
    let n = bars.len();
    let mut out = vec![f64::NAN; n];
    let typical: Vec<f64> = bars.iter().map(|b| (b.high + b.low + b.close) / 3.0).collect();

    for i in 0..n {
        if i + 1 < period {
            continue;
        }
        let window = &typical[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let mean_dev = window.iter().map(|v| (v - mean).abs()).sum::<f64>() / period as f64;
        out[i] = if mean_dev > 0.0 {
            (typical[i] - mean) / (0.015 * mean_dev)
        } else {
            0.0
        };
    }
    ScalarSeries(out)
}

pub fn obv(bars: &[Bar]) -> ScalarSeries {
    let n = bars.len();
    let mut out = vec![f64::NAN; n];
    if n == 0 {
        return ScalarSeries(out);
    }
    out[0] = 0.0;
    for i in 1..n {
        let prev = out[i - 1];
        out[i] = if bars[i].close > bars[i - 1].close {
            prev + bars[i].volume
        } else if bars[i].close < bars[i - 1].close {
            prev - bars[i].volume
        } else {
            prev
        };
    }
    ScalarSeries(out)
}
