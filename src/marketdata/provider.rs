//! Wire types for the upstream market-data HTTP provider (§6).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single OHLCV row as the provider returns it (string-encoded numerics,
/// newest-first — the client re-sorts and re-types these).
#[derive(Debug, Clone, Deserialize)]
pub struct RawOhlcvRow {
    pub datetime: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    #[serde(default)]
    pub volume: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTimeSeriesResponse {
    #[serde(default)]
    pub values: Vec<RawOhlcvRow>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawIndicatorRow {
    pub datetime: String,
    #[serde(flatten)]
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawIndicatorResponse {
    #[serde(default)]
    pub values: Vec<RawIndicatorRow>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RawIndicatorResponse {
    pub fn is_error(&self) -> bool {
        self.status.as_deref() == Some("error")
    }
}

impl RawTimeSeriesResponse {
    pub fn is_error(&self) -> bool {
        self.status.as_deref() == Some("error")
    }
}

/// One leg of a batch request: `SYMBOL::INDICATOR::TIMEFRAME -> {url}`. The
/// `::` delimiter is reserved and never appears inside a bare symbol name.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRequestLeg {
    pub url: String,
}

pub const BATCH_DELIMITER: &str = "::";

pub fn make_batch_request_id(symbol: &str, indicator: &str, timeframe: &str) -> String {
    format!("{symbol}{BATCH_DELIMITER}{indicator}{BATCH_DELIMITER}{timeframe}")
}

pub fn split_batch_request_id(request_id: &str) -> Option<(String, String, String)> {
    let mut parts = request_id.split(BATCH_DELIMITER);
    let symbol = parts.next()?.to_string();
    let indicator = parts.next()?.to_string();
    let timeframe = parts.next()?.to_string();
    Some((symbol, indicator, timeframe))
}

pub type BatchResponse = HashMap<String, RawIndicatorResponse>;

/// Endpoint paths used by the upstream provider (§6).
pub mod endpoint {
    pub const TIME_SERIES: &str = "/time_series";
    pub const EMA: &str = "/ema";
    pub const SMA: &str = "/sma";
    pub const RSI: &str = "/rsi";
    pub const ATR: &str = "/atr";
    pub const ADX: &str = "/adx";
    pub const CCI: &str = "/cci";
    pub const WILLR: &str = "/willr";
    pub const STOCH: &str = "/stoch";
    pub const BBANDS: &str = "/bbands";
    pub const MACD: &str = "/macd";
    pub const OBV: &str = "/obv";
    pub const PRICE: &str = "/price";
    pub const BATCH: &str = "/batch";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_request_id_round_trips() {
        let id = make_batch_request_id("EURUSD", "rsi", "60min");
        assert_eq!(
            split_batch_request_id(&id),
            Some(("EURUSD".to_string(), "rsi".to_string(), "60min".to_string()))
        );
    }

    #[test]
    fn batch_delimiter_cannot_collide_with_bare_symbol() {
        // A bare symbol never contains "::"; guards against malformed ids
        // being misparsed as a 3-part request id.
        assert!(!"EURUSD".contains(BATCH_DELIMITER));
    }
}
