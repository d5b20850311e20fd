//! Internal <-> provider symbol/interval translation (§4.D).

use crate::models::{AssetClass, InstrumentSpec, Timeframe};

/// Translate an internal symbol (`EURUSD`, `BTCUSD`) into the provider's
/// slash form (`EUR/USD`, `BTC/USD`), inferring an asset class along the
/// way so callers don't need a side lookup for common pairs.
pub fn to_provider_symbol(symbol: &str) -> String {
    let symbol = symbol.trim().to_ascii_uppercase();
    if symbol.len() == 6 && symbol.chars().all(|c| c.is_ascii_alphabetic()) {
        format!("{}/{}", &symbol[..3], &symbol[3..])
    } else {
        symbol
    }
}

pub fn infer_asset_class(symbol: &str) -> AssetClass {
    let s = symbol.trim().to_ascii_uppercase();
    match s.as_str() {
        "XAUUSD" | "XAGUSD" => AssetClass::Metal,
        "USOIL" | "UKOIL" | "WTIUSD" | "BRENTUSD" => AssetClass::Energy,
        "US30" | "US500" | "NAS100" | "GER40" | "UK100" | "JPN225" => AssetClass::Index,
        _ if s.ends_with("USD") && !is_forex_pair(&s) => AssetClass::Crypto,
        _ if s.starts_with("USDJPY") || s.ends_with("JPY") => AssetClass::JpyForex,
        _ => AssetClass::Forex,
    }
}

fn is_forex_pair(symbol: &str) -> bool {
    const MAJORS: &[&str] = &[
        "EUR", "GBP", "AUD", "NZD", "CAD", "CHF", "JPY", "USD", "SEK", "NOK", "MXN", "ZAR", "TRY",
    ];
    symbol.len() == 6
        && MAJORS.contains(&&symbol[..3])
        && MAJORS.contains(&&symbol[3..])
}

/// Translate a crypto-style symbol into the provider form plus an exchange
/// hint, e.g. `BTCUSD` -> (`BTC/USD`, `Binance`).
pub fn to_provider_crypto(symbol: &str, exchange: &str) -> (String, String) {
    (to_provider_symbol(symbol), exchange.to_string())
}

/// Map internal timeframe codes to provider interval strings.
pub fn to_provider_interval(tf: Timeframe) -> &'static str {
    tf.as_provider_interval()
}

/// Build static per-symbol pip/contract metadata from the asset class
/// alone — this engine trades standard-size instruments, not bespoke
/// per-broker contracts, so a class-level table is sufficient.
pub fn instrument_for(symbol: &str) -> InstrumentSpec {
    let asset_class = infer_asset_class(symbol);
    let (pip_size, digits, contract_size) = match asset_class {
        AssetClass::JpyForex => (0.01, 3, 100_000.0),
        AssetClass::Forex => (0.0001, 5, 100_000.0),
        AssetClass::Crypto => (0.01, 2, 1.0),
        AssetClass::Metal => (0.01, 2, 100.0),
        AssetClass::Index => (1.0, 2, 1.0),
        AssetClass::Energy => (0.01, 2, 1000.0),
    };
    // Standard-lot pip value in quote currency; approximate and flagged as
    // such downstream via `PositionSize::is_approximate` when sizing clips.
    let pip_value = match asset_class {
        AssetClass::JpyForex => 9.30,
        AssetClass::Forex => 10.0,
        AssetClass::Crypto => contract_size * pip_size,
        AssetClass::Metal => contract_size * pip_size,
        AssetClass::Index => contract_size * pip_size,
        AssetClass::Energy => contract_size * pip_size,
    };
    InstrumentSpec { symbol: symbol.to_string(), pip_size, pip_value, digits, contract_size, asset_class }
}
