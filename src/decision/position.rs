//! Position sizing (§4.H).
//!
//! Converts a risk percentage and a stop distance into a lot size, capped
//! by a max-position-percent guardrail. Grounded on `risk.rs`'s
//! guardrail-constant/clamp style from the teacher.

use crate::models::{AssetClass, InstrumentSpec, PositionSize};
use crate::strategy::UserSettings;

/// Stop distances past this fraction of entry price are flagged rather
/// than rejected — the strategy's own ATR-derived stop is trusted, but the
/// resulting risk-per-unit is worth surfacing to the caller.
const WIDE_STOP_WARNING_THRESHOLD: f64 = 0.10;

/// Seven-step sizing algorithm (§4.H):
/// 1. risk_amount = account_size * risk_percent / 100
/// 2. stop_distance = |entry - stop|
/// 3. pip_distance = stop_distance / pip_size
/// 4. value_per_pip = instrument.pip_value (per standard lot)
/// 5. lots = risk_amount / (pip_distance * value_per_pip)
/// 6. cap notional to max_position_percent of account; if capped, mark
///    `is_approximate`; round lots to 2 decimals
/// 7. units = floor(lots * contract_size) for forex, unfloored for crypto;
///    warn when the stop is more than 10% of entry away
///
/// Returns the sized position plus any warnings raised along the way.
pub fn size_position(
    entry: f64,
    stop: f64,
    instrument: &InstrumentSpec,
    settings: &UserSettings,
) -> (PositionSize, Vec<String>) {
    let risk_amount = settings.account_size * settings.risk_percent / 100.0;
    let stop_distance = (entry - stop).abs();

    if stop_distance <= 0.0 || !stop_distance.is_finite() {
        return (PositionSize { lots: 0.0, units: 0.0, risk_amount, is_approximate: true }, Vec::new());
    }

    let mut warnings = Vec::new();
    if entry != 0.0 && stop_distance / entry.abs() > WIDE_STOP_WARNING_THRESHOLD {
        warnings.push(format!(
            "stop is {:.1}% from entry, past the 10% guideline",
            stop_distance / entry.abs() * 100.0
        ));
    }

    let pip_distance = stop_distance / instrument.pip_size;
    let value_per_pip = instrument.pip_value;

    let mut lots = if pip_distance > 0.0 && value_per_pip > 0.0 {
        risk_amount / (pip_distance * value_per_pip)
    } else {
        0.0
    };

    let mut is_approximate = false;
    let max_notional = settings.account_size * settings.max_position_percent / 100.0;
    let notional = lots * instrument.contract_size * entry;
    if notional > max_notional && notional > 0.0 {
        let scale = max_notional / notional;
        lots *= scale;
        is_approximate = true;
    }

    lots = (lots * 100.0).round() / 100.0;
    let raw_units = lots * instrument.contract_size;
    let units = match instrument.asset_class {
        AssetClass::Crypto => raw_units,
        _ => raw_units.floor(),
    };

    (PositionSize { lots, units, risk_amount, is_approximate }, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssetClass;

    fn eurusd() -> InstrumentSpec {
        InstrumentSpec {
            symbol: "EURUSD".into(),
            pip_size: 0.0001,
            pip_value: 10.0,
            digits: 5,
            contract_size: 100_000.0,
            asset_class: AssetClass::Forex,
        }
    }

    #[test]
    fn sizes_to_risk_amount_for_known_stop_distance() {
        let instrument = eurusd();
        let settings = UserSettings { account_size: 10_000.0, risk_percent: 1.0, max_position_percent: 50.0 };
        // risk_amount = 100; stop_distance = 0.0020 = 20 pips; value_per_pip = 10
        // lots = 100 / (20 * 10) = 0.5
        let (position, warnings) = size_position(1.1000, 1.0980, &instrument, &settings);
        assert_eq!(position.lots, 0.5);
        assert!(!position.is_approximate);
        assert_eq!(position.units, 50_000.0);
        assert!(warnings.is_empty());
    }

    #[test]
    fn caps_notional_and_marks_approximate() {
        let instrument = eurusd();
        let settings = UserSettings { account_size: 1_000.0, risk_percent: 5.0, max_position_percent: 1.0 };
        let (position, _warnings) = size_position(1.1000, 1.0990, &instrument, &settings);
        assert!(position.is_approximate);
        let notional = position.lots * instrument.contract_size * 1.1000;
        assert!(notional <= settings.account_size * settings.max_position_percent / 100.0 + 1e-6);
    }

    #[test]
    fn zero_stop_distance_is_not_approximated_into_a_size() {
        let instrument = eurusd();
        let settings = UserSettings::default();
        let (position, _warnings) = size_position(1.1000, 1.1000, &instrument, &settings);
        assert_eq!(position.lots, 0.0);
    }

    #[test]
    fn stop_past_ten_percent_of_entry_is_flagged() {
        let instrument = eurusd();
        let settings = UserSettings::default();
        let (_position, warnings) = size_position(1.1000, 0.9000, &instrument, &settings);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("10%"));
    }

    #[test]
    fn crypto_units_are_not_floored() {
        let instrument = InstrumentSpec {
            symbol: "BTCUSD".into(),
            pip_size: 0.01,
            pip_value: 0.01,
            digits: 2,
            contract_size: 1.0,
            asset_class: AssetClass::Crypto,
        };
        let settings = UserSettings { account_size: 10_000.0, risk_percent: 1.0, max_position_percent: 50.0 };
        let (position, _warnings) = size_position(50_000.0, 49_500.0, &instrument, &settings);
        assert_eq!(position.units, position.lots * instrument.contract_size);
    }
}
