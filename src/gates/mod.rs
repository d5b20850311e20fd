//! Volatility and cooldown gates (§4.I) applied after a strategy emits a
//! candidate decision, before it reaches the detection store.

pub mod cooldown;
pub mod volatility;

pub use cooldown::CooldownTracker;
pub use volatility::{PercentileRegime, VolatilityRegime};
