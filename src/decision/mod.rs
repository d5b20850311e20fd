//! Decision builder (§4.H): stop/take-profit/tiered-exit construction and
//! position sizing.

pub mod builder;
pub mod position;

pub use builder::{build, RawSignal};
