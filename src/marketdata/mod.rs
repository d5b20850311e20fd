//! Market-data access layer (§4.D): symbol/interval translation, the
//! resilient HTTP client, and the wire types it speaks.

pub mod client;
pub mod provider;
pub mod symbols;

pub use client::MarketDataClient;
