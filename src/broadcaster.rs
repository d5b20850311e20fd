//! Event broadcaster (§4.M).
//!
//! Fans decision/error events out to any number of subscribers via a
//! `tokio::sync::broadcast` channel. Grounded on the teacher's
//! `signal_tx: broadcast::Sender<WsServerEvent>` + `websocket_broadcaster`
//! pump in `main.rs`, generalized from a single `WsServerEvent` enum to
//! this engine's event categories, with an added dedup cache so a
//! subscriber that reconnects mid-cooldown doesn't re-alert on the same
//! detection.

use crate::models::Decision;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 1024;
const DEDUP_CACHE_CAPACITY: usize = 500;

#[derive(Debug, Clone)]
pub enum EngineEvent {
    Decision(Box<Decision>),
    GradeUpgrade(crate::grade_tracker::UpgradeEvent),
    ScanError { symbol: String, detail: String, at: DateTime<Utc> },
    ScanCompleted { symbols_scanned: usize, decisions_emitted: usize, at: DateTime<Utc> },
}

pub struct Broadcaster {
    tx: broadcast::Sender<EngineEvent>,
    dedup: Mutex<DedupCache>,
}

struct DedupCache {
    seen: HashSet<String>,
    order: std::collections::VecDeque<String>,
}

impl DedupCache {
    fn new() -> Self {
        Self { seen: HashSet::new(), order: std::collections::VecDeque::new() }
    }

    /// `true` if this is a key we haven't alerted on before.
    fn insert_if_new(&mut self, key: String) -> bool {
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() >= DEDUP_CACHE_CAPACITY {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        self.order.push_back(key.clone());
        self.seen.insert(key);
        true
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, dedup: Mutex::new(DedupCache::new()) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: EngineEvent) {
        // A closed channel (zero subscribers) is not an error: the engine
        // can run headless.
        if let Err(err) = self.tx.send(event) {
            debug!(receivers = 0, "broadcast with no subscribers: {err}");
        }
    }

    /// Publish a decision, deduped on `(strategy_id, symbol, direction,
    /// grade)` so repeated identical emissions within a cooldown window
    /// don't spam subscribers.
    pub fn publish_decision(&self, decision: Decision) {
        let key = format!("{}:{}:{:?}:{}", decision.strategy_id, decision.symbol, decision.direction, decision.grade);
        let is_new = self.dedup.lock().insert_if_new(key);
        if !is_new {
            return;
        }
        self.publish(EngineEvent::Decision(Box::new(decision)));
    }

    pub fn publish_grade_upgrade(&self, event: crate::grade_tracker::UpgradeEvent) {
        self.publish(EngineEvent::GradeUpgrade(event));
    }

    pub fn publish_scan_error(&self, symbol: impl Into<String>, detail: impl Into<String>) {
        let symbol = symbol.into();
        let detail = detail.into();
        warn!(%symbol, %detail, "scan error");
        self.publish(EngineEvent::ScanError { symbol, detail, at: Utc::now() });
    }

    pub fn publish_scan_completed(&self, symbols_scanned: usize, decisions_emitted: usize) {
        self.publish(EngineEvent::ScanCompleted { symbols_scanned, decisions_emitted, at: Utc::now() });
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, Gating, Grade, PositionSize, PriceLevel, SignalState};

    fn sample_decision(grade: Grade) -> Decision {
        let now = Utc::now();
        Decision {
            symbol: "EURUSD".into(),
            strategy_id: "bollinger-mr".into(),
            strategy_name: "Bollinger Mean Reversion".into(),
            timestamp: now,
            direction: Direction::Long,
            grade,
            confidence: 70.0,
            entry: PriceLevel { price: 1.1, formatted: String::new(), pips: 0.0, rr: 0.0 },
            stop_loss: PriceLevel { price: 1.09, formatted: String::new(), pips: 0.0, rr: -1.0 },
            take_profit: PriceLevel { price: 1.12, formatted: String::new(), pips: 0.0, rr: 2.0 },
            take_profit_source: String::new(),
            position: PositionSize { lots: 0.1, units: 10_000.0, risk_amount: 10.0, is_approximate: false },
            tiered_exits: vec![],
            break_even_trigger: 1.11,
            trailing_stop_distance: None,
            first_detected: now,
            valid_until: now,
            optimal_entry_window: now,
            state: SignalState::Optimal,
            triggers: vec![],
            reason_codes: vec![],
            warnings: vec![],
            gating: Gating::default(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_decision() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe();
        broadcaster.publish_decision(sample_decision(Grade::A));
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::Decision(_)));
    }

    #[tokio::test]
    async fn duplicate_decision_is_not_republished() {
        let broadcaster = Broadcaster::new();
        let mut rx = broadcaster.subscribe();
        broadcaster.publish_decision(sample_decision(Grade::A));
        broadcaster.publish_decision(sample_decision(Grade::A));
        let _first = rx.recv().await.unwrap();
        let second = tokio::time::timeout(tokio::time::Duration::from_millis(50), rx.recv()).await;
        assert!(second.is_err(), "second identical publish should have been deduped");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish_decision(sample_decision(Grade::B));
    }
}
