//! Grade tracker (§4.J).
//!
//! Tracks the last known grade per `(strategyId, symbol, direction)` and
//! emits an upgrade event whenever a fresh decision's grade outranks the
//! previous one for that key — e.g. a `B` detection re-scoring to `A` on a
//! later tick. Downgrades update the tracked grade but are not events.
//! Recent upgrades are kept in a bounded ring buffer for the status API.
//! Grounded on the teacher's event-on-state-change dispatch in `main.rs`'s
//! broadcaster wiring.

use crate::models::{Decision, Direction, Grade};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

const RING_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct UpgradeEvent {
    pub strategy_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub from_grade: Grade,
    pub to_grade: Grade,
    pub at: DateTime<Utc>,
}

type Key = (String, String, Direction);

pub struct GradeTracker {
    last_grade: Mutex<HashMap<Key, Grade>>,
    recent_upgrades: Mutex<VecDeque<UpgradeEvent>>,
}

impl GradeTracker {
    pub fn new() -> Self {
        Self { last_grade: Mutex::new(HashMap::new()), recent_upgrades: Mutex::new(VecDeque::new()) }
    }

    /// Feed a freshly scored decision in. Returns `Some` only when this
    /// sighting's grade strictly outranks the previously tracked grade for
    /// the same key.
    pub fn observe(&self, decision: &Decision) -> Option<UpgradeEvent> {
        let key: Key = (decision.strategy_id.clone(), decision.symbol.clone(), decision.direction);
        let mut last = self.last_grade.lock();
        let prior = last.insert(key, decision.grade);

        match prior {
            Some(prior_grade) if decision.grade > prior_grade => {
                let event = UpgradeEvent {
                    strategy_id: decision.strategy_id.clone(),
                    symbol: decision.symbol.clone(),
                    direction: decision.direction,
                    from_grade: prior_grade,
                    to_grade: decision.grade,
                    at: Utc::now(),
                };
                drop(last);
                self.push_event(event.clone());
                Some(event)
            }
            _ => None,
        }
    }

    fn push_event(&self, event: UpgradeEvent) {
        let mut ring = self.recent_upgrades.lock();
        if ring.len() >= RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(event);
    }

    pub fn recent_upgrades(&self) -> Vec<UpgradeEvent> {
        self.recent_upgrades.lock().iter().cloned().collect()
    }
}

impl Default for GradeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gating, PositionSize, PriceLevel, SignalState};

    fn decision_with_grade(grade: Grade) -> Decision {
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

    #[test]
    fn first_sighting_is_never_an_upgrade() {
        let tracker = GradeTracker::new();
        assert!(tracker.observe(&decision_with_grade(Grade::B)).is_none());
    }

    #[test]
    fn increasing_grade_emits_upgrade_event() {
        let tracker = GradeTracker::new();
        tracker.observe(&decision_with_grade(Grade::B));
        let event = tracker.observe(&decision_with_grade(Grade::A)).expect("should upgrade");
        assert_eq!(event.from_grade, Grade::B);
        assert_eq!(event.to_grade, Grade::A);
        assert_eq!(tracker.recent_upgrades().len(), 1);
    }

    #[test]
    fn downgrade_updates_state_without_emitting() {
        let tracker = GradeTracker::new();
        tracker.observe(&decision_with_grade(Grade::A));
        assert!(tracker.observe(&decision_with_grade(Grade::C)).is_none());
        assert!(tracker.recent_upgrades().is_empty());
    }

    #[test]
    fn ring_buffer_stays_bounded() {
        let tracker = GradeTracker::new();
        for i in 0..60 {
            let grade = if i % 2 == 0 { Grade::C } else { Grade::A };
            tracker.observe(&decision_with_grade(grade));
        }
        assert!(tracker.recent_upgrades().len() <= 50);
    }
}
