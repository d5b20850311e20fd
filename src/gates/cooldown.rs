//! Cooldown gate (§4.I).
//!
//! Per-`(symbol, style, direction)` state machine: once a detection fires,
//! the same key is suppressed for a configurable window so the scanner
//! doesn't re-emit the same signal tick after tick. Grounded on the
//! teacher's signal-dedup map in `signals/engine.rs`, generalized from a
//! single global key to the 3-tuple key this spec needs.

use crate::models::{Direction, Grade, Style};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub symbol: String,
    pub style: Style,
    pub direction: Direction,
}

impl CooldownKey {
    pub fn new(symbol: impl Into<String>, style: Style, direction: Direction) -> Self {
        Self { symbol: symbol.into(), style, direction }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    until: DateTime<Utc>,
    grade: Grade,
}

/// Cooldown TTL by style (§4.I): equal to the signal's own validity
/// window, so a key never re-blocks past the point its prior detection
/// would itself have expired.
pub fn default_cooldown_minutes(style: Style) -> i64 {
    match style {
        Style::Intraday => 240,
        Style::Swing => 1440,
    }
}

pub struct CooldownTracker {
    entries: HashMap<CooldownKey, Entry>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Blocked unless (a) no active entry, (b) the entry expired, or (c)
    /// `grade` strictly outranks the entry's recorded grade. Direction is
    /// part of the key, so a flipped direction is never blocked.
    pub fn is_blocked(&self, symbol: &str, style: Style, direction: Direction, grade: Grade, now: DateTime<Utc>) -> bool {
        self.entries
            .get(&CooldownKey::new(symbol, style, direction))
            .map(|e| now < e.until && grade <= e.grade)
            .unwrap_or(false)
    }

    /// Record a new detection and start its cooldown window.
    pub fn record(&mut self, symbol: &str, style: Style, direction: Direction, grade: Grade, now: DateTime<Utc>) {
        let minutes = default_cooldown_minutes(style);
        self.entries.insert(
            CooldownKey::new(symbol, style, direction),
            Entry { until: now + Duration::minutes(minutes), grade },
        );
    }

    /// Drop expired entries; called opportunistically from the scanner tick.
    pub fn sweep(&mut self, now: DateTime<Utc>) {
        self.entries.retain(|_, e| e.until > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_blocks_then_expires() {
        let mut tracker = CooldownTracker::new();
        let t0 = Utc::now();
        tracker.record("EURUSD", Style::Intraday, Direction::Long, Grade::A, t0);
        assert!(tracker.is_blocked("EURUSD", Style::Intraday, Direction::Long, Grade::A, t0));
        assert!(!tracker.is_blocked("EURUSD", Style::Intraday, Direction::Short, Grade::A, t0));

        let later = t0 + Duration::minutes(241);
        assert!(!tracker.is_blocked("EURUSD", Style::Intraday, Direction::Long, Grade::A, later));
    }

    #[test]
    fn sweep_drops_expired_entries() {
        let mut tracker = CooldownTracker::new();
        let t0 = Utc::now();
        tracker.record("EURUSD", Style::Intraday, Direction::Long, Grade::A, t0);
        tracker.sweep(t0 + Duration::minutes(241));
        assert_eq!(tracker.len(), 0);
    }

    #[test]
    fn strictly_higher_grade_bypasses_an_active_cooldown() {
        let mut tracker = CooldownTracker::new();
        let t0 = Utc::now();
        tracker.record("EURUSD", Style::Intraday, Direction::Long, Grade::B, t0);
        assert!(tracker.is_blocked("EURUSD", Style::Intraday, Direction::Long, Grade::B, t0));
        assert!(!tracker.is_blocked("EURUSD", Style::Intraday, Direction::Long, Grade::A, t0));
    }
}
