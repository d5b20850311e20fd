//! Detection lifecycle store (§4.K).
//!
//! Wraps a [`persistence::Backend`] with the `(strategyId, symbol,
//! direction)` lifecycle state machine: a fresh decision starts
//! `CoolingDown`, becomes `Eligible` once its cooldown window elapses (via
//! the background sweep), and can be externally marked `Executed` /
//! `Dismissed` / `Invalidated`. Grounded on the teacher's
//! `signals/db_storage.rs` upsert shape, generalized from an append-only
//! signal log to a stateful per-key record.

use crate::error::EngineResult;
use crate::models::{Decision, Detection, DetectionStatus};
use crate::persistence::Backend;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{debug, info};

/// Lifecycle cooldown (§4.K): a flat window regardless of the decision's
/// own style, distinct from the per-style signal-level cooldown gate in
/// [`crate::gates::cooldown`].
const LIFECYCLE_COOLDOWN_MINUTES: i64 = 60;

pub struct DetectionStore {
    backend: Arc<Backend>,
    shutdown: Arc<Notify>,
}

#[derive(Debug, Clone, Default)]
pub struct DetectionFilter {
    pub symbol: Option<String>,
    pub min_grade: Option<crate::models::Grade>,
    pub active_only: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DetectionSummary {
    pub total: usize,
    pub active: usize,
    pub by_status: Vec<(DetectionStatus, usize)>,
}

impl DetectionStore {
    pub fn new(backend: Backend) -> Self {
        Self { backend: Arc::new(backend), shutdown: Arc::new(Notify::new()) }
    }

    /// Record a new strategy emission against the lifecycle table. If an
    /// active record already exists for the same key, bump its detection
    /// count and refresh `last_detected_at`/grade/confidence rather than
    /// resetting the cooldown clock.
    pub fn record(&self, decision: &Decision) -> EngineResult<Detection> {
        let now = Utc::now();
        let existing = self
            .backend
            .by_symbol(&decision.symbol)?
            .into_iter()
            .find(|d| d.strategy_id == decision.strategy_id && d.direction == decision.direction && d.status.is_active());

        let detection = match existing {
            Some(mut prior) => {
                prior.grade = decision.grade;
                prior.confidence = decision.confidence;
                prior.last_detected_at = now;
                prior.detection_count += 1;
                prior
            }
            None => {
                Detection {
                    strategy_id: decision.strategy_id.clone(),
                    symbol: decision.symbol.clone(),
                    direction: decision.direction,
                    status: DetectionStatus::CoolingDown,
                    grade: decision.grade,
                    confidence: decision.confidence,
                    first_detected_at: now,
                    last_detected_at: now,
                    detection_count: 1,
                    cooldown_ends_at: now + Duration::minutes(LIFECYCLE_COOLDOWN_MINUTES),
                    notes: None,
                }
            }
        };

        self.backend.upsert(&detection)?;
        Ok(detection)
    }

    pub fn mark(&self, mut detection: Detection, status: DetectionStatus) -> EngineResult<()> {
        detection.status = status;
        self.backend.upsert(&detection)
    }

    pub fn by_symbol(&self, symbol: &str) -> EngineResult<Vec<Detection>> {
        self.backend.by_symbol(symbol)
    }

    pub fn query(&self, filter: &DetectionFilter) -> EngineResult<Vec<Detection>> {
        let mut rows = if filter.active_only {
            self.backend.all_active()?
        } else if let Some(symbol) = &filter.symbol {
            self.backend.by_symbol(symbol)?
        } else {
            self.backend.all_active()?
        };

        if let Some(symbol) = &filter.symbol {
            rows.retain(|d| &d.symbol == symbol);
        }
        if let Some(min_grade) = filter.min_grade {
            rows.retain(|d| d.grade >= min_grade);
        }
        Ok(rows)
    }

    pub fn summary(&self) -> EngineResult<DetectionSummary> {
        let rows = self.backend.all_active()?;
        let active = rows.iter().filter(|d| d.status.is_active()).count();
        let mut by_status: Vec<(DetectionStatus, usize)> = Vec::new();
        for status in [
            DetectionStatus::CoolingDown,
            DetectionStatus::Eligible,
            DetectionStatus::Executed,
            DetectionStatus::Dismissed,
            DetectionStatus::Expired,
            DetectionStatus::Invalidated,
        ] {
            let count = rows.iter().filter(|d| d.status == status).count();
            if count > 0 {
                by_status.push((status, count));
            }
        }
        Ok(DetectionSummary { total: rows.len(), active, by_status })
    }

    /// One sweep pass: transition any `CoolingDown` row past its cooldown
    /// window to `Eligible`, then expire anything stale.
    pub fn sweep_once(&self) -> EngineResult<usize> {
        let now = Utc::now();
        let mut transitioned = 0usize;
        for detection in self.backend.all_active()? {
            if detection.status == DetectionStatus::CoolingDown && detection.cooldown_ends_at <= now {
                let mut updated = detection;
                updated.status = DetectionStatus::Eligible;
                self.backend.upsert(&updated)?;
                transitioned += 1;
            }
        }
        let expired = self.backend.expire_stale(now)?;
        Ok(transitioned + expired)
    }

    /// Spawn the ~60s background sweep worker.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        tokio::spawn(async move {
            let mut tick = interval(TokioDuration::from_secs(60));
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        match store.sweep_once() {
                            Ok(n) if n > 0 => debug!(transitioned = n, "detection sweep"),
                            Ok(_) => {}
                            Err(err) => info!(%err, "detection sweep failed"),
                        }
                    }
                    _ = shutdown.notified() => break,
                }
            }
        })
    }

    pub fn stop(&self) {
        self.shutdown.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, Gating, Grade, PositionSize, PriceLevel, SignalState};
    use crate::persistence::DetectionDb;

    fn sample_decision(symbol: &str) -> Decision {
        let now = Utc::now();
        Decision {
            symbol: symbol.into(),
            strategy_id: "bollinger-mr".into(),
            strategy_name: "Bollinger Mean Reversion".into(),
            timestamp: now,
            direction: Direction::Long,
            grade: Grade::A,
            confidence: 80.0,
            entry: PriceLevel { price: 1.1, formatted: String::new(), pips: 0.0, rr: 0.0 },
            stop_loss: PriceLevel { price: 1.09, formatted: String::new(), pips: 0.0, rr: -1.0 },
            take_profit: PriceLevel { price: 1.12, formatted: String::new(), pips: 0.0, rr: 2.0 },
            take_profit_source: String::new(),
            position: PositionSize { lots: 0.1, units: 10_000.0, risk_amount: 10.0, is_approximate: false },
            tiered_exits: vec![],
            break_even_trigger: 1.11,
            trailing_stop_distance: None,
            first_detected: now,
            valid_until: now + Duration::minutes(60),
            optimal_entry_window: now + Duration::minutes(30),
            state: SignalState::Optimal,
            triggers: vec![],
            reason_codes: vec![],
            warnings: vec![],
            gating: Gating::default(),
        }
    }

    #[test]
    fn records_new_decision_as_cooling_down() {
        let store = DetectionStore::new(Backend::Sqlite(DetectionDb::in_memory().unwrap()));
        let detection = store.record(&sample_decision("EURUSD")).unwrap();
        assert_eq!(detection.status, DetectionStatus::CoolingDown);
        assert_eq!(detection.detection_count, 1);
    }

    #[test]
    fn repeat_detection_increments_count_without_resetting_cooldown() {
        let store = DetectionStore::new(Backend::Sqlite(DetectionDb::in_memory().unwrap()));
        let first = store.record(&sample_decision("EURUSD")).unwrap();
        let second = store.record(&sample_decision("EURUSD")).unwrap();
        assert_eq!(second.detection_count, 2);
        assert_eq!(first.cooldown_ends_at, second.cooldown_ends_at);
    }

    #[test]
    fn sweep_transitions_past_cooldown_to_eligible() {
        let store = DetectionStore::new(Backend::Sqlite(DetectionDb::in_memory().unwrap()));
        let mut detection = store.record(&sample_decision("EURUSD")).unwrap();
        detection.cooldown_ends_at = Utc::now() - Duration::minutes(1);
        store.backend.upsert(&detection).unwrap();
        let changed = store.sweep_once().unwrap();
        assert_eq!(changed, 1);
        let rows = store.by_symbol("EURUSD").unwrap();
        assert_eq!(rows[0].status, DetectionStatus::Eligible);
    }
}
