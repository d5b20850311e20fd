//! Relational persistence backend for detections (§4.N).
//!
//! Grounded on the teacher's `signals/db_storage.rs`: a single
//! `Mutex`-guarded `rusqlite::Connection`, `CREATE TABLE IF NOT EXISTS`
//! schema applied on connect, prepared/cached statements, and
//! `INSERT ... ON CONFLICT DO UPDATE` upserts. Trimmed to this engine's
//! one table — no FTS5 search index, no Dome event log, none of the
//! Polymarket-specific tables the teacher's schema carried.

use crate::error::{EngineError, EngineResult};
use crate::models::{Detection, DetectionStatus, Direction, Grade};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::sync::Arc;
use tracing::info;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS detections (
    strategy_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    direction TEXT NOT NULL,
    status TEXT NOT NULL,
    grade TEXT NOT NULL,
    confidence REAL NOT NULL,
    first_detected_at INTEGER NOT NULL,
    last_detected_at INTEGER NOT NULL,
    detection_count INTEGER NOT NULL,
    cooldown_ends_at INTEGER NOT NULL,
    notes TEXT,
    PRIMARY KEY (strategy_id, symbol, direction)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_detections_status
    ON detections(status, last_detected_at DESC);

CREATE INDEX IF NOT EXISTS idx_detections_symbol
    ON detections(symbol, last_detected_at DESC);
"#;

pub struct DetectionDb {
    conn: Arc<Mutex<Connection>>,
}

impl DetectionDb {
    pub fn open(db_path: &str) -> EngineResult<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(db_path, flags)?;
        conn.execute_batch(SCHEMA_SQL)?;
        info!(db_path, "detection store database ready");
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn upsert(&self, detection: &Detection) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO detections
                (strategy_id, symbol, direction, status, grade, confidence,
                 first_detected_at, last_detected_at, detection_count, cooldown_ends_at, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(strategy_id, symbol, direction) DO UPDATE SET
                status=excluded.status,
                grade=excluded.grade,
                confidence=excluded.confidence,
                last_detected_at=excluded.last_detected_at,
                detection_count=excluded.detection_count,
                cooldown_ends_at=excluded.cooldown_ends_at,
                notes=excluded.notes",
            params![
                detection.strategy_id,
                detection.symbol,
                direction_str(detection.direction),
                status_str(detection.status),
                detection.grade.to_string(),
                detection.confidence,
                detection.first_detected_at.timestamp(),
                detection.last_detected_at.timestamp(),
                detection.detection_count,
                detection.cooldown_ends_at.timestamp(),
                detection.notes,
            ],
        )
        .map_err(|e| EngineError::internal("detection upsert", e))?;
        Ok(())
    }

    pub fn all_active(&self) -> EngineResult<Vec<Detection>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT strategy_id, symbol, direction, status, grade, confidence,
                        first_detected_at, last_detected_at, detection_count, cooldown_ends_at, notes
                 FROM detections
                 WHERE status IN ('cooling_down', 'eligible')
                 ORDER BY last_detected_at DESC",
            )
            .map_err(|e| EngineError::internal("prepare all_active", e))?;
        let rows = stmt
            .query_map([], row_to_detection)
            .map_err(|e| EngineError::internal("query all_active", e))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn by_symbol(&self, symbol: &str) -> EngineResult<Vec<Detection>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT strategy_id, symbol, direction, status, grade, confidence,
                        first_detected_at, last_detected_at, detection_count, cooldown_ends_at, notes
                 FROM detections WHERE symbol = ?1 ORDER BY last_detected_at DESC",
            )
            .map_err(|e| EngineError::internal("prepare by_symbol", e))?;
        let rows = stmt
            .query_map(params![symbol], row_to_detection)
            .map_err(|e| EngineError::internal("query by_symbol", e))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Transition stale rows past `valid_until`/cooldown to a terminal
    /// status; invoked from the background sweep (§4.K).
    pub fn expire_stale(&self, now: DateTime<Utc>) -> EngineResult<usize> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE detections SET status = 'expired'
                 WHERE status = 'eligible' AND cooldown_ends_at < ?1",
                params![now.timestamp()],
            )
            .map_err(|e| EngineError::internal("expire_stale", e))?;
        Ok(changed)
    }

    pub fn count_by_status(&self, status: DetectionStatus) -> EngineResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM detections WHERE status = ?1",
                params![status_str(status)],
                |row| row.get(0),
            )
            .map_err(|e| EngineError::internal("count_by_status", e))?;
        Ok(count.max(0) as usize)
    }
}

fn direction_str(direction: Direction) -> &'static str {
    match direction {
        Direction::Long => "long",
        Direction::Short => "short",
    }
}

fn status_str(status: DetectionStatus) -> &'static str {
    match status {
        DetectionStatus::CoolingDown => "cooling_down",
        DetectionStatus::Eligible => "eligible",
        DetectionStatus::Executed => "executed",
        DetectionStatus::Dismissed => "dismissed",
        DetectionStatus::Expired => "expired",
        DetectionStatus::Invalidated => "invalidated",
    }
}

fn row_to_detection(row: &rusqlite::Row) -> rusqlite::Result<Detection> {
    let direction: String = row.get(2)?;
    let status: String = row.get(3)?;
    let grade: String = row.get(4)?;
    let first_ts: i64 = row.get(6)?;
    let last_ts: i64 = row.get(7)?;
    let cooldown_ts: i64 = row.get(9)?;

    Ok(Detection {
        strategy_id: row.get(0)?,
        symbol: row.get(1)?,
        direction: parse_direction(&direction),
        status: parse_status(&status),
        grade: grade.parse::<Grade>().unwrap_or(Grade::NoTrade),
        confidence: row.get(5)?,
        first_detected_at: Utc.timestamp_opt(first_ts, 0).single().unwrap_or_else(Utc::now),
        last_detected_at: Utc.timestamp_opt(last_ts, 0).single().unwrap_or_else(Utc::now),
        detection_count: row.get(8)?,
        cooldown_ends_at: Utc.timestamp_opt(cooldown_ts, 0).single().unwrap_or_else(Utc::now),
        notes: row.get(10)?,
    })
}

fn parse_direction(s: &str) -> Direction {
    match s {
        "short" => Direction::Short,
        _ => Direction::Long,
    }
}

fn parse_status(s: &str) -> DetectionStatus {
    match s {
        "eligible" => DetectionStatus::Eligible,
        "executed" => DetectionStatus::Executed,
        "dismissed" => DetectionStatus::Dismissed,
        "expired" => DetectionStatus::Expired,
        "invalidated" => DetectionStatus::Invalidated,
        _ => DetectionStatus::CoolingDown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(symbol: &str) -> Detection {
        let now = Utc::now();
        Detection {
            strategy_id: "bollinger-mr".into(),
            symbol: symbol.into(),
            direction: Direction::Long,
            status: DetectionStatus::Eligible,
            grade: Grade::A,
            confidence: 80.0,
            first_detected_at: now,
            last_detected_at: now,
            detection_count: 1,
            cooldown_ends_at: now + Duration::minutes(30),
            notes: None,
        }
    }

    #[test]
    fn upsert_then_fetch_roundtrips() {
        let db = DetectionDb::in_memory().unwrap();
        db.upsert(&sample("EURUSD")).unwrap();
        let rows = db.by_symbol("EURUSD").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].grade, Grade::A);
    }

    #[test]
    fn upsert_is_idempotent_on_the_composite_key() {
        let db = DetectionDb::in_memory().unwrap();
        let mut detection = sample("EURUSD");
        db.upsert(&detection).unwrap();
        detection.detection_count = 2;
        detection.confidence = 90.0;
        db.upsert(&detection).unwrap();
        let rows = db.by_symbol("EURUSD").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].detection_count, 2);
    }

    #[test]
    fn expire_stale_transitions_past_cooldown() {
        let db = DetectionDb::in_memory().unwrap();
        let mut detection = sample("EURUSD");
        detection.cooldown_ends_at = Utc::now() - Duration::minutes(5);
        db.upsert(&detection).unwrap();
        let changed = db.expire_stale(Utc::now()).unwrap();
        assert_eq!(changed, 1);
        assert_eq!(db.count_by_status(DetectionStatus::Expired).unwrap(), 1);
    }
}
