//! Persistence (§4.N): relational backend preferred, JSON file fallback
//! when no database path is configured.

pub mod db;
pub mod file_store;

pub use db::DetectionDb;
pub use file_store::FileDetectionStore;

/// Either backend, selected once at startup from `Config::database_url`.
pub enum Backend {
    Sqlite(DetectionDb),
    File(FileDetectionStore),
}

impl Backend {
    pub fn upsert(&self, detection: &crate::models::Detection) -> crate::error::EngineResult<()> {
        match self {
            Backend::Sqlite(db) => db.upsert(detection),
            Backend::File(store) => store.record(detection.clone()),
        }
    }

    pub fn by_symbol(&self, symbol: &str) -> crate::error::EngineResult<Vec<crate::models::Detection>> {
        match self {
            Backend::Sqlite(db) => db.by_symbol(symbol),
            Backend::File(store) => Ok(store.by_symbol(symbol)),
        }
    }

    pub fn all_active(&self) -> crate::error::EngineResult<Vec<crate::models::Detection>> {
        match self {
            Backend::Sqlite(db) => db.all_active(),
            Backend::File(store) => Ok(store.all().into_iter().filter(|d| d.status.is_active()).collect()),
        }
    }

    pub fn expire_stale(&self, now: chrono::DateTime<chrono::Utc>) -> crate::error::EngineResult<usize> {
        match self {
            Backend::Sqlite(db) => db.expire_stale(now),
            Backend::File(store) => store.expire_stale(now),
        }
    }
}
