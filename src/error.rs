//! Crate-wide error taxonomy.
//!
//! Mirrors the error kinds in the design: `Transient` upstream failures are
//! retried by the caller, `UpstreamUnavailable` means the circuit is open,
//! `DataQuality` means a per-symbol skip, `ConfigInvalid` aborts startup,
//! and `Internal` is a bug. Strategy-local violations never produce one of
//! these — they return `Ok(None)` instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transient upstream failure in {context}: {source}")]
    Transient {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("upstream unavailable for {dependency} (circuit open until {retry_at})")]
    UpstreamUnavailable {
        dependency: String,
        retry_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("data quality violation in {context}: {detail}")]
    DataQuality { context: String, detail: String },

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("internal error in {context}: {source}")]
    Internal {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    pub fn transient(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Transient {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn data_quality(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::DataQuality {
            context: context.into(),
            detail: detail.into(),
        }
    }

    pub fn internal(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Whether retrying the same call immediately makes sense.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient { .. })
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.status().is_some_and(|s| {
            s.as_u16() == 429 || s.is_server_error()
        }) {
            EngineError::transient("http request", err)
        } else {
            EngineError::internal("http request", err)
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::data_quality("json decode", err.to_string())
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::internal("sqlite", err)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
