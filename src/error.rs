use thiserror::Error;

/// Errors surfaced by the dashboard store, its persistence and its data feed
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("import failed: {0}")]
    Import(String),
    #[error("unsupported schema version {found} (newest supported is {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("snapshot '{0}' not found")]
    SnapshotNotFound(String),
    #[error("data source unavailable after {attempts} attempt(s)")]
    SourceUnavailable { attempts: u32 },
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DashboardError>;
