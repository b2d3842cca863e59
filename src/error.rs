use thiserror::Error;

/// Main error type for Bionet
#[derive(Error, Debug)]
pub enum BionetError {
    /// Root person id did not resolve to a record
    #[error("Entity not found: person {0}")]
    EntityNotFound(i64),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failure reported by a non-SQLite data source
    #[error("Data source error: {0}")]
    DataSource(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Graph export errors
    #[error("Export error: {0}")]
    Export(String),

    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Exploration cancelled by the caller
    #[error("Exploration cancelled")]
    Cancelled,

    /// Exploration ran past its deadline
    #[error("Exploration deadline exceeded after {0} ms")]
    DeadlineExceeded(u64),

    /// A worker-pool task panicked or was aborted
    #[error("Worker failed: {0}")]
    WorkerFailed(String),
}

/// Convenient Result type using BionetError
pub type Result<T> = std::result::Result<T, BionetError>;
