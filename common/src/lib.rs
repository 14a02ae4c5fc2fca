use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use deltalake::DeltaTableError;
use parquet::errors::ParquetError;
use thiserror::Error;
use url::ParseError;

pub mod config;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] rquest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Forbidden - Access denied")]
    Forbidden,

    #[error("Gateway timeout")]
    GatewayTimeout,

    #[error("Maximum retries exceeded")]
    MaxRetriesExceeded,

    #[error("Settings error: {0}")]
    Settings(#[from] ::config::ConfigError),

    /// Invalid window span, retention threshold or other setting. Raised
    /// before anything is written.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single identifier could not be extracted. Callers skip the item.
    #[error("Extraction of item {id} failed: {reason}")]
    ExtractionItem { id: String, reason: String },

    /// A concurrent writer committed first and the transaction could not be
    /// reconciled.
    #[error("Write conflict on table {table}: {reason}")]
    WriteConflict { table: String, reason: String },

    /// The catalog merge was rolled back as a whole.
    #[error("Merge aborted: {0}")]
    MergeAbort(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("DataFusion error: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("Delta error: {0}")]
    Delta(#[from] DeltaTableError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a failed upstream request is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::RateLimit | Error::GatewayTimeout | Error::Io(_)
        )
    }
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Self {
        Error::Storage(format!("Object store error: {}", err))
    }
}

impl From<object_store::path::Error> for Error {
    fn from(err: object_store::path::Error) -> Self {
        Error::InvalidInput(format!("Invalid object path: {}", err))
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::InvalidInput(format!("URL parse error: {}", err))
    }
}
