use thiserror::Error;

/// Convenience result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error type returned by the pipeline.
///
/// Every variant is fatal to a run. Value-level parse failures are recovered locally and use
/// [`ParseError`] instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The feed could not be fetched (network failure or non-2xx status).
    #[error("failed to fetch feed from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The feed document does not have the expected shape.
    #[error("feed format error: {message}")]
    Format { message: String },

    /// The boundary polygon for a place could not be resolved.
    #[error("failed to resolve boundary for '{place}': {message}")]
    Geocode { place: String, message: String },

    /// Invalid configuration (unknown timezone, empty primary key, ...).
    #[error("configuration error: {message}")]
    Config { message: String },

    /// A column the pipeline needs is not in the table.
    #[error("missing column '{column}'. columns={available:?}")]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },

    /// A persisted value could not be read back as its column's type.
    #[error("failed to read value at row {row} column '{column}': {source}")]
    InvalidValue {
        row: usize,
        column: String,
        #[source]
        source: ParseError,
    },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Parquet read/write error.
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl PipelineError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// A single value failed to parse as the requested type.
///
/// Never escapes the pipeline: numeric coercion falls back to text and date conversion moves
/// on to the next candidate column.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse '{raw}' as {expected}")]
pub struct ParseError {
    pub raw: String,
    pub expected: &'static str,
}

impl ParseError {
    pub(crate) fn new(raw: impl Into<String>, expected: &'static str) -> Self {
        Self {
            raw: raw.into(),
            expected,
        }
    }
}
