use thiserror::Error;

/// Validation and contract errors exposed by `agilecast-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid region '{value}', expected one of A-H, J-N, P")]
    InvalidRegion { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },

    #[error("slot valid_from must be before valid_to: {valid_from} >= {valid_to}")]
    InvalidSlotRange { valid_from: String, valid_to: String },

    #[error("load duration must be a positive number of hours, got {value}")]
    InvalidDuration { value: String },
}

/// Invalid configuration override.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {var} has invalid value '{value}'")]
    InvalidValue { var: &'static str, value: String },
}

/// Failure of a single day's rate fetch.
///
/// `Network` and retryable `Upstream` statuses are transient and drive the
/// repository retry loop; `Format` never is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("invalid rates response: {0}")]
    Format(String),

    #[error("failed to fetch rates after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "fetch.network",
            Self::Upstream { .. } => "fetch.upstream",
            Self::Format(_) => "fetch.format",
            Self::RetriesExhausted { .. } => "fetch.retries_exhausted",
        }
    }
}

/// Errors raised by a key-value store backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store quota exceeded while writing '{key}'")]
    QuotaExceeded { key: String },

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the rate cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Precondition failures of the analyzer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("no rates data provided")]
    EmptyInput,
}

/// Terminal failure of an acquisition cycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error(
        "no pricing data available; please check your internet connection and try again{}",
        last_failure.as_ref().map(|failure| format!(" (last error: {failure})")).unwrap_or_default()
    )]
    NoDataAvailable { last_failure: Option<FetchError> },
}

/// Errors returned by the inbound session API.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("failed to reset cached rates: {0}")]
    Cache(#[from] CacheError),

    #[error("failed to save preference: {0}")]
    Preference(#[from] StoreError),
}
