//! Error types for search operations

use crate::error::AppError;
use chrono::{DateTime, Utc};

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors surfaced to callers of the search service
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The query was rejected before reaching any backend
    #[error("Invalid search query: {0}")]
    Validation(#[from] ValidationError),

    /// A backend adapter call failed
    #[error("{operation} failed")]
    Execution {
        operation: &'static str,
        #[source]
        source: BackendError,
    },

    /// Backend construction failed
    #[error("Index initialization failed: {0}")]
    IndexInitFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl SearchError {
    pub(crate) fn execution(operation: &'static str, source: BackendError) -> Self {
        SearchError::Execution { operation, source }
    }

    /// Check if this is a validation failure
    pub fn is_validation(&self) -> bool {
        matches!(self, SearchError::Validation(_))
    }

    /// Operation label of an execution failure
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            SearchError::Execution { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}

/// A violated query constraint
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("blank query: text is required unless the mode is wildcard")]
    BlankQuery,

    #[error("page out of range: {page} (must be >= 1)")]
    PageOutOfRange { page: u32 },

    #[error("size out of range: {size} (must be between 1 and {max})")]
    SizeOutOfRange { size: u32, max: u32 },

    #[error("startTime after endTime: {start} > {end}")]
    InvalidTimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("duplicate aggregation name: {name}")]
    DuplicateAggregation { name: String },

    #[error("invalid aggregation '{name}': {reason}")]
    InvalidAggregation { name: String, reason: String },

    #[error("empty value in {field} filter")]
    EmptyFilterValue { field: String },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid sort field: '{0}'")]
    InvalidSortField(String),

    #[error("unknown time zone: {0}")]
    UnknownTimeZone(String),
}

/// Errors raised by backend adapters.
///
/// These never reach callers directly; the dispatcher wraps them in
/// [`SearchError::Execution`].
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("query translation failed: {0}")]
    Query(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tantivy error: {0}")]
    Tantivy(String),
}

impl From<tantivy::TantivyError> for BackendError {
    fn from(err: tantivy::TantivyError) -> Self {
        BackendError::Tantivy(err.to_string())
    }
}

impl From<tantivy::query::QueryParserError> for BackendError {
    fn from(err: tantivy::query::QueryParserError) -> Self {
        BackendError::Query(err.to_string())
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Validation(err) => AppError::Validation(err.to_string()),
            SearchError::InvalidConfiguration(msg) => AppError::Configuration(msg),
            SearchError::Execution { operation, source } => AppError::Execution {
                operation: operation.to_string(),
                message: source.to_string(),
            },
            SearchError::IndexInitFailed(msg) => AppError::Internal(msg),
        }
    }
}
