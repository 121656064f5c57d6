//! Backend adapter contracts

use crate::models::LogRecord;
use crate::search::error::BackendError;
use crate::search::result::{AggregationResults, SearchHit};
use crate::search::translate::TranslatedQuery;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A page of records from a containment search
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<LogRecord>,
    pub total: u64,
}

/// A page of hits from the full-path backend
#[derive(Debug, Clone, Default)]
pub struct BackendPage {
    pub hits: Vec<SearchHit>,
    pub total: u64,
    pub aggregations: AggregationResults,
}

/// What a full-path backend can do beyond matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub highlighting: bool,
    pub suggestions: bool,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            highlighting: true,
            suggestions: true,
        }
    }
}

/// A distinct field value and how many records carry it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: u64,
}

/// Record store used by the fast path
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Literal containment match on the message, newest first.
    /// `page` is 1-based.
    async fn containment_search(
        &self,
        text: &str,
        page: u32,
        size: u32,
    ) -> Result<RecordPage, BackendError>;
}

/// Full-text and aggregation backend used by the full path
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }

    async fn execute(&self, query: &TranslatedQuery) -> Result<BackendPage, BackendError>;

    /// Distinct values of `field` with their record counts, in any order
    async fn field_values(&self, field: &str) -> Result<Vec<ValueCount>, BackendError>;
}
