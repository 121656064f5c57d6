//! Log search: query model, validation, dispatch and backends
//!
//! A [`SearchQuery`] is built once and never mutated. The
//! [`SearchService`] validates it with the [`QueryNormalizer`], translates it
//! into a backend-neutral [`TranslatedQuery`] and hands that to a
//! [`SearchBackend`]. Literal containment lookups skip all of that and go
//! straight to a [`RecordStore`] through [`SearchService::quick_search`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │           SearchService                          │
//! ├─────────────────────────────────────────────────┤
//! │  - quick_search()   - search()                   │
//! │  - search_errors()  - search_scoped()            │
//! │  - search_pattern() - field_suggestions()        │
//! └─────────────────────────────────────────────────┘
//!          │ fast path               │ full path
//!          ▼                         ▼
//!   ┌──────────────┐   ┌──────────────────────────────┐
//!   │ RecordStore  │   │ SearchBackend                │
//!   │  (in-memory) │   │  in-memory | Tantivy index   │
//!   └──────────────┘   └──────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use log_query_engine::search::{InMemoryLogStore, SearchConfig, SearchQuery, SearchService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryLogStore::new());
//!     let search = SearchService::new(store.clone(), store, SearchConfig::default())?;
//!
//!     let query = SearchQuery::builder("database timeout")
//!         .with_levels(vec!["ERROR", "FATAL"])
//!         .with_size(20)
//!         .build();
//!
//!     let results = search.search(&query).await?;
//!     println!("Found {} records", results.total_hits());
//!
//!     Ok(())
//! }
//! ```

mod aggregation;
mod backend;
mod builders;
mod config;
mod document;
mod error;
mod factory;
mod fields;
mod index;
mod matcher;
mod memory;
mod normalize;
mod query;
mod result;
mod service;
mod translate;

pub use aggregation::{AggregationPlan, AggregationSpec};
pub use backend::{
    BackendCapabilities, BackendPage, RecordPage, RecordStore, SearchBackend, ValueCount,
};
pub use builders::{error_window_query, pattern_query, scoped_query, ERROR_MATCH};
pub use config::{BackendConfig, BackendKind, SearchConfig, SearchConfigBuilder};
pub use document::{build_log_schema, LogSchema};
pub use error::{BackendError, SearchError, SearchResult, ValidationError};
pub use factory::{create_backends, read_records, Backends};
pub use fields::{AVAILABLE_FIELDS, SUGGESTABLE_FIELDS};
pub use index::{IndexStats, TantivyLogIndex};
pub use matcher::RecordMatcher;
pub use memory::InMemoryLogStore;
pub use normalize::{NormalizedQuery, QueryNormalizer};
pub use query::{
    AggregationRequest, AggregationType, SearchMode, SearchQuery, SearchQueryBuilder,
    SortDirection, SortField, DEFAULT_PAGE, DEFAULT_SIZE, DEFAULT_TIME_ZONE, MATCH_ALL, MAX_SIZE,
};
pub use result::{
    AggregationOutput, AggregationResults, Bucket, DateBucket, NumericBucket, SearchHit,
    SearchResponse,
};
pub use service::SearchService;
pub use translate::{FieldConstraint, QueryTerm, QueryTranslator, TextMatch, TimeRange, TranslatedQuery};
