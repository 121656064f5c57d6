//! Main search service implementation

use crate::search::backend::{RecordStore, SearchBackend};
use crate::search::builders;
use crate::search::config::SearchConfig;
use crate::search::error::{BackendError, SearchError, SearchResult, ValidationError};
use crate::search::fields::{self, AVAILABLE_FIELDS};
use crate::search::normalize::QueryNormalizer;
use crate::search::query::{SearchMode, SearchQuery};
use crate::search::result::{SearchHit, SearchResponse};
use crate::search::translate::QueryTranslator;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Dispatches queries to the record store (fast path) or the search
/// backend (full path).
///
/// Holds no per-request state; share one instance behind an `Arc` across
/// concurrent callers.
pub struct SearchService {
    store: Arc<dyn RecordStore>,
    backend: Arc<dyn SearchBackend>,
    normalizer: QueryNormalizer,
    translator: QueryTranslator,
    config: SearchConfig,
}

impl SearchService {
    /// Create a new search service
    pub fn new(
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn SearchBackend>,
        config: SearchConfig,
    ) -> SearchResult<Self> {
        if config.default_time_zone.parse::<Tz>().is_err() {
            return Err(SearchError::InvalidConfiguration(format!(
                "unknown default time zone '{}'",
                config.default_time_zone
            )));
        }
        if config.max_page_size == 0 {
            return Err(SearchError::InvalidConfiguration(
                "max_page_size must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            store,
            backend,
            normalizer: QueryNormalizer::new(config.max_page_size, config.default_time_zone.clone()),
            translator: QueryTranslator::new(config.fuzzy_distance),
            config,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Literal containment search on the message text.
    ///
    /// Ignores time range, filters, mode and aggregations.
    pub async fn quick_search(&self, text: &str, page: u32, size: u32) -> SearchResult<SearchResponse> {
        const OPERATION: &str = "Quick search";
        let search_id = Uuid::new_v4();

        if text.trim().is_empty() {
            return Err(self.rejected(search_id, OPERATION, ValidationError::BlankQuery));
        }
        if let Err(err) = self.normalizer.check_pagination(page, size) {
            return Err(self.rejected(search_id, OPERATION, err));
        }

        let (records, took) = self
            .call(search_id, OPERATION, self.config.default_timeout(), self.store.containment_search(text, page, size))
            .await?;

        tracing::info!(
            search_id = %search_id,
            operation = OPERATION,
            total_hits = records.total,
            took_ms = took.as_secs_f64() * 1000.0,
            "Search completed"
        );

        Ok(SearchResponse::new(
            search_id,
            records.records.into_iter().map(SearchHit::new).collect(),
            records.total,
            page,
            size,
            took,
            None,
        ))
    }

    /// Full search with mode, filters, sort, aggregations and highlighting
    pub async fn search(&self, query: &SearchQuery) -> SearchResult<SearchResponse> {
        self.execute("Search", query.clone(), self.config.default_timeout()).await
    }

    /// Full search bounded by `timeout`
    pub async fn search_with_timeout(
        &self,
        query: &SearchQuery,
        timeout: Duration,
    ) -> SearchResult<SearchResponse> {
        self.execute("Search", query.clone(), Some(timeout)).await
    }

    /// Error-level records in a time window, with stack traces
    pub async fn search_errors(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: u32,
        size: u32,
    ) -> SearchResult<SearchResponse> {
        let query = builders::error_window_query(start, end, page, size);
        self.execute("Error search", query, self.config.default_timeout()).await
    }

    /// Records of one application in one environment
    pub async fn search_scoped(
        &self,
        application: &str,
        environment: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        page: u32,
        size: u32,
    ) -> SearchResult<SearchResponse> {
        let query = builders::scoped_query(application, environment, start, end, page, size);
        self.execute("Scoped search", query, self.config.default_timeout()).await
    }

    /// Highlighted pattern search in an explicit mode
    pub async fn search_pattern(
        &self,
        pattern: &str,
        mode: SearchMode,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        page: u32,
        size: u32,
    ) -> SearchResult<SearchResponse> {
        let query = builders::pattern_query(pattern, mode, start, end, page, size);
        self.execute("Pattern search", query, self.config.default_timeout()).await
    }

    /// Searchable field names, stable for the life of the process
    pub fn available_fields(&self) -> &'static [&'static str] {
        AVAILABLE_FIELDS
    }

    /// Up to `limit` known values of `field` starting with `prefix`.
    ///
    /// Unknown or free-text fields yield an empty list.
    pub async fn field_suggestions(
        &self,
        field: &str,
        prefix: &str,
        limit: usize,
    ) -> SearchResult<Vec<String>> {
        const OPERATION: &str = "Field suggestions";

        let field = field.trim().to_lowercase();
        let limit = limit.min(self.config.max_suggestions);
        if !self.config.enable_suggestions
            || !self.backend.capabilities().suggestions
            || !fields::is_suggestable(&field)
            || limit == 0
        {
            return Ok(Vec::new());
        }

        let (values, _) = self
            .call(Uuid::new_v4(), OPERATION, self.config.default_timeout(), self.backend.field_values(&field))
            .await?;

        Ok(fields::rank_suggestions(values, prefix.trim(), limit))
    }

    async fn execute(
        &self,
        operation: &'static str,
        query: SearchQuery,
        timeout: Option<Duration>,
    ) -> SearchResult<SearchResponse> {
        let search_id = Uuid::new_v4();

        let normalized = match self.normalizer.normalize(query) {
            Ok(normalized) => normalized,
            Err(err) => return Err(self.rejected(search_id, operation, err)),
        };

        let mut translated = self.translator.translate(&normalized);
        if translated.highlight
            && !(self.config.enable_highlighting && self.backend.capabilities().highlighting)
        {
            tracing::debug!(
                search_id = %search_id,
                backend = self.backend.name(),
                "Highlighting unavailable, returning plain text"
            );
            translated.highlight = false;
        }

        let (page, took) = self
            .call(search_id, operation, timeout, self.backend.execute(&translated))
            .await?;

        let query = normalized.query();
        let hits = page
            .hits
            .into_iter()
            .map(|mut hit| {
                if !query.include_stack_trace() {
                    hit.record.stack_trace = None;
                }
                if !query.include_metadata() {
                    hit.record.metadata.clear();
                }
                hit
            })
            .collect();
        let aggregations = query.has_aggregations().then_some(page.aggregations);

        tracing::info!(
            search_id = %search_id,
            operation,
            mode = normalized.mode().as_ref(),
            backend = self.backend.name(),
            total_hits = page.total,
            took_ms = took.as_secs_f64() * 1000.0,
            "Search completed"
        );

        Ok(SearchResponse::new(
            search_id,
            hits,
            page.total,
            query.page(),
            query.size(),
            took,
            aggregations,
        ))
    }

    /// Time one adapter call, bounded by `timeout`, and wrap its failure
    async fn call<T, F>(
        &self,
        search_id: Uuid,
        operation: &'static str,
        timeout: Option<Duration>,
        call: F,
    ) -> SearchResult<(T, Duration)>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        let started = Instant::now();
        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(BackendError::Timeout(limit))),
            None => call.await,
        };
        let took = started.elapsed();

        outcome.map(|value| (value, took)).map_err(|source| {
            tracing::error!(
                search_id = %search_id,
                operation,
                error = %source,
                took_ms = took.as_secs_f64() * 1000.0,
                "Backend call failed"
            );
            SearchError::execution(operation, source)
        })
    }

    fn rejected(&self, search_id: Uuid, operation: &'static str, err: ValidationError) -> SearchError {
        tracing::debug!(search_id = %search_id, operation, error = %err, "Query rejected");
        SearchError::Validation(err)
    }
}
