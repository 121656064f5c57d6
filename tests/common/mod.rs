//! Shared fixtures and stub backends for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use log_query_engine::models::{LogLevel, LogRecord};
use log_query_engine::search::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Timestamp of the oldest fixture record
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Six records one minute apart, `a1` oldest
pub fn sample_records() -> Vec<LogRecord> {
    let base = base_time();
    vec![
        LogRecord::new(base, LogLevel::Error, "Database connection timeout after 30s", "api.log")
            .with_id("a1")
            .with_host("web-01")
            .with_application("checkout")
            .with_environment("prod")
            .with_stack_trace("at db.connect(pool.rs:42)")
            .with_metadata("region", "us-east"),
        LogRecord::new(base + Duration::minutes(1), LogLevel::Info, "User login successful", "auth.log")
            .with_id("a2")
            .with_host("web-02")
            .with_application("auth")
            .with_environment("prod"),
        LogRecord::new(
            base + Duration::minutes(2),
            LogLevel::Warn,
            "Slow query detected on orders table",
            "api.log",
        )
        .with_id("a3")
        .with_host("web-01")
        .with_application("checkout")
        .with_environment("staging"),
        LogRecord::new(
            base + Duration::minutes(3),
            LogLevel::Error,
            "Payment gateway ERROR code 502",
            "payments.log",
        )
        .with_id("a4")
        .with_host("web-03")
        .with_application("checkout")
        .with_environment("prod")
        .with_metadata("region", "eu-west"),
        LogRecord::new(base + Duration::minutes(4), LogLevel::Debug, "Cache warmup complete", "worker.log")
            .with_id("a5")
            .with_host("worker-01")
            .with_application("cache")
            .with_environment("dev"),
        LogRecord::new(
            base + Duration::minutes(5),
            LogLevel::Fatal,
            "Unhandled ERROR in scheduler",
            "worker.log",
        )
        .with_id("a6")
        .with_host("worker-01")
        .with_application("scheduler")
        .with_environment("prod"),
    ]
}

/// In-memory store loaded with [`sample_records`]
pub fn sample_store() -> Arc<InMemoryLogStore> {
    let store = Arc::new(InMemoryLogStore::new());
    store.extend(sample_records());
    store
}

/// Service whose fast and full paths both use one in-memory store
pub fn memory_service() -> SearchService {
    let store = sample_store();
    SearchService::new(store.clone(), store, SearchConfig::default()).unwrap()
}

/// Service whose full path runs on a Tantivy index over the same records
pub async fn tantivy_service() -> SearchService {
    let index = Arc::new(TantivyLogIndex::in_memory().await.unwrap());
    index.index_records(&sample_records()).await.unwrap();
    SearchService::new(sample_store(), index, SearchConfig::default()).unwrap()
}

/// Ids of the returned hits, in response order
pub fn hit_ids(response: &SearchResponse) -> Vec<String> {
    response.records().map(|record| record.id.clone()).collect()
}

/// Every call fails as if the backend were down
pub struct FailingBackend;

#[async_trait]
impl RecordStore for FailingBackend {
    async fn containment_search(
        &self,
        _text: &str,
        _page: u32,
        _size: u32,
    ) -> Result<RecordPage, BackendError> {
        Err(BackendError::Unavailable("connection refused".to_string()))
    }
}

#[async_trait]
impl SearchBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn execute(&self, _query: &TranslatedQuery) -> Result<BackendPage, BackendError> {
        Err(BackendError::Unavailable("connection refused".to_string()))
    }

    async fn field_values(&self, _field: &str) -> Result<Vec<ValueCount>, BackendError> {
        Err(BackendError::Unavailable("connection refused".to_string()))
    }
}

/// Wraps the in-memory store, counting calls and optionally delaying them
pub struct InstrumentedBackend {
    inner: Arc<InMemoryLogStore>,
    delay: Option<std::time::Duration>,
    highlighting: bool,
    calls: AtomicUsize,
}

impl InstrumentedBackend {
    pub fn new(inner: Arc<InMemoryLogStore>) -> Self {
        Self {
            inner,
            delay: None,
            highlighting: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn without_highlighting(mut self) -> Self {
        self.highlighting = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RecordStore for InstrumentedBackend {
    async fn containment_search(
        &self,
        text: &str,
        page: u32,
        size: u32,
    ) -> Result<RecordPage, BackendError> {
        self.enter().await;
        self.inner.containment_search(text, page, size).await
    }
}

#[async_trait]
impl SearchBackend for InstrumentedBackend {
    fn name(&self) -> &'static str {
        "instrumented"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            highlighting: self.highlighting,
            ..Default::default()
        }
    }

    async fn execute(&self, query: &TranslatedQuery) -> Result<BackendPage, BackendError> {
        self.enter().await;
        SearchBackend::execute(self.inner.as_ref(), query).await
    }

    async fn field_values(&self, field: &str) -> Result<Vec<ValueCount>, BackendError> {
        self.enter().await;
        self.inner.field_values(field).await
    }
}
