//! Backend construction from configuration

use crate::error::{AppError, Result};
use crate::models::LogRecord;
use crate::search::backend::{RecordStore, SearchBackend};
use crate::search::config::{BackendConfig, BackendKind, SearchConfig};
use crate::search::error::SearchResult;
use crate::search::index::TantivyLogIndex;
use crate::search::memory::InMemoryLogStore;
use crate::search::service::SearchService;
use std::path::Path;
use std::sync::Arc;
use validator::Validate;

/// The record store plus the configured full-path backend
#[derive(Debug, Clone)]
pub struct Backends {
    store: Arc<InMemoryLogStore>,
    index: Option<Arc<TantivyLogIndex>>,
}

impl Backends {
    pub fn store(&self) -> Arc<InMemoryLogStore> {
        self.store.clone()
    }

    pub fn record_store(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    pub fn search_backend(&self) -> Arc<dyn SearchBackend> {
        match &self.index {
            Some(index) => index.clone() as Arc<dyn SearchBackend>,
            None => self.store.clone(),
        }
    }

    /// Add records to every backend
    pub async fn load(&self, records: Vec<LogRecord>) -> SearchResult<usize> {
        if let Some(index) = &self.index {
            index.index_records(&records).await?;
        }
        Ok(self.store.extend(records))
    }

    pub fn into_service(self, config: SearchConfig) -> SearchResult<SearchService> {
        SearchService::new(self.record_store(), self.search_backend(), config)
    }
}

/// Create backends based on configuration
pub async fn create_backends(config: &BackendConfig, search: &SearchConfig) -> SearchResult<Backends> {
    let store = Arc::new(
        InMemoryLogStore::new()
            .with_highlight_tags(search.highlight_pre_tag.clone(), search.highlight_post_tag.clone()),
    );

    let index = match config.kind {
        BackendKind::Memory => {
            tracing::info!("Initializing in-memory search backend");
            None
        }
        BackendKind::Tantivy => {
            tracing::info!(path = ?config.index_path, "Initializing Tantivy search backend");
            let index = TantivyLogIndex::new(config)
                .await?
                .with_highlight_tags(search.highlight_pre_tag.clone(), search.highlight_post_tag.clone());
            Some(Arc::new(index))
        }
    };

    Ok(Backends { store, index })
}

/// Read newline-delimited JSON records, skipping blank lines
pub fn read_records(path: &Path) -> Result<Vec<LogRecord>> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            AppError::NotFound(format!("record file {}", path.display()))
        }
        _ => AppError::Io(e),
    })?;
    let mut records = Vec::new();

    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: LogRecord = serde_json::from_str(line).map_err(|e| {
            AppError::Serialization(format!("{}:{}: {}", path.display(), number + 1, e))
        })?;
        record.validate()?;
        records.push(record);
    }

    tracing::debug!(path = %path.display(), count = records.len(), "Records read");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogLevel;
    use crate::search::query::SearchQuery;
    use chrono::Utc;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_create_memory_backends() {
        let backends = create_backends(&BackendConfig::default(), &SearchConfig::default())
            .await
            .unwrap();
        assert_eq!(backends.search_backend().name(), "memory");

        let loaded = backends
            .load(vec![LogRecord::new(Utc::now(), LogLevel::Info, "up", "app.log")])
            .await
            .unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(backends.store().len(), 1);
    }

    #[tokio::test]
    async fn test_create_tantivy_backends() {
        let config = BackendConfig {
            kind: BackendKind::Tantivy,
            ..Default::default()
        };
        let backends = create_backends(&config, &SearchConfig::default()).await.unwrap();
        assert_eq!(backends.search_backend().name(), "tantivy");

        backends
            .load(vec![LogRecord::new(Utc::now(), LogLevel::Info, "up", "app.log")])
            .await
            .unwrap();
        let service = backends.into_service(SearchConfig::default()).unwrap();
        let response = service.search(&SearchQuery::builder("up").build()).await.unwrap();
        assert_eq!(response.total_hits(), 1);
    }

    #[test]
    fn test_read_records() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"id":"a","timestamp":"2024-01-01T00:00:00Z","level":"ERROR","message":"boom","source":"app.log"}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"id":"b","timestamp":"2024-01-01T00:00:01Z","level":"WARNING","message":"slow","source":"app.log","host":"web-01"}}"#
        )
        .unwrap();

        let records = read_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].level, LogLevel::Warn);
        assert_eq!(records[1].host, "web-01");
    }

    #[test]
    fn test_read_records_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = read_records(&dir.path().join("absent.jsonl")).unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_read_records_rejects_bad_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();
        let err = read_records(file.path()).unwrap_err();
        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");

        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"id":"c","timestamp":"2024-01-01T00:00:00Z","level":"INFO","message":"x","source":""}}"#
        )
        .unwrap();
        let err = read_records(file.path()).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
}
