//! In-memory record store and search backend

use crate::models::LogRecord;
use crate::search::aggregation;
use crate::search::backend::{BackendPage, RecordPage, RecordStore, SearchBackend, ValueCount};
use crate::search::error::BackendError;
use crate::search::matcher::{sort_records, RecordMatcher};
use crate::search::result::SearchHit;
use crate::search::translate::TranslatedQuery;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory log store (for development and testing)
#[derive(Clone)]
pub struct InMemoryLogStore {
    records: Arc<DashMap<String, LogRecord>>,
    pre_tag: String,
    post_tag: String,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            pre_tag: "<em>".to_string(),
            post_tag: "</em>".to_string(),
        }
    }

    /// Markers placed around highlighted spans
    pub fn with_highlight_tags(mut self, pre: impl Into<String>, post: impl Into<String>) -> Self {
        self.pre_tag = pre.into();
        self.post_tag = post.into();
        self
    }

    /// Insert or replace a record by id
    pub fn insert(&self, record: LogRecord) {
        tracing::trace!(record_id = %record.id, "Record stored");
        self.records.insert(record.id.clone(), record);
    }

    pub fn extend(&self, records: impl IntoIterator<Item = LogRecord>) -> usize {
        let mut count = 0;
        for record in records {
            self.insert(record);
            count += 1;
        }
        tracing::debug!(count, total = self.records.len(), "Records stored");
        count
    }

    pub fn remove(&self, id: &str) -> Option<LogRecord> {
        self.records.remove(id).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&self) {
        self.records.clear();
    }

    fn snapshot(&self) -> Vec<LogRecord> {
        self.records.iter().map(|entry| entry.value().clone()).collect()
    }
}

impl Default for InMemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

fn paginate<T>(items: Vec<T>, offset: u64, limit: u32) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    items.into_iter().skip(offset).take(limit as usize).collect()
}

#[async_trait]
impl RecordStore for InMemoryLogStore {
    async fn containment_search(
        &self,
        text: &str,
        page: u32,
        size: u32,
    ) -> Result<RecordPage, BackendError> {
        let mut matches: Vec<LogRecord> = self
            .records
            .iter()
            .filter(|entry| entry.value().message.contains(text))
            .map(|entry| entry.value().clone())
            .collect();

        // Newest first
        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));

        let total = matches.len() as u64;
        let offset = (page.max(1) as u64 - 1) * size as u64;

        Ok(RecordPage {
            records: paginate(matches, offset, size),
            total,
        })
    }
}

#[async_trait]
impl SearchBackend for InMemoryLogStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn execute(&self, query: &TranslatedQuery) -> Result<BackendPage, BackendError> {
        let matcher = RecordMatcher::new(query)?;

        let mut scored: Vec<(f32, LogRecord)> = self
            .snapshot()
            .into_iter()
            .filter_map(|record| matcher.score(&record).map(|score| (score, record)))
            .collect();

        let total = scored.len() as u64;

        let aggregations = if query.aggregations.is_empty() {
            Default::default()
        } else {
            let matched: Vec<&LogRecord> = scored.iter().map(|(_, record)| record).collect();
            aggregation::evaluate(&query.aggregations, &matched, query.time_zone)
        };

        sort_records(&mut scored, &query.sort);
        let relevance = query.is_relevance_ordered();

        let hits = paginate(scored, query.offset, query.limit)
            .into_iter()
            .map(|(score, record)| {
                let highlight = if query.highlight {
                    matcher.highlight(&record, &self.pre_tag, &self.post_tag)
                } else {
                    None
                };
                SearchHit {
                    record,
                    score: relevance.then_some(score),
                    highlight,
                }
            })
            .collect();

        Ok(BackendPage {
            hits,
            total,
            aggregations,
        })
    }

    async fn field_values(&self, field: &str) -> Result<Vec<ValueCount>, BackendError> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in self.records.iter() {
            if let Some(value) = entry.value().field_value(field) {
                *counts.entry(value).or_insert(0) += 1;
            }
        }

        Ok(counts
            .into_iter()
            .map(|(value, count)| ValueCount { value, count })
            .collect())
    }
}

impl std::fmt::Debug for InMemoryLogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLogStore")
            .field("records", &self.records.len())
            .finish()
    }
}
