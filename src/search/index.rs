//! Tantivy-backed log index

use crate::models::LogRecord;
use crate::search::aggregation;
use crate::search::backend::{BackendPage, SearchBackend, ValueCount};
use crate::search::config::BackendConfig;
use crate::search::document::LogSchema;
use crate::search::error::{BackendError, SearchError, SearchResult};
use crate::search::matcher::{sort_records, RecordMatcher};
use crate::search::result::SearchHit;
use crate::search::translate::{FieldConstraint, TextMatch, TranslatedQuery};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{
    AllQuery, BooleanQuery, FuzzyTermQuery, Occur, PhraseQuery, Query, RangeQuery, TermQuery,
};
use tantivy::schema::{IndexRecordOption, Term};
use tantivy::snippet::SnippetGenerator;
use tantivy::tokenizer::TokenStream;
use tantivy::{DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument};
use tokio::sync::RwLock;

const SNIPPET_MAX_CHARS: usize = 1 << 20;

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Total number of live documents in the index
    pub total_documents: u64,

    /// Number of segments
    pub num_segments: usize,
}

/// Tantivy query plus the parts of the request it cannot express
struct CompiledQuery {
    query: Box<dyn Query>,
    /// Text query used for snippet generation, absent for post-filtered modes
    text_query: Option<Box<dyn Query>>,
    /// Residual request evaluated on stored records
    residual: Option<RecordMatcher>,
}

/// Full-path backend over a Tantivy index
pub struct TantivyLogIndex {
    /// The Tantivy index
    index: Index,

    /// Field handles
    fields: LogSchema,

    /// Index writer (wrapped in RwLock for thread-safety)
    writer: Arc<RwLock<IndexWriter>>,

    /// Index reader, reloaded after every commit
    reader: IndexReader,

    /// On-disk location, `None` for a RAM index
    path: Option<PathBuf>,

    pre_tag: String,
    post_tag: String,
}

impl TantivyLogIndex {
    /// Open or create the index described by `config`
    pub async fn new(config: &BackendConfig) -> SearchResult<Self> {
        let index = match &config.index_path {
            Some(path) => Self::open_or_create(path)?,
            None => Index::create_in_ram(LogSchema::new().schema().clone()),
        };

        let fields = LogSchema::from_schema(index.schema())
            .map_err(|e| SearchError::IndexInitFailed(e.to_string()))?;

        // Create index writer
        let writer: IndexWriter = index
            .writer_with_num_threads(config.indexing_threads.max(1), config.writer_heap_size)
            .map_err(|e| SearchError::IndexInitFailed(format!("Failed to create writer: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| SearchError::IndexInitFailed(format!("Failed to create reader: {}", e)))?;

        tracing::info!(
            path = ?config.index_path,
            heap = config.writer_heap_size,
            "Tantivy log index ready"
        );

        Ok(Self {
            index,
            fields,
            writer: Arc::new(RwLock::new(writer)),
            reader,
            path: config.index_path.clone(),
            pre_tag: "<em>".to_string(),
            post_tag: "</em>".to_string(),
        })
    }

    /// RAM index with default settings
    pub async fn in_memory() -> SearchResult<Self> {
        Self::new(&BackendConfig::default()).await
    }

    fn open_or_create(path: &Path) -> SearchResult<Index> {
        // Create index directory if it doesn't exist
        std::fs::create_dir_all(path).map_err(|e| {
            SearchError::IndexInitFailed(format!("Failed to create index directory: {}", e))
        })?;

        if path.join("meta.json").exists() {
            Index::open_in_dir(path).map_err(|e| {
                SearchError::IndexInitFailed(format!("Failed to open existing index: {}", e))
            })
        } else {
            Index::create_in_dir(path, LogSchema::new().schema().clone()).map_err(|e| {
                SearchError::IndexInitFailed(format!("Failed to create new index: {}", e))
            })
        }
    }

    /// Markers placed around highlighted spans
    pub fn with_highlight_tags(mut self, pre: impl Into<String>, post: impl Into<String>) -> Self {
        self.pre_tag = pre.into();
        self.post_tag = post.into();
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Index records, replacing any with the same id, and commit
    pub async fn index_records(&self, records: &[LogRecord]) -> SearchResult<usize> {
        let mut writer = self.writer.write().await;

        for record in records {
            writer.delete_term(Term::from_field_text(self.fields.id, &record.id));
            writer
                .add_document(self.fields.to_document(record))
                .map_err(|e| SearchError::execution("Index records", e.into()))?;
        }

        writer
            .commit()
            .map_err(|e| SearchError::execution("Index records", e.into()))?;
        drop(writer);
        self.reload("Index records")?;

        tracing::debug!(count = records.len(), "Records indexed");
        Ok(records.len())
    }

    /// Delete a record by id and commit
    pub async fn delete_record(&self, id: &str) -> SearchResult<()> {
        let mut writer = self.writer.write().await;
        writer.delete_term(Term::from_field_text(self.fields.id, id));
        writer
            .commit()
            .map_err(|e| SearchError::execution("Delete record", e.into()))?;
        drop(writer);
        self.reload("Delete record")
    }

    /// Commit pending changes
    pub async fn commit(&self) -> SearchResult<()> {
        let mut writer = self.writer.write().await;
        writer
            .commit()
            .map_err(|e| SearchError::execution("Commit", e.into()))?;
        drop(writer);
        self.reload("Commit")
    }

    /// Clear the entire index
    pub async fn clear(&self) -> SearchResult<()> {
        let mut writer = self.writer.write().await;
        writer
            .delete_all_documents()
            .map_err(|e| SearchError::execution("Clear index", e.into()))?;
        writer
            .commit()
            .map_err(|e| SearchError::execution("Clear index", e.into()))?;
        drop(writer);
        self.reload("Clear index")
    }

    fn reload(&self, operation: &'static str) -> SearchResult<()> {
        self.reader
            .reload()
            .map_err(|e| SearchError::execution(operation, e.into()))
    }

    /// Get index statistics
    pub fn stats(&self) -> IndexStats {
        let searcher = self.reader.searcher();
        IndexStats {
            total_documents: searcher.num_docs(),
            num_segments: searcher.segment_readers().len(),
        }
    }

    fn compile(&self, query: &TranslatedQuery) -> Result<CompiledQuery, BackendError> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        let text_clause = self.text_query(&query.text_match)?;
        let text_indexed = text_clause.is_some();
        if let Some(text_clause) = text_clause {
            clauses.push((Occur::Must, text_clause));
        }

        if let Some(range) = &query.time_range {
            clauses.push((
                Occur::Must,
                Box::new(RangeQuery::new_i64_bounds(
                    "timestamp".to_string(),
                    Bound::Included(range.start.timestamp_micros()),
                    Bound::Included(range.end.timestamp_micros()),
                )),
            ));
        }

        let mut residual_constraints: Vec<FieldConstraint> = Vec::new();
        for constraint in &query.constraints {
            match self.fields.raw_field(&constraint.field) {
                Some(field) => {
                    let alternatives: Vec<(Occur, Box<dyn Query>)> = constraint
                        .values
                        .iter()
                        .map(|value| {
                            let term = self.fields.raw_term(field, value);
                            (
                                Occur::Should,
                                Box::new(TermQuery::new(term, IndexRecordOption::Basic)) as Box<dyn Query>,
                            )
                        })
                        .collect();
                    clauses.push((Occur::Must, Box::new(BooleanQuery::new(alternatives))));
                }
                None => residual_constraints.push(constraint.clone()),
            }
        }

        // The index lowercases message terms
        let residual_text = match &query.text_match {
            TextMatch::Wildcard { .. }
            | TextMatch::Regex { .. }
            | TextMatch::Exact {
                case_sensitive: true,
                ..
            } => query.text_match.clone(),
            TextMatch::Exact { .. } if !text_indexed => query.text_match.clone(),
            _ => TextMatch::All,
        };
        let residual = if residual_text == TextMatch::All && residual_constraints.is_empty() {
            None
        } else {
            let residual_query = TranslatedQuery {
                text_match: residual_text,
                time_range: None,
                constraints: residual_constraints,
                sort: Vec::new(),
                aggregations: Vec::new(),
                highlight: false,
                offset: 0,
                limit: query.limit,
                time_zone: query.time_zone,
            };
            Some(RecordMatcher::new(&residual_query)?)
        };

        let compiled: Box<dyn Query> = if clauses.is_empty() {
            Box::new(AllQuery)
        } else {
            Box::new(BooleanQuery::new(clauses))
        };

        Ok(CompiledQuery {
            query: compiled,
            text_query: self.text_query(&query.text_match)?,
            residual,
        })
    }

    /// Tantivy form of the text match, `None` when it matches everything or
    /// must be evaluated on stored text
    fn text_query(&self, text_match: &TextMatch) -> Result<Option<Box<dyn Query>>, BackendError> {
        let message = self.fields.message;

        let query: Box<dyn Query> = match text_match {
            TextMatch::All | TextMatch::Wildcard { .. } | TextMatch::Regex { .. } => return Ok(None),
            TextMatch::Relevance { terms } => {
                let clauses: Vec<(Occur, Box<dyn Query>)> = terms
                    .iter()
                    .map(|term| {
                        let query: Box<dyn Query> = match &term.field {
                            Some(field) => {
                                let term = match self.fields.raw_field(field) {
                                    Some(handle) => self.fields.raw_term(handle, &term.value),
                                    None => Term::from_field_text(message, &term.value.to_lowercase()),
                                };
                                Box::new(TermQuery::new(term, IndexRecordOption::Basic))
                            }
                            None => Box::new(TermQuery::new(
                                Term::from_field_text(message, &term.value),
                                IndexRecordOption::WithFreqs,
                            )),
                        };
                        (Occur::Should, query)
                    })
                    .collect();
                Box::new(BooleanQuery::new(clauses))
            }
            TextMatch::Exact { phrase, .. } => {
                let terms: Vec<Term> = self
                    .message_tokens(phrase)?
                    .iter()
                    .map(|token| Term::from_field_text(message, token))
                    .collect();
                match terms.len() {
                    // evaluated on stored text instead
                    0 => return Ok(None),
                    1 => Box::new(TermQuery::new(terms[0].clone(), IndexRecordOption::WithFreqs)),
                    _ => Box::new(PhraseQuery::new(terms)),
                }
            }
            TextMatch::Fuzzy { terms, distance } => {
                let clauses: Vec<(Occur, Box<dyn Query>)> = terms
                    .iter()
                    .map(|term| {
                        // plain Levenshtein, a transposition counts as two edits
                        let query: Box<dyn Query> = Box::new(FuzzyTermQuery::new(
                            Term::from_field_text(message, term),
                            *distance,
                            false,
                        ));
                        (Occur::Should, query)
                    })
                    .collect();
                Box::new(BooleanQuery::new(clauses))
            }
        };

        Ok(Some(query))
    }

    /// Tokenize with the analyzer registered for the message field
    fn message_tokens(&self, text: &str) -> Result<Vec<String>, BackendError> {
        let mut analyzer = self.index.tokenizer_for_field(self.fields.message)?;
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        stream.process(&mut |token| tokens.push(token.text.clone()));
        Ok(tokens)
    }

    fn load(&self, searcher: &Searcher, address: DocAddress) -> Result<LogRecord, BackendError> {
        let doc: TantivyDocument = searcher.doc(address)?;
        self.fields.to_record(&doc)
    }

    fn highlight(
        &self,
        generator: Option<&SnippetGenerator>,
        fallback: &RecordMatcher,
        record: &LogRecord,
    ) -> Option<String> {
        let Some(generator) = generator else {
            return fallback.highlight(record, &self.pre_tag, &self.post_tag);
        };

        let snippet = generator.snippet(&record.message);
        if snippet.highlighted().is_empty() {
            return fallback.highlight(record, &self.pre_tag, &self.post_tag);
        }
        let Some(base) = record.message.find(snippet.fragment()) else {
            return fallback.highlight(record, &self.pre_tag, &self.post_tag);
        };

        let message = &record.message;
        let mut out = String::with_capacity(message.len() + 16);
        let mut cursor = 0;
        for range in snippet.highlighted() {
            let (start, end) = (base + range.start, base + range.end);
            if start < cursor || end > message.len() {
                continue;
            }
            out.push_str(&message[cursor..start]);
            out.push_str(&self.pre_tag);
            out.push_str(&message[start..end]);
            out.push_str(&self.post_tag);
            cursor = end;
        }
        out.push_str(&message[cursor..]);
        Some(out)
    }
}

impl std::fmt::Debug for TantivyLogIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TantivyLogIndex")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl SearchBackend for TantivyLogIndex {
    fn name(&self) -> &'static str {
        "tantivy"
    }

    async fn execute(&self, query: &TranslatedQuery) -> Result<BackendPage, BackendError> {
        let searcher = self.reader.searcher();
        let compiled = self.compile(query)?;
        let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let limit = query.limit as usize;

        let simple = compiled.residual.is_none()
            && query.aggregations.is_empty()
            && query.is_relevance_ordered();

        let (page, total, aggregations) = if simple {
            let total = searcher.search(&*compiled.query, &Count)?;
            let mut page = Vec::new();
            if offset < total {
                let top_docs = searcher.search(
                    &*compiled.query,
                    &TopDocs::with_limit(limit).and_offset(offset),
                )?;
                for (score, address) in top_docs {
                    page.push((score, self.load(&searcher, address)?));
                }
            }
            (page, total as u64, Default::default())
        } else {
            let num_docs = searcher.num_docs() as usize;
            let mut matched = Vec::new();
            if num_docs > 0 {
                for (score, address) in searcher.search(&*compiled.query, &TopDocs::with_limit(num_docs))? {
                    let record = self.load(&searcher, address)?;
                    let keep = compiled
                        .residual
                        .as_ref()
                        .map_or(true, |residual| residual.score(&record).is_some());
                    if keep {
                        matched.push((score, record));
                    }
                }
            }

            let total = matched.len() as u64;
            let aggregations = if query.aggregations.is_empty() {
                Default::default()
            } else {
                let records: Vec<&LogRecord> = matched.iter().map(|(_, record)| record).collect();
                aggregation::evaluate(&query.aggregations, &records, query.time_zone)
            };

            sort_records(&mut matched, &query.sort);
            let page: Vec<(f32, LogRecord)> = matched.into_iter().skip(offset).take(limit).collect();
            (page, total, aggregations)
        };

        let generator = match (&compiled.text_query, query.highlight) {
            (Some(text_query), true) => {
                match SnippetGenerator::create(&searcher, &**text_query, self.fields.message) {
                    Ok(mut generator) => {
                        generator.set_max_num_chars(SNIPPET_MAX_CHARS);
                        Some(generator)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Snippet generation unavailable, using stored-text highlighting");
                        None
                    }
                }
            }
            _ => None,
        };
        let fallback = RecordMatcher::new(query)?;
        let relevance = query.is_relevance_ordered();

        let hits = page
            .into_iter()
            .map(|(score, record)| {
                let highlight = if query.highlight {
                    self.highlight(generator.as_ref(), &fallback, &record)
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
        let Some(handle) = self.fields.raw_field(field) else {
            return Ok(Vec::new());
        };

        let searcher = self.reader.searcher();
        let mut values = BTreeSet::new();
        for segment_reader in searcher.segment_readers() {
            let inverted_index = segment_reader.inverted_index(handle)?;
            let mut stream = inverted_index.terms().stream()?;
            while stream.advance() {
                values.insert(String::from_utf8_lossy(stream.key()).into_owned());
            }
        }

        // Count live documents; term doc_freq includes deletions
        let mut counts: HashMap<String, u64> = HashMap::new();
        for value in values {
            let term_query = TermQuery::new(
                Term::from_field_text(handle, &value),
                IndexRecordOption::Basic,
            );
            let count = searcher.search(&term_query, &Count)? as u64;
            if count > 0 {
                counts.insert(value, count);
            }
        }

        Ok(counts
            .into_iter()
            .map(|(value, count)| ValueCount { value, count })
            .collect())
    }
}
