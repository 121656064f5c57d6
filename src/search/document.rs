//! Log record documents and the index schema

use crate::models::{LogLevel, LogRecord};
use crate::search::error::BackendError;
use chrono::DateTime;
use std::collections::BTreeMap;
use std::str::FromStr;
use tantivy::schema::*;
use tantivy::TantivyDocument;

/// Resolved handles for every field of the log schema
#[derive(Debug, Clone)]
pub struct LogSchema {
    schema: Schema,
    pub id: Field,
    pub timestamp: Field,
    pub level: Field,
    pub message: Field,
    pub source: Field,
    pub host: Field,
    pub application: Field,
    pub environment: Field,
    pub logger: Field,
    pub thread: Field,
    pub stack_trace: Field,
    pub metadata: Field,
}

/// Build the search schema for log records
pub fn build_log_schema() -> Schema {
    LogSchema::new().schema
}

impl LogSchema {
    pub fn new() -> Self {
        let mut schema_builder = Schema::builder();

        // ID - stored, indexed as string
        let id = schema_builder.add_text_field("id", STRING | STORED);

        // Timestamp - microseconds since epoch, range-queryable
        let timestamp = schema_builder.add_i64_field("timestamp", INDEXED | STORED | FAST);

        let level = schema_builder.add_text_field("level", STRING | STORED);

        // Message - full-text indexed, stored
        let message = schema_builder.add_text_field("message", TEXT | STORED);

        let source = schema_builder.add_text_field("source", STRING | STORED);
        let host = schema_builder.add_text_field("host", STRING | STORED);
        let application = schema_builder.add_text_field("application", STRING | STORED);
        let environment = schema_builder.add_text_field("environment", STRING | STORED);
        let logger = schema_builder.add_text_field("logger", STRING | STORED);
        let thread = schema_builder.add_text_field("thread", STRING | STORED);

        let stack_trace = schema_builder.add_text_field("stack_trace", TEXT | STORED);

        // Metadata - JSON, stored only
        let metadata = schema_builder.add_text_field("metadata", STORED);

        Self {
            schema: schema_builder.build(),
            id,
            timestamp,
            level,
            message,
            source,
            host,
            application,
            environment,
            logger,
            thread,
            stack_trace,
            metadata,
        }
    }

    /// Resolve field handles from an existing index schema
    pub fn from_schema(schema: Schema) -> Result<Self, BackendError> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| BackendError::MalformedResponse(format!("index schema has no '{}' field", name)))
        };

        Ok(Self {
            id: field("id")?,
            timestamp: field("timestamp")?,
            level: field("level")?,
            message: field("message")?,
            source: field("source")?,
            host: field("host")?,
            application: field("application")?,
            environment: field("environment")?,
            logger: field("logger")?,
            thread: field("thread")?,
            stack_trace: field("stack_trace")?,
            metadata: field("metadata")?,
            schema,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Handle of an untokenized field, `None` for anything else
    pub fn raw_field(&self, name: &str) -> Option<Field> {
        match name {
            "id" => Some(self.id),
            "level" => Some(self.level),
            "source" => Some(self.source),
            "host" => Some(self.host),
            "application" => Some(self.application),
            "environment" => Some(self.environment),
            "logger" => Some(self.logger),
            "thread" => Some(self.thread),
            _ => None,
        }
    }

    /// Term for an exact value of a raw field; levels are canonicalized
    pub fn raw_term(&self, field: Field, value: &str) -> Term {
        if field == self.level {
            if let Ok(level) = LogLevel::from_str(value.trim()) {
                return Term::from_field_text(field, &level.to_string());
            }
        }
        Term::from_field_text(field, value)
    }

    pub fn to_document(&self, record: &LogRecord) -> TantivyDocument {
        let mut doc = TantivyDocument::new();

        doc.add_text(self.id, &record.id);
        doc.add_i64(self.timestamp, record.timestamp.timestamp_micros());
        doc.add_text(self.level, record.level.to_string());
        doc.add_text(self.message, &record.message);
        doc.add_text(self.source, &record.source);

        for (field, value) in [
            (self.host, &record.host),
            (self.application, &record.application),
            (self.environment, &record.environment),
        ] {
            if !value.is_empty() {
                doc.add_text(field, value);
            }
        }

        if let Some(ref logger) = record.logger {
            doc.add_text(self.logger, logger);
        }
        if let Some(ref thread) = record.thread {
            doc.add_text(self.thread, thread);
        }
        if let Some(ref stack_trace) = record.stack_trace {
            doc.add_text(self.stack_trace, stack_trace);
        }

        if !record.metadata.is_empty() {
            doc.add_text(
                self.metadata,
                serde_json::to_string(&record.metadata).unwrap_or_default(),
            );
        }

        doc
    }

    /// Rebuild a record from its stored fields
    pub fn to_record(&self, doc: &TantivyDocument) -> Result<LogRecord, BackendError> {
        let text = |field: Field| doc.get_first(field).and_then(|v| v.as_str()).map(str::to_string);

        let micros = doc
            .get_first(self.timestamp)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| BackendError::MalformedResponse("document without timestamp".into()))?;
        let timestamp = DateTime::from_timestamp_micros(micros)
            .ok_or_else(|| BackendError::MalformedResponse(format!("timestamp out of range: {}", micros)))?;

        let level_text = text(self.level).unwrap_or_default();
        let level = LogLevel::from_str(&level_text)
            .map_err(|_| BackendError::MalformedResponse(format!("unknown level '{}'", level_text)))?;

        let metadata = match text(self.metadata) {
            Some(json) => serde_json::from_str::<BTreeMap<String, String>>(&json)
                .map_err(|e| BackendError::MalformedResponse(format!("metadata: {}", e)))?,
            None => BTreeMap::new(),
        };

        Ok(LogRecord {
            id: text(self.id).unwrap_or_default(),
            timestamp,
            level,
            message: text(self.message).unwrap_or_default(),
            source: text(self.source).unwrap_or_default(),
            host: text(self.host).unwrap_or_default(),
            application: text(self.application).unwrap_or_default(),
            environment: text(self.environment).unwrap_or_default(),
            logger: text(self.logger),
            thread: text(self.thread),
            stack_trace: text(self.stack_trace),
            metadata,
        })
    }
}

impl Default for LogSchema {
    fn default() -> Self {
        Self::new()
    }
}
