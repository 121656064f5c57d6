use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;
use validator::Validate;

/// A single structured log record as stored by the backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Unique record identifier
    pub id: String,

    /// When the event was logged
    pub timestamp: DateTime<Utc>,

    /// Log level
    pub level: LogLevel,

    /// Log message text
    pub message: String,

    /// Emitting source (file, stream, collector)
    #[validate(length(min = 1, max = 255))]
    pub source: String,

    /// Host the record originated from
    #[serde(default)]
    pub host: String,

    /// Application name
    #[serde(default)]
    pub application: String,

    /// Deployment environment (production, staging, ...)
    #[serde(default)]
    pub environment: String,

    /// Logger name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,

    /// Thread name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,

    /// Stack trace attached to the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,

    /// Free-form key/value metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl LogRecord {
    /// Create a new record with a generated id
    pub fn new(
        timestamp: DateTime<Utc>,
        level: LogLevel,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp,
            level,
            message: message.into(),
            source: source.into(),
            host: String::new(),
            application: String::new(),
            environment: String::new(),
            logger: None,
            thread: None,
            stack_trace: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = application.into();
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Look up a field value by its searchable name.
    ///
    /// Names that are not record fields fall back to the metadata map, so
    /// `duration_ms` resolves to `metadata["duration_ms"]`.
    pub fn field_value(&self, field: &str) -> Option<String> {
        match field {
            "id" => Some(self.id.clone()),
            "timestamp" => Some(self.timestamp.to_rfc3339()),
            "level" => Some(self.level.to_string()),
            "message" => Some(self.message.clone()),
            "source" => Some(self.source.clone()),
            "host" => Some(self.host.clone()),
            "application" => Some(self.application.clone()),
            "environment" => Some(self.environment.clone()),
            "logger" => self.logger.clone(),
            "thread" => self.thread.clone(),
            "stack_trace" => self.stack_trace.clone(),
            other => self
                .metadata
                .get(other.strip_prefix("metadata.").unwrap_or(other))
                .cloned(),
        }
        .filter(|value| !value.is_empty())
    }
}

/// Log severity level
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[strum(to_string = "WARN", serialize = "WARNING")]
    #[serde(alias = "WARNING")]
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// Check if the level marks a failure
    pub fn is_error(&self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Fatal)
    }
}
