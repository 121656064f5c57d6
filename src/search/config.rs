//! Search configuration

use crate::search::query::{DEFAULT_SIZE, DEFAULT_TIME_ZONE, MAX_SIZE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use strum::{AsRefStr, Display, EnumString};

/// Search service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Page size used by callers that do not pass one
    pub default_page_size: u32,

    /// Largest accepted page size (capped at 10000)
    pub max_page_size: u32,

    /// IANA zone applied when a query leaves `timeZone` blank
    pub default_time_zone: String,

    /// Enable highlighting
    pub enable_highlighting: bool,

    pub highlight_pre_tag: String,

    pub highlight_post_tag: String,

    /// Maximum edit distance for fuzzy mode (0..=2)
    pub fuzzy_distance: u8,

    /// Deadline for a single backend call
    pub default_timeout_ms: Option<u64>,

    /// Enable field value suggestions
    pub enable_suggestions: bool,

    /// Upper bound on suggestions returned per call
    pub max_suggestions: usize,
}

impl SearchConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_SIZE,
            max_page_size: MAX_SIZE,
            default_time_zone: DEFAULT_TIME_ZONE.to_string(),
            enable_highlighting: true,
            highlight_pre_tag: "<em>".to_string(),
            highlight_post_tag: "</em>".to_string(),
            fuzzy_distance: 2,
            default_timeout_ms: None,
            enable_suggestions: true,
            max_suggestions: 100,
        }
    }
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn default_page_size(mut self, size: u32) -> Self {
        self.config.default_page_size = size;
        self
    }

    pub fn max_page_size(mut self, size: u32) -> Self {
        self.config.max_page_size = size;
        self
    }

    pub fn default_time_zone(mut self, tz: impl Into<String>) -> Self {
        self.config.default_time_zone = tz.into();
        self
    }

    pub fn enable_highlighting(mut self, enabled: bool) -> Self {
        self.config.enable_highlighting = enabled;
        self
    }

    pub fn highlight_tags(mut self, pre: impl Into<String>, post: impl Into<String>) -> Self {
        self.config.highlight_pre_tag = pre.into();
        self.config.highlight_post_tag = post.into();
        self
    }

    pub fn fuzzy_distance(mut self, distance: u8) -> Self {
        self.config.fuzzy_distance = distance;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn enable_suggestions(mut self, enabled: bool) -> Self {
        self.config.enable_suggestions = enabled;
        self
    }

    pub fn max_suggestions(mut self, max: usize) -> Self {
        self.config.max_suggestions = max;
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Which full-path backend to run
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BackendKind {
    #[default]
    Memory,
    Tantivy,
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,

    /// Tantivy index directory; the index lives in RAM when unset
    pub index_path: Option<PathBuf>,

    /// Index writer heap size in bytes (default: 50MB)
    pub writer_heap_size: usize,

    /// Number of threads for indexing
    pub indexing_threads: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Memory,
            index_path: None,
            writer_heap_size: 50_000_000, // 50MB
            indexing_threads: 1,
        }
    }
}
