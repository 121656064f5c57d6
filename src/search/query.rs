//! Search query model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumString};

/// Default page number
pub const DEFAULT_PAGE: u32 = 1;

/// Default page size
pub const DEFAULT_SIZE: u32 = 100;

/// Largest accepted page size
pub const MAX_SIZE: u32 = 10_000;

/// Default time zone for date bucketing
pub const DEFAULT_TIME_ZONE: &str = "UTC";

/// Text that matches every record
pub const MATCH_ALL: &str = "*";

/// Matching semantics applied to the query text
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SearchMode {
    /// Tokenized relevance match
    #[default]
    FullText,
    /// Exact phrase equality
    ExactMatch,
    /// Glob pattern with `*` and `?`
    Wildcard,
    /// Regular expression over the record text
    Regex,
    /// Edit-distance tolerant match
    Fuzzy,
}

/// Sort order for search results
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum SortDirection {
    #[serde(alias = "asc")]
    #[strum(to_string = "asc", serialize = "ascending")]
    Ascending,
    #[default]
    #[serde(alias = "desc")]
    #[strum(to_string = "desc", serialize = "descending")]
    Descending,
}

/// Field to sort by
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortField {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Ascending)
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Descending)
    }
}

/// Kind of aggregation to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AggregationType {
    Terms,
    DateHistogram,
    Histogram,
    Stats,
    Cardinality,
    Percentiles,
}

/// Aggregation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRequest {
    /// Output name, unique within a query
    pub name: String,

    #[serde(rename = "type")]
    pub aggregation_type: AggregationType,

    /// Target field
    pub field: String,

    /// Type-specific parameters (`size`, `interval`, `percents`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl AggregationRequest {
    pub fn new(
        name: impl Into<String>,
        aggregation_type: AggregationType,
        field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            aggregation_type,
            field: field.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn terms(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, AggregationType::Terms, field)
    }

    pub fn date_histogram(name: impl Into<String>, interval: impl Into<String>) -> Self {
        Self::new(name, AggregationType::DateHistogram, "timestamp").with_param("interval", interval)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

fn default_page() -> u32 {
    DEFAULT_PAGE
}

fn default_size() -> u32 {
    DEFAULT_SIZE
}

fn default_true() -> bool {
    true
}

fn default_time_zone() -> String {
    DEFAULT_TIME_ZONE.to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// An immutable search request.
///
/// Built once through [`SearchQueryBuilder`] (or deserialized) and never
/// mutated afterwards, so a single query can be shared across concurrent
/// searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_time: Option<DateTime<Utc>>,

    #[serde(default = "default_page")]
    page: u32,

    #[serde(default = "default_size")]
    size: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sources: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    levels: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    hosts: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    applications: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    environments: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    filters: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sort_fields: Vec<SortField>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    aggregations: Vec<AggregationRequest>,

    #[serde(default)]
    mode: SearchMode,

    #[serde(default, skip_serializing_if = "is_false")]
    include_stack_trace: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    include_metadata: bool,

    #[serde(default = "default_true")]
    highlight_matches: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    case_sensitive: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    use_regex: bool,

    #[serde(default = "default_time_zone")]
    time_zone: String,
}

impl SearchQuery {
    /// Start building a query for the given text
    pub fn builder(text: impl Into<String>) -> SearchQueryBuilder {
        SearchQueryBuilder::new(text)
    }

    /// Copy this query into a builder for deriving a variant
    pub fn to_builder(&self) -> SearchQueryBuilder {
        SearchQueryBuilder {
            query: self.clone(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn applications(&self) -> &[String] {
        &self.applications
    }

    pub fn environments(&self) -> &[String] {
        &self.environments
    }

    pub fn filters(&self) -> &BTreeMap<String, String> {
        &self.filters
    }

    pub fn sort_fields(&self) -> &[SortField] {
        &self.sort_fields
    }

    pub fn aggregations(&self) -> &[AggregationRequest] {
        &self.aggregations
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn include_stack_trace(&self) -> bool {
        self.include_stack_trace
    }

    pub fn include_metadata(&self) -> bool {
        self.include_metadata
    }

    pub fn highlight_matches(&self) -> bool {
        self.highlight_matches
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn use_regex(&self) -> bool {
        self.use_regex
    }

    pub fn time_zone(&self) -> &str {
        &self.time_zone
    }

    /// True only when both time bounds are set
    pub fn has_time_range(&self) -> bool {
        self.start_time.is_some() && self.end_time.is_some()
    }

    /// True when any filter collection is non-empty
    pub fn has_filters(&self) -> bool {
        !self.sources.is_empty()
            || !self.levels.is_empty()
            || !self.hosts.is_empty()
            || !self.applications.is_empty()
            || !self.environments.is_empty()
            || !self.filters.is_empty()
    }

    pub fn has_aggregations(&self) -> bool {
        !self.aggregations.is_empty()
    }

    pub fn has_sorting(&self) -> bool {
        !self.sort_fields.is_empty()
    }

    /// Named filter collections in a fixed order, including empty ones
    pub fn filter_collections(&self) -> [(&'static str, &[String]); 5] {
        [
            ("source", self.sources.as_slice()),
            ("level", self.levels.as_slice()),
            ("host", self.hosts.as_slice()),
            ("application", self.applications.as_slice()),
            ("environment", self.environments.as_slice()),
        ]
    }
}

/// Builder for [`SearchQuery`]
#[derive(Debug, Clone)]
pub struct SearchQueryBuilder {
    query: SearchQuery,
}

impl SearchQueryBuilder {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            query: SearchQuery {
                text: text.into(),
                start_time: None,
                end_time: None,
                page: DEFAULT_PAGE,
                size: DEFAULT_SIZE,
                sources: Vec::new(),
                levels: Vec::new(),
                hosts: Vec::new(),
                applications: Vec::new(),
                environments: Vec::new(),
                filters: BTreeMap::new(),
                sort_fields: Vec::new(),
                aggregations: Vec::new(),
                mode: SearchMode::default(),
                include_stack_trace: false,
                include_metadata: false,
                highlight_matches: true,
                case_sensitive: false,
                use_regex: false,
                time_zone: default_time_zone(),
            },
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.query.text = text.into();
        self
    }

    /// Set both time bounds (inclusive)
    pub fn with_time_range(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.query.start_time = start;
        self.query.end_time = end;
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.query.page = page;
        self
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.query.size = size;
        self
    }

    pub fn with_sources(mut self, sources: Vec<impl Into<String>>) -> Self {
        self.query.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_levels(mut self, levels: Vec<impl Into<String>>) -> Self {
        self.query.levels = levels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_hosts(mut self, hosts: Vec<impl Into<String>>) -> Self {
        self.query.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_applications(mut self, applications: Vec<impl Into<String>>) -> Self {
        self.query.applications = applications.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_environments(mut self, environments: Vec<impl Into<String>>) -> Self {
        self.query.environments = environments.into_iter().map(Into::into).collect();
        self
    }

    /// Add an arbitrary field-equality filter
    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.filters.insert(field.into(), value.into());
        self
    }

    /// Append a sort directive; order of calls is significant
    pub fn with_sort(mut self, sort: SortField) -> Self {
        self.query.sort_fields.push(sort);
        self
    }

    /// Append an aggregation; order of calls is significant
    pub fn with_aggregation(mut self, aggregation: AggregationRequest) -> Self {
        self.query.aggregations.push(aggregation);
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.query.mode = mode;
        self
    }

    pub fn with_stack_trace(mut self, include: bool) -> Self {
        self.query.include_stack_trace = include;
        self
    }

    pub fn with_metadata(mut self, include: bool) -> Self {
        self.query.include_metadata = include;
        self
    }

    pub fn with_highlight(mut self, highlight: bool) -> Self {
        self.query.highlight_matches = highlight;
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.query.case_sensitive = case_sensitive;
        self
    }

    pub fn with_regex(mut self, use_regex: bool) -> Self {
        self.query.use_regex = use_regex;
        self
    }

    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.query.time_zone = time_zone.into();
        self
    }

    pub fn build(self) -> SearchQuery {
        self.query
    }
}
