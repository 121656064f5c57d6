//! Translation of normalized queries into backend-neutral match plans

use crate::search::aggregation::AggregationPlan;
use crate::search::normalize::NormalizedQuery;
use crate::search::query::{SearchMode, SortField, MATCH_ALL};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Field prefix a full-text token may carry, e.g. `level:ERROR`
pub const FIELD_TERM_FIELDS: &[&str] = &[
    "level",
    "source",
    "host",
    "application",
    "environment",
    "logger",
    "thread",
    "id",
];

/// One token of a relevance query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerm {
    /// Target field, `None` for the message text
    pub field: Option<String>,
    pub value: String,
}

/// Text matching semantics, one variant per search mode plus match-all
#[derive(Debug, Clone, PartialEq)]
pub enum TextMatch {
    All,
    /// Tokenized relevance match, any term may match
    Relevance { terms: Vec<QueryTerm> },
    /// Phrase equality
    Exact { phrase: String, case_sensitive: bool },
    /// Glob with `*`/`?`, kept verbatim
    Wildcard { pattern: String, case_sensitive: bool },
    Regex { pattern: String, case_sensitive: bool },
    /// Edit-distance tolerant match on message tokens
    Fuzzy { terms: Vec<String>, distance: u8 },
}

/// Inclusive time bounds on the record timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

/// Membership constraint: the field must equal one of `values`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldConstraint {
    pub field: String,
    pub values: Vec<String>,
}

/// Everything an adapter needs to run the full path
#[derive(Debug, Clone)]
pub struct TranslatedQuery {
    pub text_match: TextMatch,
    pub time_range: Option<TimeRange>,
    /// ANDed together; never contains an empty `values` list
    pub constraints: Vec<FieldConstraint>,
    /// Empty means backend relevance ordering
    pub sort: Vec<SortField>,
    pub aggregations: Vec<AggregationPlan>,
    pub highlight: bool,
    pub offset: u64,
    pub limit: u32,
    pub time_zone: Tz,
}

impl TranslatedQuery {
    /// True when the query ranks matches by relevance
    pub fn is_relevance_ordered(&self) -> bool {
        self.sort.is_empty()
    }
}

/// Turns a [`NormalizedQuery`] into a [`TranslatedQuery`]
#[derive(Debug, Clone)]
pub struct QueryTranslator {
    fuzzy_distance: u8,
}

impl Default for QueryTranslator {
    fn default() -> Self {
        Self { fuzzy_distance: 2 }
    }
}

impl QueryTranslator {
    /// `fuzzy_distance` is capped at 2
    pub fn new(fuzzy_distance: u8) -> Self {
        Self {
            fuzzy_distance: fuzzy_distance.min(2),
        }
    }

    pub fn translate(&self, normalized: &NormalizedQuery) -> TranslatedQuery {
        let query = normalized.query();

        let time_range = match (query.start_time(), query.end_time()) {
            (Some(start), Some(end)) => Some(TimeRange { start, end }),
            _ => None,
        };

        let mut constraints: Vec<FieldConstraint> = query
            .filter_collections()
            .into_iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(field, values)| FieldConstraint {
                field: field.to_string(),
                values: values.to_vec(),
            })
            .collect();
        constraints.extend(query.filters().iter().map(|(field, value)| FieldConstraint {
            field: field.clone(),
            values: vec![value.clone()],
        }));

        TranslatedQuery {
            text_match: self.text_match(query.text(), normalized.mode(), query.case_sensitive()),
            time_range,
            constraints,
            sort: query.sort_fields().to_vec(),
            aggregations: normalized.aggregations().to_vec(),
            highlight: query.highlight_matches(),
            offset: normalized.offset(),
            limit: normalized.limit(),
            time_zone: normalized.time_zone(),
        }
    }

    fn text_match(&self, text: &str, mode: SearchMode, case_sensitive: bool) -> TextMatch {
        let trimmed = text.trim();
        if trimmed == MATCH_ALL || (trimmed.is_empty() && mode == SearchMode::Wildcard) {
            return TextMatch::All;
        }

        match mode {
            SearchMode::FullText => TextMatch::Relevance {
                terms: parse_terms(trimmed),
            },
            SearchMode::ExactMatch => TextMatch::Exact {
                phrase: trimmed.to_string(),
                case_sensitive,
            },
            SearchMode::Wildcard => TextMatch::Wildcard {
                pattern: text.to_string(),
                case_sensitive,
            },
            SearchMode::Regex => TextMatch::Regex {
                pattern: text.to_string(),
                case_sensitive,
            },
            SearchMode::Fuzzy => TextMatch::Fuzzy {
                terms: tokenize(trimmed),
                distance: self.fuzzy_distance,
            },
        }
    }
}

/// Split relevance text into terms, recognizing `field:value` tokens
pub fn parse_terms(text: &str) -> Vec<QueryTerm> {
    text.split_whitespace()
        .flat_map(|token| match token.split_once(':') {
            Some((field, value))
                if !value.is_empty() && FIELD_TERM_FIELDS.contains(&field.to_lowercase().as_str()) =>
            {
                vec![QueryTerm {
                    field: Some(field.to_lowercase()),
                    value: value.to_string(),
                }]
            }
            _ => tokenize(token)
                .into_iter()
                .map(|value| QueryTerm { field: None, value })
                .collect(),
        })
        .collect()
}

/// Lowercased alphanumeric tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Convert a glob into an anchored regex, escaping everything except `*` and `?`
pub fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}
