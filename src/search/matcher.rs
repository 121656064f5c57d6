//! Record-level evaluation of translated queries

use crate::models::{LogLevel, LogRecord};
use crate::search::error::BackendError;
use crate::search::query::{SortDirection, SortField};
use crate::search::translate::{wildcard_to_regex, FieldConstraint, QueryTerm, TextMatch, TranslatedQuery};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use std::str::FromStr;

/// Compiled text matcher
#[derive(Debug, Clone)]
enum CompiledMatch {
    All,
    Relevance(Vec<QueryTerm>),
    Exact { phrase: String, case_sensitive: bool },
    Pattern { regex: Regex, per_token: bool },
    Fuzzy { terms: Vec<String>, distance: usize },
}

/// Evaluates a [`TranslatedQuery`] against individual records
#[derive(Debug, Clone)]
pub struct RecordMatcher {
    text: CompiledMatch,
    query: TranslatedQuery,
}

impl RecordMatcher {
    pub fn new(query: &TranslatedQuery) -> Result<Self, BackendError> {
        let text = match &query.text_match {
            TextMatch::All => CompiledMatch::All,
            TextMatch::Relevance { terms } => CompiledMatch::Relevance(terms.clone()),
            TextMatch::Exact {
                phrase,
                case_sensitive,
            } => CompiledMatch::Exact {
                phrase: phrase.clone(),
                case_sensitive: *case_sensitive,
            },
            TextMatch::Wildcard {
                pattern,
                case_sensitive,
            } => CompiledMatch::Pattern {
                regex: compile(&wildcard_to_regex(pattern), *case_sensitive)?,
                per_token: true,
            },
            TextMatch::Regex {
                pattern,
                case_sensitive,
            } => CompiledMatch::Pattern {
                regex: compile(pattern, *case_sensitive)?,
                per_token: false,
            },
            TextMatch::Fuzzy { terms, distance } => CompiledMatch::Fuzzy {
                terms: terms.clone(),
                distance: *distance as usize,
            },
        };

        Ok(Self {
            text,
            query: query.clone(),
        })
    }

    /// Score a record, `None` when it does not match
    pub fn score(&self, record: &LogRecord) -> Option<f32> {
        if let Some(range) = &self.query.time_range {
            if !range.contains(record.timestamp) {
                return None;
            }
        }
        if !self
            .query
            .constraints
            .iter()
            .all(|constraint| constraint_matches(constraint, record))
        {
            return None;
        }
        self.text_score(record)
    }

    /// Score only the text part of the query
    pub fn text_score(&self, record: &LogRecord) -> Option<f32> {
        match &self.text {
            CompiledMatch::All => Some(1.0),
            CompiledMatch::Relevance(terms) => {
                let tokens = crate::search::translate::tokenize(&record.message);
                let matched = terms
                    .iter()
                    .filter(|term| match &term.field {
                        Some(field) => field_equals(field, &term.value, record),
                        None => tokens.iter().any(|token| *token == term.value),
                    })
                    .count();
                (matched > 0).then(|| matched as f32 / terms.len().max(1) as f32)
            }
            CompiledMatch::Exact {
                phrase,
                case_sensitive,
            } => (!phrase_spans(&record.message, phrase, *case_sensitive).is_empty()).then_some(1.0),
            CompiledMatch::Pattern { regex, per_token } => {
                let found = regex.is_match(&record.message)
                    || (*per_token && record.message.split_whitespace().any(|t| regex.is_match(t)));
                found.then_some(1.0)
            }
            CompiledMatch::Fuzzy { terms, distance } => {
                let tokens = crate::search::translate::tokenize(&record.message);
                let mut best: Option<usize> = None;
                for term in terms {
                    for token in &tokens {
                        let d = levenshtein(term, token);
                        if d <= *distance {
                            best = Some(best.map_or(d, |b| b.min(d)));
                        }
                    }
                }
                best.map(|d| 1.0 / (1.0 + d as f32))
            }
        }
    }

    /// Mark matched spans of the message with `pre`/`post`
    pub fn highlight(&self, record: &LogRecord, pre: &str, post: &str) -> Option<String> {
        let message = &record.message;
        let mut spans: Vec<(usize, usize)> = match &self.text {
            CompiledMatch::All => Vec::new(),
            CompiledMatch::Relevance(terms) => {
                let words: Vec<&str> = terms
                    .iter()
                    .filter(|t| t.field.is_none())
                    .map(|t| t.value.as_str())
                    .collect();
                token_spans(message, |token| words.contains(&token.to_lowercase().as_str()))
            }
            CompiledMatch::Exact {
                phrase,
                case_sensitive,
            } => phrase_spans(message, phrase, *case_sensitive),
            CompiledMatch::Pattern { regex, per_token } => {
                if *per_token {
                    whitespace_spans(message)
                        .into_iter()
                        .filter(|(start, end)| regex.is_match(&message[*start..*end]))
                        .collect()
                } else {
                    regex
                        .find_iter(message)
                        .filter(|m| !m.as_str().is_empty())
                        .map(|m| (m.start(), m.end()))
                        .collect()
                }
            }
            CompiledMatch::Fuzzy { terms, distance } => token_spans(message, |token| {
                let lower = token.to_lowercase();
                terms.iter().any(|term| levenshtein(term, &lower) <= *distance)
            }),
        };

        if spans.is_empty() {
            return None;
        }
        spans.sort_unstable();

        let mut out = String::with_capacity(message.len() + spans.len() * (pre.len() + post.len()));
        let mut cursor = 0;
        for (start, end) in spans {
            if start < cursor {
                continue;
            }
            out.push_str(&message[cursor..start]);
            out.push_str(pre);
            out.push_str(&message[start..end]);
            out.push_str(post);
            cursor = end;
        }
        out.push_str(&message[cursor..]);
        Some(out)
    }
}

fn compile(pattern: &str, case_sensitive: bool) -> Result<Regex, BackendError> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| BackendError::Query(format!("invalid pattern '{}': {}", pattern, e)))
}

fn constraint_matches(constraint: &FieldConstraint, record: &LogRecord) -> bool {
    constraint
        .values
        .iter()
        .any(|value| field_equals(&constraint.field, value, record))
}

/// Field equality; levels compare case-insensitively
fn field_equals(field: &str, value: &str, record: &LogRecord) -> bool {
    if field == "level" {
        return LogLevel::from_str(value.trim()).map_or(false, |level| level == record.level);
    }
    record
        .field_value(field)
        .map_or(false, |actual| actual == value)
}

/// Byte spans of alphanumeric tokens accepted by `keep`
fn token_spans(text: &str, keep: impl Fn(&str) -> bool) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (index, c) in text.char_indices() {
        match (c.is_alphanumeric(), start) {
            (true, None) => start = Some(index),
            (false, Some(s)) => {
                if keep(&text[s..index]) {
                    spans.push((s, index));
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        if keep(&text[s..]) {
            spans.push((s, text.len()));
        }
    }
    spans
}

/// Spans where the phrase's tokens occur as a contiguous run of message
/// tokens. A phrase without tokens falls back to substring search.
fn phrase_spans(message: &str, phrase: &str, case_sensitive: bool) -> Vec<(usize, usize)> {
    let same = |a: &str, b: &str| {
        if case_sensitive {
            a == b
        } else {
            a.to_lowercase() == b.to_lowercase()
        }
    };

    let wanted: Vec<&str> = token_spans(phrase, |_| true)
        .into_iter()
        .map(|(start, end)| &phrase[start..end])
        .collect();
    if wanted.is_empty() {
        return substring_spans(message, phrase, case_sensitive);
    }

    let tokens = token_spans(message, |_| true);
    if tokens.len() < wanted.len() {
        return Vec::new();
    }
    tokens
        .windows(wanted.len())
        .filter(|run| {
            run.iter()
                .zip(&wanted)
                .all(|((start, end), want)| same(&message[*start..*end], want))
        })
        .map(|run| (run[0].0, run[run.len() - 1].1))
        .collect()
}

fn substring_spans(message: &str, needle: &str, case_sensitive: bool) -> Vec<(usize, usize)> {
    if needle.is_empty() {
        return Vec::new();
    }
    let (haystack, needle) = if case_sensitive {
        (message.to_string(), needle.to_string())
    } else {
        (message.to_lowercase(), needle.to_lowercase())
    };
    // lowercasing can change byte lengths, spans would no longer line up
    if haystack.len() != message.len() {
        return Vec::new();
    }
    haystack
        .match_indices(needle.as_str())
        .map(|(start, m)| (start, start + m.len()))
        .collect()
}

fn whitespace_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (index, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (false, None) => start = Some(index),
            (true, Some(s)) => {
                spans.push((s, index));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Levenshtein edit distance over chars
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = if ca == *cb { 0 } else { 1 };
            current[j + 1] = (previous[j] + cost)
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b_chars.len()]
}

/// Sort scored records by explicit sort fields, or by relevance then recency
pub fn sort_records(records: &mut [(f32, LogRecord)], sort: &[SortField]) {
    if sort.is_empty() {
        records.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
                .then_with(|| a.id.cmp(&b.id))
        });
        return;
    }

    records.sort_by(|(_, a), (_, b)| {
        sort.iter()
            .map(|directive| {
                let ordering = compare_field(&directive.field, a, b);
                match directive.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| a.id.cmp(&b.id))
    });
}

fn compare_field(field: &str, a: &LogRecord, b: &LogRecord) -> Ordering {
    match field {
        "timestamp" => a.timestamp.cmp(&b.timestamp),
        "level" => a.level.cmp(&b.level),
        _ => {
            let left = a.field_value(field);
            let right = b.field_value(field);
            match (
                left.as_deref().and_then(|v| v.parse::<f64>().ok()),
                right.as_deref().and_then(|v| v.parse::<f64>().ok()),
            ) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                // missing values sort last in ascending order
                _ => match (left, right) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::normalize::QueryNormalizer;
    use crate::search::query::{SearchMode, SearchQuery};
    use crate::search::translate::QueryTranslator;
    use chrono::{Duration, Utc};

    fn matcher(query: SearchQuery) -> RecordMatcher {
        let normalized = QueryNormalizer::default().normalize(query).unwrap();
        RecordMatcher::new(&QueryTranslator::default().translate(&normalized)).unwrap()
    }

    fn record(message: &str) -> LogRecord {
        LogRecord::new(Utc::now(), LogLevel::Error, message, "app.log")
            .with_host("web-01")
            .with_application("web-service")
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("timeout", "timeout"), 0);
        assert_eq!(levenshtein("timout", "timeout"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn test_relevance_and_field_terms() {
        let m = matcher(SearchQuery::builder("database timeout").build());
        assert!(m.score(&record("Database connection timeout")).unwrap() > 0.99);
        assert!(m.score(&record("database up")).unwrap() < 1.0);
        assert!(m.score(&record("all good")).is_none());

        let errors = matcher(SearchQuery::builder("level:error").build());
        assert!(errors.score(&record("anything")).is_some());
        let info = LogRecord::new(Utc::now(), LogLevel::Info, "anything", "app.log");
        assert!(errors.score(&info).is_none());
    }

    #[test]
    fn test_wildcard_and_regex() {
        let wildcard = matcher(SearchQuery::builder("connection*").with_mode(SearchMode::Wildcard).build());
        assert!(wildcard.score(&record("lost connections to db")).is_some());
        assert!(wildcard.score(&record("socket closed")).is_none());

        let sensitive = matcher(
            SearchQuery::builder("ERR-\\d+")
                .with_mode(SearchMode::Regex)
                .with_case_sensitive(true)
                .build(),
        );
        assert!(sensitive.score(&record("failed with ERR-42")).is_some());
        assert!(sensitive.score(&record("failed with err-42")).is_none());

        let insensitive = matcher(SearchQuery::builder("ERR-\\d+").with_mode(SearchMode::Regex).build());
        assert!(insensitive.score(&record("failed with err-42")).is_some());
    }

    #[test]
    fn test_exact_and_fuzzy() {
        let exact = matcher(SearchQuery::builder("pool exhausted").with_mode(SearchMode::ExactMatch).build());
        assert!(exact.score(&record("Connection pool exhausted")).is_some());
        assert!(exact.score(&record("exhausted pool")).is_none());

        let fuzzy = matcher(SearchQuery::builder("timout").with_mode(SearchMode::Fuzzy).build());
        assert!(fuzzy.score(&record("request timeout")).is_some());
        assert!(fuzzy.score(&record("request failed")).is_none());
    }

    #[test]
    fn test_exact_matches_whole_tokens_only() {
        let exact = matcher(SearchQuery::builder("connection time").with_mode(SearchMode::ExactMatch).build());
        assert!(exact.score(&record("Database connection timeout")).is_none());
        assert!(exact.score(&record("connection time exceeded")).is_some());
        assert!(exact.score(&record("lost CONNECTION, time 12s")).is_some());

        let sensitive = matcher(
            SearchQuery::builder("Pool Exhausted")
                .with_mode(SearchMode::ExactMatch)
                .with_case_sensitive(true)
                .build(),
        );
        assert!(sensitive.score(&record("Pool Exhausted again")).is_some());
        assert!(sensitive.score(&record("pool exhausted again")).is_none());
        assert!(sensitive.score(&record("Pool Exhaustedness")).is_none());

        assert_eq!(
            exact.highlight(&record("a connection time b"), "[", "]").as_deref(),
            Some("a [connection time] b")
        );
    }

    #[test]
    fn test_transposition_costs_two_edits() {
        assert_eq!(levenshtein("tiemout", "timeout"), 2);
        assert_eq!(levenshtein("timout", "timeout"), 1);
    }

    #[test]
    fn test_constraints_and_time_range() {
        let now = Utc::now();
        let m = matcher(
            SearchQuery::builder("*")
                .with_applications(vec!["web-service"])
                .with_hosts(vec!["web-02", "web-01"])
                .with_time_range(Some(now - Duration::hours(1)), Some(now + Duration::hours(1)))
                .build(),
        );
        assert!(m.score(&record("x")).is_some());

        let old = LogRecord { timestamp: now - Duration::days(2), ..record("x") };
        assert!(m.score(&old).is_none());

        let other_app = record("x").with_application("billing");
        assert!(m.score(&other_app).is_none());
    }

    #[test]
    fn test_highlight() {
        let m = matcher(SearchQuery::builder("timeout").build());
        assert_eq!(
            m.highlight(&record("Read timeout on db"), "<em>", "</em>").as_deref(),
            Some("Read <em>timeout</em> on db")
        );

        let regex = matcher(SearchQuery::builder("\\d+ms").with_mode(SearchMode::Regex).build());
        assert_eq!(
            regex.highlight(&record("took 350ms"), "[", "]").as_deref(),
            Some("took [350ms]")
        );

        let all = matcher(SearchQuery::builder("*").build());
        assert_eq!(all.highlight(&record("anything"), "<em>", "</em>"), None);
    }

    #[test]
    fn test_sort_records() {
        let now = Utc::now();
        let a = LogRecord { timestamp: now - Duration::minutes(2), ..record("a") }.with_id("a");
        let b = LogRecord { timestamp: now, ..record("b") }.with_id("b");
        let c = LogRecord { timestamp: now - Duration::minutes(1), ..record("c") }.with_id("c");

        let mut scored = vec![(0.5, a.clone()), (1.0, b.clone()), (0.5, c.clone())];
        sort_records(&mut scored, &[]);
        let ids: Vec<_> = scored.iter().map(|(_, r)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        sort_records(&mut scored, &[SortField::ascending("timestamp")]);
        let ids: Vec<_> = scored.iter().map(|(_, r)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);

        let mut by_duration = vec![
            (0.0, a.with_metadata("duration_ms", "90")),
            (0.0, b.with_metadata("duration_ms", "100")),
            (0.0, c),
        ];
        sort_records(&mut by_duration, &[SortField::descending("duration_ms")]);
        let ids: Vec<_> = by_duration.iter().map(|(_, r)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }
}
