//! Canned queries for common investigations
//!
//! Each builder returns a fresh [`SearchQuery`]; the service still runs it
//! through normalization before dispatch.

use crate::search::query::{SearchMode, SearchQuery, MATCH_ALL};
use chrono::{DateTime, Utc};

/// Query text selecting error-level records
pub const ERROR_MATCH: &str = "level:ERROR";

/// Errors between `start` and `end`, with stack traces
pub fn error_window_query(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    page: u32,
    size: u32,
) -> SearchQuery {
    SearchQuery::builder(ERROR_MATCH)
        .with_time_range(Some(start), Some(end))
        .with_stack_trace(true)
        .with_page(page)
        .with_size(size)
        .build()
}

/// Everything one application logged in one environment.
///
/// The text is a match-all expression; override it with
/// `scoped_query(..).to_builder().with_text(..)`.
pub fn scoped_query(
    application: impl Into<String>,
    environment: impl Into<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    page: u32,
    size: u32,
) -> SearchQuery {
    SearchQuery::builder(MATCH_ALL)
        .with_applications(vec![application.into()])
        .with_environments(vec![environment.into()])
        .with_time_range(start, end)
        .with_page(page)
        .with_size(size)
        .build()
}

/// Pattern match in an explicit mode, always highlighted
pub fn pattern_query(
    pattern: impl Into<String>,
    mode: SearchMode,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    page: u32,
    size: u32,
) -> SearchQuery {
    SearchQuery::builder(pattern)
        .with_mode(mode)
        .with_highlight(true)
        .with_time_range(start, end)
        .with_page(page)
        .with_size(size)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_error_window() {
        let end = Utc::now();
        let start = end - Duration::hours(24);
        let query = error_window_query(start, end, 2, 50);

        assert!(query.include_stack_trace());
        assert_eq!(query.text(), "level:ERROR");
        assert_eq!(query.start_time(), Some(start));
        assert_eq!(query.end_time(), Some(end));
        assert_eq!((query.page(), query.size()), (2, 50));
    }

    #[test]
    fn test_scoped_text_override() {
        let query = scoped_query("web-service", "production", None, None, 1, 100)
            .to_builder()
            .with_text("timeout")
            .build();

        assert_eq!(query.text(), "timeout");
        assert_eq!(query.applications(), ["web-service"]);
        assert!(!query.has_time_range());
    }

    #[test]
    fn test_pattern_keeps_text_verbatim() {
        let query = pattern_query("  conn*  ", SearchMode::Wildcard, None, None, 1, 10);
        assert_eq!(query.text(), "  conn*  ");
        assert!(query.highlight_matches());
    }
}
