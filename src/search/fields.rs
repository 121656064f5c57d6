//! Searchable fields and value suggestions

use crate::search::backend::ValueCount;

/// Searchable field names, in display order
pub const AVAILABLE_FIELDS: &[&str] = &[
    "timestamp",
    "level",
    "message",
    "source",
    "host",
    "application",
    "environment",
    "logger",
    "thread",
    "stack_trace",
];

/// Fields with a small, enumerable set of values
pub const SUGGESTABLE_FIELDS: &[&str] = &[
    "level",
    "source",
    "host",
    "application",
    "environment",
    "logger",
    "thread",
];

pub fn is_suggestable(field: &str) -> bool {
    SUGGESTABLE_FIELDS.contains(&field)
}

/// Filter values by case-insensitive prefix and keep the `limit` most frequent.
///
/// Ties are broken alphabetically so the output is stable.
pub fn rank_suggestions(values: Vec<ValueCount>, prefix: &str, limit: usize) -> Vec<String> {
    let prefix = prefix.to_lowercase();
    let mut matching: Vec<ValueCount> = values
        .into_iter()
        .filter(|v| !v.value.is_empty() && v.value.to_lowercase().starts_with(&prefix))
        .collect();

    matching.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    matching.truncate(limit);
    matching.into_iter().map(|v| v.value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, u64)]) -> Vec<ValueCount> {
        pairs
            .iter()
            .map(|(value, count)| ValueCount {
                value: value.to_string(),
                count: *count,
            })
            .collect()
    }

    #[test]
    fn test_minimum_fields_present() {
        for field in ["timestamp", "level", "message", "source", "host"] {
            assert!(AVAILABLE_FIELDS.contains(&field));
        }
        assert!(!is_suggestable("message"));
        assert!(is_suggestable("host"));
    }

    #[test]
    fn test_prefix_is_case_insensitive() {
        let values = counts(&[("Web-01", 3), ("web-02", 5), ("db-01", 9)]);
        assert_eq!(rank_suggestions(values, "WEB", 10), vec!["web-02", "Web-01"]);
    }

    #[test]
    fn test_empty_prefix_orders_by_frequency() {
        let values = counts(&[("b", 2), ("a", 2), ("c", 7)]);
        assert_eq!(rank_suggestions(values, "", 2), vec!["c", "a"]);
    }
}
