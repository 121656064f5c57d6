//! Query normalization and validation

use crate::search::aggregation::AggregationPlan;
use crate::search::error::ValidationError;
use crate::search::query::{SearchMode, SearchQuery, DEFAULT_TIME_ZONE, MAX_SIZE};
use chrono_tz::Tz;
use std::collections::HashSet;

/// A query that passed validation, with its derived values
#[derive(Debug, Clone)]
pub struct NormalizedQuery {
    query: SearchQuery,
    mode: SearchMode,
    offset: u64,
    time_zone: Tz,
    aggregations: Vec<AggregationPlan>,
}

impl NormalizedQuery {
    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    /// Effective matching mode after `useRegex` promotion
    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Number of leading matches to skip: `(page - 1) * size`
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn limit(&self) -> u32 {
        self.query.size()
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    pub fn aggregations(&self) -> &[AggregationPlan] {
        &self.aggregations
    }
}

/// Applies defaults and enforces query invariants before any backend call
#[derive(Debug, Clone)]
pub struct QueryNormalizer {
    max_size: u32,
    default_time_zone: String,
}

impl Default for QueryNormalizer {
    fn default() -> Self {
        Self {
            max_size: MAX_SIZE,
            default_time_zone: DEFAULT_TIME_ZONE.to_string(),
        }
    }
}

impl QueryNormalizer {
    /// Create a normalizer; `max_size` is capped at [`MAX_SIZE`]
    pub fn new(max_size: u32, default_time_zone: impl Into<String>) -> Self {
        Self {
            max_size: max_size.clamp(1, MAX_SIZE),
            default_time_zone: default_time_zone.into(),
        }
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    pub fn normalize(&self, query: SearchQuery) -> Result<NormalizedQuery, ValidationError> {
        let mode = if query.use_regex() && query.mode() == SearchMode::FullText {
            SearchMode::Regex
        } else {
            query.mode()
        };

        if query.text().trim().is_empty() && mode != SearchMode::Wildcard {
            return Err(ValidationError::BlankQuery);
        }

        self.check_pagination(query.page(), query.size())?;

        if let (Some(start), Some(end)) = (query.start_time(), query.end_time()) {
            if start > end {
                return Err(ValidationError::InvalidTimeRange { start, end });
            }
        }

        for (field, values) in query.filter_collections() {
            if values.iter().any(|value| value.trim().is_empty()) {
                return Err(ValidationError::EmptyFilterValue {
                    field: field.to_string(),
                });
            }
        }
        for (field, value) in query.filters() {
            if field.trim().is_empty() || value.trim().is_empty() {
                return Err(ValidationError::EmptyFilterValue {
                    field: field.clone(),
                });
            }
        }

        if let Some(sort) = query.sort_fields().iter().find(|s| s.field.trim().is_empty()) {
            return Err(ValidationError::InvalidSortField(sort.field.clone()));
        }

        let aggregations = Self::plan_aggregations(&query)?;

        if mode == SearchMode::Regex {
            regex::RegexBuilder::new(query.text())
                .case_insensitive(!query.case_sensitive())
                .build()
                .map_err(|e| ValidationError::InvalidPattern {
                    pattern: query.text().to_string(),
                    reason: e.to_string(),
                })?;
        }

        let (query, time_zone) = self.resolve_time_zone(query)?;
        let offset = (query.page() as u64 - 1) * query.size() as u64;

        Ok(NormalizedQuery {
            query,
            mode,
            offset,
            time_zone,
            aggregations,
        })
    }

    /// Page and size bounds shared by every entry point
    pub fn check_pagination(&self, page: u32, size: u32) -> Result<(), ValidationError> {
        if page < 1 {
            return Err(ValidationError::PageOutOfRange { page });
        }
        if size < 1 || size > self.max_size {
            return Err(ValidationError::SizeOutOfRange {
                size,
                max: self.max_size,
            });
        }
        Ok(())
    }

    fn plan_aggregations(query: &SearchQuery) -> Result<Vec<AggregationPlan>, ValidationError> {
        let mut seen = HashSet::new();
        let mut plans = Vec::with_capacity(query.aggregations().len());

        for request in query.aggregations() {
            if request.name.trim().is_empty() {
                return Err(ValidationError::InvalidAggregation {
                    name: request.name.clone(),
                    reason: "name must not be blank".to_string(),
                });
            }
            if !seen.insert(request.name.as_str()) {
                return Err(ValidationError::DuplicateAggregation {
                    name: request.name.clone(),
                });
            }
            if request.field.trim().is_empty() {
                return Err(ValidationError::InvalidAggregation {
                    name: request.name.clone(),
                    reason: "field must not be blank".to_string(),
                });
            }

            let plan = AggregationPlan::from_request(request).map_err(|reason| {
                ValidationError::InvalidAggregation {
                    name: request.name.clone(),
                    reason,
                }
            })?;
            plans.push(plan);
        }

        Ok(plans)
    }

    fn resolve_time_zone(&self, query: SearchQuery) -> Result<(SearchQuery, Tz), ValidationError> {
        if query.time_zone().trim().is_empty() {
            let tz = self
                .default_time_zone
                .parse::<Tz>()
                .map_err(|_| ValidationError::UnknownTimeZone(self.default_time_zone.clone()))?;
            let query = query.to_builder().with_time_zone(self.default_time_zone.clone()).build();
            return Ok((query, tz));
        }

        let tz = query
            .time_zone()
            .trim()
            .parse::<Tz>()
            .map_err(|_| ValidationError::UnknownTimeZone(query.time_zone().to_string()))?;
        Ok((query, tz))
    }
}
