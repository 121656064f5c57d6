//! Search result model

use crate::models::LogRecord;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// A single matched record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(flatten)]
    pub record: LogRecord,

    /// Relevance score, when the backend ranks matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,

    /// Message text with matched spans marked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
}

impl SearchHit {
    pub fn new(record: LogRecord) -> Self {
        Self {
            record,
            score: None,
            highlight: None,
        }
    }
}

/// Term or range bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub key: String,
    pub count: u64,
}

/// Date histogram bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateBucket {
    pub key: DateTime<Utc>,
    pub count: u64,
}

/// Numeric histogram bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericBucket {
    pub key: f64,
    pub count: u64,
}

/// Output of one aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregationOutput {
    Terms {
        buckets: Vec<Bucket>,
        /// Matches whose value fell outside the returned buckets
        other_count: u64,
    },
    DateHistogram {
        buckets: Vec<DateBucket>,
    },
    Histogram {
        buckets: Vec<NumericBucket>,
    },
    Stats {
        count: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        avg: Option<f64>,
        sum: f64,
    },
    Cardinality {
        value: u64,
    },
    Percentiles {
        values: BTreeMap<String, f64>,
    },
}

/// Aggregation outputs in request order, keyed by aggregation name
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "BTreeMap<String, AggregationOutput>")]
pub struct AggregationResults {
    entries: Vec<(String, AggregationOutput)>,
}

impl AggregationResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, output: AggregationOutput) {
        self.entries.push((name.into(), output));
    }

    pub fn get(&self, name: &str) -> Option<&AggregationOutput> {
        self.entries
            .iter()
            .find(|(entry_name, _)| entry_name == name)
            .map(|(_, output)| output)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AggregationOutput)> {
        self.entries.iter().map(|(name, output)| (name.as_str(), output))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<BTreeMap<String, AggregationOutput>> for AggregationResults {
    fn from(map: BTreeMap<String, AggregationOutput>) -> Self {
        Self {
            entries: map.into_iter().collect(),
        }
    }
}

impl Serialize for AggregationResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, output) in &self.entries {
            map.serialize_entry(name, output)?;
        }
        map.end()
    }
}

/// A page of matches plus aggregation outputs and execution metadata.
///
/// Owned by the caller once returned; holds no reference to the query or
/// the backend that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    search_id: Uuid,

    hits: Vec<SearchHit>,

    /// Backend-reported total, may exceed `hits.len()`
    total_hits: u64,

    page: u32,

    size: u32,

    #[serde(rename = "tookMs", with = "duration_ms")]
    took: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    aggregations: Option<AggregationResults>,
}

impl SearchResponse {
    pub(crate) fn new(
        search_id: Uuid,
        hits: Vec<SearchHit>,
        total_hits: u64,
        page: u32,
        size: u32,
        took: Duration,
        aggregations: Option<AggregationResults>,
    ) -> Self {
        Self {
            search_id,
            hits,
            total_hits,
            page,
            size,
            took,
            aggregations,
        }
    }

    /// Unique identifier of this execution
    pub fn search_id(&self) -> Uuid {
        self.search_id
    }

    pub fn hits(&self) -> &[SearchHit] {
        &self.hits
    }

    pub fn records(&self) -> impl Iterator<Item = &LogRecord> {
        self.hits.iter().map(|hit| &hit.record)
    }

    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Wall-clock duration of the backend call
    pub fn took(&self) -> Duration {
        self.took
    }

    pub fn aggregations(&self) -> Option<&AggregationResults> {
        self.aggregations.as_ref()
    }

    pub fn into_hits(self) -> Vec<SearchHit> {
        self.hits
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_nanos() as f64 / 1_000_000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(millis.max(0.0) / 1000.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogLevel;

    #[test]
    fn test_aggregations_keep_request_order() {
        let mut results = AggregationResults::new();
        results.push("zeta", AggregationOutput::Cardinality { value: 3 });
        results.push("alpha", AggregationOutput::Cardinality { value: 1 });

        assert_eq!(results.names().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        let json = serde_json::to_string(&results).unwrap();
        assert!(json.find("zeta").unwrap() < json.find("alpha").unwrap());
        assert_eq!(
            results.get("alpha"),
            Some(&AggregationOutput::Cardinality { value: 1 })
        );
    }

    #[test]
    fn test_response_wire_format() {
        let record = LogRecord::new(Utc::now(), LogLevel::Error, "boom", "app.log").with_id("r-1");
        let response = SearchResponse::new(
            Uuid::new_v4(),
            vec![SearchHit::new(record)],
            7,
            1,
            100,
            Duration::from_micros(1500),
            None,
        );

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["totalHits"], 7);
        assert_eq!(json["hits"][0]["id"], "r-1");
        assert_eq!(json["hits"][0]["level"], "ERROR");
        assert_eq!(json["tookMs"], 1.5);
        assert!(json.get("aggregations").is_none());
        assert!(json["hits"][0].get("score").is_none());
    }
}
