//! Aggregation planning and evaluation over matched records

use crate::models::LogRecord;
use crate::search::query::{AggregationRequest, AggregationType};
use crate::search::result::{
    AggregationOutput, AggregationResults, Bucket, DateBucket, NumericBucket,
};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, HashMap, HashSet};

const DEFAULT_TERMS_SIZE: usize = 10;
const DEFAULT_DATE_INTERVAL: &str = "1h";
const DEFAULT_HISTOGRAM_INTERVAL: f64 = 10.0;
const DEFAULT_PERCENTS: [f64; 3] = [50.0, 95.0, 99.0];

/// Validated, typed form of an [`AggregationRequest`]
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationSpec {
    Terms { size: usize },
    DateHistogram { interval: Duration },
    Histogram { interval: f64 },
    Stats,
    Cardinality,
    Percentiles { percents: Vec<f64> },
}

impl AggregationSpec {
    /// Parse and check the type-specific parameters of a request
    pub fn parse(request: &AggregationRequest) -> Result<Self, String> {
        match request.aggregation_type {
            AggregationType::Terms => {
                let size = match request.param("size") {
                    Some(raw) => raw
                        .trim()
                        .parse::<usize>()
                        .ok()
                        .filter(|size| *size > 0)
                        .ok_or_else(|| format!("size must be a positive integer, got '{}'", raw))?,
                    None => DEFAULT_TERMS_SIZE,
                };
                Ok(AggregationSpec::Terms { size })
            }
            AggregationType::DateHistogram => {
                let raw = request.param("interval").unwrap_or(DEFAULT_DATE_INTERVAL);
                let interval = parse_interval(raw)?;
                Ok(AggregationSpec::DateHistogram { interval })
            }
            AggregationType::Histogram => {
                let interval = match request.param("interval") {
                    Some(raw) => raw
                        .trim()
                        .parse::<f64>()
                        .ok()
                        .filter(|interval| interval.is_finite() && *interval > 0.0)
                        .ok_or_else(|| format!("interval must be a positive number, got '{}'", raw))?,
                    None => DEFAULT_HISTOGRAM_INTERVAL,
                };
                Ok(AggregationSpec::Histogram { interval })
            }
            AggregationType::Stats => Ok(AggregationSpec::Stats),
            AggregationType::Cardinality => Ok(AggregationSpec::Cardinality),
            AggregationType::Percentiles => {
                let percents = match request.param("percents") {
                    Some(raw) => raw
                        .split(',')
                        .map(|part| {
                            part.trim()
                                .parse::<f64>()
                                .ok()
                                .filter(|p| (0.0..=100.0).contains(p))
                                .ok_or_else(|| format!("invalid percentile '{}'", part.trim()))
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    None => DEFAULT_PERCENTS.to_vec(),
                };
                Ok(AggregationSpec::Percentiles { percents })
            }
        }
    }
}

/// Parse an interval such as `30s`, `5m`, `1h`, `1d` or `1w`
pub fn parse_interval(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("interval '{}' is missing a unit", raw))?;
    let (amount, unit) = raw.split_at(split);
    let amount: i64 = amount
        .parse()
        .map_err(|_| format!("interval '{}' has no amount", raw))?;
    if amount <= 0 {
        return Err(format!("interval '{}' must be positive", raw));
    }

    let interval = match unit {
        "s" | "sec" | "second" | "seconds" => Duration::try_seconds(amount),
        "m" | "min" | "minute" | "minutes" => Duration::try_minutes(amount),
        "h" | "hour" | "hours" => Duration::try_hours(amount),
        "d" | "day" | "days" => Duration::try_days(amount),
        "w" | "week" | "weeks" => Duration::try_weeks(amount),
        other => return Err(format!("unknown interval unit '{}'", other)),
    };
    interval.ok_or_else(|| format!("interval '{}' is out of range", raw))
}

/// An aggregation ready to evaluate
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationPlan {
    pub name: String,
    pub field: String,
    pub spec: AggregationSpec,
}

impl AggregationPlan {
    pub fn from_request(request: &AggregationRequest) -> Result<Self, String> {
        Ok(Self {
            name: request.name.clone(),
            field: request.field.clone(),
            spec: AggregationSpec::parse(request)?,
        })
    }
}

/// Evaluate every plan over the full matched set, in plan order
pub fn evaluate(plans: &[AggregationPlan], records: &[&LogRecord], tz: Tz) -> AggregationResults {
    let mut results = AggregationResults::new();
    for plan in plans {
        let output = match &plan.spec {
            AggregationSpec::Terms { size } => terms(records, &plan.field, *size),
            AggregationSpec::DateHistogram { interval } => {
                date_histogram(records, &plan.field, *interval, tz)
            }
            AggregationSpec::Histogram { interval } => histogram(records, &plan.field, *interval),
            AggregationSpec::Stats => stats(&numeric_values(records, &plan.field)),
            AggregationSpec::Cardinality => {
                let distinct: HashSet<String> = records
                    .iter()
                    .filter_map(|record| record.field_value(&plan.field))
                    .collect();
                AggregationOutput::Cardinality {
                    value: distinct.len() as u64,
                }
            }
            AggregationSpec::Percentiles { percents } => {
                percentiles(numeric_values(records, &plan.field), percents)
            }
        };
        results.push(plan.name.clone(), output);
    }
    results
}

fn terms(records: &[&LogRecord], field: &str, size: usize) -> AggregationOutput {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for value in records.iter().filter_map(|record| record.field_value(field)) {
        *counts.entry(value).or_insert(0) += 1;
    }

    let mut buckets: Vec<Bucket> = counts
        .into_iter()
        .map(|(key, count)| Bucket { key, count })
        .collect();
    buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));

    let other_count = buckets.iter().skip(size).map(|bucket| bucket.count).sum();
    buckets.truncate(size);

    AggregationOutput::Terms {
        buckets,
        other_count,
    }
}

fn date_histogram(
    records: &[&LogRecord],
    field: &str,
    interval: Duration,
    tz: Tz,
) -> AggregationOutput {
    let step = interval.num_seconds().max(1);
    let mut counts: BTreeMap<DateTime<Utc>, u64> = BTreeMap::new();

    for record in records {
        let timestamp = if field == "timestamp" {
            Some(record.timestamp)
        } else {
            record
                .field_value(field)
                .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                .map(|dt| dt.with_timezone(&Utc))
        };
        if let Some(timestamp) = timestamp {
            *counts.entry(bucket_start(timestamp, step, tz)).or_insert(0) += 1;
        }
    }

    AggregationOutput::DateHistogram {
        buckets: counts
            .into_iter()
            .map(|(key, count)| DateBucket { key, count })
            .collect(),
    }
}

/// Floor a timestamp to its bucket, aligned on wall-clock time in `tz`
fn bucket_start(timestamp: DateTime<Utc>, step: i64, tz: Tz) -> DateTime<Utc> {
    let local = timestamp.with_timezone(&tz).naive_local();
    let local_secs = local.and_utc().timestamp();
    let floored_secs = local_secs - local_secs.rem_euclid(step);
    let floored = DateTime::from_timestamp(floored_secs, 0).map(|dt| dt.naive_utc());

    floored
        .and_then(|naive: NaiveDateTime| tz.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| {
            let utc_secs = timestamp.timestamp();
            DateTime::from_timestamp(utc_secs - utc_secs.rem_euclid(step), 0).unwrap_or(timestamp)
        })
}

fn histogram(records: &[&LogRecord], field: &str, interval: f64) -> AggregationOutput {
    let mut counts: BTreeMap<i64, u64> = BTreeMap::new();
    for value in numeric_values(records, field) {
        let slot = (value / interval).floor() as i64;
        *counts.entry(slot).or_insert(0) += 1;
    }

    AggregationOutput::Histogram {
        buckets: counts
            .into_iter()
            .map(|(slot, count)| NumericBucket {
                key: slot as f64 * interval,
                count,
            })
            .collect(),
    }
}

fn numeric_values(records: &[&LogRecord], field: &str) -> Vec<f64> {
    records
        .iter()
        .filter_map(|record| {
            if field == "timestamp" {
                Some(record.timestamp.timestamp_millis() as f64)
            } else {
                record
                    .field_value(field)
                    .and_then(|raw| raw.trim().parse::<f64>().ok())
            }
        })
        .filter(|value| value.is_finite())
        .collect()
}

fn stats(values: &[f64]) -> AggregationOutput {
    let count = values.len() as u64;
    let sum: f64 = values.iter().sum();
    let min = values.iter().copied().reduce(f64::min);
    let max = values.iter().copied().reduce(f64::max);
    let avg = if count > 0 {
        Some(sum / count as f64)
    } else {
        None
    };

    AggregationOutput::Stats {
        count,
        min,
        max,
        avg,
        sum,
    }
}

/// Nearest-rank percentiles
fn percentiles(mut values: Vec<f64>, percents: &[f64]) -> AggregationOutput {
    values.sort_by(|a, b| a.total_cmp(b));

    let mut out = BTreeMap::new();
    if !values.is_empty() {
        for percent in percents {
            let rank = ((percent / 100.0) * values.len() as f64).ceil() as usize;
            let index = rank.clamp(1, values.len()) - 1;
            out.insert(format_percent(*percent), values[index]);
        }
    }
    AggregationOutput::Percentiles { values: out }
}

fn format_percent(percent: f64) -> String {
    if percent.fract() == 0.0 {
        format!("{:.0}", percent)
    } else {
        percent.to_string()
    }
}
