use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::domain::{CanonicalId, ObservationRecord, StoreBatch};
use crate::observability::metrics::{emit_counter, MetricName};
use crate::pipeline::processing::identifier::IdentifierNormalizer;

/// The most recent observation of one canonical tree.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestObservation {
    pub id: CanonicalId,
    /// `None` when the date cell was missing or unparseable.
    pub observed_at: Option<NaiveDateTime>,
    pub record: ObservationRecord,
}

#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Winners in merge order: ascending by timestamp of the winning row.
    pub latest: Vec<LatestObservation>,
    pub input_records: usize,
    pub unidentified: usize,
    pub unparseable_dates: usize,
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"];

/// Parses the date cell of a monitoring row. Unparseable input is `None`,
/// which orders before every real timestamp.
pub fn parse_observed_at(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    // Stores written by the mobile app keep epoch values
    if raw.chars().all(|c| c.is_ascii_digit()) {
        let value: i64 = raw.parse().ok()?;
        let dt = if raw.len() >= 12 {
            DateTime::from_timestamp_millis(value)
        } else {
            DateTime::from_timestamp(value, 0)
        };
        return dt.map(|d| d.naive_utc());
    }

    None
}

/// Collapses every extracted row to the latest observation per canonical id.
pub struct Deduplicator<'a> {
    normalizer: &'a IdentifierNormalizer,
}

impl<'a> Deduplicator<'a> {
    pub fn new(normalizer: &'a IdentifierNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn deduplicate(&self, batches: Vec<StoreBatch>) -> DedupOutcome {
        let mut outcome = DedupOutcome::default();
        let mut keyed = Vec::new();

        for batch in batches {
            for record in batch.records {
                outcome.input_records += 1;
                let Some(id) = self.normalizer.canonical_id(record.code.as_deref()) else {
                    outcome.unidentified += 1;
                    continue;
                };
                let observed_at = record.monitoring_date.as_deref().and_then(parse_observed_at);
                if observed_at.is_none() {
                    outcome.unparseable_dates += 1;
                    debug!(code = %id, store = %record.store, "Monitoring date missing or unparseable");
                }
                keyed.push(LatestObservation { id, observed_at, record });
            }
        }

        // Stable: equal timestamps keep merge order, so the later batch wins.
        keyed.sort_by(|a, b| a.observed_at.cmp(&b.observed_at));

        let mut seen = HashSet::new();
        let mut latest: Vec<LatestObservation> = keyed
            .into_iter()
            .rev()
            .filter(|obs| seen.insert(obs.id.join_key()))
            .collect();
        latest.reverse();

        emit_counter(MetricName::DedupInputRecords, outcome.input_records as f64);
        emit_counter(MetricName::DedupUnidentifiedRecords, outcome.unidentified as f64);
        emit_counter(MetricName::DedupUnparseableDates, outcome.unparseable_dates as f64);
        emit_counter(MetricName::DedupCanonicalTrees, latest.len() as f64);

        info!(
            "Deduplicated {} records into {} trees ({} without code, {} without usable date)",
            outcome.input_records,
            latest.len(),
            outcome.unidentified,
            outcome.unparseable_dates
        );

        outcome.latest = latest;
        outcome
    }
}
