use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::{CanonicalTreeView, SecondaryRecord, TreeCondition};
use crate::error::Result;
use crate::pipeline::ingestion::store_extractor::SkippedStore;
use crate::pipeline::processing::secondary::SecondaryOutcome;

use super::writer::ArtifactDigest;

/// Machine-readable account of one run, written next to the map files.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stores: StoreSummary,
    pub records: RecordCounts,
    pub registry: RegistrySummary,
    pub heatmap: HeatmapSummary,
    /// `[lat, lon]` mean of the located canonical trees.
    pub map_center: Option<[f64; 2]>,
    pub artifacts: Vec<ArtifactDigest>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreSummary {
    pub used: Vec<String>,
    pub skipped: Vec<SkippedStore>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordCounts {
    pub extracted: usize,
    pub provisional_dropped: usize,
    pub unidentified: usize,
    pub unparseable_dates: usize,
    pub canonical_trees: usize,
    pub without_coordinates: usize,
    pub status_matched: usize,
    pub status_unknown: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistrySummary {
    pub geotagged: usize,
    pub dead: usize,
    pub alive: usize,
    pub other: usize,
    pub dead_pct: f64,
    pub alive_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_total: Option<u32>,
    /// Geotagged share of `expected_total`, only when one is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geotagged_pct_of_expected: Option<f64>,
    pub rejected: BTreeMap<&'static str, usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HeatmapSummary {
    pub buckets: usize,
    pub suppressed: usize,
}

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 * 1000.0 / whole as f64).round() / 10.0
}

impl RegistrySummary {
    pub fn from_outcome(outcome: &SecondaryOutcome, expected_total: Option<u32>) -> Self {
        let mut summary = Self::tally(&outcome.records);
        summary.expected_total = expected_total;
        summary.geotagged_pct_of_expected = expected_total.map(|t| pct(summary.geotagged, t as usize));
        summary.rejected = outcome
            .rejected
            .iter()
            .map(|(reason, count)| (reason.as_str(), *count))
            .collect();
        summary
    }

    fn tally(records: &[SecondaryRecord]) -> Self {
        let mut summary = Self {
            geotagged: records.len(),
            ..Self::default()
        };
        for record in records {
            match record.counted_condition() {
                TreeCondition::Dead => summary.dead += 1,
                TreeCondition::Alive => summary.alive += 1,
                TreeCondition::Other => summary.other += 1,
            }
        }
        summary.dead_pct = pct(summary.dead, summary.geotagged);
        summary.alive_pct = pct(summary.alive, summary.geotagged);
        summary
    }
}

pub fn map_center(views: &[CanonicalTreeView]) -> Option<[f64; 2]> {
    let located: Vec<(f64, f64)> = views.iter().filter_map(|v| v.coordinates()).collect();
    if located.is_empty() {
        return None;
    }
    let n = located.len() as f64;
    let (lat, lon) = located
        .iter()
        .fold((0.0, 0.0), |(a, b), (lat, lon)| (a + lat, b + lon));
    Some([lat / n, lon / n])
}

pub fn render(summary: &RunSummary) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(summary)?)
}
