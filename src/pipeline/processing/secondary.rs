use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::OutputConfig;
use crate::domain::{SecondaryRecord, TreeCondition};
use crate::error::Result;
use crate::observability::metrics::{emit_counter, emit_labeled_counter, MetricName};
use crate::pipeline::ingestion::tabular::{cell, TabularData};
use crate::pipeline::processing::identifier::IdentifierNormalizer;
use crate::pipeline::processing::palette::registry_colors;

/// Registry sheet column names.
pub mod columns {
    pub const STATUS: &str = "Status";
    pub const LATITUDE: &str = "Latitude";
    pub const LONGITUDE: &str = "Longitude";
    pub const CODE: &str = "Kode";
    pub const NAME: &str = "Nama pohon";
    pub const TREE_STATUS: &str = "Tree Status";
    pub const PHOTO: &str = "Foto 1";

    pub const REQUIRED: &[&str] = &[STATUS, LATITUDE, LONGITUDE, CODE, NAME, TREE_STATUS, PHOTO];
}

const GEOTAG_MARKER: &str = "geotag";

static DMS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)\D+(\d+)\D+([\d.]+)\D+([NSEWnsew])").expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RejectReason {
    NotGeotagged,
    BadCoordinate,
    OutOfRange,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NotGeotagged => "not_geotagged",
            RejectReason::BadCoordinate => "bad_coordinate",
            RejectReason::OutOfRange => "out_of_range",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SecondaryOutcome {
    pub records: Vec<SecondaryRecord>,
    pub rejected: BTreeMap<RejectReason, usize>,
}

impl SecondaryOutcome {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }
}

/// Decimal degrees, or degrees/minutes/seconds with a hemisphere letter.
pub fn parse_coordinate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(value) = raw.parse::<f64>() {
        return value.is_finite().then_some(value);
    }

    let caps = DMS_PATTERN.captures(raw)?;
    let degrees: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let mut decimal = degrees + minutes / 60.0 + seconds / 3600.0;
    if matches!(&caps[4], "S" | "s" | "W" | "w") {
        decimal = -decimal;
    }
    decimal.is_finite().then_some(decimal)
}

/// Where the map expects to find a registry photo locally.
#[derive(Debug, Clone)]
pub struct PhotoPaths {
    pub folder: String,
    pub thumbnails_enabled: bool,
}

impl PhotoPaths {
    pub fn from_output(output: &OutputConfig) -> Self {
        Self {
            folder: output.pictures_folder.trim_end_matches('/').to_string(),
            thumbnails_enabled: output.thumbnails_enabled,
        }
    }

    pub fn local_path(&self, photo_ref: &str) -> Option<String> {
        let without_query = photo_ref.split(['?', '#']).next().unwrap_or("");
        let file_name = without_query.rsplit('/').next().unwrap_or("").trim();
        if file_name.is_empty() {
            return None;
        }
        Some(if self.thumbnails_enabled {
            format!("{}/thumbnails/tn_{}", self.folder, file_name)
        } else {
            format!("{}/{}", self.folder, file_name)
        })
    }
}

/// Filters and normalizes the registry sheet into geotagged records.
pub struct SecondaryNormalizer<'a> {
    normalizer: &'a IdentifierNormalizer,
    photos: PhotoPaths,
}

impl<'a> SecondaryNormalizer<'a> {
    pub fn new(normalizer: &'a IdentifierNormalizer, photos: PhotoPaths) -> Self {
        Self { normalizer, photos }
    }

    /// Fails only on a schema mismatch; bad rows are dropped and counted.
    pub fn normalize(&self, table: &TabularData) -> Result<SecondaryOutcome> {
        let idx = table.require_columns(columns::REQUIRED)?;
        let col = |name: &str| idx[name];
        let mut outcome = SecondaryOutcome::default();

        for (row_no, row) in table.rows.iter().enumerate() {
            match self.normalize_row(row, &col) {
                Ok(record) => outcome.records.push(record),
                Err(reason) => {
                    debug!(row = row_no + 2, reason = reason.as_str(), "Registry row excluded");
                    *outcome.rejected.entry(reason).or_insert(0) += 1;
                }
            }
        }

        emit_counter(MetricName::SecondaryRowsAccepted, outcome.records.len() as f64);
        for (reason, count) in &outcome.rejected {
            emit_labeled_counter(MetricName::SecondaryRowsRejected, "reason", reason.as_str(), *count as f64);
        }
        info!(
            "Registry: {} geotagged records kept, {} rows excluded",
            outcome.records.len(),
            outcome.rejected_total()
        );
        Ok(outcome)
    }

    fn normalize_row(
        &self,
        row: &[String],
        col: &impl Fn(&str) -> usize,
    ) -> std::result::Result<SecondaryRecord, RejectReason> {
        let registry_status = cell(row, col(columns::STATUS)).trim().to_lowercase();
        if !registry_status.contains(GEOTAG_MARKER) {
            return Err(RejectReason::NotGeotagged);
        }

        let latitude = parse_coordinate(cell(row, col(columns::LATITUDE))).ok_or(RejectReason::BadCoordinate)?;
        let longitude = parse_coordinate(cell(row, col(columns::LONGITUDE))).ok_or(RejectReason::BadCoordinate)?;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(RejectReason::OutOfRange);
        }

        let code = self.normalizer.normalize(cell(row, col(columns::CODE)));
        let tree_status = cell(row, col(columns::TREE_STATUS)).to_string();
        let condition = TreeCondition::from_label(&tree_status);
        let photo = cell(row, col(columns::PHOTO)).trim();
        let photo_url = (!photo.is_empty()).then(|| photo.to_string());
        let photo_path = photo_url.as_deref().and_then(|p| self.photos.local_path(p));

        Ok(SecondaryRecord {
            code,
            name: cell(row, col(columns::NAME)).to_string(),
            tree_status,
            condition,
            latitude,
            longitude,
            photo_url,
            photo_path,
            colors: registry_colors(condition),
        })
    }
}
