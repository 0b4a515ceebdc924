//! Data shapes shared by every pipeline stage.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A tree code after legacy-prefix rewriting and zero-padding (`JJK-007`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalId(String);

impl CanonicalId {
    /// Wraps a code that has already been through the identifier normalizer.
    pub(crate) fn from_normalized(code: String) -> Self {
        CanonicalId(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key used for case-insensitive joins.
    pub fn join_key(&self) -> String {
        self.0.trim().to_uppercase()
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One monitoring event for one tree, as read from a field store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    /// Name of the store the row came from.
    pub store: String,
    pub tree_id: Option<String>,
    pub code: Option<String>,
    pub tree_name: Option<String>,
    pub binomial_name: Option<String>,
    pub tree_status: Option<String>,
    pub program_name: Option<String>,
    pub monitoring_id: Option<String>,
    /// Raw date cell; parsed by the deduplicator.
    pub monitoring_date: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<f64>,
    pub status_approval: Option<String>,
    pub img1: Option<String>,
}

impl ObservationRecord {
    pub fn is_provisional(&self, excluded_approval: &str) -> bool {
        self.status_approval
            .as_deref()
            .map(|s| s.trim() == excluded_approval)
            .unwrap_or(false)
    }
}

/// Rows extracted from one store, after the approval filter.
#[derive(Debug, Clone)]
pub struct StoreBatch {
    pub store: String,
    pub records: Vec<ObservationRecord>,
    pub provisional_dropped: usize,
}

/// Border and fill colour pair used by the map layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarkerColors {
    pub border: &'static str,
    pub fill: &'static str,
}

/// Latest observation for one canonical tree with its overlaid registry status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalTreeView {
    pub id: CanonicalId,
    pub observed_at: Option<NaiveDateTime>,
    pub record: ObservationRecord,
    pub status: String,
    pub colors: MarkerColors,
}

impl CanonicalTreeView {
    /// `(latitude, longitude)` when the observation carries both.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.record.latitude.zip(self.record.longitude)
    }
}

/// Lifecycle state as reported by the secondary registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeCondition {
    Dead,
    Alive,
    Other,
}

impl TreeCondition {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "dead" => TreeCondition::Dead,
            "alive" => TreeCondition::Alive,
            _ => TreeCondition::Other,
        }
    }

    /// Only the exact `Dead`/`Alive` labels count toward heat and tallies.
    pub fn from_exact_label(label: &str) -> Self {
        match label {
            "Dead" => TreeCondition::Dead,
            "Alive" => TreeCondition::Alive,
            _ => TreeCondition::Other,
        }
    }
}

/// Geotagged tree from the secondary registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecondaryRecord {
    pub code: String,
    pub name: String,
    /// Lifecycle label exactly as the registry holds it.
    pub tree_status: String,
    pub condition: TreeCondition,
    pub latitude: f64,
    pub longitude: f64,
    pub photo_url: Option<String>,
    pub photo_path: Option<String>,
    pub colors: MarkerColors,
}

impl SecondaryRecord {
    /// Condition used for heat counts and legend tallies; colours use `condition`.
    pub fn counted_condition(&self) -> TreeCondition {
        TreeCondition::from_exact_label(&self.tree_status)
    }
}

/// One grid cell of the mortality heat layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpatialBucket {
    pub key: (i64, i64),
    pub dead: usize,
    pub alive: usize,
    pub latitude: f64,
    pub longitude: f64,
    pub raw_ratio: f64,
    pub normalized_ratio: f64,
    pub intensity: f64,
}

impl SpatialBucket {
    pub fn samples(&self) -> usize {
        self.dead + self.alive
    }

    pub fn heat_point(&self) -> [f64; 3] {
        [self.latitude, self.longitude, self.intensity]
    }
}
