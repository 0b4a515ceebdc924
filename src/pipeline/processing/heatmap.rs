//! Dead/alive ratio heat layer.
//!
//! Registry trees are snapped to a fixed grid by rounding both coordinates
//! (4 decimals is roughly 11 m), so no spatial index is needed. Sparse cells
//! are suppressed and the ratio is clipped so a single cluster of dead trees
//! cannot saturate the whole layer.

use std::collections::BTreeMap;
use tracing::info;

use crate::config::HeatmapConfig;
use crate::domain::{SecondaryRecord, SpatialBucket, TreeCondition};
use crate::observability::metrics::{emit_counter, MetricName};

#[derive(Debug, Default)]
struct CellAccumulator {
    dead: usize,
    alive: usize,
    members: usize,
    lat_sum: f64,
    lon_sum: f64,
}

#[derive(Debug, Clone, Default)]
pub struct HeatmapOutcome {
    /// Emitted cells, ordered by grid key.
    pub buckets: Vec<SpatialBucket>,
    pub suppressed: usize,
}

impl HeatmapOutcome {
    pub fn heat_points(&self) -> Vec<[f64; 3]> {
        self.buckets.iter().map(SpatialBucket::heat_point).collect()
    }
}

pub struct SpatialAggregator {
    config: HeatmapConfig,
    scale: f64,
}

impl SpatialAggregator {
    pub fn new(config: HeatmapConfig) -> Self {
        let scale = 10f64.powi(config.grid_decimals as i32);
        Self { config, scale }
    }

    /// Grid cell for a coordinate pair. Ties round to even.
    pub fn grid_key(&self, latitude: f64, longitude: f64) -> (i64, i64) {
        (
            (latitude * self.scale).round_ties_even() as i64,
            (longitude * self.scale).round_ties_even() as i64,
        )
    }

    /// Returns `(raw, normalized, intensity)` for a cell's counts.
    pub fn score(&self, dead: usize, alive: usize) -> (f64, f64, f64) {
        let ceiling = self.config.ratio_ceiling;
        let raw = dead as f64 / alive.max(1) as f64;
        let normalized = raw.min(ceiling) / ceiling;
        let intensity = (normalized * self.config.intensity_gain).min(1.0);
        (raw, normalized, intensity)
    }

    pub fn aggregate(&self, records: &[SecondaryRecord]) -> HeatmapOutcome {
        let mut cells: BTreeMap<(i64, i64), CellAccumulator> = BTreeMap::new();
        for record in records {
            let acc = cells
                .entry(self.grid_key(record.latitude, record.longitude))
                .or_default();
            match record.counted_condition() {
                TreeCondition::Dead => acc.dead += 1,
                TreeCondition::Alive => acc.alive += 1,
                TreeCondition::Other => {}
            }
            acc.members += 1;
            acc.lat_sum += record.latitude;
            acc.lon_sum += record.longitude;
        }

        let mut outcome = HeatmapOutcome::default();
        for (key, acc) in cells {
            if acc.dead + acc.alive < self.config.min_bucket_samples {
                outcome.suppressed += 1;
                continue;
            }
            let (raw_ratio, normalized_ratio, intensity) = self.score(acc.dead, acc.alive);
            outcome.buckets.push(SpatialBucket {
                key,
                dead: acc.dead,
                alive: acc.alive,
                latitude: acc.lat_sum / acc.members as f64,
                longitude: acc.lon_sum / acc.members as f64,
                raw_ratio,
                normalized_ratio,
                intensity,
            });
        }

        emit_counter(MetricName::HeatmapBucketsEmitted, outcome.buckets.len() as f64);
        emit_counter(MetricName::HeatmapBucketsSuppressed, outcome.suppressed as f64);
        info!(
            "Heat layer: {} cells emitted, {} below {} samples",
            outcome.buckets.len(),
            outcome.suppressed,
            self.config.min_bucket_samples
        );
        outcome
    }
}
