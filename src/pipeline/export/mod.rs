//! Geo export: tabular, point features, waypoints, heat layer and run summary.

pub mod geojson;
pub mod heat;
pub mod kml;
pub mod summary;
pub mod tabular;
pub mod writer;

pub use writer::{commit_artifacts, Artifact, ArtifactDigest};

use crate::config::OutputConfig;
use crate::domain::{CanonicalTreeView, SecondaryRecord};
use crate::error::Result;
use crate::pipeline::processing::heatmap::HeatmapOutcome;

/// Renders the map artifacts in memory, in a fixed order. The run summary is
/// rendered afterwards since it carries their digests.
pub fn render_artifacts(
    views: &[CanonicalTreeView],
    registry: &[SecondaryRecord],
    heatmap: &HeatmapOutcome,
    output: &OutputConfig,
) -> Result<Vec<Artifact>> {
    Ok(vec![
        Artifact::new(&output.csv, tabular::render_canonical_csv(views)?),
        Artifact::new(
            &output.geojson,
            geojson::render(&geojson::combined_collection(views, registry))?,
        ),
        Artifact::new(&output.kml, kml::render_combined(views, registry)),
        Artifact::new(
            &output.secondary_geojson,
            geojson::render(&geojson::registry_collection(registry))?,
        ),
        Artifact::new(&output.secondary_kml, kml::render_registry(registry)),
        Artifact::new(&output.heatmap, heat::render(heatmap)?),
    ])
}
