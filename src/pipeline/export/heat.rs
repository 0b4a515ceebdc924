use crate::error::Result;
use crate::pipeline::processing::heatmap::HeatmapOutcome;

/// Heat layer as `[[lat, lon, intensity], ...]`, ready for a JS heat plugin.
pub fn render(outcome: &HeatmapOutcome) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&outcome.heat_points())?)
}
