//! Marker colours for the two map layers.
//!
//! The field-store layer and the registry layer use different palettes so the
//! two datasets stay distinguishable on a combined map. Keep them separate.

use crate::domain::{MarkerColors, TreeCondition};

/// Colours for canonical (field-store) trees, keyed by overlaid status text.
pub fn field_store_colors(status: &str) -> MarkerColors {
    match TreeCondition::from_label(status) {
        TreeCondition::Dead => MarkerColors { border: "red", fill: "red" },
        TreeCondition::Alive => MarkerColors { border: "green", fill: "green" },
        TreeCondition::Other => MarkerColors { border: "black", fill: "#ccc" },
    }
}

/// Colours for registry trees.
pub fn registry_colors(condition: TreeCondition) -> MarkerColors {
    match condition {
        TreeCondition::Dead => MarkerColors { border: "#990000", fill: "#ff9999" },
        TreeCondition::Alive => MarkerColors { border: "#006600", fill: "#66ff66" },
        TreeCondition::Other => MarkerColors { border: "#666666", fill: "#cccccc" },
    }
}
