// Pipeline processing: identifiers, dedup, status overlay, registry rows, heat layer

pub mod dedup;
pub mod heatmap;
pub mod identifier;
pub mod palette;
pub mod secondary;
pub mod status_overlay;
