//! Point feature collections for the web map.
//!
//! Geometry always uses the observed coordinates as `[lon, lat]`; grid
//! rounding belongs to the heat layer only.

use serde::{Deserialize, Serialize};

use crate::domain::{CanonicalTreeView, SecondaryRecord};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    #[serde(rename = "DB")]
    FieldStore,
    #[serde(rename = "PIJAK")]
    Registry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Point,
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(rename = "type")]
    pub kind: String,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_id: Option<String>,
    pub tree_name: Option<String>,
    pub code: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Provenance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    pub border_color: String,
    pub fill_color: String,
}

impl FeatureCollection {
    fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: "FeatureCollection".to_string(),
            features,
        }
    }
}

fn point_feature(latitude: f64, longitude: f64, properties: FeatureProperties) -> Feature {
    Feature {
        kind: "Feature".to_string(),
        geometry: Point {
            kind: "Point".to_string(),
            coordinates: [longitude, latitude],
        },
        properties,
    }
}

/// `None` for a field-store tree without coordinates; it stays in the CSV only.
fn field_store_feature(view: &CanonicalTreeView) -> Option<Feature> {
    let (latitude, longitude) = view.coordinates()?;
    Some(point_feature(
        latitude,
        longitude,
        FeatureProperties {
            tree_id: view.record.tree_id.clone(),
            tree_name: view.record.tree_name.clone(),
            code: view.id.as_str().to_string(),
            status: view.status.clone(),
            source: Some(Provenance::FieldStore),
            photo: None,
            border_color: view.colors.border.to_string(),
            fill_color: view.colors.fill.to_string(),
        },
    ))
}

fn registry_feature(record: &SecondaryRecord, source: Option<Provenance>) -> Feature {
    point_feature(
        record.latitude,
        record.longitude,
        FeatureProperties {
            tree_id: None,
            tree_name: Some(record.name.clone()),
            code: record.code.clone(),
            status: record.tree_status.clone(),
            source,
            photo: record.photo_path.clone().or_else(|| record.photo_url.clone()),
            border_color: record.colors.border.to_string(),
            fill_color: record.colors.fill.to_string(),
        },
    )
}

/// Field-store trees first, then registry trees, each in merge order.
pub fn combined_collection(views: &[CanonicalTreeView], registry: &[SecondaryRecord]) -> FeatureCollection {
    let features = views
        .iter()
        .filter_map(field_store_feature)
        .chain(
            registry
                .iter()
                .map(|r| registry_feature(r, Some(Provenance::Registry))),
        )
        .collect();
    FeatureCollection::new(features)
}

pub fn registry_collection(registry: &[SecondaryRecord]) -> FeatureCollection {
    FeatureCollection::new(registry.iter().map(|r| registry_feature(r, None)).collect())
}

pub fn render(collection: &FeatureCollection) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(collection)?)
}
