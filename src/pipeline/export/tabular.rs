use serde::Serialize;

use crate::domain::{CanonicalTreeView, ObservationRecord};
use crate::error::{ReconcileError, Result};

/// Source columns keep the field app's names; derived columns follow them.
#[derive(Debug, Serialize)]
struct CanonicalRow<'a> {
    tree_id: Option<&'a str>,
    code: &'a str,
    tree_name: Option<&'a str>,
    #[serde(rename = "binomialName")]
    binomial_name: Option<&'a str>,
    tree_status: Option<&'a str>,
    #[serde(rename = "programName")]
    program_name: Option<&'a str>,
    #[serde(rename = "treeMonitoringId")]
    monitoring_id: Option<&'a str>,
    monitoring_date: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    monitoring_elevation: Option<f64>,
    #[serde(rename = "statusApproval")]
    status_approval: Option<&'a str>,
    img1: Option<&'a str>,
    source_store: &'a str,
    status: &'a str,
    border_color: &'a str,
    fill_color: &'a str,
}

impl<'a> CanonicalRow<'a> {
    fn from_view(view: &'a CanonicalTreeView) -> Self {
        let record = &view.record;
        Self {
            tree_id: record.tree_id.as_deref(),
            code: view.id.as_str(),
            tree_name: record.tree_name.as_deref(),
            binomial_name: record.binomial_name.as_deref(),
            tree_status: record.tree_status.as_deref(),
            program_name: record.program_name.as_deref(),
            monitoring_id: record.monitoring_id.as_deref(),
            monitoring_date: view
                .observed_at
                .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string()),
            latitude: record.latitude,
            longitude: record.longitude,
            monitoring_elevation: record.elevation,
            status_approval: record.status_approval.as_deref(),
            img1: record.img1.as_deref(),
            source_store: &record.store,
            status: &view.status,
            border_color: view.colors.border,
            fill_color: view.colors.fill,
        }
    }
}

#[derive(Debug, Serialize)]
struct ExtractRow<'a> {
    tree_id: Option<&'a str>,
    code: Option<&'a str>,
    tree_name: Option<&'a str>,
    #[serde(rename = "binomialName")]
    binomial_name: Option<&'a str>,
    tree_status: Option<&'a str>,
    #[serde(rename = "programName")]
    program_name: Option<&'a str>,
    #[serde(rename = "treeMonitoringId")]
    monitoring_id: Option<&'a str>,
    monitoring_date: Option<&'a str>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    monitoring_elevation: Option<f64>,
    #[serde(rename = "statusApproval")]
    status_approval: Option<&'a str>,
    img1: Option<&'a str>,
}

impl<'a> From<&'a ObservationRecord> for ExtractRow<'a> {
    fn from(record: &'a ObservationRecord) -> Self {
        Self {
            tree_id: record.tree_id.as_deref(),
            code: record.code.as_deref(),
            tree_name: record.tree_name.as_deref(),
            binomial_name: record.binomial_name.as_deref(),
            tree_status: record.tree_status.as_deref(),
            program_name: record.program_name.as_deref(),
            monitoring_id: record.monitoring_id.as_deref(),
            monitoring_date: record.monitoring_date.as_deref(),
            latitude: record.latitude,
            longitude: record.longitude,
            monitoring_elevation: record.elevation,
            status_approval: record.status_approval.as_deref(),
            img1: record.img1.as_deref(),
        }
    }
}

/// One row per canonical tree, including those without coordinates.
pub fn render_canonical_csv(views: &[CanonicalTreeView]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for view in views {
        writer.serialize(CanonicalRow::from_view(view))?;
    }
    finish(writer)
}

/// Per-store extract after the approval filter, codes as stored.
pub fn render_store_extract_csv(records: &[ObservationRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(ExtractRow::from(record))?;
    }
    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| ReconcileError::Io(e.into_error()))
}
