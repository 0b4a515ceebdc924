use std::collections::HashMap;
use tracing::{debug, info};

use crate::domain::CanonicalTreeView;
use crate::error::{ReconcileError, Result};
use crate::observability::metrics::{emit_counter, MetricName};
use crate::pipeline::ingestion::tabular::{cell, TabularData};
use crate::pipeline::processing::dedup::LatestObservation;
use crate::pipeline::processing::identifier::IdentifierNormalizer;
use crate::pipeline::processing::palette::field_store_colors;

pub const UNKNOWN_STATUS: &str = "Unknown";

/// Code -> status lookup built from the first two columns of the registry sheet.
#[derive(Debug, Clone, Default)]
pub struct StatusTable {
    by_key: HashMap<String, String>,
}

impl StatusTable {
    /// Columns past the second are ignored. Rows with a blank code or a blank
    /// status carry no information and are skipped; for repeated codes the
    /// first row wins.
    pub fn from_tabular(table: &TabularData, normalizer: &IdentifierNormalizer) -> Result<Self> {
        if table.header.len() < 2 {
            return Err(ReconcileError::SchemaMismatch {
                source_name: table.source_name.clone(),
                missing: ["code", "status"]
                    .iter()
                    .skip(table.header.len())
                    .map(|c| c.to_string())
                    .collect(),
            });
        }

        let mut by_key = HashMap::new();
        for row in &table.rows {
            let status = cell(row, 1).trim();
            let Some(id) = normalizer.canonical_id(Some(cell(row, 0))) else {
                continue;
            };
            if status.is_empty() {
                continue;
            }
            let key = id.join_key();
            if by_key.contains_key(&key) {
                debug!(code = %id, "Duplicate code in status sheet; keeping first");
                continue;
            }
            by_key.insert(key, status.to_string());
        }
        Ok(Self { by_key })
    }

    pub fn status_for(&self, join_key: &str) -> Option<&str> {
        self.by_key.get(join_key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Left-joins registry status onto the deduplicated trees. Never fails.
#[derive(Debug, Clone, Default)]
pub struct OverlayOutcome {
    pub views: Vec<CanonicalTreeView>,
    /// Trees whose status came from the sheet, whatever its value.
    pub matched: usize,
}

pub fn overlay_status(latest: Vec<LatestObservation>, statuses: &StatusTable) -> OverlayOutcome {
    let mut matched = 0usize;
    let views: Vec<CanonicalTreeView> = latest
        .into_iter()
        .map(|obs| {
            let status = match statuses.status_for(&obs.id.join_key()) {
                Some(s) => {
                    matched += 1;
                    s.to_string()
                }
                None => UNKNOWN_STATUS.to_string(),
            };
            let colors = field_store_colors(&status);
            CanonicalTreeView {
                id: obs.id,
                observed_at: obs.observed_at,
                record: obs.record,
                status,
                colors,
            }
        })
        .collect();

    let unmatched = views.len() - matched;
    emit_counter(MetricName::OverlayMatched, matched as f64);
    emit_counter(MetricName::OverlayUnmatched, unmatched as f64);
    info!("Status overlay: {} matched, {} defaulted to {}", matched, unmatched, UNKNOWN_STATUS);
    OverlayOutcome { views, matched }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ObservationRecord;

    fn observation(code: &str) -> LatestObservation {
        let normalizer = IdentifierNormalizer::default();
        LatestObservation {
            id: normalizer.canonical_id(Some(code)).unwrap(),
            observed_at: None,
            record: ObservationRecord {
                store: "a".into(),
                tree_id: None,
                code: Some(code.into()),
                tree_name: None,
                binomial_name: None,
                tree_status: Some("Alive".into()),
                program_name: None,
                monitoring_id: None,
                monitoring_date: None,
                latitude: Some(1.0),
                longitude: Some(124.0),
                elevation: None,
                status_approval: None,
                img1: None,
            },
        }
    }

    fn sheet(rows: &[&[&str]]) -> TabularData {
        let raw = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        TabularData::from_raw_rows("TreeStatus", raw).unwrap()
    }

    #[test]
    fn joins_case_insensitively_and_ignores_extra_columns() {
        let normalizer = IdentifierNormalizer::default();
        let table = StatusTable::from_tabular(
            &sheet(&[
                &["Code", "Status", "Notes"],
                &[" jjk-001 ", " Dead ", "washed out"],
                &["MAN-2", "Alive", ""],
            ]),
            &normalizer,
        )
        .unwrap();
        let outcome = overlay_status(vec![observation("JJK-001"), observation("MAN-02")], &table);
        assert_eq!(outcome.matched, 2);
        let views = outcome.views;
        assert_eq!(views[0].status, "Dead");
        assert_eq!((views[0].colors.border, views[0].colors.fill), ("red", "red"));
        assert_eq!(views[1].status, "Alive");
        assert_eq!(views[1].colors.fill, "green");
    }

    #[test]
    fn absent_code_defaults_to_unknown() {
        let normalizer = IdentifierNormalizer::default();
        let table =
            StatusTable::from_tabular(&sheet(&[&["Code", "Status"], &["JJK-999", "Dead"]]), &normalizer)
                .unwrap();
        let outcome = overlay_status(vec![observation("MAN-7")], &table);
        assert_eq!(outcome.matched, 0);
        let views = outcome.views;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].status, UNKNOWN_STATUS);
        assert_eq!((views[0].colors.border, views[0].colors.fill), ("black", "#ccc"));
    }

    #[test]
    fn first_row_wins_for_repeated_codes() {
        let normalizer = IdentifierNormalizer::default();
        let table = StatusTable::from_tabular(
            &sheet(&[&["Code", "Status"], &["JJK-001", "Dead"], &["JJK-001", "Alive"], &["JJK-002", ""]]),
            &normalizer,
        )
        .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.status_for("JJK-001"), Some("Dead"));
    }

    #[test]
    fn single_column_sheet_is_a_schema_mismatch() {
        let normalizer = IdentifierNormalizer::default();
        let err = StatusTable::from_tabular(&sheet(&[&["Code"], &["JJK-001"]]), &normalizer).unwrap_err();
        match err {
            ReconcileError::SchemaMismatch { missing, .. } => assert_eq!(missing, vec!["status"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn sheet_saying_unknown_still_counts_as_matched() {
        let normalizer = IdentifierNormalizer::default();
        let table = StatusTable::from_tabular(
            &sheet(&[&["Code", "Status"], &["JJK-007", "Unknown"]]),
            &normalizer,
        )
        .unwrap();
        let outcome = overlay_status(vec![observation("MAN-7"), observation("MAN-8")], &table);
        assert_eq!(outcome.matched, 1);
        assert!(outcome.views.iter().all(|v| v.status == UNKNOWN_STATUS));
    }
}
