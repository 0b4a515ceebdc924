use std::collections::HashMap;

use crate::error::{ReconcileError, Result};

/// A sheet as pulled from an external source: one header row, string cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularData {
    pub source_name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TabularData {
    /// Splits raw rows into header and data. An empty sheet has no schema at
    /// all and is reported as unavailable.
    pub fn from_raw_rows(source_name: &str, mut raw: Vec<Vec<String>>) -> Result<Self> {
        if raw.is_empty() {
            return Err(ReconcileError::unavailable(source_name, "sheet is empty (no header row)"));
        }
        let header = raw.remove(0).into_iter().map(|h| h.trim().to_string()).collect();
        Ok(Self {
            source_name: source_name.to_string(),
            header,
            rows: raw,
        })
    }

    /// Resolves the named columns to indices, failing fast on any that are missing.
    pub fn require_columns(&self, required: &[&str]) -> Result<HashMap<String, usize>> {
        let mut resolved = HashMap::new();
        let mut missing = Vec::new();
        for name in required {
            match self.header.iter().position(|h| h == name) {
                Some(idx) => {
                    resolved.insert(name.to_string(), idx);
                }
                None => missing.push(name.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(ReconcileError::SchemaMismatch {
                source_name: self.source_name.clone(),
                missing,
            });
        }
        Ok(resolved)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Cell lookup that tolerates ragged rows (sheets drop trailing blanks).
pub fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn header_is_split_off_and_trimmed() {
        let table =
            TabularData::from_raw_rows("status", rows(&[&[" Kode ", "Status"], &["JJK-001", "Dead"]]))
                .unwrap();
        assert_eq!(table.header, vec!["Kode", "Status"]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn empty_sheet_is_unavailable() {
        let err = TabularData::from_raw_rows("status", Vec::new()).unwrap_err();
        assert!(err.is_source_unavailable());
    }

    #[test]
    fn missing_columns_are_listed() {
        let table = TabularData::from_raw_rows("pijak", rows(&[&["Kode", "Status"]])).unwrap();
        match table.require_columns(&["Kode", "Latitude", "Longitude"]) {
            Err(ReconcileError::SchemaMismatch { missing, .. }) => {
                assert_eq!(missing, vec!["Latitude", "Longitude"]);
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn ragged_rows_read_as_blank() {
        let row = vec!["a".to_string()];
        assert_eq!(cell(&row, 0), "a");
        assert_eq!(cell(&row, 3), "");
    }
}
