use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::app::ports::ObservationStorePort;
use crate::domain::{ObservationRecord, StoreBatch};
use crate::error::{ReconcileError, Result};

/// One row per monitoring event, joined to its tree.
pub const OBSERVATION_QUERY: &str = r#"
SELECT
    t.id AS tree_id,
    t.code,
    t.name AS tree_name,
    t.binomialName,
    t.status AS tree_status,
    t.programName,
    tm.treeMonitoringId,
    tm.date AS monitoring_date,
    tm.latitude AS latitude,
    tm.longitude AS longitude,
    tm.elevation AS monitoring_elevation,
    tm.statusApproval,
    tm.img1
FROM tree t
JOIN tree_monitoring tm ON t.id = tm.treeId
"#;

/// A field-app SQLite export, opened read-only.
#[derive(Debug, Clone)]
pub struct SqliteFieldStore {
    name: String,
    path: PathBuf,
}

impl SqliteFieldStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("store")
            .to_string();
        Self { name, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Lists `*.<extension>` files in `folder`, sorted by path so merge order is stable.
pub fn discover_stores<P: AsRef<Path>>(folder: P, extension: &str) -> Result<Vec<SqliteFieldStore>> {
    let folder = folder.as_ref();
    let entries = fs::read_dir(folder).map_err(|e| {
        ReconcileError::unavailable(folder.display().to_string(), format!("cannot read store folder: {}", e))
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some(extension) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths.into_iter().map(SqliteFieldStore::new).collect())
}

impl ObservationStorePort for SqliteFieldStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract(&self, excluded_approval: &str) -> Result<StoreBatch> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let mut stmt = conn.prepare(OBSERVATION_QUERY)?;
        let mut rows = stmt.query([])?;

        let mut records = Vec::new();
        let mut provisional_dropped = 0;
        while let Some(row) = rows.next()? {
            let record = self.read_row(row)?;
            if record.is_provisional(excluded_approval) {
                provisional_dropped += 1;
                continue;
            }
            records.push(record);
        }

        debug!(
            store = %self.name,
            kept = records.len(),
            provisional = provisional_dropped,
            "Store extracted"
        );
        Ok(StoreBatch {
            store: self.name.clone(),
            records,
            provisional_dropped,
        })
    }
}

impl SqliteFieldStore {
    fn read_row(&self, row: &Row<'_>) -> Result<ObservationRecord> {
        Ok(ObservationRecord {
            store: self.name.clone(),
            tree_id: text_cell(row, 0)?,
            code: text_cell(row, 1)?,
            tree_name: text_cell(row, 2)?,
            binomial_name: text_cell(row, 3)?,
            tree_status: text_cell(row, 4)?,
            program_name: text_cell(row, 5)?,
            monitoring_id: text_cell(row, 6)?,
            monitoring_date: text_cell(row, 7)?,
            latitude: real_cell(row, 8)?,
            longitude: real_cell(row, 9)?,
            elevation: real_cell(row, 10)?,
            status_approval: text_cell(row, 11)?,
            img1: text_cell(row, 12)?,
        })
    }
}

/// Field-app columns are loosely typed; render whatever is stored as text.
fn text_cell(row: &Row<'_>, idx: usize) -> Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => None,
    })
}

/// Numeric cell; text that does not parse to a finite number reads as missing.
fn real_cell(row: &Row<'_>, idx: usize) -> Result<Option<f64>> {
    let value = match row.get_ref(idx)? {
        ValueRef::Integer(i) => Some(i as f64),
        ValueRef::Real(f) => Some(f),
        ValueRef::Text(t) => String::from_utf8_lossy(t).trim().parse::<f64>().ok(),
        ValueRef::Null | ValueRef::Blob(_) => None,
    };
    Ok(value.filter(|v| v.is_finite()))
}
