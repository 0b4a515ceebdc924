use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

use tree_reconciler::{Config, ReconcileUseCase};

struct Monitoring {
    code: &'static str,
    date: &'static str,
    approval: &'static str,
    tree_status: &'static str,
    coords: Option<(f64, f64)>,
}

fn create_store(path: &Path, rows: &[Monitoring]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE tree (
            id INTEGER PRIMARY KEY, code TEXT, name TEXT, binomialName TEXT,
            status TEXT, programName TEXT
        );
        CREATE TABLE tree_monitoring (
            treeMonitoringId TEXT, treeId INTEGER, date TEXT, latitude REAL,
            longitude REAL, elevation REAL, statusApproval TEXT, img1 TEXT
        );
        "#,
    )
    .unwrap();
    for (i, row) in rows.iter().enumerate() {
        let id = i as i64 + 1;
        conn.execute(
            "INSERT INTO tree VALUES (?1, ?2, 'Bakau', 'Rhizophora apiculata', ?3, 'Restore')",
            params![id, row.code, row.tree_status],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO tree_monitoring VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, NULL)",
            params![
                format!("m{}", id),
                id,
                row.date,
                row.coords.map(|c| c.0),
                row.coords.map(|c| c.1),
                row.approval
            ],
        )
        .unwrap();
    }
}

const REGISTRY_CSV: &str = "Status,Latitude,Longitude,Kode,Nama pohon,Tree Status,Foto 1\n\
Geotagging complete,\"1° 30' 0\"\" N\",124.51,MAN-10,Api-api,Dead,https://photos.example.org/p/a.jpg\n\
Pending,1.6,124.6,JJK-011,Bakau,Alive,\n";

/// Two stores holding the same tree, a provisional newer observation, a tree
/// without coordinates and one broken store file.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let db = dir.path().join("db");
        fs::create_dir_all(&db).unwrap();

        create_store(
            &db.join("north.db"),
            &[
                Monitoring {
                    code: "MAN-7",
                    date: "2024-01-01",
                    approval: "Approved",
                    tree_status: "Alive",
                    coords: Some((1.0, 124.0)),
                },
                Monitoring {
                    code: "MAN-9",
                    date: "2025-03-01",
                    approval: "NeedAction",
                    tree_status: "Alive",
                    coords: Some((1.2, 124.2)),
                },
                Monitoring {
                    code: "MAN-20",
                    date: "2024-02-01",
                    approval: "Approved",
                    tree_status: "Alive",
                    coords: None,
                },
            ],
        );
        create_store(
            &db.join("south.db"),
            &[
                Monitoring {
                    code: "MAN-7",
                    date: "2024-06-01",
                    approval: "Approved",
                    tree_status: "Dead",
                    coords: Some((1.1895, 124.5123)),
                },
                Monitoring {
                    code: "JJK-007",
                    date: "2025-01-01",
                    approval: "NeedAction",
                    tree_status: "Dead",
                    coords: Some((9.0, 99.0)),
                },
            ],
        );
        fs::write(db.join("broken.db"), "not a database").unwrap();

        fs::write(dir.path().join("status.csv"), "Kode,Status\nJJK-007,Alive\n").unwrap();
        fs::write(dir.path().join("registry.csv"), REGISTRY_CSV).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn config(&self) -> Config {
        let toml = format!(
            r#"
            [stores]
            folder = "{db}"
            write_extracts = true

            [status_source]
            kind = "csv_file"
            path = "{status}"

            [secondary_source]
            kind = "csv_file"
            path = "{registry}"

            [output]
            dir = "{out}"
            expected_total = 4103
            "#,
            db = self.path("db").display(),
            status = self.path("status.csv").display(),
            registry = self.path("registry.csv").display(),
            out = self.path("out").display(),
        );
        Config::from_toml(&toml).unwrap()
    }

    fn read_json(&self, name: &str) -> serde_json::Value {
        serde_json::from_slice(&fs::read(self.path("out").join(name)).unwrap()).unwrap()
    }
}

fn canonical_rows(path: &Path) -> HashMap<String, HashMap<String, String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader.headers().unwrap().clone();
    reader
        .records()
        .map(|r| {
            let r = r.unwrap();
            let row: HashMap<String, String> = headers
                .iter()
                .zip(r.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect();
            (row["code"].clone(), row)
        })
        .collect()
}

#[tokio::test]
async fn latest_observation_wins_and_status_comes_from_overlay() {
    let fixture = Fixture::new();
    let report = ReconcileUseCase::from_config(fixture.config())
        .unwrap()
        .run()
        .await
        .unwrap();

    let rows = canonical_rows(&fixture.path("out").join("geotagged_tree_aggregated_latest.csv"));
    assert_eq!(rows.len(), 2);

    let tree = &rows["JJK-007"];
    assert_eq!(tree["latitude"], "1.1895");
    assert_eq!(tree["longitude"], "124.5123");
    assert_eq!(tree["source_store"], "south");
    assert_eq!(tree["tree_status"], "Dead");
    assert_eq!(tree["status"], "Alive");
    assert_eq!(tree["fill_color"], "green");

    let unmatched = &rows["JJK-020"];
    assert_eq!(unmatched["status"], "Unknown");
    assert_eq!(unmatched["border_color"], "black");
    assert_eq!(unmatched["fill_color"], "#ccc");

    assert_eq!(report.summary.stores.used, vec!["north", "south"]);
    assert_eq!(report.summary.stores.skipped.len(), 1);
    assert_eq!(report.summary.stores.skipped[0].store, "broken");
    assert_eq!(report.summary.records.provisional_dropped, 2);
    assert_eq!(report.summary.records.without_coordinates, 1);
}

#[tokio::test]
async fn provisional_rows_never_reach_any_output() {
    let fixture = Fixture::new();
    ReconcileUseCase::from_config(fixture.config())
        .unwrap()
        .run()
        .await
        .unwrap();

    let out = fixture.path("out");
    let csv = fs::read_to_string(out.join("geotagged_tree_aggregated_latest.csv")).unwrap();
    assert!(!csv.contains("JJK-009"));
    assert!(!csv.contains("NeedAction"));
    let north = fs::read_to_string(out.join("geotagged_tree_north.csv")).unwrap();
    assert!(!north.contains("MAN-9"));
}

#[tokio::test]
async fn geotagged_registry_rows_are_kept_and_pending_ones_dropped() {
    let fixture = Fixture::new();
    let report = ReconcileUseCase::from_config(fixture.config())
        .unwrap()
        .run()
        .await
        .unwrap();

    let registry = fixture.read_json("pijak_tree.geojson");
    let features = registry["features"].as_array().unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["properties"]["code"], "JJK-010");
    assert_eq!(features[0]["properties"]["photo"], "pijak_foto/a.jpg");
    let lat = features[0]["geometry"]["coordinates"][1].as_f64().unwrap();
    assert!((lat - 1.5).abs() < 1e-9);

    let kml = fs::read_to_string(fixture.path("out").join("geotagged_tree.kml")).unwrap();
    assert!(kml.contains("<description>[DB] Bakau</description>"));
    assert!(kml.contains("<description>[PIJAK] Api-api</description>"));

    assert_eq!(report.summary.registry.geotagged, 1);
    assert_eq!(report.summary.registry.rejected.get("not_geotagged"), Some(&1));
    // One registry tree is below the bucket sample floor.
    assert_eq!(report.summary.heatmap.buckets, 0);
    assert_eq!(fixture.read_json("heatmap.json"), serde_json::json!([]));
}

#[tokio::test]
async fn combined_geojson_preserves_observed_coordinates() {
    let fixture = Fixture::new();
    ReconcileUseCase::from_config(fixture.config())
        .unwrap()
        .run()
        .await
        .unwrap();

    let combined = fixture.read_json("geotagged_tree.geojson");
    let features = combined["features"].as_array().unwrap();
    // JJK-020 has no coordinates and is left out of the map layers.
    assert_eq!(features.len(), 2);

    let db = features
        .iter()
        .find(|f| f["properties"]["code"] == "JJK-007")
        .unwrap();
    assert_eq!(db["properties"]["source"], "DB");
    let coords = db["geometry"]["coordinates"].as_array().unwrap();
    assert!((coords[0].as_f64().unwrap() - 124.5123).abs() < 1e-9);
    assert!((coords[1].as_f64().unwrap() - 1.1895).abs() < 1e-9);

    let pijak = features
        .iter()
        .find(|f| f["properties"]["code"] == "JJK-010")
        .unwrap();
    assert_eq!(pijak["properties"]["source"], "PIJAK");
}

#[tokio::test]
async fn summary_digests_match_written_files() {
    let fixture = Fixture::new();
    ReconcileUseCase::from_config(fixture.config())
        .unwrap()
        .run()
        .await
        .unwrap();

    let summary = fixture.read_json("run_summary.json");
    assert_eq!(summary["registry"]["expected_total"], 4103);
    let artifacts = summary["artifacts"].as_array().unwrap();
    // Six map artifacts plus one extract per usable store.
    assert_eq!(artifacts.len(), 8);
    for artifact in artifacts {
        let file = artifact["file"].as_str().unwrap();
        let bytes = fs::read(fixture.path("out").join(file)).unwrap();
        assert_eq!(artifact["sha256"], hex::encode(Sha256::digest(&bytes)));
    }
}

#[tokio::test]
async fn unavailable_status_source_leaves_previous_outputs_untouched() {
    let fixture = Fixture::new();
    let out = fixture.path("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("geotagged_tree.geojson"), "previous").unwrap();
    fs::remove_file(fixture.path("status.csv")).unwrap();

    let err = ReconcileUseCase::from_config(fixture.config())
        .unwrap()
        .run()
        .await
        .unwrap_err();
    assert!(err.is_source_unavailable());

    assert_eq!(
        fs::read_to_string(out.join("geotagged_tree.geojson")).unwrap(),
        "previous"
    );
    assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
}

#[tokio::test]
async fn registry_schema_mismatch_is_fatal() {
    let fixture = Fixture::new();
    fs::write(fixture.path("registry.csv"), "Kode,Latitude\nJJK-001,1.0\n").unwrap();

    let err = ReconcileUseCase::from_config(fixture.config())
        .unwrap()
        .run()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Longitude"));
    assert!(!fixture.path("out").exists());
}
