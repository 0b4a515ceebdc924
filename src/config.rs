use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ReconcileError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "reconcile.toml";
pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub const STATUS_WORKSHEET: &str = "TreeStatus";
pub const SECONDARY_WORKSHEET: &str = "Pijak DB";

/// Everything one batch run needs; passed explicitly into each stage.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub stores: StoresConfig,
    pub status_source: TabularSourceConfig,
    pub secondary_source: TabularSourceConfig,
    pub identifiers: IdentifierConfig,
    pub heatmap: HeatmapConfig,
    pub output: OutputConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoresConfig {
    pub folder: PathBuf,
    pub extension: String,
    /// Approval state marking a provisional monitoring row.
    pub excluded_approval: String,
    /// Write one CSV per store after the approval filter.
    pub write_extracts: bool,
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("./db"),
            extension: "db".to_string(),
            excluded_approval: "NeedAction".to_string(),
            write_extracts: false,
        }
    }
}

/// Where a tabular (header row + string cells) source is read from.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TabularSourceConfig {
    /// Google Sheets values API.
    Sheets {
        spreadsheet_id: String,
        /// Defaults to the worksheet conventional for the section.
        #[serde(default)]
        worksheet: Option<String>,
        #[serde(default)]
        api_key_env: Option<String>,
        #[serde(default)]
        bearer_token_env: Option<String>,
        #[serde(default = "default_sheets_base_url")]
        base_url: String,
    },
    /// Published CSV export.
    CsvUrl { url: String },
    /// Local CSV file, mostly for offline runs.
    CsvFile { path: PathBuf },
}

impl Default for TabularSourceConfig {
    fn default() -> Self {
        TabularSourceConfig::CsvFile {
            path: PathBuf::new(),
        }
    }
}

fn default_sheets_base_url() -> String {
    DEFAULT_SHEETS_BASE_URL.to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentifierConfig {
    /// Legacy prefix -> canonical prefix.
    pub legacy_prefixes: BTreeMap<String, String>,
    pub pad_width: usize,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        let mut legacy_prefixes = BTreeMap::new();
        legacy_prefixes.insert("MAN".to_string(), "JJK".to_string());
        Self {
            legacy_prefixes,
            pad_width: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeatmapConfig {
    pub ratio_ceiling: f64,
    pub min_bucket_samples: usize,
    pub intensity_gain: f64,
    pub grid_decimals: u32,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            ratio_ceiling: 10.0,
            min_bucket_samples: 3,
            intensity_gain: 1.2,
            grid_decimals: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub csv: String,
    pub geojson: String,
    pub kml: String,
    pub secondary_geojson: String,
    pub secondary_kml: String,
    pub heatmap: String,
    pub summary: String,
    pub thumbnails_enabled: bool,
    pub pictures_folder: String,
    /// Denominator for the "geotagged so far" share in the summary.
    pub expected_total: Option<u32>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            csv: "geotagged_tree_aggregated_latest.csv".to_string(),
            geojson: "geotagged_tree.geojson".to_string(),
            kml: "geotagged_tree.kml".to_string(),
            secondary_geojson: "pijak_tree.geojson".to_string(),
            secondary_kml: "pijak_tree.kml".to_string(),
            heatmap: "heatmap.json".to_string(),
            summary: "run_summary.json".to_string(),
            thumbnails_enabled: false,
            pictures_folder: "pijak_foto".to_string(),
            expected_total: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub pushgateway_url: Option<String>,
    pub job: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            pushgateway_url: None,
            job: "tree_reconciler".to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ReconcileError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let ids = &self.identifiers;
        if ids.legacy_prefixes.is_empty() {
            return Err(ReconcileError::Config(
                "identifiers.legacy_prefixes must name at least one prefix".into(),
            ));
        }
        if ids.pad_width == 0 {
            return Err(ReconcileError::Config("identifiers.pad_width must be > 0".into()));
        }
        for (legacy, canonical) in &ids.legacy_prefixes {
            if !is_prefix_token(legacy) || !is_prefix_token(canonical) {
                return Err(ReconcileError::Config(format!(
                    "identifier prefixes must be ASCII letters: {} -> {}",
                    legacy, canonical
                )));
            }
            // A canonical prefix that is also legacy would be rewritten again.
            if ids
                .legacy_prefixes
                .keys()
                .any(|k| k.eq_ignore_ascii_case(canonical))
            {
                return Err(ReconcileError::Config(format!(
                    "canonical prefix {} is also listed as a legacy prefix",
                    canonical
                )));
            }
        }

        let heat = &self.heatmap;
        if !(heat.ratio_ceiling.is_finite() && heat.ratio_ceiling > 0.0) {
            return Err(ReconcileError::Config("heatmap.ratio_ceiling must be > 0".into()));
        }
        if !(heat.intensity_gain.is_finite() && heat.intensity_gain > 0.0) {
            return Err(ReconcileError::Config("heatmap.intensity_gain must be > 0".into()));
        }
        if heat.grid_decimals > 7 {
            return Err(ReconcileError::Config("heatmap.grid_decimals must be <= 7".into()));
        }

        self.status_source.validate("status_source")?;
        self.secondary_source.validate("secondary_source")?;
        if self.stores.excluded_approval.trim().is_empty() {
            return Err(ReconcileError::Config("stores.excluded_approval must not be empty".into()));
        }
        if matches!(self.output.expected_total, Some(0)) {
            return Err(ReconcileError::Config("output.expected_total must be > 0".into()));
        }
        Ok(())
    }
}

impl TabularSourceConfig {
    fn validate(&self, section: &str) -> Result<()> {
        let ok = match self {
            TabularSourceConfig::Sheets {
                spreadsheet_id,
                worksheet,
                ..
            } => {
                !spreadsheet_id.trim().is_empty()
                    && worksheet.as_deref().map_or(true, |w| !w.trim().is_empty())
            }
            TabularSourceConfig::CsvUrl { url } => !url.trim().is_empty(),
            TabularSourceConfig::CsvFile { path } => !path.as_os_str().is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(ReconcileError::Config(format!("{} is not configured", section)))
        }
    }
}

fn is_prefix_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic())
}
