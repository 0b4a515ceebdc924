use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use crate::app::ports::TabularSourcePort;
use crate::config::TabularSourceConfig;
use crate::error::{ReconcileError, Result};
use crate::observability::metrics::{emit_labeled_counter, MetricName};
use crate::pipeline::ingestion::tabular::TabularData;

/// Builds the adapter for one configured sheet. `default_worksheet` applies
/// to Sheets sources that name no worksheet.
pub fn build_tabular_source(
    name: &str,
    config: &TabularSourceConfig,
    default_worksheet: &str,
    client: reqwest::Client,
) -> Result<Box<dyn TabularSourcePort>> {
    Ok(match config {
        TabularSourceConfig::Sheets {
            spreadsheet_id,
            worksheet,
            api_key_env,
            bearer_token_env,
            base_url,
        } => {
            let api_key = read_secret(api_key_env.as_deref())?;
            let bearer_token = read_secret(bearer_token_env.as_deref())?;
            Box::new(SheetsValuesSource {
                name: name.to_string(),
                client,
                base_url: base_url.clone(),
                spreadsheet_id: spreadsheet_id.clone(),
                worksheet: worksheet.clone().unwrap_or_else(|| default_worksheet.to_string()),
                api_key,
                bearer_token,
            })
        }
        TabularSourceConfig::CsvUrl { url } => Box::new(CsvUrlSource {
            name: name.to_string(),
            client,
            url: url.clone(),
        }),
        TabularSourceConfig::CsvFile { path } => Box::new(CsvFileSource {
            name: name.to_string(),
            path: path.clone(),
        }),
    })
}

fn read_secret(env_name: Option<&str>) -> Result<Option<String>> {
    let Some(var) = env_name else {
        return Ok(None);
    };
    std::env::var(var)
        .map(Some)
        .map_err(|_| ReconcileError::Config(format!("environment variable {} is not set", var)))
}

/// Parses CSV bytes into rows of string cells. Ragged rows are allowed.
pub fn parse_csv_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn record_fetch(name: &str, started: Instant, result: &Result<TabularData>) {
    match result {
        Ok(table) => {
            emit_labeled_counter(MetricName::SourceFetchSuccess, "source", name, 1.0);
            emit_labeled_counter(MetricName::SourceRows, "source", name, table.len() as f64);
            info!(
                "Fetched {} rows from {} in {:.2}ms",
                table.len(),
                name,
                started.elapsed().as_secs_f64() * 1000.0
            );
        }
        Err(e) => {
            emit_labeled_counter(MetricName::SourceFetchError, "source", name, 1.0);
            warn!("Fetching {} failed: {}", name, e);
        }
    }
}

/// Google Sheets values API (`GET /v4/spreadsheets/{id}/values/{range}`).
pub struct SheetsValuesSource {
    name: String,
    client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    worksheet: String,
    api_key: Option<String>,
    bearer_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl SheetsValuesSource {
    fn values_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ReconcileError::Config(format!("invalid sheets base_url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ReconcileError::Config("sheets base_url cannot be a base".into()))?
            .pop_if_empty()
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&self.worksheet);
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("key", key);
        }
        Ok(url)
    }

    async fn fetch_inner(&self) -> Result<TabularData> {
        let url = self.values_url()?;
        let mut request = self.client.get(url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ReconcileError::unavailable(&self.name, e))?;
        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| ReconcileError::unavailable(&self.name, e))?;
        let rows = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();
        TabularData::from_raw_rows(&self.name, rows)
    }
}

#[async_trait]
impl TabularSourcePort for SheetsValuesSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<TabularData> {
        let started = Instant::now();
        let result = self.fetch_inner().await;
        record_fetch(&self.name, started, &result);
        result
    }
}

/// A published CSV export of a sheet.
pub struct CsvUrlSource {
    name: String,
    client: reqwest::Client,
    url: String,
}

impl CsvUrlSource {
    async fn fetch_inner(&self) -> Result<TabularData> {
        let bytes = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ReconcileError::unavailable(&self.name, e))?
            .bytes()
            .await
            .map_err(|e| ReconcileError::unavailable(&self.name, e))?;
        let rows = parse_csv_rows(&bytes).map_err(|e| ReconcileError::unavailable(&self.name, e))?;
        TabularData::from_raw_rows(&self.name, rows)
    }
}

#[async_trait]
impl TabularSourcePort for CsvUrlSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<TabularData> {
        let started = Instant::now();
        let result = self.fetch_inner().await;
        record_fetch(&self.name, started, &result);
        result
    }
}

/// A CSV file on local disk.
pub struct CsvFileSource {
    name: String,
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
        }
    }

    async fn fetch_inner(&self) -> Result<TabularData> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            ReconcileError::unavailable(&self.name, format!("{}: {}", self.path.display(), e))
        })?;
        let rows = parse_csv_rows(&bytes).map_err(|e| ReconcileError::unavailable(&self.name, e))?;
        TabularData::from_raw_rows(&self.name, rows)
    }
}

#[async_trait]
impl TabularSourcePort for CsvFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<TabularData> {
        let started = Instant::now();
        let result = self.fetch_inner().await;
        record_fetch(&self.name, started, &result);
        result
    }
}
