use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::app::ports::{ObservationStorePort, TabularSourcePort};
use crate::config::{Config, SECONDARY_WORKSHEET, STATUS_WORKSHEET};
use crate::domain::CanonicalTreeView;
use crate::error::Result;
use crate::infra::sqlite_store::discover_stores;
use crate::infra::tabular_sources::build_tabular_source;
use crate::observability::metrics::emit_stage_duration;
use crate::pipeline::export::summary::{
    HeatmapSummary, RecordCounts, RegistrySummary, RunSummary, StoreSummary,
};
use crate::pipeline::export::{self, commit_artifacts, tabular, Artifact};
use crate::pipeline::ingestion::store_extractor::extract_all;
use crate::pipeline::processing::dedup::Deduplicator;
use crate::pipeline::processing::heatmap::{HeatmapOutcome, SpatialAggregator};
use crate::pipeline::processing::identifier::IdentifierNormalizer;
use crate::pipeline::processing::secondary::{PhotoPaths, SecondaryNormalizer, SecondaryOutcome};
use crate::pipeline::processing::status_overlay::{overlay_status, StatusTable};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Everything one run produced, held in memory before any file is written.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub views: Vec<CanonicalTreeView>,
    pub registry: SecondaryOutcome,
    pub heatmap: HeatmapOutcome,
    pub stores: StoreSummary,
    pub records: RecordCounts,
    /// Per-store extract CSVs, empty unless enabled.
    pub extracts: Vec<Artifact>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub written: Vec<PathBuf>,
}

/// Runs the whole reconciliation: extract, dedup, overlay, registry, heat
/// layer, export.
pub struct ReconcileUseCase {
    config: Config,
    stores: Vec<Arc<dyn ObservationStorePort>>,
    status_source: Box<dyn TabularSourcePort>,
    secondary_source: Box<dyn TabularSourcePort>,
}

impl ReconcileUseCase {
    pub fn new(
        config: Config,
        stores: Vec<Arc<dyn ObservationStorePort>>,
        status_source: Box<dyn TabularSourcePort>,
        secondary_source: Box<dyn TabularSourcePort>,
    ) -> Self {
        Self {
            config,
            stores,
            status_source,
            secondary_source,
        }
    }

    /// Wires the SQLite stores found in the configured folder and the
    /// configured tabular sources.
    pub fn from_config(config: Config) -> Result<Self> {
        let stores: Vec<Arc<dyn ObservationStorePort>> =
            discover_stores(&config.stores.folder, &config.stores.extension)?
                .into_iter()
                .map(|s| Arc::new(s) as Arc<dyn ObservationStorePort>)
                .collect();
        info!(
            "Found {} stores in {}",
            stores.len(),
            config.stores.folder.display()
        );

        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        let status_source =
            build_tabular_source("status", &config.status_source, STATUS_WORKSHEET, client.clone())?;
        let secondary_source = build_tabular_source(
            "secondary",
            &config.secondary_source,
            SECONDARY_WORKSHEET,
            client,
        )?;
        Ok(Self::new(config, stores, status_source, secondary_source))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Computes every dataset without touching the output directory.
    pub async fn reconcile(&self, run_id: Uuid) -> Result<Reconciliation> {
        let started_at = Utc::now();
        let normalizer = IdentifierNormalizer::new(&self.config.identifiers);

        let fetch_started = Instant::now();
        let (extraction, status_table, secondary_table) = tokio::join!(
            extract_all(self.stores.clone(), &self.config.stores.excluded_approval),
            self.status_source.fetch(),
            self.secondary_source.fetch(),
        );
        let extraction = extraction?;
        let status_table = status_table?;
        let secondary_table = secondary_table?;
        emit_stage_duration("fetch", fetch_started.elapsed().as_secs_f64());

        let mut extracts = Vec::new();
        if self.config.stores.write_extracts {
            for batch in &extraction.batches {
                extracts.push(Artifact::new(
                    format!("geotagged_tree_{}.csv", batch.store),
                    tabular::render_store_extract_csv(&batch.records)?,
                ));
            }
        }

        let stores = StoreSummary {
            used: extraction.batches.iter().map(|b| b.store.clone()).collect(),
            skipped: extraction.skipped.clone(),
        };
        let provisional_dropped = extraction.provisional_dropped();

        let stage = Instant::now();
        let dedup = info_span!("dedup")
            .in_scope(|| Deduplicator::new(&normalizer).deduplicate(extraction.batches));
        emit_stage_duration("dedup", stage.elapsed().as_secs_f64());

        let input_records = dedup.input_records;
        let unidentified = dedup.unidentified;
        let unparseable_dates = dedup.unparseable_dates;

        let stage = Instant::now();
        let overlay = info_span!("overlay").in_scope(|| -> Result<_> {
            let statuses = StatusTable::from_tabular(&status_table, &normalizer)?;
            Ok(overlay_status(dedup.latest, &statuses))
        })?;
        let status_matched = overlay.matched;
        let views = overlay.views;
        emit_stage_duration("overlay", stage.elapsed().as_secs_f64());

        let stage = Instant::now();
        let (registry, heatmap) = info_span!("registry").in_scope(|| -> Result<_> {
            let photos = PhotoPaths::from_output(&self.config.output);
            let registry = SecondaryNormalizer::new(&normalizer, photos).normalize(&secondary_table)?;
            let heatmap = SpatialAggregator::new(self.config.heatmap.clone()).aggregate(&registry.records);
            Ok((registry, heatmap))
        })?;
        emit_stage_duration("registry", stage.elapsed().as_secs_f64());

        let without_coordinates = views.iter().filter(|v| v.coordinates().is_none()).count();
        if without_coordinates > 0 {
            warn!(
                "{} canonical trees have no coordinates; they appear in the CSV only",
                without_coordinates
            );
        }

        let records = RecordCounts {
            extracted: input_records,
            provisional_dropped,
            unidentified,
            unparseable_dates,
            canonical_trees: views.len(),
            without_coordinates,
            status_matched,
            status_unknown: views.len() - status_matched,
        };

        Ok(Reconciliation {
            run_id,
            started_at,
            views,
            registry,
            heatmap,
            stores,
            records,
            extracts,
        })
    }

    /// Reconciles, then writes the full artifact set. Any failure before the
    /// commit leaves the output directory as it was.
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("reconcile", run_id = %run_id);
        self.run_with_id(run_id).instrument(span).await
    }

    async fn run_with_id(&self, run_id: Uuid) -> Result<RunReport> {
        let run_started = Instant::now();
        info!("Starting reconciliation run");
        let outcome = self.reconcile(run_id).await?;

        let stage = Instant::now();
        let output = &self.config.output;
        let mut artifacts = export::render_artifacts(
            &outcome.views,
            &outcome.registry.records,
            &outcome.heatmap,
            output,
        )?;
        artifacts.extend(outcome.extracts.iter().cloned());

        let summary = RunSummary {
            run_id,
            started_at: outcome.started_at,
            finished_at: Utc::now(),
            stores: outcome.stores.clone(),
            records: outcome.records.clone(),
            registry: RegistrySummary::from_outcome(&outcome.registry, output.expected_total),
            heatmap: HeatmapSummary {
                buckets: outcome.heatmap.buckets.len(),
                suppressed: outcome.heatmap.suppressed,
            },
            map_center: export::summary::map_center(&outcome.views),
            artifacts: artifacts.iter().map(Artifact::digest).collect(),
        };
        artifacts.push(Artifact::new(&output.summary, export::summary::render(&summary)?));

        let written = commit_artifacts(&output.dir, &artifacts)?;
        emit_stage_duration("export", stage.elapsed().as_secs_f64());
        emit_stage_duration("total", run_started.elapsed().as_secs_f64());

        info!(
            "Run complete: {} canonical trees, {} registry trees, {} heat buckets",
            summary.records.canonical_trees, summary.registry.geotagged, summary.heatmap.buckets
        );
        Ok(RunReport { summary, written })
    }
}
