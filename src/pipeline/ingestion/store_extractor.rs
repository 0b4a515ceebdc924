use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, Instrument};

use crate::app::ports::ObservationStorePort;
use crate::domain::StoreBatch;
use crate::error::{ReconcileError, Result};
use crate::observability::metrics::{emit_counter, MetricName};

#[derive(Debug, Clone, Serialize)]
pub struct SkippedStore {
    pub store: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    /// Batches in store order, whatever order the stores finished in.
    pub batches: Vec<StoreBatch>,
    pub skipped: Vec<SkippedStore>,
}

impl ExtractionOutcome {
    pub fn total_records(&self) -> usize {
        self.batches.iter().map(|b| b.records.len()).sum()
    }

    pub fn provisional_dropped(&self) -> usize {
        self.batches.iter().map(|b| b.provisional_dropped).sum()
    }
}

/// Extracts every store in parallel. A failing store is logged and skipped;
/// the run only fails when no store yields a single usable row.
pub async fn extract_all(
    stores: Vec<Arc<dyn ObservationStorePort>>,
    excluded_approval: &str,
) -> Result<ExtractionOutcome> {
    let mut tasks = JoinSet::new();
    for (idx, store) in stores.iter().enumerate() {
        let store = Arc::clone(store);
        let excluded = excluded_approval.to_string();
        let span = info_span!("extract_store", store = %store.name());
        tasks.spawn(
            async move {
                let name = store.name().to_string();
                let result = tokio::task::spawn_blocking(move || store.extract(&excluded))
                    .await
                    .unwrap_or_else(|e| Err(ReconcileError::unavailable(&name, e)));
                (idx, name, result)
            }
            .instrument(span),
        );
    }

    let mut results = Vec::with_capacity(stores.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => error!("Store extraction task failed: {}", e),
        }
    }
    results.sort_by_key(|(idx, _, _)| *idx);

    let mut outcome = ExtractionOutcome::default();
    for (_, name, result) in results {
        match result {
            Ok(batch) => {
                emit_counter(MetricName::StoresOpened, 1.0);
                emit_counter(MetricName::StoreRowsExtracted, batch.records.len() as f64);
                emit_counter(MetricName::StoreRowsProvisional, batch.provisional_dropped as f64);
                info!(
                    "Store {}: {} rows kept, {} provisional dropped",
                    name,
                    batch.records.len(),
                    batch.provisional_dropped
                );
                outcome.batches.push(batch);
            }
            Err(e) => {
                emit_counter(MetricName::StoresFailed, 1.0);
                error!("Skipping store {}: {}", name, e);
                outcome.skipped.push(SkippedStore {
                    store: name,
                    reason: e.to_string(),
                });
            }
        }
    }

    if outcome.total_records() == 0 {
        return Err(ReconcileError::NoUsableStores);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ObservationRecord;

    struct FakeStore {
        name: String,
        rows: Option<Vec<&'static str>>,
    }

    impl ObservationStorePort for FakeStore {
        fn name(&self) -> &str {
            &self.name
        }

        fn extract(&self, _excluded_approval: &str) -> Result<StoreBatch> {
            let rows = self
                .rows
                .as_ref()
                .ok_or_else(|| ReconcileError::unavailable(&self.name, "file is not a database"))?;
            Ok(StoreBatch {
                store: self.name.clone(),
                records: rows
                    .iter()
                    .map(|code| ObservationRecord {
                        store: self.name.clone(),
                        tree_id: None,
                        code: Some(code.to_string()),
                        tree_name: None,
                        binomial_name: None,
                        tree_status: None,
                        program_name: None,
                        monitoring_id: None,
                        monitoring_date: None,
                        latitude: None,
                        longitude: None,
                        elevation: None,
                        status_approval: None,
                        img1: None,
                    })
                    .collect(),
                provisional_dropped: 0,
            })
        }
    }

    fn store(name: &str, rows: Option<Vec<&'static str>>) -> Arc<dyn ObservationStorePort> {
        Arc::new(FakeStore {
            name: name.to_string(),
            rows,
        })
    }

    #[tokio::test]
    async fn broken_store_is_skipped() {
        let outcome = extract_all(
            vec![store("a", Some(vec!["MAN-1"])), store("b", None), store("c", Some(vec!["MAN-2"]))],
            "NeedAction",
        )
        .await
        .unwrap();
        let names: Vec<&str> = outcome.batches.iter().map(|b| b.store.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].store, "b");
    }

    #[tokio::test]
    async fn no_usable_rows_is_fatal() {
        let err = extract_all(vec![store("a", None), store("b", Some(vec![]))], "NeedAction")
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::NoUsableStores));

        let err = extract_all(Vec::new(), "NeedAction").await.unwrap_err();
        assert!(matches!(err, ReconcileError::NoUsableStores));
    }
}
