use async_trait::async_trait;

use crate::domain::StoreBatch;
use crate::error::Result;
use crate::pipeline::ingestion::tabular::TabularData;

/// A local field database holding tree and monitoring tables.
///
/// Extraction is synchronous; the extractor runs each store on a blocking task.
pub trait ObservationStorePort: Send + Sync {
    fn name(&self) -> &str;

    /// Reads every monitoring row and drops those whose approval state equals
    /// `excluded_approval`.
    fn extract(&self, excluded_approval: &str) -> Result<StoreBatch>;
}

/// A read-only sheet: header row plus string cells. Re-read on every run.
#[async_trait]
pub trait TabularSourcePort: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<TabularData>;
}
