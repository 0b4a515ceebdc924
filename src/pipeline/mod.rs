// Reconciliation pipeline: ingestion, processing, and export

pub mod export;
pub mod ingestion;
pub mod processing;
