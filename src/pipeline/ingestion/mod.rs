// Pipeline ingestion: field-store extraction and tabular sheet shapes

pub mod store_extractor;
pub mod tabular;
