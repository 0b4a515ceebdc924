use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source '{source_name}' unavailable: {message}")]
    SourceUnavailable { source_name: String, message: String },

    #[error("Source '{source_name}' is missing required columns: {}", missing.join(", "))]
    SchemaMismatch {
        source_name: String,
        missing: Vec<String>,
    },

    #[error("No field store produced usable rows")]
    NoUsableStores,
}

impl ReconcileError {
    pub fn unavailable(source_name: impl Into<String>, message: impl ToString) -> Self {
        ReconcileError::SourceUnavailable {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Schema mismatches count as an unavailable source: a partial schema
    /// cannot be joined safely.
    pub fn is_source_unavailable(&self) -> bool {
        matches!(
            self,
            ReconcileError::SourceUnavailable { .. }
                | ReconcileError::SchemaMismatch { .. }
                | ReconcileError::NoUsableStores
                | ReconcileError::Http(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
