// Adapters behind the app ports: SQLite field stores and tabular sheet sources.

pub mod sqlite_store;
pub mod tabular_sources;
