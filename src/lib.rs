pub mod config;
pub mod domain;
pub mod error;
pub mod observability;
pub mod pipeline;

// Layered boundaries: ports and use case in app, adapters in infra
pub mod app;
pub mod infra;

pub use app::ReconcileUseCase;
pub use config::Config;
pub use error::{ReconcileError, Result};
