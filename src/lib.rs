pub mod config;
pub mod error;
pub mod indexer;
pub mod llm;
pub mod models;
pub mod persist;
pub mod rag;

pub use config::Settings;
pub use error::{RagError, Result};
pub use rag::CourseAdvisor;

/// Install the global `tracing` subscriber. Honors `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
