//! sentinel - Data source update monitor
//!
//! Detects whether upstream data sources changed by reading lightweight
//! metadata (HTTP headers, API fields, page text, command output) instead
//! of downloading the data, and remembers the last seen update time of
//! every source.
//!
//! # Architecture
//!
//! - [`config`] - Settings and the sources file
//! - [`parser`] - Date normalization and markup/JSON/XML extraction
//! - [`handlers`] - One retrieval strategy per method tag
//! - [`registry`] - Source lookup and handler dispatch
//! - [`storage`] - Persisted per-source state
//! - [`verifier`] - Optional timestamp verification
//! - [`sentinel`] - Check orchestration
//! - [`report`] - CSV export and run summary
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use sentinel::config::Settings;
//! use sentinel::registry::Registry;
//! use sentinel::storage::StateManager;
//! use sentinel::Sentinel;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::default();
//!     let state = Arc::new(StateManager::new(&settings.state.path));
//!     let registry = Registry::from_file(Path::new("config/sources.yaml"), settings)?;
//!     let sentinel = Sentinel::new(registry, state);
//!
//!     for result in sentinel.check_all_sources().await {
//!         println!("{result}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod parser;
pub mod registry;
pub mod report;
pub mod sentinel;
pub mod storage;
pub mod utils;
pub mod verifier;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::error::{Error, Result};
    pub use crate::handlers::SourceHandler;
    pub use crate::models::{CheckResult, CheckStatus, Method, SourceDescriptor, Verification};
    pub use crate::registry::Registry;
    pub use crate::sentinel::Sentinel;
    pub use crate::storage::StateManager;
}

// Direct re-exports for convenience
pub use error::{Error, Result};
pub use models::{CheckResult, Method, SourceDescriptor};
pub use sentinel::Sentinel;
