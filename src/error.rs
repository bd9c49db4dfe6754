//! Unified error handling for the sentinel crate
//!
//! Handlers never surface errors from `fetch`; they record them and report
//! an absent timestamp instead. [`Error`] is used at the edges: handler
//! construction, report export and verifier calls.

use std::io;
use thiserror::Error;

pub use crate::utils::error::{CheckError, FetchError};

/// Unified error type for the sentinel crate
#[derive(Error, Debug)]
pub enum Error {
    /// Source retrieval errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// CSV export errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Verifier errors
    #[error("Verification error: {0}")]
    Verification(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
