//! Error types for source retrieval and per-source checks
//!
//! `FetchError` covers everything that can go wrong while talking to a
//! source (HTTP, shell commands, headless browser). `CheckError` is the
//! terminal outcome recorded on a `CheckResult`.

use thiserror::Error;

/// Errors that can occur while retrieving metadata from a source
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Server rejected the HTTP method (405)
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Request, command or browser timeout
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Shell command exited unsuccessfully
    #[error("Command failed with code {code:?}: {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    /// Child process could not be spawned or awaited
    #[error("Process error: {0}")]
    Process(#[from] std::io::Error),

    /// Headless browser produced no usable DOM
    #[error("Browser error: {0}")]
    Browser(String),

    /// Missing or malformed source URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::ServerError(status) => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Timeout(_) => true,
            Self::CommandFailed { .. } => true,
            Self::Process(_) => true,
            Self::Browser(_) => true,
            Self::MethodNotAllowed(_) | Self::InvalidUrl(_) => false,
        }
    }
}

/// Terminal per-source outcomes reported on a check result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    /// The source id is not configured
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// The configured method has no handler
    #[error("Unsupported method '{method}' for source: {id}")]
    UnsupportedMethod { id: String, method: String },

    /// The handler panicked mid-fetch
    #[error("Handler for {id} panicked: {message}")]
    HandlerPanicked { id: String, message: String },

    /// Retrieval failed after all attempts
    #[error("Fetch failed: {0}")]
    FetchFailed(String),
}
