//! Configuration management for the sentinel monitor
//!
//! This module loads runtime settings and source descriptors from YAML
//! files, applies environment overrides and validates the result.
//! Settings are an explicit value threaded into each component.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};

use crate::models::SourceDescriptor;
use crate::utils::retry::RetryConfig;

/// Default location of the sources file
pub const DEFAULT_SOURCES_PATH: &str = "config/sources.yaml";

/// Default location of the settings file
pub const DEFAULT_SETTINGS_PATH: &str = "config/settings.yaml";

/// Main settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// HTTP client settings
    pub http: HttpSettings,

    /// Headless browser settings
    pub selenium: BrowserSettings,

    /// Logging settings
    pub logging: LoggingSettings,

    /// State persistence settings
    pub state: StateSettings,

    /// Timestamp verification settings
    pub verification: VerificationSettings,

    /// Batch concurrency settings
    pub concurrency: ConcurrencySettings,
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-attempt timeout in seconds
    pub timeout: u64,

    /// Total attempts per retrieval
    pub max_retries: u32,

    /// User agent string
    pub user_agent: String,

    /// Pause between attempts in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: 30,
            max_retries: 3,
            user_agent: format!("Sentinel-Monitor/{}", env!("CARGO_PKG_VERSION")),
            retry_delay_ms: 1000,
        }
    }
}

/// Headless browser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Run the browser without a window
    pub headless: bool,

    /// Time allowed for scripts to settle, seconds
    pub wait_timeout: u64,

    /// Page load timeout, seconds
    pub page_load_timeout: u64,

    /// Browser executable; falls back to `CHROME_BIN`, then `chromium`
    pub chrome_binary: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            wait_timeout: 10,
            page_load_timeout: 30,
            chrome_binary: None,
        }
    }
}

impl BrowserSettings {
    /// Resolve the browser executable
    pub fn chrome_binary(&self) -> String {
        self.chrome_binary
            .clone()
            .or_else(|| std::env::var("CHROME_BIN").ok())
            .unwrap_or_else(|| String::from("chromium"))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

/// State persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSettings {
    /// Path of the JSON state document
    pub path: PathBuf,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("state/last_checked.json"),
        }
    }
}

/// Timestamp verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    /// Verify every extracted timestamp
    pub enabled: bool,

    /// OpenAI-compatible API base URL
    pub endpoint: String,

    /// Chat model name
    pub model: String,

    /// Cap on page content included in the prompt
    pub max_content_chars: usize,

    /// Request timeout in seconds
    pub timeout: u64,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: String::from("https://api.groq.com/openai/v1"),
            model: String::from("llama-3.3-70b-versatile"),
            max_content_chars: 4000,
            timeout: 30,
        }
    }
}

/// Batch concurrency configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencySettings {
    /// Sources checked at the same time during a batch
    pub max_concurrent_checks: usize,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self {
            max_concurrent_checks: 4,
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    ///
    /// Missing sections and keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let settings: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML settings file: {}", path.display()))?;

        Ok(settings)
    }

    /// Load settings from a file when it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(path = %path.display(), "Settings file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Apply `SENTINEL_*` environment overrides
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("SENTINEL_STATE_PATH") {
            self.state.path = PathBuf::from(path);
        }

        if let Ok(level) = std::env::var("SENTINEL_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(timeout) = std::env::var("SENTINEL_HTTP_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.http.timeout = timeout;
        }

        if let Some(retries) = std::env::var("SENTINEL_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            self.http.max_retries = retries;
        }

        self
    }

    /// Validate settings values
    pub fn validate(&self) -> Result<()> {
        if self.http.timeout == 0 {
            anyhow::bail!("http.timeout must be greater than 0");
        }

        if self.http.max_retries == 0 {
            anyhow::bail!("http.max_retries must be at least 1");
        }

        if self.concurrency.max_concurrent_checks == 0 {
            anyhow::bail!("concurrency.max_concurrent_checks must be greater than 0");
        }

        if self.verification.max_content_chars == 0 {
            anyhow::bail!("verification.max_content_chars must be greater than 0");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        Ok(())
    }

    /// Retry policy shared by all handlers
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::fixed(self.http.max_retries, self.http.retry_delay_ms)
    }
}

/// Load source descriptors from a YAML mapping of id to descriptor
///
/// File order is preserved. Entries that fail to deserialize are logged
/// and skipped.
pub fn load_sources(path: &Path) -> Result<Vec<SourceDescriptor>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sources file: {}", path.display()))?;

    parse_sources(&content)
        .with_context(|| format!("Failed to parse YAML sources file: {}", path.display()))
}

/// Parse source descriptors from YAML text
pub fn parse_sources(content: &str) -> Result<Vec<SourceDescriptor>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let document: Value = serde_yaml::from_str(content)?;
    let mapping = match document {
        Value::Mapping(mapping) => mapping,
        Value::Null => return Ok(Vec::new()),
        _ => anyhow::bail!("sources file must be a mapping of id to descriptor"),
    };

    let mut sources = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let Some(id) = key.as_str().map(str::to_string) else {
            tracing::warn!(key = ?key, "Skipping source with non-string id");
            continue;
        };

        match serde_yaml::from_value::<SourceDescriptor>(value) {
            Ok(mut descriptor) => {
                descriptor.id = id;
                sources.push(descriptor);
            }
            Err(e) => {
                tracing::warn!(source = %id, error = %e, "Skipping malformed source descriptor");
            }
        }
    }

    Ok(sources)
}
