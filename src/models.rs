// Core data structures for the sentinel monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::error::CheckError;

/// Field names probed in API responses when none are configured
pub const DEFAULT_FALLBACK_FIELDS: &[&str] = &[
    "lastModified",
    "modified",
    "updatedAt",
    "last_updated",
    "dataUpdatedAt",
    "rowsUpdatedAt",
    "metadataUpdatedAt",
];

/// Retrieval strategy for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// HEAD request, read Last-Modified / Date / ETag
    #[serde(rename = "http_head")]
    HttpHead,
    /// Metadata API, JSON or XML body
    #[serde(rename = "api")]
    Api,
    /// Headless browser render
    #[serde(rename = "selenium")]
    Selenium,
    /// Static HTML scrape
    #[serde(rename = "beautifulsoup")]
    BeautifulSoup,
    /// Shell command that prints response headers
    #[serde(rename = "cli")]
    Cli,
}

impl Method {
    /// Get string representation (the configuration tag)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpHead => "http_head",
            Self::Api => "api",
            Self::Selenium => "selenium",
            Self::BeautifulSoup => "beautifulsoup",
            Self::Cli => "cli",
        }
    }

    /// Create from a configuration tag
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "http_head" | "head" => Some(Self::HttpHead),
            "api" => Some(Self::Api),
            "selenium" | "browser" => Some(Self::Selenium),
            "beautifulsoup" | "static" => Some(Self::BeautifulSoup),
            "cli" => Some(Self::Cli),
            _ => None,
        }
    }

    /// Get all methods
    pub fn all() -> [Self; 5] {
        [
            Self::HttpHead,
            Self::Api,
            Self::Selenium,
            Self::BeautifulSoup,
            Self::Cli,
        ]
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Body format of a metadata API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Json,
    Xml,
    /// Any other configured value; yields no timestamp
    #[serde(other)]
    Unsupported,
}

/// Configuration of a single monitored data source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Unique identifier (the key in the sources file)
    #[serde(default)]
    pub id: String,

    /// Human-readable name
    #[serde(default, alias = "name")]
    pub import_name: Option<String>,

    /// Retrieval method tag, resolved by the registry
    #[serde(default)]
    pub method: String,

    /// URL of the monitored resource
    #[serde(default)]
    pub data_url: String,

    /// Informational link to the import script
    #[serde(default)]
    pub script_url: Option<String>,

    /// CSS selectors for scrape methods, comma separated
    #[serde(default)]
    pub selector: Option<String>,

    /// Per-source browser wait override, seconds
    #[serde(default)]
    pub wait_timeout: Option<u64>,

    /// Per-source browser page load override, seconds
    #[serde(default)]
    pub page_load_timeout: Option<u64>,

    /// Primary API timestamp field
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    /// API response format
    #[serde(default)]
    pub response_format: ResponseFormat,

    /// Additional API fields tried after `timestamp_field`
    #[serde(default)]
    pub fallback_fields: Vec<String>,

    /// Regex patterns for scrape methods
    #[serde(default)]
    pub date_patterns: Vec<String>,

    /// Command template for the cli method (`{url}` is substituted)
    #[serde(default)]
    pub command: Option<String>,

    /// Preferred HTTP method for the api method
    #[serde(default)]
    pub http_method: Option<String>,
}

fn default_timestamp_field() -> String {
    "updated_at".to_string()
}

impl Default for SourceDescriptor {
    fn default() -> Self {
        Self {
            id: String::new(),
            import_name: None,
            method: String::new(),
            data_url: String::new(),
            script_url: None,
            selector: None,
            wait_timeout: None,
            page_load_timeout: None,
            timestamp_field: default_timestamp_field(),
            response_format: ResponseFormat::default(),
            fallback_fields: Vec::new(),
            date_patterns: Vec::new(),
            command: None,
            http_method: None,
        }
    }
}

impl SourceDescriptor {
    /// Create a descriptor with the required fields set
    pub fn new(id: impl Into<String>, method: Method, data_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method: method.as_str().to_string(),
            data_url: data_url.into(),
            ..Default::default()
        }
    }

    /// Name used in reports and prompts
    pub fn display_name(&self) -> &str {
        self.import_name.as_deref().unwrap_or(&self.id)
    }

    /// Resolve the configured method tag
    pub fn resolved_method(&self) -> Option<Method> {
        Method::parse(&self.method)
    }

    /// API fields to probe, in priority order
    pub fn api_fields(&self) -> Vec<String> {
        let fallbacks: Vec<String> = if self.fallback_fields.is_empty() {
            DEFAULT_FALLBACK_FIELDS.iter().map(|f| f.to_string()).collect()
        } else {
            self.fallback_fields.clone()
        };

        let mut fields = vec![self.timestamp_field.clone()];
        for field in fallbacks {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        fields
    }

    /// Configured CSS selectors, split on commas
    pub fn selectors(&self) -> Vec<String> {
        self.selector
            .as_deref()
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Persisted per-source state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    /// Last observed update time
    pub timestamp: DateTime<Utc>,

    /// Raw value the timestamp was parsed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_value: Option<String>,

    /// Entity tag, when the source exposed one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// When the source was last checked
    pub last_check: DateTime<Utc>,
}

/// Outcome of an authenticity check on an extracted timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    /// `None` when the verifier could not decide
    pub is_verified: Option<bool>,

    /// Confidence in `[0, 1]`
    pub confidence: f64,

    /// Short explanation
    pub reasoning: String,

    /// Timestamp the verifier believes is correct, if different
    pub suggested_alternative: Option<String>,
}

impl Verification {
    /// Unknown outcome with zero confidence
    pub fn unknown(reasoning: impl Into<String>) -> Self {
        Self {
            is_verified: None,
            confidence: 0.0,
            reasoning: reasoning.into(),
            suggested_alternative: None,
        }
    }
}

/// Classification of a check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Updated,
    Unchanged,
    Error,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of checking one source
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub id: String,
    pub import_name: Option<String>,
    pub data_url: Option<String>,
    pub script_url: Option<String>,
    pub method: Option<String>,
    pub changed: bool,
    pub current_timestamp: Option<DateTime<Utc>>,
    pub previous_timestamp: Option<DateTime<Utc>>,
    pub raw_value: Option<String>,
    pub error: Option<String>,
    pub check_time: DateTime<Utc>,
    pub verification: Option<Verification>,
}

impl CheckResult {
    /// Empty result for an id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            import_name: None,
            data_url: None,
            script_url: None,
            method: None,
            changed: false,
            current_timestamp: None,
            previous_timestamp: None,
            raw_value: None,
            error: None,
            check_time: Utc::now(),
            verification: None,
        }
    }

    /// Result pre-filled with descriptor metadata
    pub fn for_source(source: &SourceDescriptor) -> Self {
        Self {
            import_name: Some(source.display_name().to_string()),
            data_url: Some(source.data_url.clone()),
            script_url: source.script_url.clone(),
            method: Some(source.method.clone()),
            ..Self::new(&source.id)
        }
    }

    /// Attach a terminal error
    pub fn with_error(mut self, error: CheckError) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn status(&self) -> CheckStatus {
        if self.error.is_some() {
            CheckStatus::Error
        } else if self.changed {
            CheckStatus::Updated
        } else {
            CheckStatus::Unchanged
        }
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.status())?;
        if let Some(ts) = self.current_timestamp {
            write!(f, " current={}", ts.to_rfc3339())?;
        }
        if let Some(ts) = self.previous_timestamp {
            write!(f, " previous={}", ts.to_rfc3339())?;
        }
        if let Some(error) = &self.error {
            write!(f, " error={error}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse_roundtrip() {
        for method in Method::all() {
            assert_eq!(Method::parse(method.as_str()), Some(method));
        }
        assert_eq!(Method::parse("BeautifulSoup"), Some(Method::BeautifulSoup));
        assert_eq!(Method::parse("ftp"), None);
    }

    #[test]
    fn test_descriptor_defaults_from_yaml() {
        let yaml = "method: api\ndata_url: https://example.com/meta.json\n";
        let desc: SourceDescriptor = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(desc.timestamp_field, "updated_at");
        assert_eq!(desc.response_format, ResponseFormat::Json);
        assert_eq!(desc.resolved_method(), Some(Method::Api));
        assert_eq!(desc.api_fields()[0], "updated_at");
        assert_eq!(desc.api_fields().len(), 1 + DEFAULT_FALLBACK_FIELDS.len());
    }

    #[test]
    fn test_unknown_response_format() {
        let yaml = "method: api\nresponse_format: protobuf\n";
        let desc: SourceDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(desc.response_format, ResponseFormat::Unsupported);
    }

    #[test]
    fn test_configured_fallback_fields_replace_defaults() {
        let desc = SourceDescriptor {
            timestamp_field: "modified".into(),
            fallback_fields: vec!["issued".into()],
            ..Default::default()
        };
        assert_eq!(desc.api_fields(), vec!["modified", "issued"]);
    }

    #[test]
    fn test_selectors_split() {
        let desc = SourceDescriptor {
            selector: Some(".updated, #last-mod ,".into()),
            ..Default::default()
        };
        assert_eq!(desc.selectors(), vec![".updated", "#last-mod"]);
    }

    #[test]
    fn test_check_result_status() {
        let mut result = CheckResult::new("a");
        assert_eq!(result.status(), CheckStatus::Unchanged);

        result.changed = true;
        assert_eq!(result.status(), CheckStatus::Updated);

        let result = result.with_error(CheckError::SourceNotFound("a".into()));
        assert_eq!(result.status(), CheckStatus::Error);
        assert!(!result.is_success());
        assert!(result.to_string().contains("error=Source not found: a"));
    }
}
