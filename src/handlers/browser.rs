//! Headless browser render for script-driven pages
//!
//! Launches Chrome/Chromium with `--dump-dom` in a throwaway profile and
//! runs the markup cascade over the rendered DOM, followed by page-text
//! and embedded-JSON fallbacks. Only dates from [`MIN_PLAUSIBLE_YEAR`] up
//! to now are accepted.
//!
//! [`MIN_PLAUSIBLE_YEAR`]: crate::parser::selectors::MIN_PLAUSIBLE_YEAR

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{FetchRecord, HandlerContext, SourceHandler};
use crate::config::BrowserSettings;
use crate::models::{Method, SourceDescriptor};
use crate::parser::{visible_text, DateParser, MarkupExtractor, SanityBounds};
use crate::utils::error::FetchError;
use crate::utils::parse_http_url;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Renders a page in a headless browser and extracts its update date
pub struct BrowserHandler {
    source: Arc<SourceDescriptor>,
    browser: BrowserSettings,
    parser: DateParser,
    retry: RetryConfig,
    record: FetchRecord,
}

impl BrowserHandler {
    pub fn new(source: Arc<SourceDescriptor>, context: &HandlerContext) -> Self {
        Self {
            source,
            browser: context.settings.selenium.clone(),
            parser: context.parser,
            retry: context.settings.retry_config(),
            record: FetchRecord::default(),
        }
    }

    /// Seconds the page may take to load
    fn page_load_timeout(&self) -> u64 {
        self.source
            .page_load_timeout
            .unwrap_or(self.browser.page_load_timeout)
    }

    /// Seconds scripts get to settle before the DOM is dumped
    fn wait_timeout(&self) -> u64 {
        self.source.wait_timeout.unwrap_or(self.browser.wait_timeout)
    }

    /// Command-line arguments for one render
    pub fn browser_args(&self, profile_dir: &std::path::Path, url: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(9);
        if self.browser.headless {
            args.push("--headless=new".to_string());
        }
        args.extend([
            "--no-sandbox".to_string(),
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
            format!("--user-data-dir={}", profile_dir.display()),
            format!("--timeout={}", self.page_load_timeout() * 1000),
            format!("--virtual-time-budget={}", self.wait_timeout() * 1000),
            "--dump-dom".to_string(),
            url.to_string(),
        ]);
        args
    }

    /// Launch the browser once and return the rendered DOM
    async fn render_once(&self, binary: &str, url: &str) -> Result<String, FetchError> {
        // The profile directory is removed when this guard drops.
        let profile = tempfile::tempdir()?;
        let limit = self.page_load_timeout() + self.wait_timeout();

        let mut command = Command::new(binary);
        command
            .args(self.browser_args(profile.path(), url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(limit), command.output())
            .await
            .map_err(|_| FetchError::Timeout(limit))??;

        if !output.status.success() {
            return Err(FetchError::CommandFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Err(FetchError::Browser("empty DOM output".to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn extract(&mut self, dom: &str) -> Option<DateTime<Utc>> {
        let mut extractor = MarkupExtractor::new(
            self.parser,
            &self.source.selectors(),
            &self.source.date_patterns,
        )
        .with_bounds(SanityBounds::plausible());

        match extractor.extract_rendered(dom) {
            Some(extraction) => {
                debug!(
                    source = %self.source.id,
                    strategy = extraction.strategy.as_str(),
                    "Extracted update date from rendered page"
                );
                self.record.raw_value = Some(extraction.raw_value);
                Some(extraction.timestamp)
            }
            None => {
                warn!(source = %self.source.id, "Could not find update date on rendered page");
                self.record.raw_value = extractor.last_attempt().map(str::to_string);
                None
            }
        }
    }
}

fn is_missing_binary(error: &FetchError) -> bool {
    matches!(error, FetchError::Process(e) if e.kind() == ErrorKind::NotFound)
}

#[async_trait]
impl SourceHandler for BrowserHandler {
    fn method(&self) -> Method {
        Method::Selenium
    }

    async fn fetch(&mut self) -> Option<DateTime<Utc>> {
        self.record.reset();

        let url = match parse_http_url(&self.source.data_url) {
            Ok(url) => url.to_string(),
            Err(e) => {
                let id = self.source.id.clone();
                self.record.fail(&id, e);
                return None;
            }
        };

        let binary = self.browser.chrome_binary();
        info!(source = %self.source.id, browser = %binary, "Rendering page");

        let this: &Self = self;
        let rendered = with_retry_if(
            &this.retry,
            |_| this.render_once(&binary, &url),
            |e| e.is_recoverable() && !is_missing_binary(e),
        )
        .await;

        let dom = match rendered {
            Ok(dom) => dom,
            Err(e) => {
                let id = self.source.id.clone();
                if is_missing_binary(&e) {
                    self.record
                        .fail(&id, FetchError::Browser(format!("browser not available: {binary}")));
                } else {
                    self.record.fail(&id, e);
                }
                return None;
            }
        };

        let timestamp = self.extract(&dom);
        self.record.content = Some(visible_text(&dom));
        timestamp
    }

    fn raw_value(&self) -> Option<&str> {
        self.record.raw_value.as_deref()
    }

    fn content(&self) -> Option<&str> {
        self.record.content.as_deref()
    }

    fn last_error(&self) -> Option<&str> {
        self.record.last_error.as_deref()
    }
}
