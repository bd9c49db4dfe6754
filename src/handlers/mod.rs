//! Per-method retrieval strategies
//!
//! Every source is checked by a [`SourceHandler`] chosen from its method
//! tag. Handlers are constructed fresh for each check and never fail from
//! `fetch`: an unreachable source or an unparseable page yields `None`,
//! with transport failures recorded in [`SourceHandler::last_error`].

pub mod api;
pub mod browser;
pub mod cli;
pub mod head;
pub mod http;
pub mod static_page;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;

use crate::config::Settings;
use crate::models::Method;
use crate::parser::DateParser;

pub use api::MetadataApiHandler;
pub use browser::BrowserHandler;
pub use cli::HeaderProbeCliHandler;
pub use head::HttpHeadHandler;
pub use http::HttpFetcher;
pub use static_page::StaticPageHandler;

/// Capability shared by all retrieval strategies
#[async_trait]
pub trait SourceHandler: Send {
    /// The method this handler implements
    fn method(&self) -> Method;

    /// Configuration tag of the method
    fn method_name(&self) -> &'static str {
        self.method().as_str()
    }

    /// Retrieve the source's last-update time
    async fn fetch(&mut self) -> Option<DateTime<Utc>>;

    /// Raw value behind the last fetch, or the last attempted candidate
    fn raw_value(&self) -> Option<&str>;

    /// Entity tag observed during the last fetch
    fn etag(&self) -> Option<&str> {
        None
    }

    /// Body or rendered page text from the last fetch
    fn content(&self) -> Option<&str> {
        None
    }

    /// Transport failure behind an absent timestamp
    fn last_error(&self) -> Option<&str> {
        None
    }

    /// Decide whether `current` represents an update over `stored`
    fn compare_with_stored(
        &self,
        current: Option<DateTime<Utc>>,
        stored: Option<DateTime<Utc>>,
    ) -> bool {
        is_newer(current, stored)
    }
}

/// Fixed change policy: no current value is never a change, no stored
/// value always is, otherwise strictly later wins.
pub fn is_newer(current: Option<DateTime<Utc>>, stored: Option<DateTime<Utc>>) -> bool {
    match (current, stored) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(current), Some(stored)) => current > stored,
    }
}

/// Shared collaborators handed to handler constructors
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub settings: Arc<Settings>,
    pub client: Client,
    pub parser: DateParser,
}

impl HandlerContext {
    /// Build the context, creating the pooled HTTP client
    pub fn new(settings: Settings) -> Result<Self, crate::utils::error::FetchError> {
        let client = http::build_client(&settings.http)?;
        Ok(Self {
            settings: Arc::new(settings),
            client,
            parser: DateParser::new(),
        })
    }

    /// HTTP requester configured from the settings
    pub fn http(&self) -> HttpFetcher {
        HttpFetcher::new(self.client.clone(), &self.settings)
    }
}

/// Observations a handler accumulates during one fetch
#[derive(Debug, Default, Clone)]
pub(crate) struct FetchRecord {
    pub raw_value: Option<String>,
    pub etag: Option<String>,
    pub content: Option<String>,
    pub last_error: Option<String>,
}

impl FetchRecord {
    /// Forget the previous fetch
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn fail(&mut self, source: &str, error: impl std::fmt::Display) {
        tracing::warn!(source = source, error = %error, "Fetch failed");
        self.last_error = Some(error.to_string());
    }
}
