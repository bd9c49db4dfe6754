//! Static HTML scrape

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method as HttpMethod;
use std::sync::Arc;
use tracing::{debug, warn};

use super::http::ACCEPT_HTML;
use super::{FetchRecord, HandlerContext, HttpFetcher, SourceHandler};
use crate::models::{Method, SourceDescriptor};
use crate::parser::{visible_text, DateParser, MarkupExtractor};

/// Fetches a page once and runs the markup cascade over it
pub struct StaticPageHandler {
    source: Arc<SourceDescriptor>,
    http: HttpFetcher,
    parser: DateParser,
    record: FetchRecord,
}

impl StaticPageHandler {
    pub fn new(source: Arc<SourceDescriptor>, context: &HandlerContext) -> Self {
        Self {
            source,
            http: context.http(),
            parser: context.parser,
            record: FetchRecord::default(),
        }
    }

    fn extract(&mut self, markup: &str) -> Option<DateTime<Utc>> {
        let mut extractor = MarkupExtractor::new(
            self.parser,
            &self.source.selectors(),
            &self.source.date_patterns,
        );

        let found = extractor.extract(markup);
        match found {
            Some(extraction) => {
                debug!(
                    source = %self.source.id,
                    strategy = extraction.strategy.as_str(),
                    "Extracted update date"
                );
                self.record.raw_value = Some(extraction.raw_value);
                Some(extraction.timestamp)
            }
            None => {
                warn!(source = %self.source.id, "Could not find update date on page");
                self.record.raw_value = extractor.last_attempt().map(str::to_string);
                None
            }
        }
    }
}

#[async_trait]
impl SourceHandler for StaticPageHandler {
    fn method(&self) -> Method {
        Method::BeautifulSoup
    }

    async fn fetch(&mut self) -> Option<DateTime<Utc>> {
        self.record.reset();

        if self.source.data_url.is_empty() {
            let id = self.source.id.clone();
            self.record.fail(&id, "no data_url configured");
            return None;
        }

        let body = match self
            .http
            .send(HttpMethod::GET, &self.source.data_url, Some(ACCEPT_HTML))
            .await
        {
            Ok(response) => response.text().await,
            Err(e) => {
                let id = self.source.id.clone();
                self.record.fail(&id, e);
                return None;
            }
        };

        let markup = match body {
            Ok(markup) => markup,
            Err(e) => {
                let id = self.source.id.clone();
                self.record.fail(&id, e);
                return None;
            }
        };

        let timestamp = self.extract(&markup);
        self.record.content = Some(visible_text(&markup));
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
