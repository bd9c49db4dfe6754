//! HEAD-request probe of a resource's headers

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, DATE, ETAG, LAST_MODIFIED};
use reqwest::Method as HttpMethod;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{FetchRecord, HandlerContext, HttpFetcher, SourceHandler};
use crate::models::{Method, SourceDescriptor};
use crate::parser::DateParser;

/// Reads `Last-Modified` (falling back to `Date`) from a HEAD response
pub struct HttpHeadHandler {
    source: Arc<SourceDescriptor>,
    http: HttpFetcher,
    parser: DateParser,
    record: FetchRecord,
}

impl HttpHeadHandler {
    pub fn new(source: Arc<SourceDescriptor>, context: &HandlerContext) -> Self {
        Self {
            source,
            http: context.http(),
            parser: context.parser,
            record: FetchRecord::default(),
        }
    }
}

/// Timestamp from `Last-Modified`, else `Date`, with the header text it came from
pub(crate) fn timestamp_from_headers(
    headers: &HeaderMap,
    parser: &DateParser,
) -> Option<(DateTime<Utc>, String)> {
    [LAST_MODIFIED, DATE]
        .into_iter()
        .find_map(|name| header_timestamp(headers, name, parser))
}

/// Timestamp from `Last-Modified` only
///
/// `Date` is the server clock at response time, not a modification time.
pub(crate) fn last_modified_from_headers(
    headers: &HeaderMap,
    parser: &DateParser,
) -> Option<(DateTime<Utc>, String)> {
    header_timestamp(headers, LAST_MODIFIED, parser)
}

fn header_timestamp(
    headers: &HeaderMap,
    name: HeaderName,
    parser: &DateParser,
) -> Option<(DateTime<Utc>, String)> {
    let value = headers.get(&name)?.to_str().ok()?.trim().to_string();
    let timestamp = parser.parse(&value)?;
    debug!(header = %name, value = %value, "Using header timestamp");
    Some((timestamp, value))
}

#[async_trait]
impl SourceHandler for HttpHeadHandler {
    fn method(&self) -> Method {
        Method::HttpHead
    }

    async fn fetch(&mut self) -> Option<DateTime<Utc>> {
        self.record.reset();
        let id = self.source.id.as_str();

        if self.source.data_url.is_empty() {
            self.record.fail(id, "no data_url configured");
            return None;
        }

        let response = match self
            .http
            .send(HttpMethod::HEAD, &self.source.data_url, None)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.record.fail(id, e);
                return None;
            }
        };

        let headers = response.headers();
        self.record.etag = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match timestamp_from_headers(headers, &self.parser) {
            Some((timestamp, raw)) => {
                self.record.raw_value = Some(raw);
                Some(timestamp)
            }
            None => {
                warn!(source = id, "No Last-Modified or Date header");
                None
            }
        }
    }

    fn raw_value(&self) -> Option<&str> {
        self.record.raw_value.as_deref()
    }

    fn etag(&self) -> Option<&str> {
        self.record.etag.as_deref()
    }

    fn last_error(&self) -> Option<&str> {
        self.record.last_error.as_deref()
    }
}
