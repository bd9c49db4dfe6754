//! Metadata API handler (JSON or XML bodies)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method as HttpMethod;
use std::sync::Arc;
use tracing::{debug, warn};

use super::head::last_modified_from_headers;
use super::{FetchRecord, HandlerContext, HttpFetcher, SourceHandler};
use crate::models::{Method, ResponseFormat, SourceDescriptor};
use crate::parser::{find_json_field, find_xml_field, DateParser, FieldMatch};
use crate::utils::error::FetchError;

const ACCEPT_JSON: &str = "application/json";
const ACCEPT_XML: &str = "application/xml, text/xml;q=0.9";

/// Queries a metadata endpoint and reads a timestamp field from the body
///
/// The configured HTTP method is tried first, then the remaining ones of
/// GET, HEAD, POST. A 405 or a failed request moves on to the next method.
pub struct MetadataApiHandler {
    source: Arc<SourceDescriptor>,
    http: HttpFetcher,
    parser: DateParser,
    record: FetchRecord,
}

impl MetadataApiHandler {
    pub fn new(source: Arc<SourceDescriptor>, context: &HandlerContext) -> Self {
        Self {
            source,
            http: context.http(),
            parser: context.parser,
            record: FetchRecord::default(),
        }
    }

    /// Methods to try, configured one first
    pub fn methods_to_try(&self) -> Vec<HttpMethod> {
        let preferred = self
            .source
            .http_method
            .as_deref()
            .and_then(|m| HttpMethod::from_bytes(m.trim().to_uppercase().as_bytes()).ok())
            .unwrap_or(HttpMethod::GET);

        let mut methods = vec![preferred];
        for method in [HttpMethod::GET, HttpMethod::HEAD, HttpMethod::POST] {
            if !methods.contains(&method) {
                methods.push(method);
            }
        }
        methods
    }

    fn accept_header(&self) -> &'static str {
        match self.source.response_format {
            ResponseFormat::Xml => ACCEPT_XML,
            _ => ACCEPT_JSON,
        }
    }

    /// Extract a timestamp from a response body
    fn parse_body(&mut self, body: &str) -> Option<DateTime<Utc>> {
        let id = self.source.id.as_str();
        let fields = self.source.api_fields();

        let found: Option<FieldMatch> = match self.source.response_format {
            ResponseFormat::Json => match serde_json::from_str::<serde_json::Value>(body) {
                Ok(data) => find_json_field(&data, &fields, &self.parser),
                Err(e) => {
                    warn!(source = id, error = %e, "Response body is not valid JSON");
                    None
                }
            },
            ResponseFormat::Xml => match find_xml_field(body, &fields, &self.parser) {
                Ok(found) => found,
                Err(e) => {
                    warn!(source = id, error = %e, "Response body is not valid XML");
                    None
                }
            },
            ResponseFormat::Unsupported => {
                warn!(source = id, "Unsupported response format");
                None
            }
        };

        let Some(found) = found else {
            warn!(source = id, fields = ?fields, "No timestamp field found in response");
            return None;
        };

        debug!(source = id, field = %found.field, raw = %found.raw_value, "Found timestamp field");
        self.record.raw_value = Some(found.raw_value);
        found.timestamp
    }
}

#[async_trait]
impl SourceHandler for MetadataApiHandler {
    fn method(&self) -> Method {
        Method::Api
    }

    async fn fetch(&mut self) -> Option<DateTime<Utc>> {
        self.record.reset();

        if self.source.data_url.is_empty() {
            let id = self.source.id.clone();
            self.record.fail(&id, "no data_url configured");
            return None;
        }

        let mut last_failure: Option<FetchError> = None;

        for method in self.methods_to_try() {
            let result = self
                .http
                .send(method.clone(), &self.source.data_url, Some(self.accept_header()))
                .await;

            let response = match result {
                Ok(response) => response,
                Err(FetchError::MethodNotAllowed(_)) => {
                    debug!(source = %self.source.id, method = %method, "Method not allowed, trying next");
                    last_failure = Some(FetchError::MethodNotAllowed(method.to_string()));
                    continue;
                }
                Err(e) => {
                    warn!(source = %self.source.id, method = %method, error = %e, "API request failed, trying next method");
                    last_failure = Some(e);
                    continue;
                }
            };

            self.record.etag = response
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            if method == HttpMethod::HEAD {
                let found = last_modified_from_headers(response.headers(), &self.parser);
                if found.is_none() {
                    debug!(source = %self.source.id, "HEAD response has no usable Last-Modified");
                }
                return found.map(|(timestamp, raw)| {
                    self.record.raw_value = Some(raw);
                    timestamp
                });
            }

            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    last_failure = Some(FetchError::Http(e));
                    continue;
                }
            };

            let timestamp = self.parse_body(&body);
            self.record.content = Some(body);
            return timestamp;
        }

        if let Some(e) = last_failure {
            let id = self.source.id.clone();
            self.record.fail(&id, e);
        }
        None
    }

    fn raw_value(&self) -> Option<&str> {
        self.record.raw_value.as_deref()
    }

    fn etag(&self) -> Option<&str> {
        self.record.etag.as_deref()
    }

    fn content(&self) -> Option<&str> {
        self.record.content.as_deref()
    }

    fn last_error(&self) -> Option<&str> {
        self.record.last_error.as_deref()
    }
}
