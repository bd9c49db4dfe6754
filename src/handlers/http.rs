//! Shared HTTP transport for the HTTP-based handlers
//!
//! Wraps a pooled `reqwest::Client` with the fixed-delay retry policy.
//! Transient failures (timeouts, connection errors, 429 and 5xx) are
//! retried; 405 and other client errors are returned at once.

use reqwest::{header::ACCEPT, Client, Method, Response};

use crate::config::{HttpSettings, Settings};
use crate::utils::error::FetchError;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Accept header for HTML pages
pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Build the HTTP client shared by all handlers
///
/// # Errors
///
/// Returns `FetchError::Http` if the HTTP client cannot be created
pub fn build_client(settings: &HttpSettings) -> Result<Client, FetchError> {
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(settings.timeout))
        .user_agent(settings.user_agent.as_str())
        .gzip(true)
        .build()?;

    Ok(client)
}

/// HTTP requester with retry
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    retry: RetryConfig,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(client: Client, settings: &Settings) -> Self {
        Self {
            client,
            retry: settings.retry_config(),
            timeout_secs: settings.http.timeout,
        }
    }

    /// Send a request, retrying transient failures
    ///
    /// POST requests carry an empty JSON object as body.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        accept: Option<&str>,
    ) -> Result<Response, FetchError> {
        with_retry_if(
            &self.retry,
            |attempt| {
                tracing::trace!(method = %method, url = url, attempt = attempt, "Sending request");
                self.send_once(method.clone(), url, accept)
            },
            FetchError::is_recoverable,
        )
        .await
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        accept: Option<&str>,
    ) -> Result<Response, FetchError> {
        let mut request = self.client.request(method.clone(), url);
        if method == Method::POST {
            request = request.json(&serde_json::json!({}));
        }
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err(FetchError::Timeout(self.timeout_secs)),
            Err(e) => return Err(FetchError::Http(e)),
        };

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else if status == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            Err(FetchError::MethodNotAllowed(method.to_string()))
        } else {
            Err(FetchError::ServerError(status.as_u16()))
        }
    }

    /// Determine if a status code should trigger a retry
    ///
    /// Retry on:
    /// - 429 Too Many Requests
    /// - 500 Internal Server Error
    /// - 502 Bad Gateway
    /// - 503 Service Unavailable
    /// - 504 Gateway Timeout
    pub fn should_retry(status: u16) -> bool {
        FetchError::ServerError(status).is_recoverable()
    }
}
