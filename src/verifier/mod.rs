//! Timestamp authenticity verification
//!
//! A [`Verifier`] asks an external reasoning service whether an extracted
//! value really is the source's last-update date. [`GroqVerifier`] talks
//! to an OpenAI-compatible chat completions API; [`UnavailableVerifier`]
//! stands in when no credentials are configured. Verification never fails
//! a check: every problem degrades to an "unknown" outcome.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::VerificationSettings;
use crate::error::Error;
use crate::models::Verification;
use crate::utils::truncate_chars;

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

/// Appended to page content cut at the length cap
pub const TRUNCATION_MARKER: &str = "\n... [content truncated]";

/// Characters of an unparseable reply kept as reasoning
const FALLBACK_REASONING_CHARS: usize = 500;

const SYSTEM_PROMPT: &str = r#"You check whether a timestamp extracted from a data source is the date the data was last updated or modified.

Look at the supplied content and decide:
1. whether the extracted timestamp is that last-updated date
2. how confident you are, from 0.0 to 1.0
3. the correct timestamp if the extracted one is wrong

Reply with JSON only, in exactly this shape:
{
    "is_verified": true or false,
    "confidence": 0.0 to 1.0,
    "reasoning": "one or two sentences",
    "correct_timestamp": "YYYY-MM-DD HH:MM:SS, or null when the extracted one is right"
}"#;

lazy_static! {
    static ref JSON_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").expect("Invalid JSON object pattern");
}

/// Everything a verifier is told about one extraction
#[derive(Debug, Clone, Copy)]
pub struct VerificationRequest<'a> {
    pub extracted_timestamp: &'a str,
    pub content: &'a str,
    pub source_name: &'a str,
    pub data_url: &'a str,
}

/// Checks extracted timestamps against page content
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Whether verification can actually be attempted
    fn is_available(&self) -> bool;

    /// Verify one extraction; never fails
    async fn verify(&self, request: &VerificationRequest<'_>) -> Verification;
}

/// Configuration for the chat-completions verifier
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// API base URL, `/chat/completions` is appended
    pub endpoint: String,

    /// Model name
    pub model: String,

    /// Bearer token
    pub api_key: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Cap on page content included in the prompt
    pub max_content_chars: usize,

    /// Sampling temperature
    pub temperature: f32,

    /// Reply length cap
    pub max_tokens: u32,
}

impl VerifierConfig {
    /// Build from settings and an API key
    pub fn new(settings: &VerificationSettings, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: api_key.into(),
            timeout_secs: settings.timeout,
            max_content_chars: settings.max_content_chars,
            temperature: 0.1,
            max_tokens: 500,
        }
    }
}

/// Chat completions request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Chat completions response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Structured verdict expected from the model
#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(default)]
    is_verified: Option<bool>,
    #[serde(default)]
    confidence: serde_json::Value,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    correct_timestamp: Option<String>,
}

/// Verifier backed by the Groq chat completions API
pub struct GroqVerifier {
    client: Client,
    config: VerifierConfig,
}

impl GroqVerifier {
    /// Create a new verifier with custom config
    pub fn with_config(config: VerifierConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::with_source("Failed to create HTTP client", e))?;

        Ok(Self { client, config })
    }

    /// Build the user prompt for one extraction
    pub fn build_prompt(&self, request: &VerificationRequest<'_>) -> String {
        let (content, truncated) = truncate_chars(request.content, self.config.max_content_chars);
        let marker = if truncated { TRUNCATION_MARKER } else { "" };

        format!(
            r#"Check whether this extracted timestamp is correct.

Data source: {name}
URL: {url}
Extracted timestamp: {timestamp}

Page content:
```
{content}{marker}
```

Is "{timestamp}" the date this data was last updated? Look for labels such as
"Last Updated", "Last Modified", "Updated on", "Data as of", "Release Date",
"Published", date meta tags, or any other sign of when the data last changed.

Answer in the JSON shape described."#,
            name = request.source_name,
            url = request.data_url,
            timestamp = request.extracted_timestamp,
        )
    }

    async fn complete(&self, prompt: &str) -> crate::Result<String> {
        let url = format!("{}/chat/completions", self.config.endpoint);
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (body, _) = truncate_chars(&body, 200);
            return Err(Error::Verification(format!("request failed: {status} - {body}")));
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Verification("empty completion".to_string()))
    }
}

/// Turn a model reply into a verification outcome
pub fn parse_reply(reply: &str) -> Verification {
    let verdict = JSON_OBJECT
        .find(reply)
        .and_then(|m| match serde_json::from_str::<Verdict>(m.as_str()) {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse verifier JSON reply");
                None
            }
        });

    let Some(verdict) = verdict else {
        let (reasoning, _) = truncate_chars(reply, FALLBACK_REASONING_CHARS);
        return Verification::unknown(reasoning);
    };

    let confidence = match &verdict.confidence {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };

    Verification {
        is_verified: verdict.is_verified,
        confidence: if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        },
        reasoning: verdict.reasoning.unwrap_or_default(),
        suggested_alternative: verdict
            .correct_timestamp
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null")),
    }
}

#[async_trait]
impl Verifier for GroqVerifier {
    fn name(&self) -> &'static str {
        "groq"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn verify(&self, request: &VerificationRequest<'_>) -> Verification {
        let prompt = self.build_prompt(request);

        match self.complete(&prompt).await {
            Ok(reply) => {
                let outcome = parse_reply(&reply);
                tracing::debug!(
                    source = request.source_name,
                    verified = ?outcome.is_verified,
                    confidence = outcome.confidence,
                    "Verification complete"
                );
                outcome
            }
            Err(e) => {
                tracing::error!(source = request.source_name, error = %e, "Verification call failed");
                Verification::unknown(format!("API call failed: {e}"))
            }
        }
    }
}

/// Verifier used when no reasoning service is configured
#[derive(Debug, Clone)]
pub struct UnavailableVerifier {
    reason: String,
}

impl UnavailableVerifier {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Verifier for UnavailableVerifier {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn verify(&self, _request: &VerificationRequest<'_>) -> Verification {
        Verification::unknown(self.reason.clone())
    }
}

/// Choose the verifier once, from settings and the `GROQ_API_KEY` variable
pub fn build_verifier(settings: &VerificationSettings) -> Arc<dyn Verifier> {
    let api_key = std::env::var(API_KEY_ENV)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());

    let Some(api_key) = api_key else {
        tracing::warn!("{API_KEY_ENV} not set, timestamp verification unavailable");
        return Arc::new(UnavailableVerifier::new(format!("{API_KEY_ENV} not configured")));
    };

    match GroqVerifier::with_config(VerifierConfig::new(settings, api_key)) {
        Ok(verifier) => {
            tracing::info!(model = %settings.model, "Timestamp verification enabled");
            Arc::new(verifier)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not create verifier");
            Arc::new(UnavailableVerifier::new(format!("verifier unavailable: {e}")))
        }
    }
}
