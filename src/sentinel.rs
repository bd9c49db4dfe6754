//! Check orchestration
//!
//! [`Sentinel`] drives one check per source: resolve the descriptor, build
//! its handler, fetch with panic isolation, diff against the stored
//! instant, persist, then optionally ask the verifier. Nothing here raises;
//! every failure ends up on the returned [`CheckResult`].

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{CheckResult, SourceDescriptor};
use crate::registry::Registry;
use crate::storage::StateManager;
use crate::utils::error::CheckError;
use crate::verifier::{VerificationRequest, Verifier};

/// Update detector over a registry of sources
pub struct Sentinel {
    registry: Registry,
    state: Arc<StateManager>,
    verifier: Option<Arc<dyn Verifier>>,
    max_concurrent: usize,
}

impl Sentinel {
    /// Create a sentinel without verification
    pub fn new(registry: Registry, state: Arc<StateManager>) -> Self {
        let max_concurrent = registry.settings().concurrency.max_concurrent_checks.max(1);
        Self {
            registry,
            state,
            verifier: None,
            max_concurrent,
        }
    }

    /// Verify every extracted timestamp with the given verifier
    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Override how many sources are checked at once
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Check one source by id
    pub async fn check_for_updates(&self, id: &str) -> CheckResult {
        match self.registry.get_source(id) {
            Some(source) => self.check_source(source).await,
            None => {
                warn!(source = %id, "Unknown source id");
                CheckResult::new(id).with_error(CheckError::SourceNotFound(id.to_string()))
            }
        }
    }

    /// Check every configured source; results follow configuration order
    pub async fn check_all_sources(&self) -> Vec<CheckResult> {
        info!(
            sources = self.registry.len(),
            concurrency = self.max_concurrent,
            "Checking all sources"
        );

        let results: Vec<CheckResult> = stream::iter(self.registry.sources())
            .map(|source| self.check_source(source))
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let updated = results.iter().filter(|r| r.changed).count();
        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(total = results.len(), updated, failed, "Check run complete");

        results
    }

    async fn check_source(&self, source: &Arc<SourceDescriptor>) -> CheckResult {
        let mut result = CheckResult::for_source(source);

        let mut handler = match self.registry.create_handler(source) {
            Ok(handler) => handler,
            Err(e) => {
                warn!(source = %source.id, error = %e, "Cannot check source");
                return result.with_error(e);
            }
        };

        debug!(source = %source.id, method = handler.method_name(), "Fetching");

        let current = match AssertUnwindSafe(handler.fetch()).catch_unwind().await {
            Ok(current) => current,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(source = %source.id, panic = %message, "Handler panicked");
                return result.with_error(CheckError::HandlerPanicked {
                    id: source.id.clone(),
                    message,
                });
            }
        };

        let previous = self.state.get_last_timestamp(&source.id);
        result.current_timestamp = current;
        result.previous_timestamp = previous;
        result.raw_value = handler.raw_value().map(str::to_string);
        result.changed = handler.compare_with_stored(current, previous);

        let Some(timestamp) = current else {
            if let Some(error) = handler.last_error() {
                return result.with_error(CheckError::FetchFailed(error.to_string()));
            }
            info!(source = %source.id, "No update date found");
            return result;
        };

        self.state
            .update_timestamp(&source.id, timestamp, handler.raw_value(), handler.etag());

        if result.changed {
            info!(
                source = %source.id,
                current = %timestamp,
                previous = ?previous,
                "Source updated"
            );
        } else {
            info!(source = %source.id, current = %timestamp, "Source unchanged");
        }

        if let Some(verifier) = &self.verifier {
            let extracted = handler
                .raw_value()
                .map(str::to_string)
                .unwrap_or_else(|| timestamp.to_rfc3339());
            let content = handler.content().unwrap_or(extracted.as_str());

            let request = VerificationRequest {
                extracted_timestamp: &extracted,
                content,
                source_name: source.display_name(),
                data_url: &source.data_url,
            };
            let verification = verifier.verify(&request).await;
            debug!(
                source = %source.id,
                verifier = verifier.name(),
                verified = ?verification.is_verified,
                "Verification merged"
            );
            result.verification = Some(verification);
        }

        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
