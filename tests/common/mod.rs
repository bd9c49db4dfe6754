//! Common test utilities

use std::sync::Arc;

use sentinel::config::Settings;
use sentinel::handlers::HandlerContext;
use sentinel::models::{Method, SourceDescriptor};

/// Settings with short timeouts and a fast fixed retry delay
pub fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.http.timeout = 5;
    settings.http.max_retries = 3;
    settings.http.retry_delay_ms = 10;
    settings
}

/// Handler context over [`fast_settings`]
#[allow(dead_code)]
pub fn context() -> HandlerContext {
    HandlerContext::new(fast_settings()).expect("Failed to build handler context")
}

/// Shared descriptor for a source served under `base`
#[allow(dead_code)]
pub fn source(id: &str, method: Method, base: &str, path: &str) -> Arc<SourceDescriptor> {
    Arc::new(SourceDescriptor::new(id, method, format!("{base}{path}")))
}
