//! Source registry and method dispatch
//!
//! Holds the configured sources in file order and a dispatch table from
//! [`Method`] to handler constructor, built once at construction.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::config::{load_sources, Settings};
use crate::handlers::{
    BrowserHandler, HandlerContext, HeaderProbeCliHandler, HttpHeadHandler, MetadataApiHandler,
    SourceHandler, StaticPageHandler,
};
use crate::models::{Method, SourceDescriptor};
use crate::utils::error::CheckError;

/// Builds a handler for one source
pub type HandlerConstructor =
    Arc<dyn Fn(Arc<SourceDescriptor>, &HandlerContext) -> Box<dyn SourceHandler> + Send + Sync>;

/// Configured sources plus the handler dispatch table
pub struct Registry {
    sources: Vec<Arc<SourceDescriptor>>,
    index: HashMap<String, usize>,
    dispatch: HashMap<Method, HandlerConstructor>,
    context: HandlerContext,
}

impl Registry {
    /// Create a registry over the given sources
    ///
    /// Later duplicates of an id replace earlier ones in place.
    pub fn new(sources: Vec<SourceDescriptor>, settings: Settings) -> crate::Result<Self> {
        let context = HandlerContext::new(settings)?;

        let mut registry = Self {
            sources: Vec::with_capacity(sources.len()),
            index: HashMap::new(),
            dispatch: default_dispatch(),
            context,
        };

        for source in sources {
            match registry.index.get(&source.id) {
                Some(&position) => {
                    tracing::warn!(source = %source.id, "Duplicate source id, keeping the last one");
                    registry.sources[position] = Arc::new(source);
                }
                None => {
                    registry.index.insert(source.id.clone(), registry.sources.len());
                    registry.sources.push(Arc::new(source));
                }
            }
        }

        Ok(registry)
    }

    /// Load sources from a YAML file
    pub fn from_file(path: &Path, settings: Settings) -> anyhow::Result<Self> {
        let sources = load_sources(path)?;
        Self::new(sources, settings).context("Failed to initialise source registry")
    }

    /// Replace the constructor used for a method
    pub fn register<F>(&mut self, method: Method, constructor: F)
    where
        F: Fn(Arc<SourceDescriptor>, &HandlerContext) -> Box<dyn SourceHandler>
            + Send
            + Sync
            + 'static,
    {
        self.dispatch.insert(method, Arc::new(constructor));
    }

    /// Look up a source by id
    pub fn get_source(&self, id: &str) -> Option<&Arc<SourceDescriptor>> {
        self.index.get(id).map(|&position| &self.sources[position])
    }

    /// Source ids in configuration order
    pub fn list_sources(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id.as_str()).collect()
    }

    /// All sources in configuration order
    pub fn sources(&self) -> &[Arc<SourceDescriptor>] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn settings(&self) -> &Settings {
        &self.context.settings
    }

    /// Build a fresh handler for a source
    pub fn create_handler(
        &self,
        source: &Arc<SourceDescriptor>,
    ) -> Result<Box<dyn SourceHandler>, CheckError> {
        let unsupported = || CheckError::UnsupportedMethod {
            id: source.id.clone(),
            method: source.method.clone(),
        };

        let method = source.resolved_method().ok_or_else(unsupported)?;
        let constructor = self.dispatch.get(&method).ok_or_else(unsupported)?;

        Ok(constructor(Arc::clone(source), &self.context))
    }
}

fn constructor<H, F>(build: F) -> HandlerConstructor
where
    H: SourceHandler + 'static,
    F: Fn(Arc<SourceDescriptor>, &HandlerContext) -> H + Send + Sync + 'static,
{
    Arc::new(
        move |source: Arc<SourceDescriptor>, context: &HandlerContext| -> Box<dyn SourceHandler> {
            Box::new(build(source, context))
        },
    )
}

fn default_dispatch() -> HashMap<Method, HandlerConstructor> {
    HashMap::from([
        (Method::HttpHead, constructor(HttpHeadHandler::new)),
        (Method::Api, constructor(MetadataApiHandler::new)),
        (Method::BeautifulSoup, constructor(StaticPageHandler::new)),
        (Method::Cli, constructor(HeaderProbeCliHandler::new)),
        (Method::Selenium, constructor(BrowserHandler::new)),
    ])
}
