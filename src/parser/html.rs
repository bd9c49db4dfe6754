//! Update-date extraction from HTML markup
//!
//! [`MarkupExtractor`] runs the heuristic cascade shared by the static and
//! browser scrape handlers. The first candidate that parses wins:
//!
//! 1. configured CSS selectors (element text, then `datetime` attribute)
//! 2. `<time>` elements (`datetime` attribute, then text)
//! 3. elements whose class names hint at a date
//! 4. modification-date `<meta>` tags
//! 5. regex patterns over the raw markup
//!
//! Rendered pages additionally fall through to visible-text patterns and
//! date fields in embedded JSON, and can be bounded by [`SanityBounds`].

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, trace};

use super::date::{from_epoch_number, DateParser};
use super::selectors::{
    compile_date_patterns, BODY, CLASSED_ELEMENT, DATE_CLASS_HINTS, EMBEDDED_JSON_PATTERNS,
    META_DATE_TAGS, MIN_PLAUSIBLE_YEAR, PAGE_TEXT_PATTERNS, TIME_ELEMENT,
};
use crate::utils::normalize_whitespace;

/// Cascade step that produced a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Selector,
    TimeElement,
    ClassName,
    MetaTag,
    Pattern,
    PageText,
    EmbeddedJson,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Selector => "selector",
            Self::TimeElement => "time_element",
            Self::ClassName => "class_name",
            Self::MetaTag => "meta_tag",
            Self::Pattern => "pattern",
            Self::PageText => "page_text",
            Self::EmbeddedJson => "embedded_json",
        }
    }
}

/// A timestamp found in markup, with the text it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub timestamp: DateTime<Utc>,
    pub raw_value: String,
    pub strategy: Strategy,
}

/// Plausibility window for dates found on rendered pages
#[derive(Debug, Clone, Copy)]
pub struct SanityBounds {
    pub min_year: i32,
    pub latest: DateTime<Utc>,
}

impl SanityBounds {
    /// Years from [`MIN_PLAUSIBLE_YEAR`] up to now
    pub fn plausible() -> Self {
        Self {
            min_year: MIN_PLAUSIBLE_YEAR,
            latest: Utc::now(),
        }
    }

    pub fn accepts(&self, timestamp: &DateTime<Utc>) -> bool {
        timestamp.year() >= self.min_year && *timestamp <= self.latest
    }
}

/// Heuristic update-date extractor for one source
#[derive(Debug)]
pub struct MarkupExtractor {
    parser: DateParser,
    selectors: Vec<Selector>,
    patterns: Vec<Regex>,
    bounds: Option<SanityBounds>,
    last_attempt: Option<String>,
}

impl MarkupExtractor {
    /// Create an extractor from per-source selectors and patterns
    ///
    /// Invalid selectors and patterns are logged and skipped.
    pub fn new(parser: DateParser, selectors: &[String], patterns: &[String]) -> Self {
        let selectors = selectors
            .iter()
            .filter_map(|s| match Selector::parse(s) {
                Ok(selector) => Some(selector),
                Err(e) => {
                    tracing::warn!(selector = %s, error = %e, "Skipping invalid CSS selector");
                    None
                }
            })
            .collect();

        Self {
            parser,
            selectors,
            patterns: compile_date_patterns(patterns),
            bounds: None,
            last_attempt: None,
        }
    }

    /// Reject candidates outside the given window
    pub fn with_bounds(mut self, bounds: SanityBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// The last candidate text examined, whether or not it parsed
    pub fn last_attempt(&self) -> Option<&str> {
        self.last_attempt.as_deref()
    }

    /// Run the markup cascade over a fetched page
    pub fn extract(&mut self, markup: &str) -> Option<Extraction> {
        let document = Html::parse_document(markup);
        self.extract_from_document(&document, markup)
    }

    /// Run the markup cascade, then the rendered-page fallbacks
    pub fn extract_rendered(&mut self, markup: &str) -> Option<Extraction> {
        let document = Html::parse_document(markup);

        self.extract_from_document(&document, markup)
            .or_else(|| self.in_page_text(&document))
            .or_else(|| self.in_embedded_json(markup))
    }

    fn extract_from_document(&mut self, document: &Html, markup: &str) -> Option<Extraction> {
        let found = self
            .by_selectors(document)
            .or_else(|| self.in_time_elements(document))
            .or_else(|| self.by_class_names(document))
            .or_else(|| self.in_meta_tags(document))
            .or_else(|| self.with_patterns(markup));

        if let Some(extraction) = &found {
            debug!(
                strategy = extraction.strategy.as_str(),
                raw = %extraction.raw_value,
                "Found update date in markup"
            );
        }
        found
    }

    fn by_selectors(&mut self, document: &Html) -> Option<Extraction> {
        let selectors = std::mem::take(&mut self.selectors);
        let found = selectors.iter().find_map(|selector| {
            let element = document.select(selector).next()?;
            self.accept(&element_text(&element), Strategy::Selector)
                .or_else(|| {
                    let attr = element.value().attr("datetime")?;
                    self.accept(attr, Strategy::Selector)
                })
        });
        self.selectors = selectors;
        found
    }

    fn in_time_elements(&mut self, document: &Html) -> Option<Extraction> {
        document.select(&TIME_ELEMENT).find_map(|element| {
            element
                .value()
                .attr("datetime")
                .and_then(|attr| self.accept(attr, Strategy::TimeElement))
                .or_else(|| self.accept(&element_text(&element), Strategy::TimeElement))
        })
    }

    fn by_class_names(&mut self, document: &Html) -> Option<Extraction> {
        DATE_CLASS_HINTS.iter().find_map(|hint| {
            document
                .select(&CLASSED_ELEMENT)
                .filter(|element| {
                    element
                        .value()
                        .classes()
                        .any(|class| class.to_lowercase().contains(hint))
                })
                .find_map(|element| self.accept(&element_text(&element), Strategy::ClassName))
        })
    }

    fn in_meta_tags(&mut self, document: &Html) -> Option<Extraction> {
        META_DATE_TAGS.iter().find_map(|(by_name, by_property)| {
            [by_name, by_property].into_iter().find_map(|selector| {
                let content = document.select(selector).next()?.value().attr("content")?;
                self.accept(content, Strategy::MetaTag)
            })
        })
    }

    fn with_patterns(&mut self, markup: &str) -> Option<Extraction> {
        let patterns = std::mem::take(&mut self.patterns);
        let found = patterns.iter().find_map(|pattern| {
            pattern.captures_iter(markup).find_map(|caps| {
                let candidate = caps.get(1).or_else(|| caps.get(0))?;
                self.accept(candidate.as_str(), Strategy::Pattern)
            })
        });
        self.patterns = patterns;
        found
    }

    fn in_page_text(&mut self, document: &Html) -> Option<Extraction> {
        let body = document.select(&BODY).next()?;
        let text = element_text(&body);

        PAGE_TEXT_PATTERNS.iter().find_map(|pattern| {
            pattern.captures_iter(&text).find_map(|caps| {
                let candidate = caps.get(1)?;
                self.accept(candidate.as_str(), Strategy::PageText)
            })
        })
    }

    fn in_embedded_json(&mut self, markup: &str) -> Option<Extraction> {
        EMBEDDED_JSON_PATTERNS.iter().find_map(|pattern| {
            pattern.captures_iter(markup).find_map(|caps| {
                let candidate = caps.get(1)?.as_str();
                if candidate.chars().all(|c| c.is_ascii_digit()) {
                    let value: f64 = candidate.parse().ok()?;
                    self.accept_timestamp(candidate, from_epoch_number(value)?, Strategy::EmbeddedJson)
                } else {
                    self.accept(candidate, Strategy::EmbeddedJson)
                }
            })
        })
    }

    fn accept(&mut self, candidate: &str, strategy: Strategy) -> Option<Extraction> {
        let candidate = normalize_whitespace(candidate);
        if candidate.is_empty() {
            return None;
        }

        self.last_attempt = Some(candidate.clone());
        let timestamp = self
            .parser
            .parse(&candidate)
            .or_else(|| self.parser.extract_date_from_text(&candidate))?;

        self.accept_timestamp(&candidate, timestamp, strategy)
    }

    fn accept_timestamp(
        &mut self,
        candidate: &str,
        timestamp: DateTime<Utc>,
        strategy: Strategy,
    ) -> Option<Extraction> {
        self.last_attempt = Some(candidate.to_string());

        if let Some(bounds) = &self.bounds {
            if !bounds.accepts(&timestamp) {
                trace!(candidate = candidate, "Date outside plausible range, skipping");
                return None;
            }
        }

        Some(Extraction {
            timestamp,
            raw_value: candidate.to_string(),
            strategy,
        })
    }
}

/// Whitespace-normalized text of a page body
pub fn visible_text(markup: &str) -> String {
    let document = Html::parse_document(markup);
    document
        .select(&BODY)
        .next()
        .map(|body| element_text(&body))
        .unwrap_or_default()
}

fn element_text(element: &ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}
