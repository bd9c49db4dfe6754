//! Selectors and patterns for locating update dates in markup
//!
//! These are the fixed heuristics shared by the static and browser scrape
//! handlers. Per-source CSS selectors and regex patterns come from the
//! source configuration and are compiled at extraction time.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::Selector;

// Helper macro to parse selectors safely at compile time
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

macro_rules! parse_regex {
    ($s:expr) => {
        Regex::new($s).expect(concat!("Invalid regex: ", $s))
    };
}

/// Class-name fragments that suggest an element holds a date
pub const DATE_CLASS_HINTS: &[&str] = &["date", "updated", "modified", "last-updated", "timestamp"];

/// Meta tag names (or properties) that carry modification dates
pub const DATE_META_NAMES: &[&str] = &[
    "last-modified",
    "dcterms.modified",
    "article:modified_time",
    "og:updated_time",
    "date",
    "DC.date.modified",
];

/// Raw-markup patterns used when a source configures none
pub const DEFAULT_DATE_PATTERNS: &[&str] = &[
    r"Updated[:\s]+(\w+\s+\d{1,2},?\s+\d{4})",
    r"Last\s+(?:Updated|Modified)[:\s]+(\w+\s+\d{1,2},?\s+\d{4})",
    r"Modified[:\s]+(\d{1,2}/\d{1,2}/\d{4})",
    r"Date[:\s]+(\w+\s+\d{1,2},?\s+\d{4})",
];

/// Earliest year accepted from rendered pages
pub const MIN_PLAUSIBLE_YEAR: i32 = 2020;

lazy_static! {
    pub static ref TIME_ELEMENT: Selector = parse_selector!("time");

    pub static ref CLASSED_ELEMENT: Selector = parse_selector!("[class]");

    pub static ref BODY: Selector = parse_selector!("body");

    /// `meta[name=...]` then `meta[property=...]` for each entry of
    /// [`DATE_META_NAMES`], in order
    pub static ref META_DATE_TAGS: Vec<(Selector, Selector)> = DATE_META_NAMES
        .iter()
        .map(|name| {
            let by_name = format!(r#"meta[name="{name}"]"#);
            let by_property = format!(r#"meta[property="{name}"]"#);
            (
                Selector::parse(&by_name).expect("Invalid meta selector"),
                Selector::parse(&by_property).expect("Invalid meta selector"),
            )
        })
        .collect();

    /// Visible-text patterns for rendered pages; every match is tried
    pub static ref PAGE_TEXT_PATTERNS: Vec<Regex> = vec![
        parse_regex!(r"(?i)(?:Last\s+)?(?:Updated|Modified)[:\s]+([A-Za-z]+\s+\d{1,2},?\s+\d{4})"),
        parse_regex!(r"(?i)(?:Last\s+)?(?:Updated|Modified)[:\s]+(\d{1,2}/\d{1,2}/\d{4})"),
        parse_regex!(r"(?i)(?:Last\s+)?(?:Updated|Modified)[:\s]+(\d{4}-\d{2}-\d{2})"),
        parse_regex!(r"(?i)Release\s+Date[:\s]+([A-Za-z]+\s+\d{1,2},?\s+\d{4})"),
        parse_regex!(r"(?i)Data\s+as\s+of[:\s]+([A-Za-z]+\s+\d{1,2},?\s+\d{4})"),
        parse_regex!(r"(?i)(?:Released|Published)[:\s]+([A-Za-z]+\s+\d{1,2},?\s+\d{4})"),
    ];

    /// Date fields embedded in inline JSON (string and numeric values)
    pub static ref EMBEDDED_JSON_PATTERNS: Vec<Regex> = vec![
        parse_regex!(r#""(?:lastUpdated|updatedAt|modified|releaseDate|dateModified)"\s*:\s*"([^"]+)""#),
        parse_regex!(r#""(?:lastUpdated|updatedAt|modified|releaseDate|dateModified)"\s*:\s*(\d{10,13})"#),
    ];
}

/// Compile configured patterns case-insensitively, falling back to the
/// defaults when none are configured. Invalid patterns are skipped.
pub fn compile_date_patterns(configured: &[String]) -> Vec<Regex> {
    let sources: Vec<&str> = if configured.is_empty() {
        DEFAULT_DATE_PATTERNS.to_vec()
    } else {
        configured.iter().map(String::as_str).collect()
    };

    sources
        .into_iter()
        .filter_map(|pattern| match Regex::new(&format!("(?i){pattern}")) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(pattern = pattern, error = %e, "Skipping invalid date pattern");
                None
            }
        })
        .collect()
}
