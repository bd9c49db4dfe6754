//! Heterogeneous date text normalization
//!
//! [`DateParser`] turns whatever a source exposes (HTTP header values, ISO
//! strings, US and European numeric forms, month-name prose, compact digit
//! runs, unix epochs) into a UTC instant. Naive values are taken as UTC.
//!
//! Parsing runs in four steps, first success wins:
//!
//! 1. clean the input (collapse whitespace, strip "Last Updated:"-style
//!    prefixes and trailing zone abbreviations; `UTC`, `GMT` and `Z` mark
//!    the value as UTC)
//! 2. permissive parse: RFC 3339, RFC 2822, then month-name prose
//! 3. the ordered [`DATE_TEMPLATES`] list
//! 4. unix epoch (milliseconds above 1e12, seconds above 1e9), only when
//!    the text holds a single run of digits

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use lazy_static::lazy_static;
use regex::Regex;

use crate::utils::normalize_whitespace;

/// Default output format for [`format_datetime`]
pub const DEFAULT_OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What a template yields when parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Date and time, no offset
    DateTime,
    /// Date only, midnight is assumed
    Date,
    /// Date and time with an explicit offset
    Zoned,
}

/// A chrono format string tried during step 3
#[derive(Debug, Clone, Copy)]
pub struct DateTemplate {
    pub format: &'static str,
    pub kind: TemplateKind,
}

const fn template(format: &'static str, kind: TemplateKind) -> DateTemplate {
    DateTemplate { format, kind }
}

/// Fixed-format templates, in the order they are tried.
///
/// US month-first forms come before European day-first ones, so an
/// ambiguous `03/04/2025` reads as March 4.
pub const DATE_TEMPLATES: &[DateTemplate] = &[
    // ISO 8601
    template("%Y-%m-%dT%H:%M:%S%.f%:z", TemplateKind::Zoned),
    template("%Y-%m-%dT%H:%M%:z", TemplateKind::Zoned),
    template("%Y-%m-%dT%H:%M:%S%.f", TemplateKind::DateTime),
    template("%Y-%m-%dT%H:%M", TemplateKind::DateTime),
    template("%Y-%m-%d %H:%M:%S%.f", TemplateKind::DateTime),
    template("%Y-%m-%d %H:%M", TemplateKind::DateTime),
    template("%Y-%m-%d", TemplateKind::Date),
    template("%Y/%m/%d %H:%M:%S", TemplateKind::DateTime),
    template("%Y/%m/%d", TemplateKind::Date),
    // US
    template("%m/%d/%Y %H:%M:%S", TemplateKind::DateTime),
    template("%m/%d/%Y %H:%M", TemplateKind::DateTime),
    template("%m/%d/%Y", TemplateKind::Date),
    template("%m-%d-%Y", TemplateKind::Date),
    // European
    template("%d/%m/%Y %H:%M:%S", TemplateKind::DateTime),
    template("%d/%m/%Y %H:%M", TemplateKind::DateTime),
    template("%d/%m/%Y", TemplateKind::Date),
    template("%d-%m-%Y", TemplateKind::Date),
    template("%d.%m.%Y", TemplateKind::Date),
    // Month names
    template("%B %d, %Y", TemplateKind::Date),
    template("%b %d, %Y", TemplateKind::Date),
    template("%B %d %Y", TemplateKind::Date),
    template("%b %d %Y", TemplateKind::Date),
    template("%d %B %Y", TemplateKind::Date),
    template("%d %b %Y", TemplateKind::Date),
    // Compact
    template("%Y%m%d%H%M%S", TemplateKind::DateTime),
    template("%Y%m%d", TemplateKind::Date),
    // RFC 1123 / RFC 5322
    template("%a, %d %b %Y %H:%M:%S", TemplateKind::DateTime),
    template("%a, %d %b %Y %H:%M:%S %z", TemplateKind::Zoned),
];

/// Date-shaped substrings scanned by [`DateParser::extract_date_from_text`]
const DATE_SHAPE_PATTERNS: &[&str] = &[
    r"\w+\s+\d{1,2},?\s+\d{4}",
    r"\d{1,2}\s+\w+\s+\d{4}",
    r"\d{4}-\d{2}-\d{2}",
    r"\d{1,2}/\d{1,2}/\d{4}",
    r"\d{4}/\d{2}/\d{2}",
];

lazy_static! {
    static ref LABEL_PREFIXES: Vec<Regex> = [
        r"(?i)^Last\s+(?:Updated|Modified)\s*[:\-]?\s*",
        r"(?i)^Updated\s*[:\-]?\s*",
        r"(?i)^Modified\s*[:\-]?\s*",
        r"(?i)^Date\s*[:\-]?\s*",
        r"(?i)^As\s+of\s*[:\-]?\s*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid label prefix pattern"))
    .collect();

    static ref ZONE_SUFFIX: Regex =
        Regex::new(r"\s*\b(?:EST|EDT|PST|PDT|CST|CDT|MST|MDT|UTC|GMT)\s*$")
            .expect("Invalid zone suffix pattern");

    static ref ZULU_SUFFIX: Regex = Regex::new(r"(\d)Z$").expect("Invalid zulu suffix pattern");

    static ref EPOCH_TEXT: Regex =
        Regex::new(r"^[^0-9]*([0-9]+(?:\.[0-9]+)?)[^0-9]*$").expect("Invalid epoch pattern");

    static ref SHAPES: Vec<Regex> = DATE_SHAPE_PATTERNS
        .iter()
        .map(|p| Regex::new(p).expect("Invalid date shape pattern"))
        .collect();

    /// Tokenizer for month-name prose: clock times, numeric offsets,
    /// numbers with optional ordinal suffix, and words.
    static ref PROSE_TOKEN: Regex = Regex::new(
        r"(?i)(?P<hour>\d{1,2}):(?P<minute>\d{2})(?::(?P<second>\d{2}))?(?:\.\d+)?(?:\s*(?P<meridiem>[ap])\.?m\.?\b)?|(?P<offset>[+-]\d{2}:?\d{2})\b|(?P<number>\d+)(?:st|nd|rd|th)?\b|(?P<word>[a-z]+)"
    )
    .expect("Invalid prose token pattern");
}

/// Stateless parser for the date formats found on data source pages
#[derive(Debug, Clone, Copy, Default)]
pub struct DateParser;

impl DateParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a date string into a UTC instant
    ///
    /// Returns `None` for empty input or when no step succeeds.
    pub fn parse(&self, text: &str) -> Option<DateTime<Utc>> {
        let cleaned = clean(text);
        if cleaned.is_empty() {
            return None;
        }

        parse_permissive(&cleaned)
            .or_else(|| parse_with_templates(&cleaned))
            .or_else(|| parse_unix_text(&cleaned))
    }

    /// Find and parse the first date-shaped substring of free text
    pub fn extract_date_from_text(&self, text: &str) -> Option<DateTime<Utc>> {
        if text.trim().is_empty() {
            return None;
        }

        SHAPES.iter().find_map(|shape| {
            shape
                .find_iter(text)
                .find_map(|candidate| self.parse(candidate.as_str()))
        })
    }
}

/// Format an instant for display
pub fn format_datetime(dt: &DateTime<Utc>, format: Option<&str>) -> String {
    dt.format(format.unwrap_or(DEFAULT_OUTPUT_FORMAT)).to_string()
}

/// Interpret a JSON number as a unix epoch
///
/// Values above 1e12 are milliseconds, anything else is seconds.
pub fn from_epoch_number(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }

    let millis = if value > 1e12 { value } else { value * 1000.0 };
    DateTime::from_timestamp_millis(millis.round() as i64)
}

fn clean(text: &str) -> String {
    let mut cleaned = normalize_whitespace(text);

    for prefix in LABEL_PREFIXES.iter() {
        cleaned = prefix.replace(&cleaned, "").into_owned();
    }

    let cleaned = ZONE_SUFFIX.replace(&cleaned, "");
    ZULU_SUFFIX.replace(cleaned.trim(), "$1").into_owned()
}

fn parse_permissive(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    parse_prose(text)
}

/// Month-name prose such as "January 15, 2025", "15th Jan 2025 10:30 pm"
/// or "Wednesday, Jan 15 2025 at 10:30 +0100".
///
/// Requires a month name and a four digit year. Unknown words are skipped;
/// unplaceable numbers reject the input.
fn parse_prose(text: &str) -> Option<DateTime<Utc>> {
    let mut year: Option<i32> = None;
    let mut month: Option<u32> = None;
    let mut day: Option<u32> = None;
    let mut time: Option<(u32, u32, u32)> = None;
    let mut offset: Option<FixedOffset> = None;

    for caps in PROSE_TOKEN.captures_iter(text) {
        if let Some(hour) = caps.name("hour") {
            if time.is_some() {
                return None;
            }
            let mut hour: u32 = hour.as_str().parse().ok()?;
            let minute: u32 = caps.name("minute")?.as_str().parse().ok()?;
            let second: u32 = match caps.name("second") {
                Some(s) => s.as_str().parse().ok()?,
                None => 0,
            };
            if let Some(meridiem) = caps.name("meridiem") {
                hour = apply_meridiem(hour, meridiem.as_str())?;
            }
            time = Some((hour, minute, second));
        } else if let Some(raw) = caps.name("offset") {
            if time.is_none() || offset.is_some() {
                return None;
            }
            offset = Some(parse_offset(raw.as_str())?);
        } else if let Some(number) = caps.name("number") {
            let digits = number.as_str();
            let value: u32 = digits.parse().ok()?;
            if digits.len() == 4 && year.is_none() {
                year = Some(value as i32);
            } else if digits.len() <= 2 && (1..=31).contains(&value) && day.is_none() {
                day = Some(value);
            } else {
                return None;
            }
        } else if let Some(word) = caps.name("word") {
            let word = word.as_str().to_lowercase();
            if let Some(m) = month_from_name(&word) {
                if month.is_some() {
                    return None;
                }
                month = Some(m);
            } else if matches!(word.as_str(), "am" | "pm") {
                let (hour, minute, second) = time?;
                time = Some((apply_meridiem(hour, &word)?, minute, second));
            }
        }
    }

    let date = NaiveDate::from_ymd_opt(year?, month?, day.unwrap_or(1))?;
    let (hour, minute, second) = time.unwrap_or((0, 0, 0));
    let naive = date.and_time(NaiveTime::from_hms_opt(hour, minute, second)?);

    match offset {
        Some(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc)),
        None => Some(Utc.from_utc_datetime(&naive)),
    }
}

fn apply_meridiem(hour: u32, meridiem: &str) -> Option<u32> {
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = meridiem.to_lowercase().starts_with('p');
    Some(match (pm, hour) {
        (false, 12) => 0,
        (false, h) => h,
        (true, 12) => 12,
        (true, h) => h + 12,
    })
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let sign = if raw.starts_with('-') { -1 } else { 1 };
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 4 {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn month_from_name(word: &str) -> Option<u32> {
    let month = match word {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn parse_with_templates(text: &str) -> Option<DateTime<Utc>> {
    DATE_TEMPLATES.iter().find_map(|t| parse_template(text, t))
}

fn parse_template(text: &str, template: &DateTemplate) -> Option<DateTime<Utc>> {
    match template.kind {
        TemplateKind::DateTime => NaiveDateTime::parse_from_str(text, template.format)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive)),
        TemplateKind::Date => NaiveDate::parse_from_str(text, template.format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive)),
        TemplateKind::Zoned => DateTime::parse_from_str(text, template.format)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Epoch fallback; surrounding non-digits are dropped, but several digit
/// groups (a date that failed to parse) never qualify
fn parse_unix_text(text: &str) -> Option<DateTime<Utc>> {
    let digits = EPOCH_TEXT.captures(text)?.get(1)?.as_str();
    let value: f64 = digits.parse().ok()?;

    if value > 1e9 {
        from_epoch_number(value)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_clean_strips_labels_and_zone() {
        assert_eq!(clean("  Last Updated:   January 15, 2025 EST "), "January 15, 2025");
        assert_eq!(clean("As of 2025-01-15"), "2025-01-15");
        assert_eq!(clean("2025-01-15 10:30:00 UTC"), "2025-01-15 10:30:00");
        assert_eq!(clean("2025-01-15T10:30:00Z"), "2025-01-15T10:30:00");
        assert_eq!(clean("Zulu"), "Zulu");
    }

    #[test]
    fn test_prose_variants() {
        let parser = DateParser::new();
        assert_eq!(parser.parse("15th Jan 2025"), Some(utc(2025, 1, 15, 0, 0, 0)));
        assert_eq!(
            parser.parse("Wednesday, January 15, 2025 at 10:30 pm"),
            Some(utc(2025, 1, 15, 22, 30, 0))
        );
        assert_eq!(
            parser.parse("Jan 15 2025 10:30 +0100"),
            Some(utc(2025, 1, 15, 9, 30, 0))
        );
        assert_eq!(parser.parse("March 2024"), Some(utc(2024, 3, 1, 0, 0, 0)));
    }

    #[test]
    fn test_prose_rejects_unplaceable_numbers() {
        assert_eq!(parse_prose("January 15, 2025 release 12345"), None);
        assert_eq!(parse_prose("January"), None);
    }

    #[test]
    fn test_meridiem() {
        assert_eq!(apply_meridiem(12, "am"), Some(0));
        assert_eq!(apply_meridiem(12, "pm"), Some(12));
        assert_eq!(apply_meridiem(3, "PM"), Some(15));
        assert_eq!(apply_meridiem(13, "pm"), None);
    }

    #[test]
    fn test_compact_forms() {
        let parser = DateParser::new();
        assert_eq!(parser.parse("20250115"), Some(utc(2025, 1, 15, 0, 0, 0)));
        assert_eq!(parser.parse("20250115103000"), Some(utc(2025, 1, 15, 10, 30, 0)));
    }

    #[test]
    fn test_epoch_thresholds() {
        assert_eq!(parse_unix_text("12345"), None);
        assert_eq!(parse_unix_text("2025-01-15T10:30"), None);
        assert_eq!(parse_unix_text("15/01/2025 10:30"), None);
        let from_secs = parse_unix_text("1705315800").unwrap();
        assert_eq!(parse_unix_text("ts=1705315800;"), Some(from_secs));
        assert_eq!(from_secs.year(), 2024);
        assert_eq!(from_secs.hour(), 10);
        assert_eq!(from_epoch_number(1705315800000.0), Some(from_secs));
        assert_eq!(from_epoch_number(-5.0), None);
    }

    #[test]
    fn test_format_datetime() {
        let dt = utc(2025, 1, 15, 10, 30, 0);
        assert_eq!(format_datetime(&dt, None), "2025-01-15 10:30:00");
        assert_eq!(format_datetime(&dt, Some("%d/%m/%Y")), "15/01/2025");
    }
}
