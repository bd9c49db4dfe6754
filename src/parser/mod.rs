//! Date parsing and timestamp extraction
//!
//! This module turns raw source material (header values, API bodies,
//! HTML pages) into UTC update timestamps.

pub mod date;
pub mod fields;
pub mod html;
pub mod selectors;

// Re-export main parser and public types
pub use date::{format_datetime, from_epoch_number, DateParser, DateTemplate, TemplateKind, DATE_TEMPLATES};
pub use fields::{find_json_field, find_xml_field, FieldMatch};
pub use html::{visible_text, Extraction, MarkupExtractor, SanityBounds, Strategy};
