//! Timestamp field lookup in metadata API responses

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;
use std::collections::VecDeque;

use super::date::{from_epoch_number, DateParser};

/// A timestamp-bearing field found in a response body
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch {
    pub field: String,
    pub raw_value: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Search a JSON document for the first usable value of `fields`
///
/// Fields are tried in priority order. Each one is looked up breadth-first
/// through nested objects; for arrays only the first element is descended.
/// Null, empty and non-scalar values are skipped.
pub fn find_json_field(data: &Value, fields: &[String], parser: &DateParser) -> Option<FieldMatch> {
    fields.iter().find_map(|field| {
        let value = breadth_first(data, field)?;
        let (raw_value, timestamp) = match value {
            Value::Number(n) => (n.to_string(), n.as_f64().and_then(from_epoch_number)),
            Value::String(s) => (s.clone(), parser.parse(s)),
            _ => return None,
        };

        Some(FieldMatch {
            field: field.clone(),
            raw_value,
            timestamp,
        })
    })
}

fn breadth_first<'a>(root: &'a Value, field: &str) -> Option<&'a Value> {
    let mut queue: VecDeque<&Value> = VecDeque::from([root]);

    while let Some(node) = queue.pop_front() {
        match node {
            Value::Object(map) => {
                if let Some(value) = map.get(field).filter(|v| is_usable(v)) {
                    return Some(value);
                }
                queue.extend(map.values());
            }
            Value::Array(items) => {
                if let Some(first) = items.first() {
                    queue.push_back(first);
                }
            }
            _ => {}
        }
    }

    None
}

fn is_usable(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.trim().is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    }
}

/// Search an XML document for the first element named like one of `fields`
///
/// Namespace prefixes are ignored. Returns an error only for malformed XML.
pub fn find_xml_field(
    content: &str,
    fields: &[String],
    parser: &DateParser,
) -> Result<Option<FieldMatch>, quick_xml::Error> {
    for field in fields {
        if let Some(text) = first_element_text(content, field)? {
            return Ok(Some(FieldMatch {
                field: field.clone(),
                timestamp: parser.parse(&text),
                raw_value: text,
            }));
        }
    }
    Ok(None)
}

fn first_element_text(content: &str, name: &str) -> Result<Option<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut capturing = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) => capturing = e.local_name().as_ref() == name.as_bytes(),
            Event::Text(text) if capturing => {
                let text = text.unescape()?.trim().to_string();
                if !text.is_empty() {
                    return Ok(Some(text));
                }
            }
            Event::CData(data) if capturing => {
                let text = String::from_utf8_lossy(&data.into_inner()).trim().to_string();
                if !text.is_empty() {
                    return Ok(Some(text));
                }
            }
            Event::End(_) => capturing = false,
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_top_level_field() {
        let data = json!({"updated_at": "2025-01-15T10:30:00Z"});
        let found = find_json_field(&data, &fields(&["updated_at"]), &DateParser::new()).unwrap();

        assert_eq!(found.raw_value, "2025-01-15T10:30:00Z");
        assert_eq!(
            found.timestamp,
            Some(Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_nested_and_array_first_element() {
        let data = json!({
            "result": {"items": [{"meta": {"lastModified": "2024-12-01"}}, {"lastModified": "2025-06-01"}]}
        });
        let found =
            find_json_field(&data, &fields(&["updated_at", "lastModified"]), &DateParser::new())
                .unwrap();

        assert_eq!(found.field, "lastModified");
        assert_eq!(found.raw_value, "2024-12-01");
    }

    #[test]
    fn test_shallowest_match_wins() {
        let data = json!({"deep": {"modified": "2020-01-01"}, "modified": "2025-01-01"});
        let found = find_json_field(&data, &fields(&["modified"]), &DateParser::new()).unwrap();
        assert_eq!(found.raw_value, "2025-01-01");
    }

    #[test]
    fn test_null_and_empty_values_skipped() {
        let data = json!({"updated_at": null, "inner": {"updated_at": ""}, "rowsUpdatedAt": 1705315800});
        let found =
            find_json_field(&data, &fields(&["updated_at", "rowsUpdatedAt"]), &DateParser::new())
                .unwrap();

        assert_eq!(found.field, "rowsUpdatedAt");
        assert_eq!(found.raw_value, "1705315800");
        assert!(found.timestamp.is_some());
    }

    #[test]
    fn test_xml_local_name() {
        let xml = r#"<?xml version="1.0"?>
            <feed xmlns:dc="http://purl.org/dc/elements/1.1/">
              <title>Rates</title>
              <dc:modified>2025-01-15</dc:modified>
            </feed>"#;
        let found = find_xml_field(xml, &fields(&["updated_at", "modified"]), &DateParser::new())
            .unwrap()
            .unwrap();

        assert_eq!(found.field, "modified");
        assert_eq!(
            found.timestamp,
            Some(Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_xml_missing_field() {
        let xml = "<root><a>1</a></root>";
        assert!(find_xml_field(xml, &fields(&["updated_at"]), &DateParser::new())
            .unwrap()
            .is_none());
    }
}
