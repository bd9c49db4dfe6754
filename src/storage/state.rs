//! Persisted last-seen state per source
//!
//! The whole state document is a JSON object keyed by source id. Every
//! mutation rewrites the document (temp file, then rename) while holding
//! the lock, so concurrent checks never interleave partial writes.
//! Persistence failures are logged and the in-memory copy stays
//! authoritative.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::StoredState;

/// Thread-safe, file-backed store of per-source state
#[derive(Debug)]
pub struct StateManager {
    path: PathBuf,
    document: Mutex<Map<String, Value>>,
}

impl StateManager {
    /// Open the state file, starting empty if it is missing or unreadable
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document = match load_document(&path) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not load state, starting empty");
                Map::new()
            }
        };

        tracing::debug!(path = %path.display(), sources = document.len(), "State loaded");
        Self {
            path,
            document: Mutex::new(document),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last stored update time; malformed entries read as `None`
    pub fn get_last_timestamp(&self, id: &str) -> Option<DateTime<Utc>> {
        let document = self.lock();
        document
            .get(id)?
            .get("timestamp")?
            .as_str()
            .and_then(parse_stored_time)
    }

    /// Record an observed update time and refresh `last_check`
    ///
    /// `raw_value` and `etag` only overwrite stored values when present;
    /// any other stored fields are kept.
    pub fn update_timestamp(
        &self,
        id: &str,
        timestamp: DateTime<Utc>,
        raw_value: Option<&str>,
        etag: Option<&str>,
    ) {
        let mut document = self.lock();

        let entry = document
            .entry(id.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }

        if let Value::Object(fields) = entry {
            fields.insert("timestamp".into(), Value::String(timestamp.to_rfc3339()));
            fields.insert("last_check".into(), Value::String(Utc::now().to_rfc3339()));
            if let Some(raw) = raw_value {
                fields.insert("raw_value".into(), Value::String(raw.to_string()));
            }
            if let Some(etag) = etag {
                fields.insert("etag".into(), Value::String(etag.to_string()));
            }
        }

        self.persist(&document);
    }

    /// Full stored state for a source
    pub fn get_state(&self, id: &str) -> Option<StoredState> {
        let document = self.lock();
        document.get(id).and_then(stored_state)
    }

    /// Every well-formed stored state, keyed by id
    pub fn all_states(&self) -> BTreeMap<String, StoredState> {
        let document = self.lock();
        document
            .iter()
            .filter_map(|(id, entry)| stored_state(entry).map(|state| (id.clone(), state)))
            .collect()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget one source; returns whether it was stored
    pub fn clear_state(&self, id: &str) -> bool {
        let mut document = self.lock();
        let removed = document.remove(id).is_some();
        if removed {
            self.persist(&document);
        }
        removed
    }

    /// Forget every source
    pub fn clear_all(&self) {
        let mut document = self.lock();
        document.clear();
        self.persist(&document);
    }

    fn persist(&self, document: &Map<String, Value>) {
        if let Err(e) = save_document(&self.path, document) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to save state");
        }
    }
}

fn load_document(path: &Path) -> Result<Map<String, Value>> {
    if !path.exists() {
        return Ok(Map::new());
    }

    let file = File::open(path)
        .with_context(|| format!("Failed to open state file: {}", path.display()))?;
    let reader = BufReader::new(file);

    match serde_json::from_reader(reader).context("Failed to deserialize state")? {
        Value::Object(document) => Ok(document),
        Value::Null => Ok(Map::new()),
        _ => anyhow::bail!("state file is not a JSON object"),
    }
}

fn save_document(path: &Path, document: &Map<String, Value>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create state directory: {}", parent.display()))?;
    }

    // Write to temp file first, then rename (atomic)
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let file = File::create(&temp_path)
        .with_context(|| format!("Failed to create state file: {}", temp_path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, document).context("Failed to serialize state")?;
    writer.flush().context("Failed to flush state file")?;
    drop(writer);

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename state file: {}", path.display()))?;

    tracing::debug!(path = %path.display(), "State saved");
    Ok(())
}

/// Parse a stored instant: RFC 3339, or a naive ISO value taken as UTC
fn parse_stored_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn stored_state(entry: &Value) -> Option<StoredState> {
    let timestamp = entry.get("timestamp")?.as_str().and_then(parse_stored_time)?;
    let last_check = entry
        .get("last_check")
        .and_then(Value::as_str)
        .and_then(parse_stored_time)
        .unwrap_or(timestamp);
    let text = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);

    Some(StoredState {
        timestamp,
        raw_value: text("raw_value"),
        etag: text("etag"),
        last_check,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> StateManager {
        StateManager::new(dir.path().join("state").join("last_checked.json"))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let state = manager(&dir);
        assert!(state.is_empty());
        assert_eq!(state.get_last_timestamp("a"), None);
    }

    #[test]
    fn test_update_merges_optional_fields() {
        let dir = TempDir::new().unwrap();
        let state = manager(&dir);
        let t1 = Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();

        state.update_timestamp("a", t1, Some("Wed, 15 Jan 2025"), Some("\"v1\""));
        state.update_timestamp("a", t2, None, None);

        let stored = state.get_state("a").unwrap();
        assert_eq!(stored.timestamp, t2);
        assert_eq!(stored.raw_value.as_deref(), Some("Wed, 15 Jan 2025"));
        assert_eq!(stored.etag.as_deref(), Some("\"v1\""));
    }

    #[test]
    fn test_legacy_naive_timestamps() {
        assert_eq!(
            parse_stored_time("2025-01-15T10:30:00.250000"),
            Some(Utc.timestamp_millis_opt(1736937000250).unwrap())
        );
        assert_eq!(parse_stored_time("yesterday"), None);
    }

    #[test]
    fn test_malformed_entry_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"a": {"timestamp": "garbage"}, "b": 7}"#).unwrap();

        let state = StateManager::new(&path);
        assert_eq!(state.len(), 2);
        assert_eq!(state.get_last_timestamp("a"), None);
        assert_eq!(state.get_last_timestamp("b"), None);
        assert!(state.all_states().is_empty());
    }
}
