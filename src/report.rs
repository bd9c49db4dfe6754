//! Run reports
//!
//! Flattens check results into CSV rows and a short run summary.

use serde::Serialize;
use std::fmt;
use std::path::Path;

use crate::models::{CheckResult, CheckStatus};
use crate::parser::format_datetime;

/// One CSV row per checked source
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub import_name: String,
    pub id: String,
    pub data_url: String,
    pub script_url: String,
    pub method: String,
    pub last_updated: String,
    pub raw_value: String,
    pub previous_timestamp: String,
    pub changed: bool,
    pub check_time: String,
    pub status: &'static str,
    pub error: String,
    pub is_verified: String,
    pub confidence: String,
    pub reasoning: String,
    pub suggested_alternative: String,
}

impl From<&CheckResult> for ReportRow {
    fn from(result: &CheckResult) -> Self {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        let verification = result.verification.as_ref();

        Self {
            import_name: result
                .import_name
                .clone()
                .unwrap_or_else(|| result.id.clone()),
            id: result.id.clone(),
            data_url: text(&result.data_url),
            script_url: text(&result.script_url),
            method: text(&result.method),
            last_updated: result
                .current_timestamp
                .map(|ts| format_datetime(&ts, None))
                .unwrap_or_default(),
            raw_value: text(&result.raw_value),
            previous_timestamp: result
                .previous_timestamp
                .map(|ts| format_datetime(&ts, None))
                .unwrap_or_default(),
            changed: result.changed,
            check_time: format_datetime(&result.check_time, None),
            status: if result.is_success() { "success" } else { "error" },
            error: text(&result.error),
            is_verified: verification
                .and_then(|v| v.is_verified)
                .map(|v| v.to_string())
                .unwrap_or_default(),
            confidence: verification
                .map(|v| format!("{:.2}", v.confidence))
                .unwrap_or_default(),
            reasoning: verification.map(|v| v.reasoning.clone()).unwrap_or_default(),
            suggested_alternative: verification
                .and_then(|v| v.suggested_alternative.clone())
                .unwrap_or_default(),
        }
    }
}

/// Write results as CSV, one row per result in the given order
pub fn export_csv(results: &[CheckResult], path: &Path) -> crate::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for result in results {
        writer.serialize(ReportRow::from(result))?;
    }
    writer.flush()?;

    tracing::info!(path = %path.display(), rows = results.len(), "Report written");
    Ok(())
}

/// Counts of outcomes in one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
}

impl Summary {
    pub fn from_results(results: &[CheckResult]) -> Self {
        results.iter().fold(Self::default(), |mut summary, result| {
            summary.total += 1;
            match result.status() {
                CheckStatus::Updated => summary.updated += 1,
                CheckStatus::Unchanged => summary.unchanged += 1,
                CheckStatus::Error => summary.errors += 1,
            }
            summary
        })
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} checked: {} updated, {} unchanged, {} errors",
            self.total, self.updated, self.unchanged, self.errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Verification;
    use crate::utils::error::CheckError;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn results() -> Vec<CheckResult> {
        let mut updated = CheckResult::new("pop");
        updated.import_name = Some("Population".into());
        updated.changed = true;
        updated.current_timestamp = Some(Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap());
        updated.raw_value = Some("Wed, 15 Jan 2025 10:30:00 GMT".into());
        updated.verification = Some(Verification {
            is_verified: Some(true),
            confidence: 0.9,
            reasoning: "Matches the header".into(),
            suggested_alternative: None,
        });

        let unchanged = CheckResult::new("gdp");
        let failed = CheckResult::new("cpi").with_error(CheckError::FetchFailed("timeout".into()));

        vec![updated, unchanged, failed]
    }

    #[test]
    fn test_summary_counts() {
        let summary = Summary::from_results(&results());
        assert_eq!(
            summary,
            Summary {
                total: 3,
                updated: 1,
                unchanged: 1,
                errors: 1
            }
        );
        assert_eq!(summary.to_string(), "3 checked: 1 updated, 1 unchanged, 1 errors");
    }

    #[test]
    fn test_row_flattening() {
        let results = results();
        let row = ReportRow::from(&results[0]);

        assert_eq!(row.import_name, "Population");
        assert_eq!(row.last_updated, "2025-01-15 10:30:00");
        assert_eq!(row.status, "success");
        assert_eq!(row.is_verified, "true");
        assert_eq!(row.confidence, "0.90");

        let row = ReportRow::from(&results[2]);
        assert_eq!(row.import_name, "cpi");
        assert_eq!(row.status, "error");
        assert_eq!(row.error, "Fetch failed: timeout");
    }

    #[test]
    fn test_export_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("report.csv");

        export_csv(&results(), &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "import_name");
        assert_eq!(&headers[15], "suggested_alternative");

        let ids: Vec<String> = reader
            .records()
            .map(|r| r.unwrap()[1].to_string())
            .collect();
        assert_eq!(ids, vec!["pop", "gdp", "cpi"]);
    }
}
