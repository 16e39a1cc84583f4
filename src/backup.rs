use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::store::StoredReport;

#[derive(Serialize)]
struct LedgerLine<'a> {
    logged_at: DateTime<Utc>,
    event: &'a str,
    kind: &'a str,
    id: Uuid,
    validation_status: &'a str,
    validated_by: Option<&'a str>,
    record: &'a serde_json::Value,
}

/// Append-only JSON-lines copy of notifiable and TB reports, kept outside the database.
#[derive(Debug, Clone)]
pub struct BackupLedger {
    path: PathBuf,
}

impl BackupLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, event: &str, report: &StoredReport) -> anyhow::Result<()> {
        let line = LedgerLine {
            logged_at: Utc::now(),
            event,
            kind: report.kind.key(),
            id: report.id,
            validation_status: report.validation_status.as_str(),
            validated_by: report.validated_by.as_deref(),
            record: &report.payload,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open backup ledger {}", self.path.display()))?;
        let mut encoded = serde_json::to_vec(&line)?;
        encoded.push(b'\n');
        file.write_all(&encoded)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::{ReportKind, ValidationStatus};
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = BackupLedger::new(dir.path().join("backup.jsonl"));
        let report = StoredReport {
            id: Uuid::new_v4(),
            kind: ReportKind::Tb,
            validation_status: ValidationStatus::Pending,
            validated_by: None,
            date_reported: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            payload: json!({ "lastName": "Reyes", "classification": "Bacteriologically confirmed" }),
        };

        ledger.append("submitted", &report).unwrap();
        ledger.append("validated", &report).unwrap();

        let text = std::fs::read_to_string(ledger.path()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], json!("submitted"));
        assert_eq!(lines[1]["kind"], json!("tb"));
        assert_eq!(lines[1]["record"]["lastName"], json!("Reyes"));
    }
}
