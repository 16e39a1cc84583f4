use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::backup::BackupLedger;
use crate::forms::{sanitize_payload, ReportKind, ReportRecord, ValidationStatus};
use crate::models::{InfectionEvent, NotifiableDiseaseCase};
use crate::store::{NewReport, RecordFilter, RecordStore, ReportPatch, StoreError, StoredReport};

/// Stores a new report as pending, stamped with the day it was reported.
pub async fn submit_report<S: RecordStore>(
    store: &S,
    backup: Option<&BackupLedger>,
    mut record: ReportRecord,
    today: NaiveDate,
) -> Result<StoredReport, StoreError> {
    let kind = record.kind();
    record.derive_age(today);
    let payload = record
        .to_payload()
        .map_err(|source| StoreError::Payload { kind, source })?;

    let stored = store
        .insert(
            kind,
            NewReport {
                date_reported: today,
                payload,
            },
        )
        .await?;
    info!("submitted {} report {} for validation", kind, stored.id);

    if kind.is_backed_up() {
        sync_backup(backup, "submitted", &stored);
    }
    Ok(stored)
}

#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    pub groups: Vec<(ReportKind, Vec<StoredReport>)>,
}

impl PendingQueue {
    pub fn total(&self) -> usize {
        self.groups.iter().map(|(_, reports)| reports.len()).sum()
    }

    pub fn reports(&self, kind: ReportKind) -> &[StoredReport] {
        self.groups
            .iter()
            .find(|(group, _)| *group == kind)
            .map(|(_, reports)| reports.as_slice())
            .unwrap_or(&[])
    }
}

pub async fn pending_reports<S: RecordStore>(store: &S) -> Result<PendingQueue, StoreError> {
    let filter = RecordFilter::status(ValidationStatus::Pending);
    let mut groups = Vec::with_capacity(ReportKind::ALL.len());
    for kind in ReportKind::ALL {
        groups.push((kind, store.get(kind, &filter).await?));
    }
    Ok(PendingQueue { groups })
}

/// Validated reports of `kind`, optionally limited to a reporting window.
pub async fn validated_reports<S: RecordStore>(
    store: &S,
    kind: ReportKind,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<StoredReport>, StoreError> {
    let filter = RecordFilter::status(ValidationStatus::Validated).reported_between(from, to);
    store.get(kind, &filter).await
}

/// Sanitizes `corrections` and checks that the stored payload, with them merged
/// in, still parses as a `kind` record. Returns the sanitized fields to merge.
async fn checked_corrections<S: RecordStore>(
    store: &S,
    kind: ReportKind,
    id: Uuid,
    corrections: Option<Value>,
) -> Result<Map<String, Value>, StoreError> {
    let fields = match corrections.map(sanitize_payload) {
        Some(Value::Object(fields)) if !fields.is_empty() => fields,
        _ => return Ok(Map::new()),
    };

    let current = store.fetch(kind, id).await?;
    let mut merged = match current.payload {
        Value::Object(stored) => stored,
        _ => Map::new(),
    };
    merged.extend(fields.clone());
    ReportRecord::from_payload(kind, Value::Object(merged))
        .map_err(|source| StoreError::Rejected { kind, id, source })?;
    Ok(fields)
}

/// Marks a report validated by `coordinator`, merging any corrections they made.
pub async fn validate_report<S: RecordStore>(
    store: &S,
    backup: Option<&BackupLedger>,
    kind: ReportKind,
    id: Uuid,
    coordinator: &str,
    corrections: Option<Value>,
) -> Result<StoredReport, StoreError> {
    let patch = ReportPatch {
        validation_status: Some(ValidationStatus::Validated),
        validated_by: Some(coordinator.to_string()),
        payload: checked_corrections(store, kind, id, corrections).await?,
    };

    let validated = store.update(kind, id, patch).await?;
    info!("{} report {} validated by {}", kind, id, coordinator);

    if kind.is_backed_up() {
        sync_backup(backup, "validated", &validated);
    }
    Ok(validated)
}

/// Edits a report in place. Its validation status and validator are left as they were.
pub async fn update_report<S: RecordStore>(
    store: &S,
    kind: ReportKind,
    id: Uuid,
    corrections: Value,
) -> Result<StoredReport, StoreError> {
    let patch = ReportPatch {
        payload: checked_corrections(store, kind, id, Some(corrections)).await?,
        ..ReportPatch::default()
    };
    let updated = store.update(kind, id, patch).await?;
    info!("{} report {} edited", kind, id);
    Ok(updated)
}

pub async fn delete_report<S: RecordStore>(
    store: &S,
    kind: ReportKind,
    id: Uuid,
) -> Result<StoredReport, StoreError> {
    debug!("deleting {} report {}", kind, id);
    let deleted = store.delete(kind, id).await?;
    info!("deleted {} report {}", kind, id);
    Ok(deleted)
}

fn sync_backup(backup: Option<&BackupLedger>, event: &str, report: &StoredReport) {
    let Some(ledger) = backup else {
        return;
    };
    if let Err(err) = ledger.append(event, report) {
        warn!(
            "backup sync failed for {} report {}: {err:#}",
            report.kind, report.id
        );
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HaiPayload {
    #[serde(default)]
    hai_type: Option<String>,
    #[serde(default)]
    area: Option<String>,
}

/// Validated HAIs for the rate tables. A record missing its type or area still
/// loads; it just never matches a rate numerator.
pub async fn load_infection_events<S: RecordStore>(
    store: &S,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<InfectionEvent>, StoreError> {
    let reports = validated_reports(store, ReportKind::Hai, from, to).await?;
    let mut events = Vec::with_capacity(reports.len());
    for report in reports {
        let payload: HaiPayload = match serde_json::from_value(report.payload) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("HAI report {} has an unreadable payload: {err}", report.id);
                continue;
            }
        };
        events.push(InfectionEvent {
            hai_type: payload.hai_type.unwrap_or_default(),
            area: payload.area.unwrap_or_default(),
        });
    }
    Ok(events)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CasePayload {
    #[serde(default)]
    disease: Option<String>,
    #[serde(default)]
    outcome: Option<String>,
    #[serde(default)]
    area: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    hospital_number: Option<String>,
    #[serde(default)]
    date_of_admission: Option<NaiveDate>,
    #[serde(default)]
    reporter_name: Option<String>,
}

pub async fn load_notifiable_cases<S: RecordStore>(
    store: &S,
) -> Result<Vec<NotifiableDiseaseCase>, StoreError> {
    let reports = validated_reports(store, ReportKind::Notifiable, None, None).await?;
    let mut cases = Vec::with_capacity(reports.len());
    for report in reports {
        let payload: CasePayload =
            serde_json::from_value(report.payload).map_err(|source| StoreError::Payload {
                kind: ReportKind::Notifiable,
                source,
            })?;
        cases.push(NotifiableDiseaseCase {
            disease: payload.disease.unwrap_or_default(),
            outcome: payload.outcome,
            area: payload.area,
            date_reported: report.date_reported,
            last_name: payload.last_name,
            first_name: payload.first_name,
            hospital_number: payload.hospital_number,
            date_of_admission: payload.date_of_admission,
            reporter_name: payload.reporter_name,
        });
    }
    cases.sort_by(|a, b| b.date_reported.cmp(&a.date_reported));
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryRecordStore;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 4).unwrap()
    }

    fn notifiable(disease: &str, outcome: Option<&str>) -> ReportRecord {
        ReportRecord::from_payload(
            ReportKind::Notifiable,
            json!({
                "lastName": "bautista",
                "firstName": "rico",
                "disease": disease,
                "area": "Medicine Ward",
                "outcome": outcome,
            }),
        )
        .unwrap()
    }

    fn hai(hai_type: &str, area: &str) -> ReportRecord {
        ReportRecord::from_payload(
            ReportKind::Hai,
            json!({
                "lastName": "Uy",
                "firstName": "Lea",
                "area": area,
                "haiType": hai_type,
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn submissions_start_pending() {
        let store = MemoryRecordStore::default();
        let stored = submit_report(&store, None, notifiable("Dengue", None), today())
            .await
            .unwrap();
        assert_eq!(stored.validation_status, ValidationStatus::Pending);
        assert_eq!(stored.date_reported, today());
        assert_eq!(stored.payload["lastName"], json!("Bautista"));

        let queue = pending_reports(&store).await.unwrap();
        assert_eq!(queue.total(), 1);
        assert_eq!(queue.reports(ReportKind::Notifiable).len(), 1);
        assert!(validated_reports(&store, ReportKind::Notifiable, None, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn validation_merges_corrections_and_moves_out_of_queue() {
        let store = MemoryRecordStore::default();
        let stored = submit_report(&store, None, notifiable("Dengue", None), today())
            .await
            .unwrap();

        let validated = validate_report(
            &store,
            None,
            ReportKind::Notifiable,
            stored.id,
            "IPC Nurse Santos",
            Some(json!({ "outcome": " Recovered " })),
        )
        .await
        .unwrap();

        assert_eq!(validated.validation_status, ValidationStatus::Validated);
        assert_eq!(validated.validated_by.as_deref(), Some("IPC Nurse Santos"));
        assert_eq!(validated.payload["outcome"], json!("Recovered"));
        assert_eq!(validated.payload["disease"], json!("Dengue"));
        assert_eq!(pending_reports(&store).await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn corrections_that_break_the_record_are_rejected() {
        let store = MemoryRecordStore::default();
        let first = submit_report(&store, None, hai(crate::rates::VAP, "ICU"), today())
            .await
            .unwrap();
        let second = submit_report(&store, None, hai(crate::rates::HAP, "NICU"), today())
            .await
            .unwrap();
        validate_report(&store, None, ReportKind::Hai, first.id, "Coordinator", None)
            .await
            .unwrap();

        let blanked = validate_report(
            &store,
            None,
            ReportKind::Hai,
            second.id,
            "Coordinator",
            Some(json!({ "area": "  " })),
        )
        .await;
        assert!(matches!(blanked, Err(StoreError::Rejected { kind: ReportKind::Hai, .. })));

        let untouched = store.fetch(ReportKind::Hai, second.id).await.unwrap();
        assert_eq!(untouched.validation_status, ValidationStatus::Pending);
        assert_eq!(untouched.payload["area"], json!("NICU"));

        let events = load_infection_events(&store, None, None).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn malformed_hai_rows_load_without_a_ward() {
        let store = MemoryRecordStore::default();
        let good = submit_report(&store, None, hai(crate::rates::CAUTI, "ICU"), today())
            .await
            .unwrap();
        let bad = store
            .insert(
                ReportKind::Hai,
                NewReport {
                    date_reported: today(),
                    payload: json!({ "haiType": crate::rates::VAP, "area": null }),
                },
            )
            .await
            .unwrap();
        for id in [good.id, bad.id] {
            let patch = ReportPatch {
                validation_status: Some(ValidationStatus::Validated),
                ..ReportPatch::default()
            };
            store.update(ReportKind::Hai, id, patch).await.unwrap();
        }

        let mut events = load_infection_events(&store, None, None).await.unwrap();
        events.sort_by(|a, b| a.area.cmp(&b.area));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].area, "");
        assert_eq!(events[1].area, "ICU");
    }

    #[tokio::test]
    async fn edits_keep_validation_state() {
        let store = MemoryRecordStore::default();
        let stored = submit_report(&store, None, notifiable("Dengue", None), today())
            .await
            .unwrap();
        validate_report(&store, None, ReportKind::Notifiable, stored.id, "IPC Nurse Santos", None)
            .await
            .unwrap();

        let edited = update_report(
            &store,
            ReportKind::Notifiable,
            stored.id,
            json!({ "outcome": "Recovered", "reporterName": "jun pascual" }),
        )
        .await
        .unwrap();
        assert_eq!(edited.validation_status, ValidationStatus::Validated);
        assert_eq!(edited.validated_by.as_deref(), Some("IPC Nurse Santos"));
        assert_eq!(edited.payload["outcome"], json!("Recovered"));
        assert_eq!(edited.payload["reporterName"], json!("Jun Pascual"));

        let cleared = update_report(&store, ReportKind::Notifiable, stored.id, json!({ "disease": "" })).await;
        assert!(matches!(cleared, Err(StoreError::Rejected { .. })));

        let missing = update_report(&store, ReportKind::Notifiable, Uuid::new_v4(), json!({ "outcome": "Died" })).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn validating_unknown_id_is_not_found() {
        let store = MemoryRecordStore::default();
        let result = validate_report(&store, None, ReportKind::Tb, Uuid::new_v4(), "Coordinator", None).await;
        assert!(matches!(result, Err(StoreError::NotFound { kind: ReportKind::Tb, .. })));
    }

    #[tokio::test]
    async fn delete_returns_row_and_second_delete_fails() {
        let store = MemoryRecordStore::default();
        let stored = submit_report(&store, None, hai(crate::rates::VAP, "ICU"), today())
            .await
            .unwrap();

        let deleted = delete_report(&store, ReportKind::Hai, stored.id).await.unwrap();
        assert_eq!(deleted.id, stored.id);
        assert_eq!(store.len(), 0);

        let again = delete_report(&store, ReportKind::Hai, stored.id).await;
        assert!(matches!(again, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn delete_checks_the_kind_as_well_as_the_id() {
        let store = MemoryRecordStore::default();
        let stored = submit_report(&store, None, hai(crate::rates::HAP, "ICU"), today())
            .await
            .unwrap();
        let wrong_kind = delete_report(&store, ReportKind::Culture, stored.id).await;
        assert!(wrong_kind.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn notifiable_and_tb_reports_are_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = BackupLedger::new(dir.path().join("backup.jsonl"));
        let store = MemoryRecordStore::default();

        let case = submit_report(&store, Some(&ledger), notifiable("Measles", None), today())
            .await
            .unwrap();
        submit_report(&store, Some(&ledger), hai(crate::rates::CAUTI, "NICU"), today())
            .await
            .unwrap();
        validate_report(&store, Some(&ledger), ReportKind::Notifiable, case.id, "Coordinator", None)
            .await
            .unwrap();

        let text = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[tokio::test]
    async fn backup_failure_does_not_block_submission() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = BackupLedger::new(dir.path().join("missing").join("backup.jsonl"));
        let store = MemoryRecordStore::default();
        let stored = submit_report(&store, Some(&ledger), notifiable("Dengue", None), today()).await;
        assert!(stored.is_ok());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn dashboards_read_validated_records_only() {
        let store = MemoryRecordStore::default();
        let first = submit_report(&store, None, hai(crate::rates::VAP, "ICU"), today())
            .await
            .unwrap();
        submit_report(&store, None, hai(crate::rates::VAP, "PICU"), today())
            .await
            .unwrap();
        validate_report(&store, None, ReportKind::Hai, first.id, "Coordinator", None)
            .await
            .unwrap();

        let events = load_infection_events(&store, None, None).await.unwrap();
        assert_eq!(
            events,
            vec![InfectionEvent {
                hai_type: crate::rates::VAP.to_string(),
                area: "ICU".to_string(),
            }]
        );

        let case = submit_report(&store, None, notifiable("Dengue", Some("Admitted")), today())
            .await
            .unwrap();
        validate_report(&store, None, ReportKind::Notifiable, case.id, "Coordinator", None)
            .await
            .unwrap();
        let cases = load_notifiable_cases(&store).await.unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].outcome.as_deref(), Some("Admitted"));
        assert_eq!(cases[0].date_reported, today());

        let later = today().succ_opt();
        assert!(load_infection_events(&store, later, None).await.unwrap().is_empty());
    }
}
