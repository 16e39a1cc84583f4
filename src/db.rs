use anyhow::Context;
use chrono::{Duration, NaiveDate};
use log::{debug, info};
use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::action_plans::{ActionPlan, ActionPlanStatus, NewActionPlan};
use crate::forms::{ReportKind, ReportRecord, ValidationStatus};
use crate::models::{AreaCensus, CensusLogEntry, HandHygieneAudit, Moment, MonitoredArea};
use crate::store::{NewReport, RecordFilter, RecordStore, ReportPatch, StoreError, StoredReport};
use crate::workflow;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn census_columns() -> Vec<String> {
    MonitoredArea::ALL
        .iter()
        .flat_map(|area| {
            let key = area.key();
            [
                key.to_string(),
                format!("{key}_vent"),
                format!("{key}_ifc"),
                format!("{key}_central"),
            ]
        })
        .collect()
}

/// Inserts a day's census, replacing whatever was logged for that date before.
pub async fn upsert_census_log(pool: &PgPool, entry: &CensusLogEntry) -> anyhow::Result<()> {
    let columns = census_columns();
    let placeholders: Vec<String> = (2..=columns.len() + 1).map(|n| format!("${n}")).collect();
    let updates: Vec<String> = columns
        .iter()
        .map(|column| format!("{column} = EXCLUDED.{column}"))
        .collect();
    let sql = format!(
        "INSERT INTO ipc.census_logs (date, {}) VALUES ($1, {}) \
         ON CONFLICT (date) DO UPDATE SET {}, updated_at = now()",
        columns.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    );

    let mut query = sqlx::query(&sql).bind(entry.date);
    for area in MonitoredArea::ALL {
        let census = entry.area(area);
        query = query
            .bind(census.patient_days)
            .bind(census.vent_days)
            .bind(census.ifc_days)
            .bind(census.central_line_days);
    }
    query
        .execute(pool)
        .await
        .with_context(|| format!("failed to upsert census log for {}", entry.date))?;
    Ok(())
}

pub async fn fetch_census_logs(
    pool: &PgPool,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> anyhow::Result<Vec<CensusLogEntry>> {
    let sql = format!(
        "SELECT date, {} FROM ipc.census_logs \
         WHERE ($1::date IS NULL OR date >= $1) AND ($2::date IS NULL OR date <= $2) \
         ORDER BY date DESC",
        census_columns().join(", ")
    );
    let rows = sqlx::query(&sql).bind(start).bind(end).fetch_all(pool).await?;

    let mut logs = Vec::with_capacity(rows.len());
    for row in rows {
        let mut entry = CensusLogEntry::empty(row.try_get("date")?);
        for area in MonitoredArea::ALL {
            let key = area.key();
            *entry.area_mut(area) = AreaCensus {
                patient_days: row.try_get(key)?,
                vent_days: row.try_get(format!("{key}_vent").as_str())?,
                ifc_days: row.try_get(format!("{key}_ifc").as_str())?,
                central_line_days: row.try_get(format!("{key}_central").as_str())?,
            };
        }
        logs.push(entry);
    }
    Ok(logs)
}

/// Imports daily census rows. Missing count columns read as zero.
pub async fn import_census_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let headers = reader.headers()?.clone();
    let mut upserted = 0usize;

    for (line, result) in reader.records().enumerate() {
        let record = result?;
        let field = |name: &str| headers.iter().position(|h| h.trim() == name).and_then(|i| record.get(i));

        let date_text = field("date").context("census CSV needs a `date` column")?;
        let date = NaiveDate::parse_from_str(date_text.trim(), "%Y-%m-%d")
            .with_context(|| format!("row {}: invalid date `{date_text}`", line + 1))?;

        let count = |name: &str| -> anyhow::Result<i64> {
            match field(name).map(str::trim) {
                None | Some("") => Ok(0),
                Some(value) => value
                    .parse::<i64>()
                    .with_context(|| format!("row {}: `{name}` is not a whole number", line + 1)),
            }
        };

        let mut entry = CensusLogEntry::empty(date);
        for area in MonitoredArea::ALL {
            let key = area.key();
            *entry.area_mut(area) = AreaCensus {
                patient_days: count(key)?,
                vent_days: count(&format!("{key}_vent"))?,
                ifc_days: count(&format!("{key}_ifc"))?,
                central_line_days: count(&format!("{key}_central"))?,
            };
        }

        upsert_census_log(pool, &entry).await?;
        debug!("census log for {date} stored");
        upserted += 1;
    }

    Ok(upserted)
}

pub async fn insert_hand_hygiene_audit(pool: &PgPool, audit: &HandHygieneAudit) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO ipc.audit_hand_hygiene (id, date, area, auditee_role, moments)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(audit.date)
    .bind(audit.area.as_deref())
    .bind(audit.auditee_role.as_deref())
    .bind(Json(&audit.moments))
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn import_audits_json(pool: &PgPool, json_path: &std::path::Path) -> anyhow::Result<usize> {
    let text = std::fs::read_to_string(json_path)
        .with_context(|| format!("failed to read {}", json_path.display()))?;
    let audits: Vec<HandHygieneAudit> =
        serde_json::from_str(&text).context("audit file must be a JSON array of audits")?;

    for audit in &audits {
        insert_hand_hygiene_audit(pool, audit).await?;
    }
    Ok(audits.len())
}

pub async fn fetch_hand_hygiene_audits(
    pool: &PgPool,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> anyhow::Result<Vec<HandHygieneAudit>> {
    let rows = sqlx::query(
        r#"
        SELECT date, area, auditee_role, moments
        FROM ipc.audit_hand_hygiene
        WHERE ($1::date IS NULL OR date >= $1) AND ($2::date IS NULL OR date <= $2)
        ORDER BY created_at
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    let mut audits = Vec::with_capacity(rows.len());
    for row in rows {
        let moments: Json<Vec<Moment>> = row.try_get("moments")?;
        audits.push(HandHygieneAudit {
            date: row.try_get("date")?,
            area: row.try_get("area")?,
            auditee_role: row.try_get("auditee_role")?,
            moments: moments.0,
        });
    }
    Ok(audits)
}

pub async fn insert_action_plan(pool: &PgPool, plan: &NewActionPlan) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO ipc.action_plans (id, category, area, action, person_responsible, target_date, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(&plan.category)
    .bind(plan.area.as_deref())
    .bind(&plan.action)
    .bind(plan.person_responsible.as_deref())
    .bind(plan.target_date)
    .bind(ActionPlanStatus::Pending.as_str())
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn update_action_plan_status(
    pool: &PgPool,
    id: Uuid,
    status: ActionPlanStatus,
) -> anyhow::Result<()> {
    let result = sqlx::query("UPDATE ipc.action_plans SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status.as_str())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        anyhow::bail!("action plan {id} not found");
    }
    Ok(())
}

pub async fn fetch_action_plans(pool: &PgPool, category: &str) -> anyhow::Result<Vec<ActionPlan>> {
    let rows = sqlx::query(
        r#"
        SELECT id, category, area, action, person_responsible, target_date, status
        FROM ipc.action_plans
        WHERE category = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(category)
    .fetch_all(pool)
    .await?;

    let mut plans = Vec::with_capacity(rows.len());
    for row in rows {
        let status: String = row.try_get("status")?;
        plans.push(ActionPlan {
            id: row.try_get("id")?,
            category: row.try_get("category")?,
            area: row.try_get("area")?,
            action: row.try_get("action")?,
            person_responsible: row.try_get("person_responsible")?,
            target_date: row.try_get("target_date")?,
            status: status.parse()?,
        });
    }
    Ok(plans)
}

/// Report storage backed by one Postgres table per report kind.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const REPORT_COLUMNS: &str = "id, validation_status, validated_by, date_reported, payload";

fn report_from_row(kind: ReportKind, row: &PgRow) -> Result<StoredReport, StoreError> {
    let status: String = row.try_get("validation_status")?;
    let validation_status = status
        .parse::<ValidationStatus>()
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
    let payload: Json<serde_json::Value> = row.try_get("payload")?;

    Ok(StoredReport {
        id: row.try_get("id")?,
        kind,
        validation_status,
        validated_by: row.try_get("validated_by")?,
        date_reported: row.try_get("date_reported")?,
        payload: payload.0,
    })
}

fn classify(kind: ReportKind, err: sqlx::Error) -> StoreError {
    let duplicate = err
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if duplicate {
        StoreError::Duplicate { kind }
    } else {
        StoreError::Database(err)
    }
}

impl RecordStore for PgRecordStore {
    async fn get(&self, kind: ReportKind, filter: &RecordFilter) -> Result<Vec<StoredReport>, StoreError> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM ipc.{} \
             WHERE ($1::text IS NULL OR validation_status = $1) \
             AND ($2::date IS NULL OR date_reported >= $2) \
             AND ($3::date IS NULL OR date_reported <= $3) \
             ORDER BY date_reported DESC, created_at DESC",
            kind.table()
        );
        let rows = sqlx::query(&sql)
            .bind(filter.status.map(ValidationStatus::as_str))
            .bind(filter.reported_from)
            .bind(filter.reported_to)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|row| report_from_row(kind, row)).collect()
    }

    async fn fetch(&self, kind: ReportKind, id: Uuid) -> Result<StoredReport, StoreError> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM ipc.{} WHERE id = $1", kind.table());
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => report_from_row(kind, &row),
            None => Err(StoreError::NotFound { kind, id }),
        }
    }

    async fn insert(&self, kind: ReportKind, report: NewReport) -> Result<StoredReport, StoreError> {
        let sql = format!(
            "INSERT INTO ipc.{} (id, validation_status, date_reported, payload) \
             VALUES ($1, $2, $3, $4) RETURNING {REPORT_COLUMNS}",
            kind.table()
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(ValidationStatus::Pending.as_str())
            .bind(report.date_reported)
            .bind(Json(&report.payload))
            .fetch_one(&self.pool)
            .await
            .map_err(|err| classify(kind, err))?;
        report_from_row(kind, &row)
    }

    async fn update(&self, kind: ReportKind, id: Uuid, patch: ReportPatch) -> Result<StoredReport, StoreError> {
        let sql = format!(
            "UPDATE ipc.{} SET \
             validation_status = COALESCE($2, validation_status), \
             validated_by = COALESCE($3, validated_by), \
             payload = payload || $4::jsonb \
             WHERE id = $1 RETURNING {REPORT_COLUMNS}",
            kind.table()
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(patch.validation_status.map(ValidationStatus::as_str))
            .bind(patch.validated_by)
            .bind(Json(serde_json::Value::Object(patch.payload)))
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| classify(kind, err))?;
        match row {
            Some(row) => report_from_row(kind, &row),
            None => Err(StoreError::NotFound { kind, id }),
        }
    }

    async fn delete(&self, kind: ReportKind, id: Uuid) -> Result<StoredReport, StoreError> {
        let sql = format!(
            "DELETE FROM ipc.{} WHERE id = $1 RETURNING {REPORT_COLUMNS}",
            kind.table()
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => report_from_row(kind, &row),
            None => Err(StoreError::NotFound { kind, id }),
        }
    }
}

pub async fn seed(pool: &PgPool, today: NaiveDate) -> anyhow::Result<()> {
    for days_ago in 0..7 {
        let mut entry = CensusLogEntry::empty(today - Duration::days(days_ago));
        entry.overall = AreaCensus {
            patient_days: 180,
            vent_days: 14,
            ifc_days: 32,
            central_line_days: 11,
        };
        entry.icu = AreaCensus {
            patient_days: 12,
            vent_days: 8,
            ifc_days: 10,
            central_line_days: 6,
        };
        entry.picu = AreaCensus {
            patient_days: 8,
            vent_days: 3,
            ifc_days: 2,
            central_line_days: 2,
        };
        entry.nicu = AreaCensus {
            patient_days: 15,
            vent_days: 3,
            ifc_days: 0,
            central_line_days: 3,
        };
        entry.medicine = AreaCensus {
            patient_days: 60,
            vent_days: 0,
            ifc_days: 14,
            central_line_days: 0,
        };
        entry.cohort = AreaCensus {
            patient_days: 10,
            vent_days: 0,
            ifc_days: 4,
            central_line_days: 0,
        };
        upsert_census_log(pool, &entry).await?;
    }

    let audits = json!([
        {
            "date": today,
            "auditeeRole": "Nurse",
            "area": "ICU",
            "moments": [
                { "moment": "1. Before touching patient", "action": "Hand Rub" },
                { "moment": "4. After touching patient", "action": "Hand Wash" },
                { "moment": "5. After touching surroundings", "action": "Missed", "usedGloves": true }
            ]
        },
        {
            "date": today,
            "auditeeRole": "Doctor",
            "area": "Medicine Ward",
            "moments": [
                { "moment": "2. Before aseptic proc.", "action": "Hand Rub" },
                { "moment": "3. After body fluid exposure", "action": "Missed" }
            ]
        }
    ]);
    let audits: Vec<HandHygieneAudit> = serde_json::from_value(audits)?;
    for audit in &audits {
        insert_hand_hygiene_audit(pool, audit).await?;
    }

    let store = PgRecordStore::new(pool.clone());
    let reports = [
        (
            ReportKind::Hai,
            json!({
                "lastName": "Villanueva", "firstName": "Carlo", "hospitalNumber": "HN-20410",
                "area": "ICU", "haiType": "Ventilator Associated Pneumonia",
                "mvInitiationArea": "ICU", "reporterName": "Liza Mendoza"
            }),
        ),
        (
            ReportKind::Hai,
            json!({
                "lastName": "Garcia", "firstName": "Rosa", "hospitalNumber": "HN-20433",
                "area": "Medicine Ward", "haiType": "Catheter-Associated UTI",
                "reporterName": "Liza Mendoza"
            }),
        ),
        (
            ReportKind::Notifiable,
            json!({
                "lastName": "Ramos", "firstName": "Paolo", "hospitalNumber": "HN-20502",
                "disease": "Dengue", "area": "Medicine Ward", "outcome": "Admitted",
                "reporterName": "Jun Pascual"
            }),
        ),
        (
            ReportKind::Notifiable,
            json!({
                "lastName": "Torres", "firstName": "Mika", "hospitalNumber": "HN-20517",
                "disease": "Leptospirosis", "area": "ICU", "outcome": "Recovered",
                "reporterName": "Jun Pascual"
            }),
        ),
    ];

    for (kind, payload) in reports {
        let record = ReportRecord::from_payload(kind, payload)?;
        let stored = workflow::submit_report(&store, None, record, today).await?;
        workflow::validate_report(&store, None, kind, stored.id, "Seed Coordinator", None).await?;
    }

    let plan = NewActionPlan::from_payload(json!({
        "action": "Provide pocket alcohol dispensers",
        "area": "Medicine Ward",
        "personResponsible": "Liza Mendoza",
        "targetDate": today + Duration::days(30)
    }))?;
    insert_action_plan(pool, &plan).await?;

    info!("seeded 7 census days, {} audits, 4 validated reports and 1 action plan", audits.len());
    Ok(())
}
