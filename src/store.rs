use chrono::NaiveDate;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::forms::{ReportKind, ValidationStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} record {id} not found, or the database refused to touch it")]
    NotFound { kind: ReportKind, id: Uuid },
    #[error("a {kind} record with this identifier already exists (possible duplicate hospital number)")]
    Duplicate { kind: ReportKind },
    #[error("corrections would leave {kind} record {id} invalid: {source}")]
    Rejected {
        kind: ReportKind,
        id: Uuid,
        #[source]
        source: serde_json::Error,
    },
    #[error("stored {kind} payload is malformed: {source}")]
    Payload {
        kind: ReportKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A report row as the store holds it. The payload is the sanitized form body.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReport {
    pub id: Uuid,
    pub kind: ReportKind,
    pub validation_status: ValidationStatus,
    pub validated_by: Option<String>,
    pub date_reported: NaiveDate,
    pub payload: Value,
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub status: Option<ValidationStatus>,
    pub reported_from: Option<NaiveDate>,
    pub reported_to: Option<NaiveDate>,
}

impl RecordFilter {
    pub fn status(status: ValidationStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn reported_between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.reported_from = from;
        self.reported_to = to;
        self
    }
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub date_reported: NaiveDate,
    pub payload: Value,
}

/// Partial update. Payload fields are merged over the stored payload key by key.
#[derive(Debug, Clone, Default)]
pub struct ReportPatch {
    pub validation_status: Option<ValidationStatus>,
    pub validated_by: Option<String>,
    pub payload: Map<String, Value>,
}

/// Durable storage for submitted reports, keyed by report kind and id.
///
/// `fetch`, `update` and `delete` hand back the affected row so callers can confirm the
/// effect; touching an id that does not exist is [`StoreError::NotFound`].
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    async fn get(&self, kind: ReportKind, filter: &RecordFilter) -> Result<Vec<StoredReport>, StoreError>;

    async fn fetch(&self, kind: ReportKind, id: Uuid) -> Result<StoredReport, StoreError>;

    async fn insert(&self, kind: ReportKind, report: NewReport) -> Result<StoredReport, StoreError>;

    async fn update(&self, kind: ReportKind, id: Uuid, patch: ReportPatch) -> Result<StoredReport, StoreError>;

    async fn delete(&self, kind: ReportKind, id: Uuid) -> Result<StoredReport, StoreError>;
}
