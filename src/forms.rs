use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseKindError {
    #[error("unknown report kind `{0}`")]
    ReportKind(String),
    #[error("unknown validation status `{0}`")]
    ValidationStatus(String),
    #[error("unknown quarter `{0}` (expected Q1-Q4 or YTD)")]
    Quarter(String),
    #[error("unknown action plan status `{0}` (expected pending, ongoing or completed)")]
    ActionPlanStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReportKind {
    Hai,
    Notifiable,
    Needlestick,
    Isolation,
    Tb,
    Culture,
}

impl ReportKind {
    pub const ALL: [ReportKind; 6] = [
        ReportKind::Hai,
        ReportKind::Isolation,
        ReportKind::Tb,
        ReportKind::Culture,
        ReportKind::Notifiable,
        ReportKind::Needlestick,
    ];

    pub fn table(self) -> &'static str {
        match self {
            ReportKind::Hai => "reports_hai",
            ReportKind::Notifiable => "report_notif",
            ReportKind::Needlestick => "reports_needlestick",
            ReportKind::Isolation => "reports_isolation",
            ReportKind::Tb => "reports_tb",
            ReportKind::Culture => "reports_culture",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReportKind::Hai => "HAI",
            ReportKind::Notifiable => "Notifiable Disease",
            ReportKind::Needlestick => "Needlestick Injury",
            ReportKind::Isolation => "Isolation Admission",
            ReportKind::Tb => "TB Report",
            ReportKind::Culture => "Culture Report",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            ReportKind::Hai => "hai",
            ReportKind::Notifiable => "notifiable",
            ReportKind::Needlestick => "needlestick",
            ReportKind::Isolation => "isolation",
            ReportKind::Tb => "tb",
            ReportKind::Culture => "culture",
        }
    }

    /// Kinds whose submissions are mirrored to the backup ledger.
    pub fn is_backed_up(self) -> bool {
        matches!(self, ReportKind::Notifiable | ReportKind::Tb)
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ReportKind {
    type Err = ParseKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ReportKind::ALL
            .into_iter()
            .find(|kind| kind.label() == value || kind.key() == value)
            .ok_or_else(|| ParseKindError::ReportKind(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    Pending,
    Validated,
}

impl ValidationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::Validated => "validated",
        }
    }
}

impl FromStr for ValidationStatus {
    type Err = ParseKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(ValidationStatus::Pending),
            "validated" => Ok(ValidationStatus::Validated),
            other => Err(ParseKindError::ValidationStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientIdentity {
    pub last_name: String,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<NaiveDate>,
    #[serde(default, deserialize_with = "age_from_number_or_text", skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AgeField {
    Years(u32),
    Text(String),
}

/// Forms send the age either as a number or as the text of one.
fn age_from_number_or_text<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<AgeField>::deserialize(deserializer)? {
        None => Ok(None),
        Some(AgeField::Years(years)) => Ok(Some(years)),
        Some(AgeField::Text(text)) => match text.trim() {
            "" => Ok(None),
            years => years
                .parse::<u32>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("age `{years}` is not a whole number of years"))),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HaiReport {
    #[serde(flatten)]
    pub patient: PatientIdentity,
    pub area: String,
    pub hai_type: String,
    #[serde(default)]
    pub date_of_admission: Option<NaiveDate>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub reporter_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifiableReport {
    #[serde(flatten)]
    pub patient: PatientIdentity,
    pub disease: String,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub outcome_date: Option<NaiveDate>,
    #[serde(default)]
    pub date_of_admission: Option<NaiveDate>,
    #[serde(default)]
    pub reporter_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeedlestickReport {
    pub hcw_name: String,
    #[serde(default)]
    pub hospital_number: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub date_of_injury: Option<NaiveDate>,
    #[serde(default)]
    pub exposure_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsolationReport {
    #[serde(flatten)]
    pub patient: PatientIdentity,
    pub area: String,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub transfer_date: Option<NaiveDate>,
    #[serde(default)]
    pub transferred_from: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TbReport {
    #[serde(flatten)]
    pub patient: PatientIdentity,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub anatomical_site: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpretation {
    S,
    I,
    R,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Antibiotic {
    pub name: String,
    #[serde(default)]
    pub mic: Option<String>,
    pub interpretation: Interpretation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CultureReport {
    #[serde(flatten)]
    pub patient: PatientIdentity,
    pub organism: String,
    #[serde(default)]
    pub specimen: Option<String>,
    #[serde(default)]
    pub colony_count: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub antibiotics: Vec<Antibiotic>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A submitted case report, typed by its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportRecord {
    Hai(HaiReport),
    Notifiable(NotifiableReport),
    Needlestick(NeedlestickReport),
    Isolation(IsolationReport),
    Tb(TbReport),
    Culture(CultureReport),
}

impl ReportRecord {
    pub fn kind(&self) -> ReportKind {
        match self {
            ReportRecord::Hai(_) => ReportKind::Hai,
            ReportRecord::Notifiable(_) => ReportKind::Notifiable,
            ReportRecord::Needlestick(_) => ReportKind::Needlestick,
            ReportRecord::Isolation(_) => ReportKind::Isolation,
            ReportRecord::Tb(_) => ReportKind::Tb,
            ReportRecord::Culture(_) => ReportKind::Culture,
        }
    }

    /// Sanitizes a raw form payload and parses it into the shape for `kind`.
    pub fn from_payload(kind: ReportKind, payload: Value) -> serde_json::Result<Self> {
        let payload = sanitize_payload(payload);
        Ok(match kind {
            ReportKind::Hai => ReportRecord::Hai(serde_json::from_value(payload)?),
            ReportKind::Notifiable => ReportRecord::Notifiable(serde_json::from_value(payload)?),
            ReportKind::Needlestick => ReportRecord::Needlestick(serde_json::from_value(payload)?),
            ReportKind::Isolation => ReportRecord::Isolation(serde_json::from_value(payload)?),
            ReportKind::Tb => ReportRecord::Tb(serde_json::from_value(payload)?),
            ReportKind::Culture => ReportRecord::Culture(serde_json::from_value(payload)?),
        })
    }

    pub fn to_payload(&self) -> serde_json::Result<Value> {
        match self {
            ReportRecord::Hai(record) => serde_json::to_value(record),
            ReportRecord::Notifiable(record) => serde_json::to_value(record),
            ReportRecord::Needlestick(record) => serde_json::to_value(record),
            ReportRecord::Isolation(record) => serde_json::to_value(record),
            ReportRecord::Tb(record) => serde_json::to_value(record),
            ReportRecord::Culture(record) => serde_json::to_value(record),
        }
    }

    pub fn patient_mut(&mut self) -> Option<&mut PatientIdentity> {
        match self {
            ReportRecord::Hai(record) => Some(&mut record.patient),
            ReportRecord::Notifiable(record) => Some(&mut record.patient),
            ReportRecord::Needlestick(_) => None,
            ReportRecord::Isolation(record) => Some(&mut record.patient),
            ReportRecord::Tb(record) => Some(&mut record.patient),
            ReportRecord::Culture(record) => Some(&mut record.patient),
        }
    }

    /// Fills in the patient's age from their date of birth when it was left blank.
    pub fn derive_age(&mut self, today: NaiveDate) {
        if let Some(patient) = self.patient_mut() {
            if patient.age.is_none() {
                patient.age = patient.dob.and_then(|dob| calculate_age(dob, today));
            }
        }
    }
}

const NAME_FIELDS: [&str; 12] = [
    "lastName",
    "firstName",
    "middleName",
    "reporterName",
    "hcwName",
    "organism",
    "barangay",
    "city",
    "supervisorName",
    "ipcName",
    "patientName",
    "nurseInCharge",
];

/// Trims strings, nulls out blanks, title-cases name fields and drops client placeholder ids.
pub fn sanitize_payload(payload: Value) -> Value {
    let fields = match payload {
        Value::Object(fields) => fields,
        other => return other,
    };

    let mut sanitized = Map::with_capacity(fields.len());
    for (key, value) in fields {
        if key == "id" && is_placeholder_id(&value) {
            continue;
        }
        let value = match value {
            Value::String(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Value::Null
                } else if NAME_FIELDS.contains(&key.as_str()) {
                    Value::String(title_case(trimmed))
                } else {
                    Value::String(trimmed.to_string())
                }
            }
            other => other,
        };
        sanitized.insert(key, value);
    }
    Value::Object(sanitized)
}

fn is_placeholder_id(value: &Value) -> bool {
    match value {
        Value::String(id) => id.contains("temp") || id.contains("form") || id.chars().count() < 5,
        _ => false,
    }
}

pub fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Whole years between `dob` and `today`; `None` for a birth date in the future.
pub fn calculate_age(dob: NaiveDate, today: NaiveDate) -> Option<u32> {
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    u32::try_from(age).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kinds_parse_from_label_or_key() {
        assert_eq!("HAI".parse::<ReportKind>(), Ok(ReportKind::Hai));
        assert_eq!("notifiable".parse::<ReportKind>(), Ok(ReportKind::Notifiable));
        assert_eq!("TB Report".parse::<ReportKind>(), Ok(ReportKind::Tb));
        assert_eq!(ReportKind::Notifiable.table(), "report_notif");
        assert_eq!(
            "surgical".parse::<ReportKind>(),
            Err(ParseKindError::ReportKind("surgical".to_string()))
        );
    }

    #[test]
    fn sanitize_trims_nulls_and_title_cases() {
        let payload = json!({
            "id": "temp-123",
            "lastName": "  dela CRUZ ",
            "hospitalNumber": " HN-9 ",
            "middleName": "   ",
            "clinicalSigns": [],
            "numLumens": 2
        });
        let sanitized = sanitize_payload(payload);
        assert_eq!(
            sanitized,
            json!({
                "lastName": "Dela Cruz",
                "hospitalNumber": "HN-9",
                "middleName": null,
                "clinicalSigns": [],
                "numLumens": 2
            })
        );
    }

    #[test]
    fn real_ids_survive_sanitizing() {
        let id = "3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2";
        let sanitized = sanitize_payload(json!({ "id": id }));
        assert_eq!(sanitized["id"], json!(id));
    }

    #[test]
    fn hai_payload_keeps_unknown_fields() {
        let payload = json!({
            "lastName": "santos",
            "firstName": "maria",
            "area": "ICU",
            "haiType": "Ventilator Associated Pneumonia",
            "mvInitiationArea": "ER",
            "dob": "1990-06-15",
            "age": ""
        });
        let mut record = ReportRecord::from_payload(ReportKind::Hai, payload).unwrap();
        record.derive_age(NaiveDate::from_ymd_opt(2026, 6, 14).unwrap());
        let ReportRecord::Hai(hai) = &record else {
            panic!("expected an HAI record");
        };
        assert_eq!(hai.patient.last_name, "Santos");
        assert_eq!(hai.patient.age, Some(35));
        assert_eq!(hai.extra.get("mvInitiationArea"), Some(&json!("ER")));

        let round = record.to_payload().unwrap();
        assert_eq!(round["haiType"], json!("Ventilator Associated Pneumonia"));
        assert_eq!(round["mvInitiationArea"], json!("ER"));
    }

    #[test]
    fn age_accepts_text_from_forms() {
        let payload = json!({
            "lastName": "Reyes",
            "firstName": "Ana",
            "disease": "Dengue",
            "age": "35"
        });
        let record = ReportRecord::from_payload(ReportKind::Notifiable, payload).unwrap();
        let ReportRecord::Notifiable(case) = &record else {
            panic!("expected a notifiable record");
        };
        assert_eq!(case.patient.age, Some(35));
        assert_eq!(record.to_payload().unwrap()["age"], json!(35));

        let numeric = json!({ "lastName": "Reyes", "firstName": "Ana", "disease": "Dengue", "age": 7 });
        assert!(ReportRecord::from_payload(ReportKind::Notifiable, numeric).is_ok());

        let words = json!({ "lastName": "Reyes", "firstName": "Ana", "disease": "Dengue", "age": "thirty" });
        assert!(ReportRecord::from_payload(ReportKind::Notifiable, words).is_err());
    }

    #[test]
    fn culture_payload_requires_organism() {
        let payload = json!({ "lastName": "Lim", "firstName": "Jo", "specimen": "Blood" });
        assert!(ReportRecord::from_payload(ReportKind::Culture, payload).is_err());
    }

    #[test]
    fn age_counts_completed_years() {
        let dob = NaiveDate::from_ymd_opt(2000, 2, 29).unwrap();
        assert_eq!(calculate_age(dob, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap()), Some(25));
        assert_eq!(calculate_age(dob, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()), Some(26));
        assert_eq!(calculate_age(dob, NaiveDate::from_ymd_opt(1999, 1, 1).unwrap()), None);
    }
}
