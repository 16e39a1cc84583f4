use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::forms::{sanitize_payload, ParseKindError};

/// Area value the audit form uses when the ward is typed in by hand.
const OTHER_AREA: &str = "Other (specify)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPlanStatus {
    Pending,
    Ongoing,
    Completed,
}

impl ActionPlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionPlanStatus::Pending => "pending",
            ActionPlanStatus::Ongoing => "ongoing",
            ActionPlanStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ActionPlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionPlanStatus {
    type Err = ParseKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(ActionPlanStatus::Pending),
            "ongoing" => Ok(ActionPlanStatus::Ongoing),
            "completed" => Ok(ActionPlanStatus::Completed),
            other => Err(ParseKindError::ActionPlanStatus(other.to_string())),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionPlanForm {
    action: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    area: Option<String>,
    #[serde(default)]
    area_other: Option<String>,
    #[serde(default)]
    person_responsible: Option<String>,
    #[serde(default)]
    target_date: Option<NaiveDate>,
}

/// A corrective action raised against audit findings, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActionPlan {
    pub category: String,
    pub area: Option<String>,
    pub action: String,
    pub person_responsible: Option<String>,
    pub target_date: Option<NaiveDate>,
}

impl NewActionPlan {
    /// Parses the action plan form. A hand-typed ward replaces the `Other (specify)` choice.
    pub fn from_payload(payload: Value) -> serde_json::Result<Self> {
        let form: ActionPlanForm = serde_json::from_value(sanitize_payload(payload))?;
        let area = match form.area {
            Some(area) if area == OTHER_AREA => form.area_other,
            area => area,
        };
        Ok(Self {
            category: form.category.unwrap_or_else(|| "Hand Hygiene".to_string()),
            area,
            action: form.action,
            person_responsible: form.person_responsible,
            target_date: form.target_date,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPlan {
    pub id: Uuid,
    pub category: String,
    pub area: Option<String>,
    pub action: String,
    pub person_responsible: Option<String>,
    pub target_date: Option<NaiveDate>,
    pub status: ActionPlanStatus,
}

impl ActionPlan {
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status != ActionPlanStatus::Completed && self.target_date.is_some_and(|target| target < today)
    }
}

/// Plans still open, overdue ones first, then by target date. Undated plans go last.
pub fn open_plans(plans: &[ActionPlan], today: NaiveDate) -> Vec<&ActionPlan> {
    let mut open: Vec<&ActionPlan> = plans
        .iter()
        .filter(|plan| plan.status != ActionPlanStatus::Completed)
        .collect();
    open.sort_by_key(|plan| (!plan.is_overdue(today), plan.target_date.is_none(), plan.target_date));
    open
}
