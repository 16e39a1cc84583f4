use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitoredArea {
    Overall,
    Icu,
    Picu,
    Nicu,
    Medicine,
    Cohort,
}

impl MonitoredArea {
    pub const ALL: [MonitoredArea; 6] = [
        MonitoredArea::Overall,
        MonitoredArea::Icu,
        MonitoredArea::Picu,
        MonitoredArea::Nicu,
        MonitoredArea::Medicine,
        MonitoredArea::Cohort,
    ];

    /// Ward label as it appears on infection reports.
    pub fn label(self) -> &'static str {
        match self {
            MonitoredArea::Overall => "Overall",
            MonitoredArea::Icu => "ICU",
            MonitoredArea::Picu => "PICU",
            MonitoredArea::Nicu => "NICU",
            MonitoredArea::Medicine => "Medicine Ward",
            MonitoredArea::Cohort => "Cohort",
        }
    }

    /// Column prefix used by the census log table.
    pub fn key(self) -> &'static str {
        match self {
            MonitoredArea::Overall => "overall",
            MonitoredArea::Icu => "icu",
            MonitoredArea::Picu => "picu",
            MonitoredArea::Nicu => "nicu",
            MonitoredArea::Medicine => "medicine",
            MonitoredArea::Cohort => "cohort",
        }
    }
}

/// Patient-days and device-days logged for one area on one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaCensus {
    pub patient_days: i64,
    pub vent_days: i64,
    pub ifc_days: i64,
    pub central_line_days: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CensusLogEntry {
    pub date: NaiveDate,
    pub overall: AreaCensus,
    pub icu: AreaCensus,
    pub picu: AreaCensus,
    pub nicu: AreaCensus,
    pub medicine: AreaCensus,
    pub cohort: AreaCensus,
}

impl CensusLogEntry {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            overall: AreaCensus::default(),
            icu: AreaCensus::default(),
            picu: AreaCensus::default(),
            nicu: AreaCensus::default(),
            medicine: AreaCensus::default(),
            cohort: AreaCensus::default(),
        }
    }

    pub fn area(&self, area: MonitoredArea) -> &AreaCensus {
        match area {
            MonitoredArea::Overall => &self.overall,
            MonitoredArea::Icu => &self.icu,
            MonitoredArea::Picu => &self.picu,
            MonitoredArea::Nicu => &self.nicu,
            MonitoredArea::Medicine => &self.medicine,
            MonitoredArea::Cohort => &self.cohort,
        }
    }

    pub fn area_mut(&mut self, area: MonitoredArea) -> &mut AreaCensus {
        match area {
            MonitoredArea::Overall => &mut self.overall,
            MonitoredArea::Icu => &mut self.icu,
            MonitoredArea::Picu => &mut self.picu,
            MonitoredArea::Nicu => &mut self.nicu,
            MonitoredArea::Medicine => &mut self.medicine,
            MonitoredArea::Cohort => &mut self.cohort,
        }
    }
}

/// A validated healthcare-associated infection, reduced to the fields rates need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfectionEvent {
    pub hai_type: String,
    pub area: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandAction {
    #[serde(rename = "Hand Rub")]
    HandRub,
    #[serde(rename = "Hand Wash")]
    HandWash,
    Missed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Moment {
    #[serde(default)]
    pub moment: String,
    pub action: HandAction,
    #[serde(default)]
    pub used_gloves: bool,
}

impl Moment {
    pub fn is_compliant(&self) -> bool {
        self.action != HandAction::Missed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandHygieneAudit {
    pub date: NaiveDate,
    #[serde(default)]
    pub auditee_role: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub moments: Vec<Moment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifiableDiseaseCase {
    pub disease: String,
    pub outcome: Option<String>,
    pub area: Option<String>,
    pub date_reported: NaiveDate,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub hospital_number: Option<String>,
    pub date_of_admission: Option<NaiveDate>,
    pub reporter_name: Option<String>,
}
