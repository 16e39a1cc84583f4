use std::collections::BTreeMap;
use std::io::Write;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::forms::ParseKindError;
use crate::models::NotifiableDiseaseCase;

/// A case is still active until it has an outcome other than admission or ER-level care.
/// A blank outcome counts as unset.
pub fn is_active(outcome: Option<&str>) -> bool {
    match outcome {
        None => true,
        Some(outcome) => outcome.is_empty() || outcome == "Admitted" || outcome == "ER-level",
    }
}

fn recorded_outcome(case: &NotifiableDiseaseCase) -> Option<&str> {
    case.outcome.as_deref().filter(|outcome| !outcome.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCensus {
    pub total_active: usize,
    pub per_disease_counts: Vec<(String, usize)>,
}

pub fn compute_active_census(cases: &[NotifiableDiseaseCase]) -> ActiveCensus {
    let mut total_active = 0usize;
    let mut counts: Vec<(String, usize)> = Vec::new();

    for case in cases.iter().filter(|case| is_active(case.outcome.as_deref())) {
        total_active += 1;
        if case.disease.is_empty() {
            continue;
        }
        match counts.iter_mut().find(|(disease, _)| *disease == case.disease) {
            Some(entry) => entry.1 += 1,
            None => counts.push((case.disease.clone(), 1)),
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    ActiveCensus {
        total_active,
        per_disease_counts: counts,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutcomeFilter {
    #[default]
    Active,
    All,
    Exactly(String),
}

impl OutcomeFilter {
    pub fn matches(&self, outcome: Option<&str>) -> bool {
        match self {
            OutcomeFilter::Active => is_active(outcome),
            OutcomeFilter::All => true,
            OutcomeFilter::Exactly(expected) => outcome.filter(|o| !o.is_empty()) == Some(expected.as_str()),
        }
    }
}

impl FromStr for OutcomeFilter {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "Active" => OutcomeFilter::Active,
            "All" => OutcomeFilter::All,
            other => OutcomeFilter::Exactly(other.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
    YearToDate,
}

impl Quarter {
    /// Inclusive date range the preset covers in `year`. `today` bounds year-to-date.
    pub fn range(self, year: i32, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let (start, end) = match self {
            Quarter::Q1 => ((1, 1), (3, 31)),
            Quarter::Q2 => ((4, 1), (6, 30)),
            Quarter::Q3 => ((7, 1), (9, 30)),
            Quarter::Q4 => ((10, 1), (12, 31)),
            Quarter::YearToDate => {
                let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
                return Some((start, today));
            }
        };
        Some((
            NaiveDate::from_ymd_opt(year, start.0, start.1)?,
            NaiveDate::from_ymd_opt(year, end.0, end.1)?,
        ))
    }
}

impl FromStr for Quarter {
    type Err = ParseKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Q1" | "q1" => Ok(Quarter::Q1),
            "Q2" | "q2" => Ok(Quarter::Q2),
            "Q3" | "q3" => Ok(Quarter::Q3),
            "Q4" | "q4" => Ok(Quarter::Q4),
            "YTD" | "ytd" => Ok(Quarter::YearToDate),
            other => Err(ParseKindError::Quarter(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    pub disease: Option<String>,
    pub area: Option<String>,
    pub outcome: OutcomeFilter,
    pub year: Option<i32>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl CaseFilter {
    pub fn matches(&self, case: &NotifiableDiseaseCase) -> bool {
        let matches_year = self
            .year
            .map_or(true, |year| case.date_reported.year() == year);
        let matches_disease = self
            .disease
            .as_deref()
            .map_or(true, |disease| case.disease == disease);
        let matches_area = self
            .area
            .as_deref()
            .map_or(true, |area| case.area.as_deref() == Some(area));
        let matches_range = self.start.map_or(true, |start| case.date_reported >= start)
            && self.end.map_or(true, |end| case.date_reported <= end);

        matches_year
            && matches_disease
            && matches_area
            && matches_range
            && self.outcome.matches(case.outcome.as_deref())
    }

    pub fn apply<'a>(&self, cases: &'a [NotifiableDiseaseCase]) -> Vec<&'a NotifiableDiseaseCase> {
        cases.iter().filter(|case| self.matches(case)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthTrend {
    pub month: String,
    pub total: usize,
    pub per_disease: BTreeMap<String, usize>,
}

pub fn monthly_trend(cases: &[&NotifiableDiseaseCase]) -> Vec<MonthTrend> {
    let mut months: BTreeMap<String, MonthTrend> = BTreeMap::new();

    for case in cases {
        let month = case.date_reported.format("%Y-%m").to_string();
        let entry = months.entry(month.clone()).or_insert_with(|| MonthTrend {
            month,
            total: 0,
            per_disease: BTreeMap::new(),
        });
        entry.total += 1;
        *entry.per_disease.entry(case.disease.clone()).or_insert(0) += 1;
    }

    months.into_values().collect()
}

pub fn outcome_distribution(cases: &[&NotifiableDiseaseCase]) -> Vec<(String, usize)> {
    let mut outcomes: Vec<(String, usize)> = Vec::new();
    for case in cases {
        let key = recorded_outcome(case).unwrap_or("Active");
        match outcomes.iter_mut().find(|(name, _)| name == key) {
            Some(entry) => entry.1 += 1,
            None => outcomes.push((key.to_string(), 1)),
        }
    }
    outcomes
}

#[derive(Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "Report_Date")]
    report_date: NaiveDate,
    #[serde(rename = "Patient_Name")]
    patient_name: String,
    #[serde(rename = "Hospital_Number")]
    hospital_number: &'a str,
    #[serde(rename = "Disease")]
    disease: &'a str,
    #[serde(rename = "Ward")]
    ward: &'a str,
    #[serde(rename = "Status")]
    status: &'a str,
    #[serde(rename = "Admission_Date")]
    admission_date: Option<NaiveDate>,
    #[serde(rename = "Reporter")]
    reporter: &'a str,
}

/// Writes the filtered line list as CSV. `redact` reduces patient names to initials.
pub fn export_csv<W: Write>(
    writer: W,
    cases: &[&NotifiableDiseaseCase],
    redact: bool,
) -> anyhow::Result<usize> {
    let mut out = csv::Writer::from_writer(writer);
    for case in cases {
        let last = case.last_name.as_deref().unwrap_or("");
        let first = case.first_name.as_deref().unwrap_or("");
        out.serialize(ExportRow {
            report_date: case.date_reported,
            patient_name: format_name(last, first, redact),
            hospital_number: case.hospital_number.as_deref().unwrap_or(""),
            disease: &case.disease,
            ward: case.area.as_deref().unwrap_or(""),
            status: recorded_outcome(case).unwrap_or("Admitted"),
            admission_date: case.date_of_admission,
            reporter: case.reporter_name.as_deref().unwrap_or(""),
        })?;
    }
    out.flush()?;
    Ok(cases.len())
}

pub fn format_name(last: &str, first: &str, redact: bool) -> String {
    if !redact {
        return format!("{last}, {first}");
    }
    let initial = |name: &str| name.chars().next().map(String::from).unwrap_or_default();
    format!("{}.{}.", initial(last), initial(first))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(disease: &str, outcome: Option<&str>, reported: (i32, u32, u32)) -> NotifiableDiseaseCase {
        NotifiableDiseaseCase {
            disease: disease.to_string(),
            outcome: outcome.map(str::to_string),
            area: Some("Medicine Ward".to_string()),
            date_reported: NaiveDate::from_ymd_opt(reported.0, reported.1, reported.2).unwrap(),
            last_name: Some("Dela Cruz".to_string()),
            first_name: Some("Juan".to_string()),
            hospital_number: Some("HN-1001".to_string()),
            date_of_admission: None,
            reporter_name: Some("Ana Reyes".to_string()),
        }
    }

    #[test]
    fn three_way_active_rule() {
        assert!(is_active(None));
        assert!(is_active(Some("Admitted")));
        assert!(is_active(Some("ER-level")));
        assert!(is_active(Some("")));
        assert!(!is_active(Some("Recovered")));
        assert!(!is_active(Some("admitted")));
    }

    #[test]
    fn census_counts_only_active_cases() {
        let cases = vec![
            case("Dengue", None, (2026, 1, 5)),
            case("Dengue", Some("Recovered"), (2026, 1, 6)),
        ];
        let census = compute_active_census(&cases);
        assert_eq!(census.total_active, 1);
        assert_eq!(census.per_disease_counts, vec![("Dengue".to_string(), 1)]);
    }

    #[test]
    fn blank_outcome_is_still_active() {
        let cases = vec![
            case("Dengue", Some(""), (2026, 2, 1)),
            case("Dengue", Some("Recovered"), (2026, 2, 2)),
        ];
        let census = compute_active_census(&cases);
        assert_eq!(census.total_active, 1);
        assert_eq!(census.per_disease_counts, vec![("Dengue".to_string(), 1)]);

        let refs: Vec<&NotifiableDiseaseCase> = cases.iter().collect();
        assert_eq!(
            outcome_distribution(&refs),
            vec![("Active".to_string(), 1), ("Recovered".to_string(), 1)]
        );

        let mut buffer = Vec::new();
        export_csv(&mut buffer, &refs[..1], false).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("Dengue,Medicine Ward,Admitted"));
    }

    #[test]
    fn census_sorts_diseases_by_count() {
        let cases = vec![
            case("Measles", Some("Admitted"), (2026, 1, 1)),
            case("Dengue", None, (2026, 1, 2)),
            case("Leptospirosis", Some("ER-level"), (2026, 1, 3)),
            case("Dengue", Some("ER-level"), (2026, 1, 4)),
            case("", None, (2026, 1, 4)),
        ];
        let census = compute_active_census(&cases);
        assert_eq!(census.total_active, 5);
        let names: Vec<&str> = census
            .per_disease_counts
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, vec!["Dengue", "Measles", "Leptospirosis"]);
    }

    #[test]
    fn filter_combines_outcome_year_and_range() {
        let cases = vec![
            case("Dengue", None, (2026, 2, 10)),
            case("Dengue", Some("Died"), (2026, 2, 11)),
            case("Dengue", None, (2025, 2, 10)),
            case("Measles", None, (2026, 5, 1)),
        ];
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let (start, end) = Quarter::Q1.range(2026, today).unwrap();
        let filter = CaseFilter {
            year: Some(2026),
            start: Some(start),
            end: Some(end),
            ..CaseFilter::default()
        };
        assert_eq!(filter.apply(&cases).len(), 1);

        let all = CaseFilter {
            outcome: "All".parse().unwrap(),
            ..CaseFilter::default()
        };
        assert_eq!(all.apply(&cases).len(), 4);

        let died = CaseFilter {
            outcome: "Died".parse().unwrap(),
            ..CaseFilter::default()
        };
        assert_eq!(died.apply(&cases).len(), 1);
    }

    #[test]
    fn year_to_date_ends_today() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let (start, end) = Quarter::YearToDate.range(2026, today).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(end, today);
        assert!("Q5".parse::<Quarter>().is_err());
    }

    #[test]
    fn trend_and_outcomes_group_filtered_cases() {
        let cases = vec![
            case("Dengue", None, (2026, 3, 2)),
            case("Measles", Some("Recovered"), (2026, 1, 20)),
            case("Dengue", Some("Recovered"), (2026, 3, 9)),
        ];
        let refs: Vec<&NotifiableDiseaseCase> = cases.iter().collect();

        let trend = monthly_trend(&refs);
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].month, "2026-01");
        assert_eq!(trend[1].total, 2);
        assert_eq!(trend[1].per_disease.get("Dengue"), Some(&2));

        let outcomes = outcome_distribution(&refs);
        assert_eq!(
            outcomes,
            vec![("Active".to_string(), 1), ("Recovered".to_string(), 2)]
        );
    }

    #[test]
    fn export_redacts_names_to_initials() {
        let cases = vec![case("Dengue", None, (2026, 3, 2))];
        let refs: Vec<&NotifiableDiseaseCase> = cases.iter().collect();
        let mut buffer = Vec::new();
        let written = export_csv(&mut buffer, &refs, true).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(written, 1);
        assert!(text.starts_with("Report_Date,Patient_Name,"));
        assert!(text.contains("D.J.,HN-1001,Dengue,Medicine Ward,Admitted"));
    }
}
