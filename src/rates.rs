use crate::models::{AreaCensus, CensusLogEntry, InfectionEvent, MonitoredArea};

pub const VAP: &str = "Ventilator Associated Pneumonia";
pub const HAP: &str = "Healthcare-Associated Pneumonia";
pub const CAUTI: &str = "Catheter-Associated UTI";
pub const CLABSI: &str = "Catheter-Related Blood Stream Infections";

/// Incidence rates per 1000 patient-days or device-days, rounded to 2 decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InfectionRates {
    pub overall: f64,
    pub vap: f64,
    pub hap: f64,
    pub cauti: f64,
    pub clabsi: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AreaRates {
    pub area: MonitoredArea,
    pub rates: InfectionRates,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateReport {
    pub areas: Vec<AreaRates>,
}

impl RateReport {
    pub fn get(&self, area: MonitoredArea) -> InfectionRates {
        self.areas
            .iter()
            .find(|entry| entry.area == area)
            .map(|entry| entry.rates)
            .unwrap_or_default()
    }
}

pub fn compute_infection_rates(
    census_logs: &[CensusLogEntry],
    infections: &[InfectionEvent],
) -> RateReport {
    let areas = MonitoredArea::ALL
        .iter()
        .map(|&area| AreaRates {
            area,
            rates: rates_for_area(area, census_logs, infections),
        })
        .collect();

    RateReport { areas }
}

fn rates_for_area(
    area: MonitoredArea,
    census_logs: &[CensusLogEntry],
    infections: &[InfectionEvent],
) -> InfectionRates {
    let sum = |field: fn(&AreaCensus) -> i64| -> i64 {
        census_logs.iter().map(|log| field(log.area(area))).sum()
    };

    let patient_days = floor_denominator(sum(|c: &AreaCensus| c.patient_days));
    let vent_days = floor_denominator(sum(|c: &AreaCensus| c.vent_days));
    let ifc_days = floor_denominator(sum(|c: &AreaCensus| c.ifc_days));
    let central_days = floor_denominator(sum(|c: &AreaCensus| c.central_line_days));

    let attributed = |hai_type: &str| -> usize {
        infections
            .iter()
            .filter(|event| event.hai_type == hai_type)
            .filter(|event| area == MonitoredArea::Overall || event.area == area.label())
            .count()
    };

    let vap = attributed(VAP);
    let hap = attributed(HAP);
    let cauti = attributed(CAUTI);
    let clabsi = attributed(CLABSI);

    InfectionRates {
        overall: per_thousand(vap + hap + cauti + clabsi, patient_days),
        vap: per_thousand(vap, vent_days),
        hap: per_thousand(hap, patient_days),
        cauti: per_thousand(cauti, ifc_days),
        clabsi: per_thousand(clabsi, central_days),
    }
}

/// No logged days yet means a denominator of 1, so the rate reads as zero.
fn floor_denominator(days: i64) -> f64 {
    if days == 0 {
        1.0
    } else {
        days as f64
    }
}

fn per_thousand(count: usize, denominator: f64) -> f64 {
    round2(count as f64 / denominator * 1000.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
