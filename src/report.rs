use std::fmt::Write;

use chrono::NaiveDate;

use crate::census::ActiveCensus;
use crate::compliance::ComplianceReport;
use crate::rates::RateReport;

pub struct ReportPeriod {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl ReportPeriod {
    fn describe(&self) -> String {
        match (self.start, self.end) {
            (Some(start), Some(end)) => format!("{start} to {end}"),
            (Some(start), None) => format!("since {start}"),
            (None, Some(end)) => format!("through {end}"),
            (None, None) => "all recorded days".to_string(),
        }
    }
}

pub fn build_report(
    period: &ReportPeriod,
    rates: &RateReport,
    hand_hygiene: Option<&ComplianceReport>,
    census: &ActiveCensus,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# IPC Surveillance Report");
    let _ = writeln!(output, "Generated for {}", period.describe());
    let _ = writeln!(output);
    let _ = writeln!(output, "## HAI Rates (per 1000 patient/device days)");
    let _ = writeln!(output, "| Area | Overall | VAP | HAP | CAUTI | CLABSI |");
    let _ = writeln!(output, "|---|---|---|---|---|---|");
    for entry in &rates.areas {
        let r = entry.rates;
        let _ = writeln!(
            output,
            "| {} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} |",
            entry.area.label(),
            r.overall,
            r.vap,
            r.hap,
            r.cauti,
            r.clabsi
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Hand Hygiene Compliance");

    match hand_hygiene {
        None => {
            let _ = writeln!(output, "No hand hygiene audits recorded for this window.");
        }
        Some(stats) => {
            let _ = writeln!(
                output,
                "Overall {}% ({} of {} opportunities)",
                stats.overall, stats.grand_performed, stats.grand_total
            );
            let _ = writeln!(output);
            let _ = writeln!(output, "### By role");
            for bucket in &stats.roles {
                let _ = writeln!(
                    output,
                    "- {}: {}% ({}/{})",
                    bucket.name, bucket.compliance, bucket.performed, bucket.total
                );
            }
            let _ = writeln!(output);
            let _ = writeln!(output, "### By area");
            for bucket in &stats.areas {
                let _ = writeln!(
                    output,
                    "- {}: {}% ({}/{})",
                    bucket.name, bucket.compliance, bucket.performed, bucket.total
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Notifiable Disease Census");
    let _ = writeln!(output, "Active cases: {}", census.total_active);

    if census.per_disease_counts.is_empty() {
        let _ = writeln!(output, "No active notifiable cases.");
    } else {
        for (disease, count) in &census.per_disease_counts {
            let _ = writeln!(output, "- {disease}: {count}");
        }
    }

    output
}
