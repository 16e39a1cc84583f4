use crate::models::HandHygieneAudit;

pub const UNSPECIFIED_ROLE: &str = "Other";
pub const UNSPECIFIED_AREA: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceBucket {
    pub name: String,
    pub total: usize,
    pub performed: usize,
    pub compliance: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceReport {
    /// Buckets in first-seen order.
    pub roles: Vec<ComplianceBucket>,
    /// Buckets ranked by compliance, highest first.
    pub areas: Vec<ComplianceBucket>,
    pub grand_total: usize,
    pub grand_performed: usize,
    pub overall: u32,
}

/// Tallies observed hand hygiene opportunities by auditee role and by area.
///
/// Returns `None` when there is nothing to report, which keeps "no audits" apart
/// from a genuine 0% compliance.
pub fn compute_hand_hygiene_stats(audits: &[HandHygieneAudit]) -> Option<ComplianceReport> {
    let mut roles: Vec<(String, usize, usize)> = Vec::new();
    let mut areas: Vec<(String, usize, usize)> = Vec::new();
    let mut grand_total = 0usize;
    let mut grand_performed = 0usize;

    for audit in audits {
        let role = bucket_name(audit.auditee_role.as_deref(), UNSPECIFIED_ROLE);
        let area = bucket_name(audit.area.as_deref(), UNSPECIFIED_AREA);

        for moment in &audit.moments {
            let performed = usize::from(moment.is_compliant());
            tally(&mut roles, role, performed);
            tally(&mut areas, area, performed);
            grand_total += 1;
            grand_performed += performed;
        }
    }

    if grand_total == 0 {
        return None;
    }

    let roles = roles.into_iter().map(into_bucket).collect();
    let mut areas: Vec<ComplianceBucket> = areas.into_iter().map(into_bucket).collect();
    areas.sort_by(|a, b| b.compliance.cmp(&a.compliance));

    Some(ComplianceReport {
        roles,
        areas,
        grand_total,
        grand_performed,
        overall: percent(grand_performed, grand_total),
    })
}

fn bucket_name<'a>(value: Option<&'a str>, fallback: &'a str) -> &'a str {
    match value {
        Some(name) if !name.is_empty() => name,
        _ => fallback,
    }
}

fn tally(buckets: &mut Vec<(String, usize, usize)>, name: &str, performed: usize) {
    match buckets.iter_mut().find(|(existing, _, _)| existing == name) {
        Some(entry) => {
            entry.1 += 1;
            entry.2 += performed;
        }
        None => buckets.push((name.to_string(), 1, performed)),
    }
}

fn into_bucket((name, total, performed): (String, usize, usize)) -> ComplianceBucket {
    ComplianceBucket {
        name,
        total,
        performed,
        compliance: percent(performed, total),
    }
}

fn percent(part: usize, whole: usize) -> u32 {
    (part as f64 / whole as f64 * 100.0).round() as u32
}
