use std::path::PathBuf;

use anyhow::Context;
use chrono::{Datelike, NaiveDate, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use log::info;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

mod action_plans;
mod backup;
mod census;
mod compliance;
mod config;
mod db;
mod forms;
mod models;
mod rates;
mod report;
mod store;
mod workflow;

use action_plans::{ActionPlanStatus, NewActionPlan};
use census::{CaseFilter, OutcomeFilter, Quarter};
use forms::{ReportKind, ReportRecord};
use models::MonitoredArea;

#[derive(Parser)]
#[command(name = "ipc-surveillance")]
#[command(about = "Infection prevention and control surveillance reporting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Upsert daily census rows from a CSV file
    ImportCensus {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Insert hand hygiene audits from a JSON file
    ImportAudits {
        #[arg(long)]
        json: PathBuf,
    },
    /// Submit a case report for coordinator validation
    Submit {
        #[arg(long)]
        kind: ReportKind,
        #[arg(long)]
        file: PathBuf,
    },
    /// List reports awaiting validation
    Pending,
    /// Validate a pending report
    Validate {
        #[arg(long)]
        kind: ReportKind,
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        coordinator: String,
        /// JSON object of corrections merged into the report
        #[arg(long)]
        patch: Option<PathBuf>,
    },
    /// Edit a report without changing its validation state
    Edit {
        #[arg(long)]
        kind: ReportKind,
        #[arg(long)]
        id: Uuid,
        /// JSON object of fields merged into the report
        #[arg(long)]
        patch: PathBuf,
    },
    /// Delete a report
    Delete {
        #[arg(long)]
        kind: ReportKind,
        #[arg(long)]
        id: Uuid,
    },
    /// Infection rates per monitored area
    Rates {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Hand hygiene compliance by role and area
    HandHygiene {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Record a corrective action plan from a JSON form
    PlanAdd {
        #[arg(long)]
        file: PathBuf,
    },
    /// Move an action plan to pending, ongoing or completed
    PlanStatus {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        status: ActionPlanStatus,
    },
    /// Notifiable disease census and line list
    #[command(group(
        ArgGroup::new("range")
            .args(["quarter", "from"])
            .multiple(false)
    ))]
    Notifiable {
        #[arg(long)]
        disease: Option<String>,
        #[arg(long)]
        area: Option<String>,
        /// `Active`, `All`, or an exact outcome such as `Recovered`
        #[arg(long, default_value = "Active")]
        outcome: OutcomeFilter,
        #[arg(long)]
        year: Option<i32>,
        /// Q1-Q4 or YTD of --year (defaults to the current year)
        #[arg(long)]
        quarter: Option<Quarter>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long, conflicts_with = "quarter")]
        to: Option<NaiveDate>,
        #[arg(long)]
        export: Option<PathBuf>,
        /// Reduce patient names to initials in the export
        #[arg(long)]
        redact: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = config::Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = db::PgRecordStore::new(pool.clone());
    let ledger = config.backup_path.clone().map(backup::BackupLedger::new);
    if let Some(ledger) = &ledger {
        info!("backing up notifiable and TB reports to {}", ledger.path().display());
    }
    let backup = ledger.as_ref();
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool, today).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportCensus { csv } => {
            let upserted = db::import_census_csv(&pool, &csv).await?;
            println!("Stored {upserted} census days from {}.", csv.display());
        }
        Commands::ImportAudits { json } => {
            let inserted = db::import_audits_json(&pool, &json).await?;
            println!("Inserted {inserted} hand hygiene audits from {}.", json.display());
        }
        Commands::Submit { kind, file } => {
            let payload = read_json(&file)?;
            let record = ReportRecord::from_payload(kind, payload)
                .with_context(|| format!("{} is not a valid {kind} report", file.display()))?;
            let stored = workflow::submit_report(&store, backup, record, today).await?;
            println!("Submitted {kind} report {} (pending validation).", stored.id);
        }
        Commands::Pending => {
            let queue = workflow::pending_reports(&store).await?;
            if queue.total() == 0 {
                println!("No reports awaiting validation.");
                return Ok(());
            }
            for kind in ReportKind::ALL {
                let reports = queue.reports(kind);
                if reports.is_empty() {
                    continue;
                }
                println!("{kind} ({}):", reports.len());
                for report in reports {
                    println!(
                        "- {} reported {} {}",
                        report.id,
                        report.date_reported,
                        patient_label(&report.payload)
                    );
                }
            }
        }
        Commands::Validate {
            kind,
            id,
            coordinator,
            patch,
        } => {
            let corrections = patch.as_deref().map(read_json).transpose()?;
            workflow::validate_report(&store, backup, kind, id, &coordinator, corrections).await?;
            println!("{kind} report {id} validated by {coordinator}.");
        }
        Commands::Edit { kind, id, patch } => {
            let corrections = read_json(&patch)?;
            let edited = workflow::update_report(&store, kind, id, corrections).await?;
            println!(
                "{kind} report {id} updated ({}).",
                edited.validation_status.as_str()
            );
        }
        Commands::Delete { kind, id } => {
            let deleted = workflow::delete_report(&store, kind, id).await?;
            println!(
                "Deleted {kind} report {} {}.",
                deleted.id,
                patient_label(&deleted.payload)
            );
        }
        Commands::Rates { from, to } => {
            let logs = db::fetch_census_logs(&pool, from, to).await?;
            let events = workflow::load_infection_events(&store, from, to).await?;
            let rates = rates::compute_infection_rates(&logs, &events);

            println!(
                "Infection rates across {} census days and {} validated HAIs:",
                logs.len(),
                events.len()
            );
            for area in MonitoredArea::ALL {
                let r = rates.get(area);
                println!(
                    "- {}: overall {:.2}, VAP {:.2}, HAP {:.2}, CAUTI {:.2}, CLABSI {:.2}",
                    area.label(),
                    r.overall,
                    r.vap,
                    r.hap,
                    r.cauti,
                    r.clabsi
                );
            }
        }
        Commands::HandHygiene { from, to } => {
            let audits = db::fetch_hand_hygiene_audits(&pool, from, to).await?;
            let Some(stats) = compliance::compute_hand_hygiene_stats(&audits) else {
                println!("No hand hygiene audits found for this window.");
                return Ok(());
            };

            println!(
                "Overall compliance {}% ({} of {} opportunities)",
                stats.overall, stats.grand_performed, stats.grand_total
            );
            println!("By role:");
            for bucket in &stats.roles {
                println!("- {}: {}% of {}", bucket.name, bucket.compliance, bucket.total);
            }
            println!("By area:");
            for bucket in &stats.areas {
                println!("- {}: {}% of {}", bucket.name, bucket.compliance, bucket.total);
            }

            let plans = db::fetch_action_plans(&pool, "Hand Hygiene").await?;
            let open = action_plans::open_plans(&plans, today);
            if !open.is_empty() {
                println!("Open action plans:");
                for plan in open {
                    let due = plan
                        .target_date
                        .map(|date| format!(" due {date}"))
                        .unwrap_or_default();
                    let overdue = if plan.is_overdue(today) { " (overdue)" } else { "" };
                    println!(
                        "- [{}] {}: {}{due}{overdue}",
                        plan.status,
                        plan.area.as_deref().unwrap_or("Unassigned"),
                        plan.action
                    );
                }
            }
        }
        Commands::PlanAdd { file } => {
            let plan = NewActionPlan::from_payload(read_json(&file)?)
                .with_context(|| format!("{} is not a valid action plan", file.display()))?;
            let id = db::insert_action_plan(&pool, &plan).await?;
            info!("action plan {id} recorded for {}", plan.category);
            println!("Recorded action plan {id}.");
        }
        Commands::PlanStatus { id, status } => {
            db::update_action_plan_status(&pool, id, status).await?;
            println!("Action plan {id} is now {status}.");
        }
        Commands::Notifiable {
            disease,
            area,
            outcome,
            year,
            quarter,
            from,
            to,
            export,
            redact,
        } => {
            let cases = workflow::load_notifiable_cases(&store).await?;
            let census = census::compute_active_census(&cases);

            println!("Active cases: {}", census.total_active);
            for (disease, count) in &census.per_disease_counts {
                println!("- {disease}: {count}");
            }

            let (start, end) = match quarter {
                Some(quarter) => {
                    let year = year.unwrap_or_else(|| today.year());
                    let (start, end) = quarter
                        .range(year, today)
                        .with_context(|| format!("no calendar dates for {year}"))?;
                    (Some(start), Some(end))
                }
                None => (from, to),
            };
            let filter = CaseFilter {
                disease,
                area,
                outcome,
                year,
                start,
                end,
            };
            let filtered = filter.apply(&cases);
            if filtered.is_empty() {
                println!("No cases match the selected filters.");
                return Ok(());
            }

            println!();
            println!("Monthly trend ({} matching cases):", filtered.len());
            for month in census::monthly_trend(&filtered) {
                let breakdown: Vec<String> = month
                    .per_disease
                    .iter()
                    .map(|(disease, count)| format!("{disease} {count}"))
                    .collect();
                println!("- {}: {} ({})", month.month, month.total, breakdown.join(", "));
            }
            println!("Outcomes:");
            for (outcome, count) in census::outcome_distribution(&filtered) {
                println!("- {outcome}: {count}");
            }

            if let Some(path) = export {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                let written = census::export_csv(file, &filtered, redact)?;
                println!("Exported {written} cases to {}.", path.display());
            }
        }
        Commands::Report { from, to, out } => {
            let logs = db::fetch_census_logs(&pool, from, to).await?;
            let events = workflow::load_infection_events(&store, from, to).await?;
            let audits = db::fetch_hand_hygiene_audits(&pool, from, to).await?;
            let cases = workflow::load_notifiable_cases(&store).await?;

            let rates = rates::compute_infection_rates(&logs, &events);
            let hand_hygiene = compliance::compute_hand_hygiene_stats(&audits);
            let census = census::compute_active_census(&cases);
            let period = report::ReportPeriod { start: from, end: to };

            let report = report::build_report(&period, &rates, hand_hygiene.as_ref(), &census);
            std::fs::write(&out, report)?;
            info!("report covers {} census days", logs.len());
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn read_json(path: &std::path::Path) -> anyhow::Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn patient_label(payload: &serde_json::Value) -> String {
    let field = |key: &str| payload.get(key).and_then(|value| value.as_str()).unwrap_or("");
    let last = match field("lastName") {
        "" => field("hcwName"),
        last => last,
    };
    if last.is_empty() {
        return String::new();
    }
    census::format_name(last, field("firstName"), true)
}
