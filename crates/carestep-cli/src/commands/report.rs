//! The `carestep report` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use carestep_core::report::{load_records, MonthlyReport, WorkType};
use carestep_providers::config::load_config_from;

use super::progress::load_state;

pub struct ReportArgs {
    pub records: PathBuf,
    pub state: PathBuf,
    pub month: Option<String>,
    pub work_type: Option<String>,
    pub format: String,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

pub fn execute(args: ReportArgs) -> Result<()> {
    anyhow::ensure!(
        matches!(args.format.as_str(), "text" | "json" | "markdown" | "md"),
        "unknown format '{}', expected text, json or markdown",
        args.format
    );
    let config = load_config_from(args.config.as_deref())?;
    let work_type = match &args.work_type {
        Some(w) => w.parse::<WorkType>().map_err(anyhow::Error::msg)?,
        None => config.work_type,
    };
    let year_month = match args.month {
        Some(m) => {
            anyhow::ensure!(
                chrono::NaiveDate::parse_from_str(&format!("{m}-01"), "%Y-%m-%d").is_ok(),
                "invalid month '{m}', expected YYYY-MM"
            );
            m
        }
        None => {
            config
                .calendar
                .current_cycle(chrono::Local::now().naive_local())
                .year_month
        }
    };

    let records = load_records(&args.records)?;
    let state = load_state(&args.state)?;
    let evaluator = config.evaluator();

    let report = MonthlyReport::build(
        &state.staff_id,
        &year_month,
        &records,
        &state,
        work_type,
        &evaluator,
    );

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "markdown" | "md" => println!("{}", report.to_markdown()),
        _ => print_summary(&report),
    }

    if let Some(path) = &args.output {
        report.save_json(path)?;
        eprintln!("Report saved to: {}", path.display());
    }

    Ok(())
}

fn print_summary(report: &MonthlyReport) {
    println!("Staff: {} ({})", report.staff_id, report.year_month);
    println!("Status: {}", report.status);

    match (&report.score, &report.level) {
        (Some(score), Some(level)) => println!(
            "Score: {score} -> {} {} ({}), {}",
            level.grade,
            level.name,
            level.label,
            if report.passed { "passed" } else { "not passed" }
        ),
        _ => println!("Score: no submissions this month"),
    }
    println!(
        "Writing days: {}/{} ({}%), ○ {} days",
        report.writing.written_days,
        report.writing.required_days,
        report.writing.percent,
        report.writing.pass_days
    );
    if report.stagnant {
        println!(
            "Stagnating: {} months in stage, -{} HR points",
            report.months_in_stage, report.stagnation_penalty
        );
    }
    println!("HR points: {}", report.net_hr_points());

    if !report.stages.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Stage", "Submissions", "○", "Mean score"]);
        for s in &report.stages {
            table.add_row(vec![
                Cell::new(s.stage),
                Cell::new(s.count),
                Cell::new(s.pass_count),
                Cell::new(s.mean_score),
            ]);
        }
        println!("{table}");
    }

    for action in &report.actions {
        println!("  - {action}");
    }
}
