//! The `carestep grade` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use serde::Serialize;

use carestep_core::grader::GradeOutcome;
use carestep_core::model::{JudgeSource, JudgementResult, Stage};
use carestep_core::parser::{self, SubmissionFile};
use carestep_core::report::GradedRecord;
use carestep_providers::config::{build_grader, load_config_from, GraderOptions};

pub struct GradeArgs {
    pub submission: PathBuf,
    pub stage: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub local: bool,
    pub staff: Option<String>,
    pub format: String,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Serialize)]
struct GradedSubmission<'a> {
    id: &'a str,
    stage: Stage,
    judged_by: JudgeSource,
    result: &'a JudgementResult,
}

pub async fn execute(args: GradeArgs) -> Result<()> {
    anyhow::ensure!(
        matches!(args.format.as_str(), "text" | "json"),
        "unknown format '{}', expected text or json",
        args.format
    );
    let stage_filter = args
        .stage
        .as_deref()
        .map(|s| s.parse::<Stage>().map_err(anyhow::Error::msg))
        .transpose()?;

    let config = load_config_from(args.config.as_deref())?;

    let mut files = parser::load_submissions(&args.submission)?;
    if let Some(stage) = stage_filter {
        files.retain(|f| f.stage() == stage);
    }
    anyhow::ensure!(
        !files.is_empty(),
        "no submissions found in {}",
        args.submission.display()
    );
    files.retain(|f| match f.submission.hypotheses() {
        Some(hypotheses) if !parser::HYPOTHESIS_RANGE.contains(&hypotheses.len()) => {
            eprintln!(
                "Skipping {}: expected {} to {} hypotheses, found {}",
                f.id,
                parser::HYPOTHESIS_RANGE.start(),
                parser::HYPOTHESIS_RANGE.end(),
                hypotheses.len()
            );
            false
        }
        _ => true,
    });
    anyhow::ensure!(
        !files.is_empty(),
        "no gradable submissions in {}",
        args.submission.display()
    );

    let options = GraderOptions {
        provider: args.provider,
        model: args.model,
        local_only: args.local,
    };
    let grader = build_grader(&config, &options)?;
    match grader.judge_name() {
        Some(name) => eprintln!(
            "Grading {} submission(s) with {name}/{}",
            files.len(),
            grader.config().model
        ),
        None => eprintln!("Grading {} submission(s) with local rules", files.len()),
    }

    let items: Vec<_> = files
        .iter()
        .map(|f| (f.stage(), f.submission.clone()))
        .collect();
    let outcomes = grader.grade_all(&items).await;

    if args.format == "json" {
        let graded: Vec<GradedSubmission<'_>> = files
            .iter()
            .zip(&outcomes)
            .map(|(file, outcome)| GradedSubmission {
                id: &file.id,
                stage: file.stage(),
                judged_by: outcome.source,
                result: &outcome.result,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&graded)?);
    } else {
        print_results(&files, &outcomes);
    }

    if let Some(dir) = &args.output {
        let now = chrono::Local::now().naive_local();
        for (file, outcome) in files.iter().zip(outcomes) {
            let staff_id = file
                .staff_id
                .clone()
                .or_else(|| args.staff.clone())
                .with_context(|| {
                    format!("submission '{}' has no staff_id; pass --staff", file.id)
                })?;
            let cycle = config
                .calendar
                .current_cycle(file.submitted_at.unwrap_or(now));
            let record = GradedRecord::new(
                staff_id,
                file.id.clone(),
                file.stage(),
                cycle.year_month,
                outcome,
            );
            record.save_json(dir)?;
        }
        eprintln!("Records saved to: {}", dir.display());
    }

    Ok(())
}

fn print_results(files: &[SubmissionFile], outcomes: &[GradeOutcome]) {
    let mut table = Table::new();
    table.set_header(vec!["Submission", "Stage", "Result", "Score", "Judge", "Comment"]);

    for (file, outcome) in files.iter().zip(outcomes) {
        table.add_row(vec![
            Cell::new(&file.id),
            Cell::new(file.stage()),
            Cell::new(outcome.result.judgement),
            Cell::new(outcome.result.score),
            Cell::new(outcome.source),
            Cell::new(&outcome.result.short_comment),
        ]);
    }
    println!("{table}");

    for (file, outcome) in files.iter().zip(outcomes) {
        let result = &outcome.result;
        if result.missing_points.is_empty() && result.improvement_example.is_empty() {
            continue;
        }
        println!("\n[{}]", file.id);
        for point in &result.missing_points {
            println!("  - {point}");
        }
        if !result.improvement_example.is_empty() {
            println!("  {}", result.improvement_example);
        }
    }

    let passed = outcomes.iter().filter(|o| o.result.passed()).count();
    println!("\n{passed}/{} passed", outcomes.len());
}
