//! Graded records and the monthly staff report, with JSON persistence.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::grader::GradeOutcome;
use crate::model::{JudgeSource, JudgementResult, Stage};
use crate::progression::{LevelBand, ProgramStatus, ProgressionEvaluator, ProgressionState};
use crate::rubric::PASS_THRESHOLD;

/// Number of improvement actions listed in a monthly report.
const MAX_ACTIONS: usize = 3;

/// A graded submission, as handed to persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedRecord {
    pub id: Uuid,
    pub staff_id: String,
    #[serde(default)]
    pub submission_id: String,
    pub stage: Stage,
    /// Cycle month the submission counts towards, "YYYY-MM".
    pub year_month: String,
    pub graded_at: DateTime<Utc>,
    pub judged_by: JudgeSource,
    pub result: JudgementResult,
}

impl GradedRecord {
    pub fn new(
        staff_id: impl Into<String>,
        submission_id: impl Into<String>,
        stage: Stage,
        year_month: impl Into<String>,
        outcome: GradeOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            staff_id: staff_id.into(),
            submission_id: submission_id.into(),
            stage,
            year_month: year_month.into(),
            graded_at: Utc::now(),
            judged_by: outcome.source,
            result: outcome.result,
        }
    }

    /// Save the record as `<dir>/<id>.json`.
    pub fn save_json(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(format!("{}.json", self.id));
        let json = serde_json::to_string_pretty(self).context("failed to serialize record")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write record to {}", path.display()))?;
        Ok(())
    }
}

/// Load graded records from a JSON array file or a directory of record files.
pub fn load_records(path: &Path) -> Result<Vec<GradedRecord>> {
    if !path.is_dir() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read records from {}", path.display()))?;
        return serde_json::from_str(&content)
            .with_context(|| format!("failed to parse records JSON: {}", path.display()));
    }

    let mut records = Vec::new();
    for entry in std::fs::read_dir(path)
        .with_context(|| format!("failed to read directory: {}", path.display()))?
    {
        let file = entry?.path();
        if file.extension().is_some_and(|ext| ext == "json") {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            match serde_json::from_str::<GradedRecord>(&content) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("skipping {}: {}", file.display(), e),
            }
        }
    }
    records.sort_by_key(|r| r.graded_at);
    Ok(records)
}

/// Work pattern, which sets the monthly writing-day minimum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    /// Day shifts.
    #[default]
    Day,
    /// Night shifts only, or twice a week.
    Night,
    /// One night shift a week.
    #[serde(alias = "nightOnce")]
    NightOnce,
}

impl WorkType {
    /// Days a staff member must write in one cycle.
    pub fn min_days(self) -> u32 {
        match self {
            WorkType::Day => 6,
            WorkType::Night => 2,
            WorkType::NightOnce => 3,
        }
    }
}

impl fmt::Display for WorkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkType::Day => write!(f, "day"),
            WorkType::Night => write!(f, "night"),
            WorkType::NightOnce => write!(f, "night_once"),
        }
    }
}

impl FromStr for WorkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(WorkType::Day),
            "night" => Ok(WorkType::Night),
            "night_once" | "night-once" | "nightOnce" => Ok(WorkType::NightOnce),
            other => Err(format!("unknown work type: {other}")),
        }
    }
}

/// Writing progress against the monthly minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritingProgress {
    pub required_days: u32,
    pub written_days: u32,
    /// Days whose entry was judged a pass.
    pub pass_days: u32,
    /// written / required, capped at 100.
    pub percent: u32,
}

impl WritingProgress {
    pub fn compute(work_type: WorkType, records: &[&GradedRecord]) -> Self {
        let required_days = work_type.min_days();
        let written_days = records.len() as u32;
        let pass_days = records.iter().filter(|r| r.result.passed()).count() as u32;
        let percent = ((written_days as f64 / required_days as f64) * 100.0).round() as u32;
        Self {
            required_days,
            written_days,
            pass_days,
            percent: percent.min(100),
        }
    }

    pub fn is_met(&self) -> bool {
        self.written_days >= self.required_days
    }
}

/// Owned copy of a level band, for persisted reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSummary {
    pub level: u8,
    pub grade: String,
    pub name: String,
    pub label: String,
    pub hr_points: u32,
}

impl From<&LevelBand> for LevelSummary {
    fn from(band: &LevelBand) -> Self {
        Self {
            level: band.level,
            grade: band.grade.to_string(),
            name: band.name.to_string(),
            label: band.label.to_string(),
            hr_points: band.hr_points,
        }
    }
}

/// Per-stage counts within a month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub count: usize,
    pub pass_count: usize,
    pub mean_score: u32,
}

/// Monthly evaluation of one staff member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub staff_id: String,
    pub year_month: String,
    pub status: ProgramStatus,
    pub submission_count: usize,
    pub pass_count: usize,
    /// Rounded mean score of the month; absent without submissions.
    pub score: Option<u32>,
    pub level: Option<LevelSummary>,
    /// Whether the month's score passes the current stage.
    pub passed: bool,
    pub months_in_stage: u32,
    pub stagnant: bool,
    /// HR points deducted for stagnation.
    pub stagnation_penalty: u32,
    pub writing: WritingProgress,
    pub stages: Vec<StageSummary>,
    /// Most frequent missing points of the month.
    pub actions: Vec<String>,
}

fn mean(scores: impl Iterator<Item = u32>) -> Option<u32> {
    let (sum, n) = scores.fold((0u64, 0u64), |(sum, n), s| (sum + s as u64, n + 1));
    (n > 0).then(|| (sum as f64 / n as f64).round() as u32)
}

impl MonthlyReport {
    /// Aggregate the records of `staff_id` for `year_month`.
    pub fn build(
        staff_id: &str,
        year_month: &str,
        records: &[GradedRecord],
        state: &ProgressionState,
        work_type: WorkType,
        evaluator: &ProgressionEvaluator,
    ) -> Self {
        let month: Vec<&GradedRecord> = records
            .iter()
            .filter(|r| r.staff_id == staff_id && r.year_month == year_month)
            .collect();

        let score = mean(month.iter().map(|r| r.result.score));
        let passed = match (score, state.status) {
            (None, _) => false,
            (Some(_), ProgramStatus::Completed) => true,
            (Some(score), ProgramStatus::InStage(Stage::CaseReport)) => score >= PASS_THRESHOLD,
            (Some(score), ProgramStatus::InStage(_)) => {
                evaluator.check_pass(score, state.attempt_number, &state.score_history)
            }
        };

        let stages = Stage::ALL
            .iter()
            .filter_map(|&stage| {
                let of_stage: Vec<&&GradedRecord> =
                    month.iter().filter(|r| r.stage == stage).collect();
                let mean_score = mean(of_stage.iter().map(|r| r.result.score))?;
                Some(StageSummary {
                    stage,
                    count: of_stage.len(),
                    pass_count: of_stage.iter().filter(|r| r.result.passed()).count(),
                    mean_score,
                })
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            staff_id: staff_id.to_string(),
            year_month: year_month.to_string(),
            status: state.status,
            submission_count: month.len(),
            pass_count: month.iter().filter(|r| r.result.passed()).count(),
            score,
            level: score.map(|s| LevelSummary::from(evaluator.level_for(s))),
            passed,
            months_in_stage: state.months_in_stage,
            stagnant: evaluator.check_stagnation(state.months_in_stage),
            stagnation_penalty: evaluator.stagnation_penalty(state.months_in_stage),
            writing: WritingProgress::compute(work_type, &month),
            stages,
            actions: frequent_missing_points(&month),
        }
    }

    /// HR points for the month after any stagnation deduction.
    pub fn net_hr_points(&self) -> i64 {
        let earned = self.level.as_ref().map_or(0, |l| l.hr_points as i64);
        earned - self.stagnation_penalty as i64
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: MonthlyReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Format the report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "## Monthly report: {} ({})\n\n",
            self.staff_id, self.year_month
        ));
        md.push_str(&format!("**Status:** {}\n\n", self.status));

        match (&self.score, &self.level) {
            (Some(score), Some(level)) => md.push_str(&format!(
                "**Score:** {score} / 100, {} {} ({}), {}\n\n",
                level.grade,
                level.name,
                level.label,
                if self.passed { "passed" } else { "not passed" }
            )),
            _ => md.push_str("**Score:** no submissions this month\n\n"),
        }

        md.push_str(&format!(
            "**Writing days:** {}/{} ({}%), ○ {} days\n\n",
            self.writing.written_days,
            self.writing.required_days,
            self.writing.percent,
            self.writing.pass_days
        ));

        if self.stagnant {
            md.push_str(&format!(
                "**Stagnation:** {} months in stage, -{} HR points\n\n",
                self.months_in_stage, self.stagnation_penalty
            ));
        }

        if !self.stages.is_empty() {
            md.push_str("| Stage | Submissions | ○ | Mean score |\n");
            md.push_str("|-------|-------------|---|------------|\n");
            for s in &self.stages {
                md.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    s.stage, s.count, s.pass_count, s.mean_score
                ));
            }
            md.push('\n');
        }

        if !self.actions.is_empty() {
            md.push_str("### Improvement actions\n\n");
            for action in &self.actions {
                md.push_str(&format!("- {action}\n"));
            }
        }

        md
    }
}

fn frequent_missing_points(records: &[&GradedRecord]) -> Vec<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for point in records.iter().flat_map(|r| &r.result.missing_points) {
        let next_order = counts.len();
        counts.entry(point.as_str()).or_insert((0, next_order)).0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(point, (count, order))| (point, count, order))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(MAX_ACTIONS)
        .map(|(point, _, _)| point.to_string())
        .collect()
}
