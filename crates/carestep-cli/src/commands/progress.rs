//! The `carestep progress` command.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use carestep_core::model::{JudgementResult, Mark, Stage};
use carestep_core::progression::ProgressionState;
use carestep_core::rubric::PASS_THRESHOLD;
use carestep_providers::config::load_config_from;

pub struct ProgressArgs {
    pub state: Option<PathBuf>,
    pub init: Option<PathBuf>,
    pub staff: Option<String>,
    pub stage: Option<String>,
    pub score: Option<u32>,
    pub apply: bool,
    pub new_month: bool,
    pub config: Option<PathBuf>,
}

pub fn load_state(path: &Path) -> Result<ProgressionState> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read state file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse state file: {}", path.display()))
}

fn save_state(state: &ProgressionState, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write state file: {}", path.display()))
}

pub fn execute(args: ProgressArgs) -> Result<()> {
    if let Some(path) = &args.init {
        return init_state(path, args.staff.as_deref(), args.stage.as_deref());
    }
    let Some(path) = args.state else {
        anyhow::bail!("--state is required unless --init is given");
    };

    let config = load_config_from(args.config.as_deref())?;
    let evaluator = config.evaluator();
    let mut state = load_state(&path)?;
    let mut changed = false;

    if args.new_month {
        state.advance_month();
        changed = true;
    }

    println!("Staff: {}", state.staff_id);
    println!(
        "Status: {} (attempt {}, {} month(s) in stage)",
        state.status, state.attempt_number, state.months_in_stage
    );
    if !state.score_history.is_empty() {
        let history: Vec<String> = state.score_history.iter().map(u32::to_string).collect();
        println!("Previous scores: {}", history.join(", "));
    }

    if let Some(score) = args.score {
        let result = score_only_result(score);
        let decision = evaluator.evaluate(&state, &result);
        let band = evaluator.level_for(score);
        println!("Score {score}: {} ({})", band.name, band.label);
        println!("Decision: {decision}");
        state.apply(&decision);
        changed = true;
    }

    if evaluator.check_stagnation(state.months_in_stage) {
        println!(
            "Stagnating: {} month(s) in stage, -{} HR points",
            state.months_in_stage,
            evaluator.stagnation_penalty(state.months_in_stage)
        );
    }

    if changed {
        if args.apply {
            save_state(&state, &path)?;
            println!("State updated: {}", path.display());
        } else {
            println!("(dry run; pass --apply to update the state file)");
        }
    }

    Ok(())
}

fn init_state(path: &Path, staff: Option<&str>, stage: Option<&str>) -> Result<()> {
    anyhow::ensure!(
        !path.exists(),
        "state file already exists: {}",
        path.display()
    );
    let staff = staff.context("--staff is required with --init")?;
    let stage = stage
        .map(|s| s.parse::<Stage>().map_err(anyhow::Error::msg))
        .transpose()?
        .unwrap_or(Stage::Awareness);

    let state = ProgressionState::enrol_at(staff, stage);
    save_state(&state, path)?;
    println!("Created {} ({staff} at {stage})", path.display());
    Ok(())
}

/// A result carrying only a score, as entered by an evaluator.
fn score_only_result(score: u32) -> JudgementResult {
    JudgementResult {
        judgement: Mark::from_score(score, PASS_THRESHOLD),
        score,
        breakdown: BTreeMap::new(),
        short_comment: String::new(),
        good_points: Vec::new(),
        missing_points: Vec::new(),
        improvement_example: String::new(),
    }
}
