//! Stage advancement, level bands and stagnation.
//!
//! A staff member moves through the stages one at a time. The first graded
//! attempt at a stage passes at 80 points; every later attempt needs two
//! consecutive perfect scores. There is no demotion.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{JudgementResult, Stage};

/// Tunable pass and stagnation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassRules {
    /// Score that passes on the first attempt.
    pub first_attempt_score: u32,
    /// Score every attempt in the streak must reach after the first attempt.
    pub perfect_score: u32,
    /// Length of that streak, counting the current attempt.
    pub perfect_streak: usize,
    /// Months in one stage before stagnation is signalled.
    pub stagnation_months: u32,
    /// HR points deducted per stagnation signal.
    pub stagnation_penalty: u32,
}

impl Default for PassRules {
    fn default() -> Self {
        Self {
            first_attempt_score: 80,
            perfect_score: 100,
            perfect_streak: 2,
            stagnation_months: 8,
            stagnation_penalty: 2,
        }
    }
}

/// One row of the level table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelBand {
    pub min: u32,
    pub max: u32,
    pub level: u8,
    /// Qualification grade, e.g. "1級".
    pub grade: &'static str,
    pub name: &'static str,
    pub label: &'static str,
    pub hr_points: u32,
}

/// Level table, highest band first. Bands are contiguous over 0..=100.
pub const LEVEL_BANDS: [LevelBand; 5] = [
    LevelBand {
        min: 90,
        max: 100,
        level: 3,
        grade: "1級",
        name: "レベル3",
        label: "リーダー候補",
        hr_points: 10,
    },
    LevelBand {
        min: 80,
        max: 89,
        level: 3,
        grade: "1級",
        name: "レベル3",
        label: "仮説100点",
        hr_points: 8,
    },
    LevelBand {
        min: 60,
        max: 79,
        level: 2,
        grade: "2級",
        name: "レベル2",
        label: "仮説80点",
        hr_points: 6,
    },
    LevelBand {
        min: 40,
        max: 59,
        level: 1,
        grade: "3級",
        name: "レベル1",
        label: "気付き100点",
        hr_points: 4,
    },
    LevelBand {
        min: 0,
        max: 39,
        level: 0,
        grade: "-",
        name: "新人",
        label: "気付き100点",
        hr_points: 2,
    },
];

/// Where a staff member is in the curriculum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramStatus {
    InStage(Stage),
    Completed,
}

impl fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramStatus::InStage(stage) => write!(f, "{stage}"),
            ProgramStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Persisted progression of one staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionState {
    #[serde(default)]
    pub staff_id: String,
    pub status: ProgramStatus,
    /// Number of the next attempt at the current stage, starting at 1.
    pub attempt_number: u32,
    /// Scores of earlier attempts at the current stage, oldest first.
    #[serde(default)]
    pub score_history: Vec<u32>,
    #[serde(default)]
    pub months_in_stage: u32,
}

impl ProgressionState {
    /// A fresh enrolment at STEP1.
    pub fn new(staff_id: impl Into<String>) -> Self {
        Self::enrol_at(staff_id, Stage::Awareness)
    }

    pub fn enrol_at(staff_id: impl Into<String>, stage: Stage) -> Self {
        Self {
            staff_id: staff_id.into(),
            status: ProgramStatus::InStage(stage),
            attempt_number: 1,
            score_history: Vec::new(),
            months_in_stage: 0,
        }
    }

    pub fn current_stage(&self) -> Option<Stage> {
        match self.status {
            ProgramStatus::InStage(stage) => Some(stage),
            ProgramStatus::Completed => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ProgramStatus::Completed
    }

    /// Apply a decision returned by [`ProgressionEvaluator::evaluate`].
    pub fn apply(&mut self, decision: &ProgressionDecision) {
        match *decision {
            ProgressionDecision::Advance { to, .. } => {
                self.status = ProgramStatus::InStage(to);
                self.reset_stage_counters();
            }
            ProgressionDecision::Complete { .. } => {
                self.status = ProgramStatus::Completed;
                self.reset_stage_counters();
            }
            ProgressionDecision::Retry { score, .. } => {
                self.score_history.push(score);
                self.attempt_number += 1;
            }
            ProgressionDecision::AlreadyCompleted => {}
        }
    }

    /// Count one more month spent in the current stage.
    pub fn advance_month(&mut self) {
        if !self.is_completed() {
            self.months_in_stage += 1;
        }
    }

    fn reset_stage_counters(&mut self) {
        self.attempt_number = 1;
        self.score_history.clear();
        self.months_in_stage = 0;
    }
}

/// Outcome of evaluating one graded attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ProgressionDecision {
    /// Passed; move to the next stage.
    Advance { from: Stage, to: Stage },
    /// Passed the final stage.
    Complete { from: Stage },
    /// Not passed; try the stage again.
    Retry {
        stage: Stage,
        score: u32,
        next_attempt: u32,
    },
    /// The program is already finished; nothing changes.
    AlreadyCompleted,
}

impl fmt::Display for ProgressionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressionDecision::Advance { from, to } => write!(f, "advance {from} -> {to}"),
            ProgressionDecision::Complete { from } => write!(f, "complete after {from}"),
            ProgressionDecision::Retry {
                stage,
                next_attempt,
                ..
            } => write!(f, "retry {stage} (attempt {next_attempt})"),
            ProgressionDecision::AlreadyCompleted => write!(f, "already completed"),
        }
    }
}

/// Applies the pass rules and the level table.
#[derive(Debug, Clone, Default)]
pub struct ProgressionEvaluator {
    rules: PassRules,
}

impl ProgressionEvaluator {
    pub fn new(rules: PassRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &PassRules {
        &self.rules
    }

    /// Whether an attempt passes its stage.
    ///
    /// `previous_scores` holds earlier attempts, oldest first. An empty
    /// history never passes after the first attempt.
    pub fn check_pass(&self, score: u32, attempt_number: u32, previous_scores: &[u32]) -> bool {
        if attempt_number <= 1 {
            return score >= self.rules.first_attempt_score;
        }
        let needed_previous = self.rules.perfect_streak.saturating_sub(1);
        if previous_scores.len() < needed_previous.max(1) {
            return false;
        }
        let recent = &previous_scores[previous_scores.len() - needed_previous..];
        score == self.rules.perfect_score && recent.iter().all(|s| *s == self.rules.perfect_score)
    }

    /// Level band for a score. Scores above 100 take the top band.
    pub fn level_for(&self, score: u32) -> &'static LevelBand {
        level_for(score)
    }

    pub fn check_stagnation(&self, months_in_stage: u32) -> bool {
        months_in_stage >= self.rules.stagnation_months
    }

    /// HR points deducted for the given time in stage, zero when not stagnant.
    pub fn stagnation_penalty(&self, months_in_stage: u32) -> u32 {
        if self.check_stagnation(months_in_stage) {
            self.rules.stagnation_penalty
        } else {
            0
        }
    }

    /// Decide what a graded attempt means for the state. Does not mutate it.
    pub fn evaluate(
        &self,
        state: &ProgressionState,
        result: &JudgementResult,
    ) -> ProgressionDecision {
        let Some(stage) = state.current_stage() else {
            return ProgressionDecision::AlreadyCompleted;
        };

        let passed = match stage {
            Stage::CaseReport => result.passed(),
            _ => self.check_pass(result.score, state.attempt_number, &state.score_history),
        };

        let decision = match (passed, stage.next()) {
            (true, Some(to)) => ProgressionDecision::Advance { from: stage, to },
            (true, None) => ProgressionDecision::Complete { from: stage },
            (false, _) => ProgressionDecision::Retry {
                stage,
                score: result.score,
                next_attempt: state.attempt_number + 1,
            },
        };
        tracing::info!(
            staff = %state.staff_id,
            %stage,
            score = result.score,
            attempt = state.attempt_number,
            %decision,
            "progression evaluated"
        );
        decision
    }
}

/// Level band for a score under the standard table.
pub fn level_for(score: u32) -> &'static LevelBand {
    let score = score.min(100);
    LEVEL_BANDS
        .iter()
        .find(|band| (band.min..=band.max).contains(&score))
        .unwrap_or(&LEVEL_BANDS[LEVEL_BANDS.len() - 1])
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::Mark;

    fn result(score: u32) -> JudgementResult {
        JudgementResult {
            judgement: Mark::from_score(score, 60),
            score,
            breakdown: BTreeMap::new(),
            short_comment: String::new(),
            good_points: vec![],
            missing_points: vec![],
            improvement_example: String::new(),
        }
    }

    #[test]
    fn check_pass_examples() {
        let eval = ProgressionEvaluator::default();
        assert!(eval.check_pass(80, 1, &[]));
        assert!(!eval.check_pass(79, 1, &[]));
        assert!(eval.check_pass(100, 2, &[100]));
        assert!(!eval.check_pass(100, 2, &[95]));
        assert!(!eval.check_pass(85, 2, &[100]));
        assert!(!eval.check_pass(100, 2, &[]));
    }

    #[test]
    fn only_the_most_recent_score_counts() {
        let eval = ProgressionEvaluator::default();
        assert!(eval.check_pass(100, 4, &[40, 70, 100]));
        assert!(!eval.check_pass(100, 4, &[100, 100, 90]));
    }

    #[test]
    fn longer_streak_rule() {
        let eval = ProgressionEvaluator::new(PassRules {
            perfect_streak: 3,
            ..PassRules::default()
        });
        assert!(!eval.check_pass(100, 3, &[100]));
        assert!(eval.check_pass(100, 3, &[100, 100]));
    }

    #[test]
    fn level_bands_cover_all_scores() {
        for score in 0..=100 {
            let matching = LEVEL_BANDS
                .iter()
                .filter(|b| (b.min..=b.max).contains(&score))
                .count();
            assert_eq!(matching, 1, "score {score}");
        }
    }

    #[test]
    fn level_lookup() {
        assert_eq!(level_for(95).label, "リーダー候補");
        assert_eq!(level_for(85).hr_points, 8);
        assert_eq!(level_for(72).grade, "2級");
        assert_eq!(level_for(40).level, 1);
        assert_eq!(level_for(39).name, "新人");
        assert_eq!(level_for(0).hr_points, 2);
        assert_eq!(level_for(150).hr_points, 10);
    }

    #[test]
    fn stagnation_threshold() {
        let eval = ProgressionEvaluator::default();
        assert!(!eval.check_stagnation(7));
        assert!(eval.check_stagnation(8));
        assert!(eval.check_stagnation(12));
        assert_eq!(eval.stagnation_penalty(7), 0);
        assert_eq!(eval.stagnation_penalty(9), 2);
    }

    #[test]
    fn first_attempt_pass_advances() {
        let eval = ProgressionEvaluator::default();
        let mut state = ProgressionState::new("S001");
        let decision = eval.evaluate(&state, &result(85));
        assert_eq!(
            decision,
            ProgressionDecision::Advance {
                from: Stage::Awareness,
                to: Stage::Hypothesis
            }
        );
        state.apply(&decision);
        assert_eq!(state.current_stage(), Some(Stage::Hypothesis));
        assert_eq!(state.attempt_number, 1);
        assert!(state.score_history.is_empty());
    }

    #[test]
    fn retries_need_two_perfect_scores() {
        let eval = ProgressionEvaluator::default();
        let mut state = ProgressionState::new("S001");
        state.advance_month();

        for score in [70, 100] {
            let decision = eval.evaluate(&state, &result(score));
            assert!(matches!(decision, ProgressionDecision::Retry { .. }));
            state.apply(&decision);
        }
        assert_eq!(state.attempt_number, 3);
        assert_eq!(state.score_history, vec![70, 100]);
        assert_eq!(state.months_in_stage, 1);

        let decision = eval.evaluate(&state, &result(100));
        assert!(matches!(decision, ProgressionDecision::Advance { .. }));
        state.apply(&decision);
        assert_eq!(state.months_in_stage, 0);
    }

    #[test]
    fn second_attempt_at_85_never_passes() {
        let eval = ProgressionEvaluator::default();
        let mut state = ProgressionState::new("S001");
        state.apply(&eval.evaluate(&state, &result(50)));
        let decision = eval.evaluate(&state, &result(85));
        assert_eq!(
            decision,
            ProgressionDecision::Retry {
                stage: Stage::Awareness,
                score: 85,
                next_attempt: 3
            }
        );
    }

    #[test]
    fn case_report_passes_on_its_rubric() {
        let eval = ProgressionEvaluator::default();
        let mut state = ProgressionState::enrol_at("S001", Stage::CaseReport);
        state.attempt_number = 2;
        state.score_history = vec![50];
        let decision = eval.evaluate(&state, &result(60));
        assert_eq!(
            decision,
            ProgressionDecision::Complete {
                from: Stage::CaseReport
            }
        );
        state.apply(&decision);
        assert!(state.is_completed());

        assert_eq!(
            eval.evaluate(&state, &result(100)),
            ProgressionDecision::AlreadyCompleted
        );
        state.advance_month();
        assert_eq!(state.months_in_stage, 0);
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut state = ProgressionState::new("S042");
        state.score_history = vec![72];
        state.attempt_number = 2;
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains(r#""status":{"in_stage":"step1"}"#));
        let back: ProgressionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);

        let done: ProgressionState = serde_json::from_str(
            r#"{"staff_id":"S1","status":"completed","attempt_number":1}"#,
        )
        .unwrap();
        assert!(done.is_completed());
    }
}
