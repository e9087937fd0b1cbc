//! Core data model types for carestep.
//!
//! Stages, the per-stage submission records, and the judgement produced
//! for each submission.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// A curriculum stage. Each stage has its own rubric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    /// STEP1: noticing changes in the person being cared for.
    #[serde(rename = "step1")]
    Awareness,
    /// STEP2: forming hypotheses about a noticed change.
    #[serde(rename = "step2")]
    Hypothesis,
    /// STEP3: reflecting on the support that was given.
    #[serde(rename = "step3")]
    Reflection,
    /// STEP4: the integrated case report.
    #[serde(rename = "step4")]
    CaseReport,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Awareness,
        Stage::Hypothesis,
        Stage::Reflection,
        Stage::CaseReport,
    ];

    /// Stage number, 1 through 4.
    pub fn number(self) -> u8 {
        match self {
            Stage::Awareness => 1,
            Stage::Hypothesis => 2,
            Stage::Reflection => 3,
            Stage::CaseReport => 4,
        }
    }

    /// The stage that follows this one, if any.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Awareness => Some(Stage::Hypothesis),
            Stage::Hypothesis => Some(Stage::Reflection),
            Stage::Reflection => Some(Stage::CaseReport),
            Stage::CaseReport => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step{}", self.number())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1" | "step1" | "awareness" => Ok(Stage::Awareness),
            "2" | "step2" | "hypothesis" => Ok(Stage::Hypothesis),
            "3" | "step3" | "reflection" => Ok(Stage::Reflection),
            "4" | "step4" | "case-report" | "case_report" => Ok(Stage::CaseReport),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// A submission for one stage. The variant determines the shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage")]
pub enum Submission {
    #[serde(rename = "step1")]
    Awareness(AwarenessSubmission),
    #[serde(rename = "step2")]
    Hypothesis(HypothesisSubmission),
    #[serde(rename = "step3")]
    Reflection(ReflectionSubmission),
    #[serde(rename = "step4")]
    CaseReport(CaseReportSubmission),
}

impl Submission {
    /// The stage this payload was written for.
    pub fn stage(&self) -> Stage {
        match self {
            Submission::Awareness(_) => Stage::Awareness,
            Submission::Hypothesis(_) => Stage::Hypothesis,
            Submission::Reflection(_) => Stage::Reflection,
            Submission::CaseReport(_) => Stage::CaseReport,
        }
    }

    /// Look up a free-text field. Returns `None` when this payload does not
    /// carry the field, which scores as a failed criterion.
    pub fn text(&self, field: TextField) -> Option<&str> {
        match (self, field) {
            (Submission::Awareness(s), TextField::NoticeText) => Some(&s.notice_text),
            (Submission::Hypothesis(s), TextField::ChangeNoticed) => Some(&s.change_noticed),
            (Submission::Reflection(s), TextField::Notice) => Some(&s.notice),
            (Submission::Reflection(s), TextField::Support) => Some(&s.support),
            (Submission::Reflection(s), TextField::Reason) => Some(&s.reason),
            (Submission::Reflection(s), TextField::Prediction) => Some(&s.prediction),
            (Submission::Reflection(s), TextField::Reaction) => Some(&s.reaction),
            (Submission::Reflection(s), TextField::DecisionReason) => Some(&s.decision_reason),
            (Submission::CaseReport(s), TextField::Summary) => Some(&s.summary),
            (Submission::CaseReport(s), TextField::OtherServices) => Some(&s.other_services),
            _ => None,
        }
    }

    /// Hypotheses, for STEP2 payloads.
    pub fn hypotheses(&self) -> Option<&[Hypothesis]> {
        match self {
            Submission::Hypothesis(s) => Some(&s.hypotheses),
            _ => None,
        }
    }
}

/// Free-text fields addressable by rubric rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    NoticeText,
    ChangeNoticed,
    Notice,
    Support,
    Reason,
    Prediction,
    Reaction,
    DecisionReason,
    Summary,
    OtherServices,
}

/// STEP1: a single noticed change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwarenessSubmission {
    /// What the staff member noticed.
    #[serde(default)]
    pub notice_text: String,
    /// The person the note is about.
    #[serde(default)]
    pub target_id: String,
    /// Day the observation was made.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// STEP2: hypotheses about a noticed change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HypothesisSubmission {
    #[serde(default)]
    pub change_noticed: String,
    /// Between 3 and 5 hypotheses when accepted by a caller.
    #[serde(default)]
    pub hypotheses: Vec<Hypothesis>,
    #[serde(default)]
    pub priority_reason: String,
    #[serde(default)]
    pub expected_change: String,
}

/// One "why?" chain with its support plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// First-level cause. Required.
    #[serde(default)]
    pub why1: String,
    #[serde(default)]
    pub why2: Option<String>,
    #[serde(default)]
    pub why3: Option<String>,
    /// Support planned against the cause.
    #[serde(default)]
    pub support: Option<String>,
    /// Rank 1..5; 0 or absent means unranked.
    #[serde(default)]
    pub priority: Option<u32>,
}

/// STEP3: reflection on delivered support.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReflectionSubmission {
    #[serde(default)]
    pub notice: String,
    #[serde(default)]
    pub support: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub prediction: String,
    #[serde(default)]
    pub reaction: String,
    #[serde(default, deserialize_with = "blank_as_no_decision")]
    pub decision: Option<Decision>,
    #[serde(default, alias = "decisionReason")]
    pub decision_reason: String,
}

/// What to do with the support after reflecting on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Continue,
    Change,
    End,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Continue => write!(f, "continue"),
            Decision::Change => write!(f, "change"),
            Decision::End => write!(f, "end"),
        }
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "continue" | "継続" => Ok(Decision::Continue),
            "change" | "変更" => Ok(Decision::Change),
            "end" | "終了" => Ok(Decision::End),
            other => Err(format!("unknown decision: {other}")),
        }
    }
}

/// Forms submit an unselected decision as "".
fn blank_as_no_decision<'de, D>(deserializer: D) -> Result<Option<Decision>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// STEP4: case report integrating the earlier stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseReportSubmission {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub has_step1: bool,
    #[serde(default)]
    pub has_step2: bool,
    #[serde(default)]
    pub has_step3: bool,
    /// Information gathered from other care services.
    #[serde(default)]
    pub other_services: String,
    #[serde(default)]
    pub presentation_date: Option<NaiveDate>,
}

/// Pass/fail mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    #[serde(rename = "○", alias = "◯", alias = "o", alias = "O")]
    Pass,
    #[serde(rename = "×", alias = "☓", alias = "x", alias = "X")]
    Fail,
}

impl Mark {
    pub fn from_score(score: u32, threshold: u32) -> Self {
        if score >= threshold {
            Mark::Pass
        } else {
            Mark::Fail
        }
    }

    pub fn is_pass(self) -> bool {
        self == Mark::Pass
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::Pass => write!(f, "○"),
            Mark::Fail => write!(f, "×"),
        }
    }
}

/// The graded outcome of one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgementResult {
    pub judgement: Mark,
    /// 0..=100.
    pub score: u32,
    /// Points earned per criterion id.
    #[serde(default)]
    pub breakdown: BTreeMap<String, u32>,
    #[serde(default)]
    pub short_comment: String,
    #[serde(default)]
    pub good_points: Vec<String>,
    #[serde(default)]
    pub missing_points: Vec<String>,
    /// Example rewrite; only set when the judgement is a fail.
    #[serde(default)]
    pub improvement_example: String,
}

impl JudgementResult {
    pub fn passed(&self) -> bool {
        self.judgement.is_pass()
    }
}

/// Which judge produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeSource {
    /// The remote language-model judge answered with a usable verdict.
    Remote,
    /// The remote judge answered, but not with parseable JSON.
    Placeholder,
    /// The local rule evaluator.
    Local,
}

impl fmt::Display for JudgeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JudgeSource::Remote => write!(f, "remote"),
            JudgeSource::Placeholder => write!(f, "placeholder"),
            JudgeSource::Local => write!(f, "local"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_display_and_parse() {
        assert_eq!(Stage::Awareness.to_string(), "step1");
        assert_eq!(Stage::CaseReport.to_string(), "step4");
        assert_eq!("step2".parse::<Stage>().unwrap(), Stage::Hypothesis);
        assert_eq!("3".parse::<Stage>().unwrap(), Stage::Reflection);
        assert_eq!("Awareness".parse::<Stage>().unwrap(), Stage::Awareness);
        assert!("step5".parse::<Stage>().is_err());
    }

    #[test]
    fn stage_order_ends_at_case_report() {
        assert_eq!(Stage::Awareness.next(), Some(Stage::Hypothesis));
        assert_eq!(Stage::Reflection.next(), Some(Stage::CaseReport));
        assert_eq!(Stage::CaseReport.next(), None);
    }

    #[test]
    fn submission_is_tagged_by_stage() {
        let json = r#"{"stage":"step1","notice_text":"朝、食堂で","target_id":"T001"}"#;
        let submission: Submission = serde_json::from_str(json).unwrap();
        assert_eq!(submission.stage(), Stage::Awareness);
        assert_eq!(submission.text(TextField::NoticeText), Some("朝、食堂で"));
        assert_eq!(submission.text(TextField::Summary), None);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let submission: Submission = serde_json::from_str(r#"{"stage":"step3"}"#).unwrap();
        assert_eq!(submission.text(TextField::Reaction), Some(""));
        let Submission::Reflection(r) = submission else {
            panic!("expected a reflection");
        };
        assert!(r.decision.is_none());
    }

    #[test]
    fn blank_decision_is_absent() {
        let json = r#"{"stage":"step3","decision":"","decisionReason":"様子を見る"}"#;
        let Submission::Reflection(r) = serde_json::from_str::<Submission>(json).unwrap() else {
            panic!("expected a reflection");
        };
        assert!(r.decision.is_none());
        assert_eq!(r.decision_reason, "様子を見る");

        let json = r#"{"stage":"step3","decision":"change"}"#;
        let Submission::Reflection(r) = serde_json::from_str::<Submission>(json).unwrap() else {
            panic!("expected a reflection");
        };
        assert_eq!(r.decision, Some(Decision::Change));
        assert!(serde_json::from_str::<Submission>(r#"{"stage":"step3","decision":"maybe"}"#).is_err());
    }

    #[test]
    fn mark_accepts_variant_glyphs() {
        let m: Mark = serde_json::from_str("\"☓\"").unwrap();
        assert_eq!(m, Mark::Fail);
        let m: Mark = serde_json::from_str("\"◯\"").unwrap();
        assert_eq!(m, Mark::Pass);
        assert_eq!(serde_json::to_string(&Mark::Fail).unwrap(), "\"×\"");
    }

    #[test]
    fn mark_threshold() {
        assert_eq!(Mark::from_score(60, 60), Mark::Pass);
        assert_eq!(Mark::from_score(59, 60), Mark::Fail);
    }
}
